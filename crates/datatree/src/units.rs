//! Unit parsing and conversion for schema-declared quantities.
//!
//! Schema unit strings are resolved against a fixed registry of physical
//! units (scale + offset over a dimension vector); datetime coordinates use
//! [`DateTimeUnit`] instead, which fixes the tick resolution and timezone of
//! the stored integer ticks. Ingestion converts every source column from
//! `source_unit` to `unit` before any value reaches an array.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Dimension exponents: length, mass, time, temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dimension([i8; 4]);

impl Dimension {
    const NONE: Dimension = Dimension([0, 0, 0, 0]);
    const LENGTH: Dimension = Dimension([1, 0, 0, 0]);
    const TIME: Dimension = Dimension([0, 0, 1, 0]);
    const TEMPERATURE: Dimension = Dimension([0, 0, 0, 1]);
    const PRESSURE: Dimension = Dimension([-1, 1, -2, 0]);

    fn div(self, other: Dimension) -> Dimension {
        let mut out = [0i8; 4];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.0[i] - other.0[i];
        }
        Dimension(out)
    }
}

/// A parsed physical unit: `value_in_base = value * scale + offset`.
///
/// The original spelling is kept so that schema serialization round trips
/// byte-for-byte.
#[derive(Debug, Clone)]
pub struct Unit {
    spec: String,
    scale: f64,
    offset: f64,
    dim: Dimension,
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

/// Registry of simple units: spelling, scale to base, offset, dimension.
fn resolve_token(token: &str) -> Option<(f64, f64, Dimension)> {
    let entry = match token {
        "" | "1" | "dimensionless" | "bool" | "boolean" | "count" => (1.0, 0.0, Dimension::NONE),
        "%" | "percent" => (0.01, 0.0, Dimension::NONE),
        // time, base second
        "s" | "sec" | "second" | "seconds" => (1.0, 0.0, Dimension::TIME),
        "ms" | "millisecond" | "milliseconds" => (1e-3, 0.0, Dimension::TIME),
        "us" | "microsecond" | "microseconds" => (1e-6, 0.0, Dimension::TIME),
        "min" | "minute" | "minutes" => (60.0, 0.0, Dimension::TIME),
        "h" | "hr" | "hour" | "hours" => (3600.0, 0.0, Dimension::TIME),
        "day" | "days" | "d" => (86400.0, 0.0, Dimension::TIME),
        // length, base meter
        "m" | "meter" | "meters" | "metre" => (1.0, 0.0, Dimension::LENGTH),
        "mm" => (1e-3, 0.0, Dimension::LENGTH),
        "cm" => (1e-2, 0.0, Dimension::LENGTH),
        "km" => (1e3, 0.0, Dimension::LENGTH),
        // temperature, base kelvin
        "K" | "kelvin" => (1.0, 0.0, Dimension::TEMPERATURE),
        "degC" | "celsius" | "°C" => (1.0, 273.15, Dimension::TEMPERATURE),
        "degF" | "fahrenheit" | "°F" => (5.0 / 9.0, 255.372_222_222_222_2, Dimension::TEMPERATURE),
        // pressure, base pascal
        "Pa" | "pascal" => (1.0, 0.0, Dimension::PRESSURE),
        "hPa" | "mbar" => (100.0, 0.0, Dimension::PRESSURE),
        "kPa" => (1000.0, 0.0, Dimension::PRESSURE),
        "bar" => (1e5, 0.0, Dimension::PRESSURE),
        _ => return None,
    };
    Some(entry)
}

impl Unit {
    /// Parse a unit spelling; supports a single token or a `a/b` quotient
    /// (quotients lose any offset, as offset units only make sense alone).
    pub fn parse(spec: &str) -> Result<Unit, String> {
        let trimmed = spec.trim();
        if let Some((num, den)) = trimmed.split_once('/') {
            let (ns, no, nd) =
                resolve_token(num.trim()).ok_or_else(|| format!("unknown unit '{num}'"))?;
            let (ds, d_off, dd) =
                resolve_token(den.trim()).ok_or_else(|| format!("unknown unit '{den}'"))?;
            if no != 0.0 || d_off != 0.0 {
                return Err(format!("offset units cannot form a quotient: '{spec}'"));
            }
            return Ok(Unit {
                spec: trimmed.to_string(),
                scale: ns / ds,
                offset: 0.0,
                dim: nd.div(dd),
            });
        }
        let (scale, offset, dim) =
            resolve_token(trimmed).ok_or_else(|| format!("unknown unit '{spec}'"))?;
        Ok(Unit {
            spec: trimmed.to_string(),
            scale,
            offset,
            dim,
        })
    }

    /// Dimensionless unit.
    pub fn dimensionless() -> Unit {
        Unit::parse("").expect("dimensionless unit")
    }

    /// The original spelling, used for serialization.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Whether values in `self` can be converted to `other`.
    pub fn compatible(&self, other: &Unit) -> bool {
        self.dim == other.dim
    }

    /// Convert a single value into `to`.
    pub fn convert_value(&self, to: &Unit, value: f64) -> Result<f64, String> {
        if !self.compatible(to) {
            return Err(format!(
                "incompatible units: '{}' -> '{}'",
                self.spec, to.spec
            ));
        }
        Ok((value * self.scale + self.offset - to.offset) / to.scale)
    }

    /// Convert a slice of values in place into `to`.
    pub fn convert_slice(&self, to: &Unit, values: &mut [f64]) -> Result<(), String> {
        if !self.compatible(to) {
            return Err(format!(
                "incompatible units: '{}' -> '{}'",
                self.spec, to.spec
            ));
        }
        if self.spec == to.spec {
            return Ok(());
        }
        for v in values {
            *v = (*v * self.scale + self.offset - to.offset) / to.scale;
        }
        Ok(())
    }

    /// The unit of differences of this unit (drops any offset; steps in
    /// degC are steps in kelvin).
    pub fn step_unit(&self) -> Unit {
        Unit {
            spec: self.spec.clone(),
            scale: self.scale,
            offset: 0.0,
            dim: self.dim,
        }
    }
}

/// Tick resolution of stored datetime coordinates.
///
/// Nanoseconds are deliberately absent: epoch nanoseconds exceed the exact
/// integer range of the `f64` working buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Whole seconds.
    Seconds,
    /// Milliseconds.
    Millis,
    /// Microseconds (default).
    Micros,
}

impl Tick {
    /// Parse the tick spelling used in schema files.
    pub fn parse(spec: &str) -> Result<Tick, String> {
        match spec {
            "s" => Ok(Tick::Seconds),
            "ms" => Ok(Tick::Millis),
            "us" => Ok(Tick::Micros),
            "ns" => Err("nanosecond ticks are not supported (exceeds exact f64 range)".to_string()),
            other => Err(format!("unknown datetime tick '{other}'")),
        }
    }

    /// Tick spelling.
    pub fn spec(self) -> &'static str {
        match self {
            Tick::Seconds => "s",
            Tick::Millis => "ms",
            Tick::Micros => "us",
        }
    }

    /// Ticks per second.
    pub fn per_second(self) -> i64 {
        match self {
            Tick::Seconds => 1,
            Tick::Millis => 1_000,
            Tick::Micros => 1_000_000,
        }
    }
}

/// Not-a-time sentinel, stored in the integer tick representation.
pub const NAT: i64 = i64::MIN;

/// Datetime parsing and storage configuration of one coordinate.
///
/// Values are stored as integer ticks since the Unix epoch, shifted into the
/// configured fixed timezone offset (local wall-clock storage).
#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeUnit {
    /// Tick resolution.
    pub tick: Tick,
    /// Fixed offset as `±HH:MM`, `UTC`, or absent (UTC).
    pub tz: Option<String>,
}

impl Default for DateTimeUnit {
    fn default() -> Self {
        Self {
            tick: Tick::Micros,
            tz: None,
        }
    }
}

impl DateTimeUnit {
    /// Resolve the configured timezone to a fixed offset.
    pub fn tz_offset(&self) -> Result<FixedOffset, String> {
        let Some(spec) = self.tz.as_deref() else {
            return Ok(FixedOffset::east_opt(0).expect("utc offset"));
        };
        if spec.eq_ignore_ascii_case("utc") || spec == "Z" {
            return Ok(FixedOffset::east_opt(0).expect("utc offset"));
        }
        let (sign, rest) = match spec.split_at_checked(1) {
            Some(("+", rest)) => (1, rest),
            Some(("-", rest)) => (-1, rest),
            _ => return Err(format!("unknown timezone spec '{spec}'")),
        };
        let (hh, mm) = rest
            .split_once(':')
            .ok_or_else(|| format!("unknown timezone spec '{spec}'"))?;
        let hours: i32 = hh.parse().map_err(|_| format!("bad timezone '{spec}'"))?;
        let minutes: i32 = mm.parse().map_err(|_| format!("bad timezone '{spec}'"))?;
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .ok_or_else(|| format!("timezone offset out of range: '{spec}'"))
    }

    /// Offset from UTC in seconds.
    pub fn tz_shift_seconds(&self) -> Result<i64, String> {
        Ok(self.tz_offset()?.local_minus_utc() as i64)
    }

    /// Parse one timestamp string into ticks; `"NaT"` maps to [`NAT`].
    ///
    /// Accepts RFC 3339 and the common `YYYY-MM-DD[ T]HH:MM:SS[.frac]` and
    /// `YYYY-MM-DD` forms; naive inputs are interpreted in the configured
    /// timezone.
    pub fn parse(&self, value: &str) -> Result<i64, String> {
        let v = value.trim();
        if v.is_empty() || v.eq_ignore_ascii_case("nat") {
            return Ok(NAT);
        }

        let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
            dt.with_timezone(&Utc)
        } else if let Some(naive) = parse_naive(v) {
            let offset = self.tz_offset()?;
            match offset.from_local_datetime(&naive) {
                chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                    dt.with_timezone(&Utc)
                }
                chrono::LocalResult::None => {
                    return Err(format!("timestamp '{v}' does not exist in target timezone"))
                }
            }
        } else {
            return Err(format!("unparsable timestamp '{v}'"));
        };

        // Stored ticks are local wall-clock in the configured timezone.
        let local_micros = utc
            .timestamp_micros()
            .checked_add(self.tz_shift_seconds()? * 1_000_000)
            .ok_or_else(|| format!("timestamp '{v}' out of range"))?;
        Ok(local_micros / (1_000_000 / self.tick.per_second()))
    }

    /// Convert ticks between two datetime units (tick rescale + tz shift).
    pub fn convert_ticks(&self, to: &DateTimeUnit, value: i64) -> Result<i64, String> {
        if value == NAT {
            return Ok(NAT);
        }
        let utc_sub = value - self.tz_shift_seconds()? * self.tick.per_second();
        // Rescale through microseconds to avoid precision juggling.
        let micros = utc_sub * (1_000_000 / self.tick.per_second());
        let rescaled = micros / (1_000_000 / to.tick.per_second());
        Ok(rescaled + to.tz_shift_seconds()? * to.tick.per_second())
    }

    /// The step unit of this axis: one tick, expressed as a time [`Unit`].
    pub fn step_unit(&self) -> Unit {
        Unit::parse(self.tick.spec()).expect("tick is a registered time unit")
    }
}

fn parse_naive(v: &str) -> Option<NaiveDateTime> {
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Unit slot of a schema variable or coordinate.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UnitSpec {
    /// No unit declared.
    #[default]
    None,
    /// Physical unit.
    Physical(Unit),
    /// Datetime configuration.
    DateTime(DateTimeUnit),
}

impl UnitSpec {
    /// The unit governing steps/differences along an axis of this unit.
    pub fn step_unit(&self) -> Unit {
        match self {
            UnitSpec::None => Unit::dimensionless(),
            UnitSpec::Physical(u) => u.step_unit(),
            UnitSpec::DateTime(dt) => dt.step_unit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_conversion() {
        let c = Unit::parse("degC").unwrap();
        let k = Unit::parse("K").unwrap();
        let mut values = [0.0, 100.0];
        c.convert_slice(&k, &mut values).unwrap();
        assert!((values[0] - 273.15).abs() < 1e-9);
        assert!((values[1] - 373.15).abs() < 1e-9);

        let f = Unit::parse("degF").unwrap();
        assert!((f.convert_value(&c, 212.0).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_quotient_units() {
        let kmh = Unit::parse("km/h").unwrap();
        let ms = Unit::parse("m/s").unwrap();
        assert!((kmh.convert_value(&ms, 36.0).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_dimensions() {
        let m = Unit::parse("m").unwrap();
        let s = Unit::parse("s").unwrap();
        assert!(m.convert_value(&s, 1.0).is_err());
    }

    #[test]
    fn test_step_unit_drops_offset() {
        let c = Unit::parse("degC").unwrap();
        let k = Unit::parse("K").unwrap();
        // A 10 degC step is a 10 K step, not a 283.15 K step.
        assert!((c.step_unit().convert_value(&k.step_unit(), 10.0).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_unit() {
        assert!(Unit::parse("furlong").is_err());
    }

    #[test]
    fn test_datetime_parse_and_nat() {
        let unit = DateTimeUnit {
            tick: Tick::Seconds,
            tz: None,
        };
        assert_eq!(unit.parse("1970-01-01T00:01:00Z").unwrap(), 60);
        assert_eq!(unit.parse("1970-01-01 00:01:00").unwrap(), 60);
        assert_eq!(unit.parse("NaT").unwrap(), NAT);
        assert!(unit.parse("not a date").is_err());
    }

    #[test]
    fn test_datetime_timezone_shift() {
        let utc = DateTimeUnit {
            tick: Tick::Seconds,
            tz: None,
        };
        let cet = DateTimeUnit {
            tick: Tick::Seconds,
            tz: Some("+01:00".to_string()),
        };
        // Naive input is wall clock in the configured zone.
        let midnight_cet = cet.parse("2024-01-01 00:00:00").unwrap();
        let midnight_utc = utc.parse("2024-01-01 00:00:00").unwrap();
        assert_eq!(midnight_cet, midnight_utc);
        // Converting relabels the wall clock.
        assert_eq!(
            cet.convert_ticks(&utc, midnight_cet).unwrap(),
            midnight_utc - 3600
        );
    }

    #[test]
    fn test_tick_rescale() {
        let s = DateTimeUnit {
            tick: Tick::Seconds,
            tz: None,
        };
        let ms = DateTimeUnit {
            tick: Tick::Millis,
            tz: None,
        };
        assert_eq!(s.convert_ticks(&ms, 10).unwrap(), 10_000);
        assert_eq!(s.convert_ticks(&ms, NAT).unwrap(), NAT);
    }

    #[test]
    fn test_ns_tick_rejected() {
        assert!(Tick::parse("ns").is_err());
    }
}
