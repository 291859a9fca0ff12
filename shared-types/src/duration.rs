//! Go-style duration strings (`"1m0s"`, `"500ms"`) as used by the
//! reconciler's API types, with serde adapters for `std::time::Duration`.

use serde::{de, Deserialize, Deserializer, Serializer};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid duration {input:?}: {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: &'static str,
}

pub fn format(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let total = d.as_secs();
    let nanos = d.subsec_nanos();

    if total == 0 {
        if nanos % 1_000_000 == 0 {
            return format!("{}ms", nanos / 1_000_000);
        }
        if nanos % 1_000 == 0 {
            return format!("{}µs", nanos / 1_000);
        }
        return format!("{nanos}ns");
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let mut seconds = (total % 60).to_string();
    if nanos != 0 {
        let frac = format!("{nanos:09}");
        seconds.push('.');
        seconds.push_str(frac.trim_end_matches('0'));
    }

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Parse a duration in Go's `time.ParseDuration` grammar: a sequence of
/// decimal numbers with optional fractions, each followed by one of
/// `ns`, `us`, `µs`, `ms`, `s`, `m` or `h` (e.g. `1.5s`, `1m0s`).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse(input: &str) -> Result<Duration, DurationError> {
    let err = |reason| DurationError {
        input: input.to_string(),
        reason,
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(err("empty"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| err("missing unit"))?;
        if num_end == 0 {
            return Err(err("expected number"));
        }
        let (num, tail) = rest.split_at(num_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let value: f64 = num.parse().map_err(|_| err("malformed number"))?;
        let nanos_per_unit = match unit {
            "h" => 3_600_000_000_000.0,
            "m" => 60_000_000_000.0,
            "s" => 1_000_000_000.0,
            "ms" => 1_000_000.0,
            "us" | "µs" => 1_000.0,
            "ns" => 1.0,
            _ => return Err(err("unknown unit")),
        };
        total += Duration::from_nanos((value * nanos_per_unit).round() as u64);
        rest = next;
    }

    Ok(total)
}

pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(de::Error::custom)
}

pub mod option {
    use super::{format, parse};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_str(&format(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| parse(&s).map_err(de::Error::custom))
            .transpose()
    }
}
