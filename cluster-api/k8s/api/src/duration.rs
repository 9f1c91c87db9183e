//! Parses durations written in Go's `time.Duration` syntax (`90s`, `1h30m`, `1.5m`), the format
//! used by autoscaler options annotations.

use std::time::Duration;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("durations must not be negative")]
    Negative,

    #[error("invalid floating-point number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

pub fn parse(mut s: &str) -> Result<Duration, ParseError> {
    fn unit_base(unit: &str) -> Result<Duration, ParseError> {
        const MINUTE: Duration = Duration::from_secs(60);
        Ok(match unit {
            "ns" => Duration::from_nanos(1),
            // U+00B5 is the "micro sign" while U+03BC is "Greek letter mu"
            "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => MINUTE,
            "h" => MINUTE * 60,
            _ => return Err(ParseError::InvalidUnit),
        })
    }

    if s.starts_with('-') {
        return Err(ParseError::Negative);
    }
    s = s.trim_start_matches('+');
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(ParseError::NoUnit);
    }

    let mut total = Duration::ZERO;
    while !s.is_empty() {
        let unit_start = s
            .find(|c: char| c.is_alphabetic())
            .ok_or(ParseError::NoUnit)?;
        let (val, rest) = s.split_at(unit_start);
        let val = val.parse::<f64>()?;
        let unit_end = rest
            .find(|c: char| !c.is_alphabetic())
            .unwrap_or(rest.len());
        let (unit, rest) = rest.split_at(unit_end);
        total += unit_base(unit)?.mul_f64(val);
        s = rest;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_go_durations() {
        for (input, expected) in [
            ("0", Duration::ZERO),
            ("10m", Duration::from_secs(600)),
            ("1h30m", Duration::from_secs(5400)),
            ("1.5m", Duration::from_secs(90)),
            ("+5s", Duration::from_secs(5)),
            ("250ms", Duration::from_millis(250)),
            ("3\u{00b5}s", Duration::from_micros(3)),
        ] {
            assert_eq!(parse(input), Ok(expected), "{input}");
        }
    }

    #[test]
    fn rejects_invalid_durations() {
        assert_eq!(parse("-5s"), Err(ParseError::Negative));
        assert_eq!(parse("10"), Err(ParseError::NoUnit));
        assert_eq!(parse(""), Err(ParseError::NoUnit));
        assert_eq!(parse("10d"), Err(ParseError::InvalidUnit));
        assert!(matches!(parse("xs"), Err(ParseError::NotANumber(_))));
    }
}
