//! Duration strings such as `"1h"`, `"90m"`, `"1h30m"` or `"1.5h"`.
//!
//! The accepted grammar is a non-empty sequence of `<decimal><unit>` pairs
//! with units `ns`, `us` (or `µs`/`μs`), `ms`, `s`, `m`, `h`. A bare `"0"` is
//! also accepted. Signs are rejected: a negative TTL is never meaningful here.

use chrono::TimeDelta;

use crate::error::{Result, ValidationError};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Fractional digits beyond this are ignored (they are below nanosecond
/// resolution for every unit).
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse a duration string.
///
/// # Errors
///
/// Returns `ValidationError::InvalidDuration` if the string is empty, has a
/// missing or unknown unit, or does not fit in a signed 64-bit nanosecond
/// count.
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    if input == "0" {
        return Ok(TimeDelta::zero());
    }
    if input.is_empty() {
        return Err(invalid(input, "empty duration"));
    }

    let mut rest = input;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);

        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(input, "expected a number"));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid(input, "missing unit"));
        }
        let scale = unit_nanos(unit).ok_or_else(|| invalid(input, "unknown unit"))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| invalid(input, "value out of range"))?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| invalid(input, "value out of range"))?;
        nanos += fraction_nanos(frac_part, scale);

        total = total
            .checked_add(nanos)
            .ok_or_else(|| invalid(input, "value out of range"))?;
        if total > i64::MAX as u128 {
            return Err(invalid(input, "value out of range"));
        }

        rest = tail;
    }

    let nanos = i64::try_from(total).map_err(|_| invalid(input, "value out of range"))?;
    Ok(TimeDelta::nanoseconds(nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(3_600 * NANOS_PER_SECOND),
        _ => None,
    }
}

fn fraction_nanos(digits: &str, scale: u128) -> u128 {
    let digits = &digits[..digits.len().min(MAX_FRACTION_DIGITS)];
    if digits.is_empty() {
        return 0;
    }
    let numerator: u128 = digits.parse().unwrap_or(0);
    let denominator = 10u128.pow(u32::try_from(digits.len()).unwrap_or(0));
    numerator * scale / denominator
}

fn invalid(input: &str, reason: &'static str) -> ValidationError {
    ValidationError::InvalidDuration {
        input: input.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_units() {
        assert_eq!(parse_duration("1h").unwrap(), TimeDelta::hours(1));
        assert_eq!(parse_duration("90m").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration("30s").unwrap(), TimeDelta::seconds(30));
        assert_eq!(parse_duration("250ms").unwrap(), TimeDelta::milliseconds(250));
        assert_eq!(parse_duration("7us").unwrap(), TimeDelta::microseconds(7));
        assert_eq!(parse_duration("7µs").unwrap(), TimeDelta::microseconds(7));
        assert_eq!(parse_duration("12ns").unwrap(), TimeDelta::nanoseconds(12));
        assert_eq!(parse_duration("2160h").unwrap(), TimeDelta::days(90));
    }

    #[test]
    fn compound_and_fractional() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            TimeDelta::minutes(90)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration(".5s").unwrap(), TimeDelta::milliseconds(500));
        assert_eq!(parse_duration("1.h").unwrap(), TimeDelta::hours(1));
        assert_eq!(parse_duration("0").unwrap(), TimeDelta::zero());
    }

    #[test]
    fn rejects_malformed() {
        for input in ["", "h", "10", "10d", "1h30", "-1h", "one hour", "1.h.5"] {
            assert!(
                matches!(
                    parse_duration(input),
                    Err(ValidationError::InvalidDuration { .. })
                ),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        let err = parse_duration("99999999999999999999h").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidDuration {
                reason: "value out of range",
                ..
            }
        ));
    }
}
