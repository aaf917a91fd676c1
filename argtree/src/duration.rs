//! Textual durations: `300ms`, `-1.5h`, `2h45m`.
//!
//! A duration is an optional sign followed by one or more decimal numbers,
//! each with an optional fraction and a mandatory unit suffix. Valid units are
//! `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is accepted.

use chrono::TimeDelta;

const NANOSECOND: u128 = 1;
const MICROSECOND: u128 = 1_000 * NANOSECOND;
const MILLISECOND: u128 = 1_000 * MICROSECOND;
const SECOND: u128 = 1_000 * MILLISECOND;
const MINUTE: u128 = 60 * SECOND;
const HOUR: u128 = 60 * MINUTE;

// Fraction digits beyond this cannot change a nanosecond count.
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_scale(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(NANOSECOND),
        "us" | "µs" | "μs" => Some(MICROSECOND),
        "ms" => Some(MILLISECOND),
        "s" => Some(SECOND),
        "m" => Some(MINUTE),
        "h" => Some(HOUR),
        _ => None,
    }
}

pub fn parse(text: &str) -> Result<TimeDelta, String> {
    let invalid = || format!("invalid duration {:?}", text);

    let (negative, mut rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map_or(rest.len(), |(i, _)| i);
        if unit_len == 0 {
            return Err(format!("missing unit in duration {:?}", text));
        }
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        let scale =
            unit_scale(unit).ok_or_else(|| format!("unknown unit {:?} in duration {:?}", unit, text))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut amount = whole.checked_mul(scale).ok_or_else(invalid)?;

        let frac_digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits.parse().map_err(|_| invalid())?;
            let denominator = 10u128.pow(frac_digits.len() as u32);
            amount += numerator * scale / denominator;
        }

        total = total.checked_add(amount).ok_or_else(invalid)?;
        if total > i64::MAX as u128 + 1 {
            return Err(invalid());
        }
    }

    let nanos = if negative {
        -(total as i128)
    } else {
        total as i128
    };
    let nanos = i64::try_from(nanos).map_err(|_| invalid())?;
    Ok(TimeDelta::nanoseconds(nanos))
}

/// Canonical form: `0s`, `750ns`, `1.5µs`, `20ms`, `1.25s`, `2m0s`, `1h30m0s`.
pub fn format(value: &TimeDelta) -> String {
    let total = value.num_seconds() as i128 * SECOND as i128 + value.subsec_nanos() as i128;
    if total == 0 {
        return "0s".to_string();
    }
    let sign = if total < 0 { "-" } else { "" };
    let magnitude = total.unsigned_abs();

    if magnitude < SECOND {
        let (scale, unit) = if magnitude < MICROSECOND {
            (NANOSECOND, "ns")
        } else if magnitude < MILLISECOND {
            (MICROSECOND, "µs")
        } else {
            (MILLISECOND, "ms")
        };
        return format!("{}{}{}", sign, decimal(magnitude, scale), unit);
    }

    let hours = magnitude / HOUR;
    let minutes = magnitude % HOUR / MINUTE;
    let seconds = decimal(magnitude % MINUTE, SECOND);
    if hours > 0 {
        format!("{}{}h{}m{}s", sign, hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}{}m{}s", sign, minutes, seconds)
    } else {
        format!("{}{}s", sign, seconds)
    }
}

fn decimal(value: u128, scale: u128) -> String {
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let width = scale.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
