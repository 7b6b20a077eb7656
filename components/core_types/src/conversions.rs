//! Numeric coercions shared by the interpreter and the runtime helpers.
//!
//! These operate on Rust primitives only. Conversions that need the heap
//! (string contents, the default-value protocol on objects) are built on top
//! of them in the interpreter's runtime module.

const TWO_POW_32: f64 = 4_294_967_296.0;
const TWO_POW_31: f64 = 2_147_483_648.0;

/// Whitespace and line terminators skipped by string-to-number conversion.
fn is_script_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'
            | '\u{000A}'
            | '\u{000B}'
            | '\u{000C}'
            | '\u{000D}'
            | '\u{0020}'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

/// Converts string contents to a number.
///
/// Surrounding whitespace is ignored, the empty string is `0`, `0x`/`0o`/`0b`
/// prefixes select a radix, and `Infinity` may carry a sign. Anything else
/// that is not a decimal literal is `NaN`.
///
/// # Examples
///
/// ```
/// use core_types::string_to_number;
///
/// assert_eq!(string_to_number("  42 "), 42.0);
/// assert_eq!(string_to_number(""), 0.0);
/// assert_eq!(string_to_number("0x1F"), 31.0);
/// assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
/// assert!(string_to_number("inf").is_nan());
/// ```
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(is_script_whitespace);
    if trimmed.is_empty() {
        return 0.0;
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return parse_radix(digits, radix);
        }
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let is_decimal_literal = trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !is_decimal_literal {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut result = 0.0f64;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => result = result * radix as f64 + d as f64,
            None => return f64::NAN,
        }
    }
    result
}

/// Formats a number the way scripts observe it.
///
/// Integral values print without a fraction, `-0` prints as `0`, and very
/// large or small magnitudes switch to exponent form.
///
/// # Examples
///
/// ```
/// use core_types::number_to_string;
///
/// assert_eq!(number_to_string(5.0), "5");
/// assert_eq!(number_to_string(-0.0), "0");
/// assert_eq!(number_to_string(0.1), "0.1");
/// assert_eq!(number_to_string(1e21), "1e+21");
/// assert_eq!(number_to_string(1.5e-7), "1.5e-7");
/// assert_eq!(number_to_string(f64::NAN), "NaN");
/// ```
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e-7".
    let formatted = format!("{:e}", n.abs());
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let k = digits.len() as i32;
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int_part, frac_part) = digits.split_at(point as usize);
        format!("{}.{}", int_part, frac_part)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let e = point - 1;
        let e_sign = if e >= 0 { '+' } else { '-' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, e_sign, e.abs())
        } else {
            format!("{}.{}e{}{}", first, rest, e_sign, e.abs())
        }
    };
    format!("{}{}", sign, body)
}

/// Modular conversion to a signed 32-bit integer.
///
/// # Examples
///
/// ```
/// use core_types::to_int32;
///
/// assert_eq!(to_int32(4294967297.0), 1);
/// assert_eq!(to_int32(2147483648.0), i32::MIN);
/// assert_eq!(to_int32(-1.9), -1);
/// assert_eq!(to_int32(f64::NAN), 0);
/// ```
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(TWO_POW_32);
    if wrapped >= TWO_POW_31 {
        (wrapped - TWO_POW_32) as i32
    } else {
        wrapped as i32
    }
}

/// Modular conversion to an unsigned 32-bit integer.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    n.trunc().rem_euclid(TWO_POW_32) as u32
}

/// Truncation toward zero with `NaN` mapped to `0`.
pub fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Interprets a property name as an array index, if it is one.
///
/// Only canonical decimal forms below `2^32 - 1` qualify, so `"01"` and
/// `"4294967295"` are ordinary names.
pub fn array_index_from_name(name: &str) -> Option<u32> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match name.parse::<u64>() {
        Ok(n) if n < u32::MAX as u64 => Some(n as u32),
        _ => None,
    }
}
