//! Unit tests for numeric coercions

use core_types::{number_to_string, string_to_number, to_int32, to_integer, to_uint32};

#[test]
fn test_string_number_string_agrees_for_common_values() {
    for text in ["0", "1", "-1", "0.5", "123.456", "1e+21", "1e-7", "2147483648"] {
        assert_eq!(number_to_string(string_to_number(text)), text);
    }
}

#[test]
fn test_string_to_number_with_garbage() {
    assert!(string_to_number("12px").is_nan());
    assert!(string_to_number("--1").is_nan());
    assert_eq!(string_to_number("0b101"), 5.0);
    assert_eq!(string_to_number("0o17"), 15.0);
}

#[test]
fn test_int32_conversions_wrap() {
    assert_eq!(to_int32(-2147483649.0), i32::MAX);
    assert_eq!(to_int32(f64::INFINITY), 0);
    assert_eq!(to_uint32(-2.0), 4294967294);
}

#[test]
fn test_to_integer() {
    assert_eq!(to_integer(f64::NAN), 0.0);
    assert_eq!(to_integer(-3.7), -3.0);
    assert_eq!(to_integer(f64::INFINITY), f64::INFINITY);
}
