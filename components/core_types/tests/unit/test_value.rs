//! Unit tests for the tagged value and its fast arithmetic

use core_types::{arith, GcRef, Value};

#[cfg(test)]
mod value_predicate_tests {
    use super::*;

    #[test]
    fn test_number_predicates() {
        assert!(Value::from_int32(1).is_number());
        assert!(Value::from_double(1.0).is_number());
        assert!(!Value::from_boolean(true).is_number());
        assert!(Value::from_double(1.0).is_double());
        assert!(!Value::from_double(1.0).is_int32());
    }

    #[test]
    fn test_heap_predicates() {
        let r = GcRef::new(1, 0, 5, 0);
        assert!(Value::from_managed(r).is_managed());
        assert!(Value::from_string(r).is_string());
        assert_eq!(Value::from_managed(r).heap_ref(), Some(r));
        assert_eq!(Value::from_string(r).as_managed(), None);
        assert!(!Value::from_managed(r).is_primitive());
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::undefined().type_of(), "undefined");
        assert_eq!(Value::null().type_of(), "object");
        assert_eq!(Value::from_double(f64::NAN).type_of(), "number");
        assert_eq!(Value::from_boolean(false).type_of(), "boolean");
    }

    #[test]
    fn test_undefined_and_null_are_distinct_representations() {
        assert_ne!(Value::undefined(), Value::null());
    }
}

#[cfg(test)]
mod arithmetic_tests {
    use super::*;

    #[test]
    fn test_sub_overflow_falls_back_to_double() {
        assert_eq!(
            arith::sub(Value::Int32(i32::MIN), Value::Int32(1)),
            Some(Value::Double(-2147483649.0))
        );
        assert_eq!(arith::sub(Value::Int32(5), Value::Int32(7)), Some(Value::Int32(-2)));
    }

    #[test]
    fn test_mixed_representation_normalizes_integral_results() {
        assert_eq!(
            arith::add(Value::Int32(1), Value::Double(0.5)),
            Some(Value::Double(1.5))
        );
        assert_eq!(
            arith::mul(Value::Double(2.0), Value::Int32(3)),
            Some(Value::Int32(6))
        );
        assert_eq!(
            arith::add(Value::Double(2.5), Value::Double(0.5)),
            Some(Value::Int32(3))
        );
        assert_eq!(
            arith::sub(Value::Double(0.5), Value::Double(0.5)),
            Some(Value::Int32(0))
        );
        assert_eq!(arith::negate(Value::Double(-4.0)), Some(Value::Int32(4)));
        let product = arith::mul(Value::Double(-2.0), Value::Int32(0));
        assert!(matches!(product, Some(Value::Double(d)) if d == 0.0 && d.is_sign_negative()));
    }

    #[test]
    fn test_increment_at_boundary() {
        assert_eq!(
            arith::increment(Value::Int32(i32::MAX)),
            Some(Value::Double(2147483648.0))
        );
        assert_eq!(
            arith::decrement(Value::Int32(i32::MIN)),
            Some(Value::Double(-2147483649.0))
        );
    }

    #[test]
    fn test_non_numeric_operands_defer_to_runtime() {
        let s = Value::from_string(GcRef::new(0, 0, 0, 0));
        assert_eq!(arith::add(s, Value::Int32(1)), None);
        assert_eq!(arith::sub(Value::Undefined, Value::Int32(1)), None);
        assert_eq!(arith::increment(Value::Boolean(true)), None);
    }
}
