use std::fmt::Display;

use super::heap::{Heap, ObjRef};

/// VM-internal representation of Lox value.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    /// Lox has a single 'number' base type, backed by f64.
    /// Infinities and NaN follow IEEE-754: in particular NaN is not equal to itself.
    Number(f64),
    /// Boolean backed by Rust bool,
    Boolean(bool),
    /// Nil is a type and a value in Lox.
    Nil,
    /// Object is a heap-allocated value, owned by the `Heap` the handle came from.
    Object(ObjRef),
}

impl Value {
    /// nil and false are falsey, everything else is truthy.
    pub fn is_falsey(&self) -> bool {
        match self {
            Value::Boolean(b) => !*b,
            Value::Nil => true,
            _ => false,
        }
    }

    /// Lox equality. Values of different types are never equal; objects compare by their own rule.
    pub fn equals(&self, other: &Value, heap: &Heap) -> bool {
        match (self, other) {
            // Lox is lax about comparing NaNs and stuff
            #[allow(clippy::float_cmp)]
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Object(a), Value::Object(b)) => {
                a == b
                    || match (heap.get(*a), heap.get(*b)) {
                        (Some(a), Some(b)) => a.equals(b),
                        _ => false,
                    }
            }
            _ => false,
        }
    }

    /// Something that prints this value the way Lox's `print` does. Objects need the heap to be rendered.
    pub fn display<'h>(&self, heap: &'h Heap) -> ValueDisplay<'h> {
        ValueDisplay { value: *self, heap }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}


/// See `Value::display`.
#[derive(Debug)]
pub struct ValueDisplay<'h> {
    value: Value,
    heap: &'h Heap,
}

impl Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            Value::Number(n) => f.write_str(&format_number(n)),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Nil => f.write_str("nil"),
            Value::Object(o) => match self.heap.get(o) {
                Some(object) => Display::fmt(object, f),
                None => write!(f, "<dangling object {}>", o.index()),
            },
        }
    }
}

const SIGNIFICANT_DIGITS: i32 = 6;

/// Render a number like C's `%g`: six significant digits, no trailing zeros,
/// and scientific notation for very large or very small magnitudes.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Rounding to the significant digits first tells us the decimal exponent after rounding,
    // which is what picks between the two notations.
    let scientific = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, n);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => match e.parse::<i32>() {
            Ok(e) => (m, e),
            Err(_) => return n.to_string(),
        },
        None => return n.to_string(),
    };

    if exponent < -4 || exponent >= SIGNIFICANT_DIGITS {
        format!(
            "{}e{}{:02}",
            strip_trailing_zeros(mantissa),
            if exponent < 0 { '-' } else { '+' },
            exponent.abs()
        )
    } else {
        let decimals = (SIGNIFICANT_DIGITS - 1 - exponent) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn strip_trailing_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_number() {
        let cases = [
            (3.0, "3"),
            (-2.5, "-2.5"),
            (0.1 + 0.2, "0.3"),
            (1.0 / 3.0, "0.333333"),
            (100.0, "100"),
            (123456.0, "123456"),
            (1234567.0, "1.23457e+06"),
            (1e6, "1e+06"),
            (999999.7, "1e+06"),
            (0.0001, "0.0001"),
            (0.00001, "1e-05"),
            (1.5e-7, "1.5e-07"),
            (1e100, "1e+100"),
            (0.0, "0"),
            (-0.0, "-0"),
            (f64::INFINITY, "inf"),
            (f64::NEG_INFINITY, "-inf"),
            (f64::NAN, "nan"),
        ];
        for (n, expected) in cases {
            assert_eq!(format_number(n), expected, "formatting {:?}", n);
        }
    }

    #[test]
    fn test_falsiness() {
        assert!(Value::Nil.is_falsey());
        assert!(Value::Boolean(false).is_falsey());
        assert!(!Value::Boolean(true).is_falsey());
        assert!(!Value::Number(0.0).is_falsey());
    }

    #[test]
    fn test_equality() {
        let mut heap = Heap::new();
        let s = Value::Object(heap.copy_string("s"));
        let t = Value::Object(heap.copy_string("t"));

        assert!(Value::Nil.equals(&Value::Nil, &heap));
        assert!(!Value::Nil.equals(&Value::Boolean(false), &heap));
        assert!(Value::Number(1.0).equals(&1.0.into(), &heap));
        assert!(!Value::Number(f64::NAN).equals(&Value::Number(f64::NAN), &heap));
        assert!(!Value::Number(0.0).equals(&Value::Boolean(false), &heap));
        assert!(s.equals(&s, &heap));
        assert!(!s.equals(&t, &heap));
    }

    #[test]
    fn test_display() {
        let mut heap = Heap::new();
        let s = Value::Object(heap.copy_string("raw \"text\""));
        assert_eq!(s.display(&heap).to_string(), "raw \"text\"");
        assert_eq!(Value::Nil.display(&heap).to_string(), "nil");
        assert_eq!(Value::Boolean(true).display(&heap).to_string(), "true");
        assert_eq!(Value::Number(7.0).display(&heap).to_string(), "7");
    }
}
