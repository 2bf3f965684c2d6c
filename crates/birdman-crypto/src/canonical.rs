//! Canonical JSON serialization
//!
//! Produces exactly one string per logical JSON value so that independent
//! nodes agree on object identifiers:
//!
//! - no insignificant whitespace
//! - object keys sorted by UTF-16 code units
//! - array elements kept in order
//! - strings escaped as standard JSON
//! - numbers formatted as IEEE-754 doubles using the ECMAScript
//!   `Number.prototype.toString` rules
//!
//! Absent optional fields never reach this module: serialization drops them
//! before a [`Value`] is built (`skip_serializing_if`).

use crate::error::CryptoError;
use serde::Serialize;
use serde_json::{Number, Value};

/// Largest integer a double represents exactly (2^53 - 1)
const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Canonicalize any serializable value.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String, CryptoError> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize_value(&value))
}

/// Canonicalize a JSON value.
pub fn canonicalize_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json escapes exactly the set JSON.stringify does for valid UTF-8
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}

fn write_number(n: &Number, out: &mut String) {
    if let Some(v) = n.as_u64() {
        if v <= MAX_SAFE_INTEGER {
            out.push_str(&v.to_string());
            return;
        }
    }
    if let Some(v) = n.as_i64() {
        if v.unsigned_abs() <= MAX_SAFE_INTEGER {
            out.push_str(&v.to_string());
            return;
        }
    }
    match n.as_f64() {
        Some(f) => write_f64(f, out),
        None => out.push_str(&n.to_string()),
    }
}

/// ECMAScript `Number::toString(x)` for finite `x`.
fn write_f64(x: f64, out: &mut String) {
    if x == 0.0 || !x.is_finite() {
        out.push('0');
        return;
    }
    if x < 0.0 {
        out.push('-');
        write_f64(-x, out);
        return;
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e-7"
    let sci = format!("{:e}", x);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let n = exponent + 1;

    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(&digits);
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        out.push('e');
        out.push(if n - 1 >= 0 { '+' } else { '-' });
        out.push_str(&(n - 1).abs().to_string());
    }
}
