//! Number to string conversion and back
//!
//! Implements the ECMAScript `Number::toString` formatting rules on top of
//! Rust's shortest round-trip float formatting, plus the string-to-number
//! grammar used by `ToNumber`.

use super::is_js_whitespace;

/// Format a number the way `String(n)` does
pub fn number_to_string(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if v < 0.0 {
        return format!("-{}", number_to_string(-v));
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "1.2345e-7"
    let formatted = format!("{:e}", v);
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let k = digits.len() as i32;
    let n = exponent + 1;

    if k <= n && n <= 21 {
        let mut out = digits;
        out.extend(std::iter::repeat_n('0', (n - k) as usize));
        out
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        format!("{}.{}", int_part, frac_part)
    } else if -6 < n && n <= 0 {
        let mut out = String::from("0.");
        out.extend(std::iter::repeat_n('0', (-n) as usize));
        out.push_str(&digits);
        out
    } else {
        let e = n - 1;
        let sign = if e >= 0 { '+' } else { '-' };
        if k == 1 {
            format!("{}e{}{}", digits, sign, e.abs())
        } else {
            format!("{}.{}e{}{}", &digits[..1], &digits[1..], sign, e.abs())
        }
    }
}

/// Convert an unsigned integer to string with given radix (2-36)
pub fn u64_to_str_radix(mut val: u64, radix: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    debug_assert!((2..=36).contains(&radix));

    let mut buf = Vec::new();
    loop {
        buf.push(DIGITS[(val % radix as u64) as usize]);
        val /= radix as u64;
        if val == 0 {
            break;
        }
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Format a number in the given radix, as `Number.prototype.toString(radix)`
pub fn number_to_radix_string(v: f64, radix: u32) -> String {
    if radix == 10 || !v.is_finite() {
        return number_to_string(v);
    }
    let negative = v < 0.0;
    let v = v.abs();
    let int_part = v.trunc();
    let mut frac = v - int_part;

    let mut out = if int_part < u64::MAX as f64 {
        u64_to_str_radix(int_part as u64, radix)
    } else {
        number_to_string(int_part)
    };

    if frac > 0.0 {
        const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        out.push('.');
        // 52 fraction digits is enough to exhaust the mantissa in base 2
        for _ in 0..52 {
            frac *= radix as f64;
            let digit = frac.trunc() as usize;
            out.push(DIGITS[digit] as char);
            frac -= digit as f64;
            if frac <= 0.0 {
                break;
            }
        }
    }

    if negative { format!("-{}", out) } else { out }
}

/// `Number.prototype.toFixed`
pub fn number_to_fixed(v: f64, digits: usize) -> String {
    if !v.is_finite() || v.abs() >= 1e21 {
        return number_to_string(v);
    }
    format!("{:.*}", digits, v)
}

/// Parse a string with the `ToNumber` grammar
///
/// Surrounding white space is ignored, the empty string is 0, and anything
/// that is not a complete numeric literal is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(is_js_whitespace);
    if t.is_empty() {
        return 0.0;
    }

    let prefixed = |prefix: &[&str], radix: u32| -> Option<f64> {
        let rest = prefix.iter().find_map(|p| t.strip_prefix(p))?;
        if rest.is_empty() {
            return Some(f64::NAN);
        }
        let mut acc = 0.0f64;
        for c in rest.chars() {
            match c.to_digit(radix) {
                Some(d) => acc = acc * radix as f64 + d as f64,
                None => return Some(f64::NAN),
            }
        }
        Some(acc)
    };
    if let Some(v) = prefixed(&["0x", "0X"], 16) {
        return v;
    }
    if let Some(v) = prefixed(&["0o", "0O"], 8) {
        return v;
    }
    if let Some(v) = prefixed(&["0b", "0B"], 2) {
        return v;
    }

    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust accepts "inf" and "nan"; the ToNumber grammar does not
    if !t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse the longest numeric prefix, as `parseFloat` does
pub fn parse_float_prefix(s: &str) -> f64 {
    let t = s.trim_start_matches(is_js_whitespace);
    for candidate in ["Infinity", "+Infinity"] {
        if t.starts_with(candidate) {
            return f64::INFINITY;
        }
    }
    if t.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }

    let bytes = t.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let mut best = None;
    while end < bytes.len() {
        let b = bytes[end];
        match b {
            b'0'..=b'9' => {
                seen_digit = true;
                best = Some(end + 1);
            }
            b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }
    match best {
        Some(len) => t[..len].parse::<f64>().unwrap_or(f64::NAN),
        None => f64::NAN,
    }
}

/// `ToInt32`
pub fn to_int32(v: f64) -> i32 {
    to_uint32(v) as i32
}

/// `ToUint32`
pub fn to_uint32(v: f64) -> u32 {
    if !v.is_finite() {
        return 0;
    }
    v.trunc().rem_euclid(4_294_967_296.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(-123.0), "-123");
        assert_eq!(number_to_string(3.14), "3.14");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(1.5e-10), "1.5e-10");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_u64_to_str_radix() {
        assert_eq!(u64_to_str_radix(255, 16), "ff");
        assert_eq!(u64_to_str_radix(255, 2), "11111111");
        assert_eq!(u64_to_str_radix(35, 36), "z");
        assert_eq!(number_to_radix_string(-255.0, 16), "-ff");
        assert_eq!(number_to_radix_string(0.5, 2), "0.1");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("  42  "), 42.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number(".").is_nan());
    }

    #[test]
    fn test_parse_float_prefix() {
        assert_eq!(parse_float_prefix("3.5px"), 3.5);
        assert_eq!(parse_float_prefix("  -2e2x"), -200.0);
        assert!(parse_float_prefix("px").is_nan());
    }

    #[test]
    fn test_int_conversions() {
        assert_eq!(to_int32(4294967295.0), -1);
        assert_eq!(to_uint32(-1.0), 4294967295);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(2147483648.0), -2147483648);
    }
}
