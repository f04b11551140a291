//! Value-level canonicalization and numeric tolerance.

/// Relative tolerance for [`double_equals`].
pub const RELATIVE_EPSILON: f64 = 1e-4;

/// Absolute tolerance for [`double_equals`], for values near zero.
pub const ABSOLUTE_EPSILON: f64 = 1e-12;

/// Map negative-zero spellings to their positive form.
///
/// `None` (SQL NULL) passes through. Applying it twice is the same as once.
#[must_use]
pub fn canonicalize_value(value: Option<&str>) -> Option<String> {
    value.map(|v| match v {
        "-0.0" => "0.0".to_owned(),
        "-0" => "0".to_owned(),
        other => other.to_owned(),
    })
}

/// Compare two textual numbers within [`RELATIVE_EPSILON`]/[`ABSOLUTE_EPSILON`].
///
/// Either side failing to parse makes the pair unequal; this never errors.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn double_equals(first: &str, second: &str) -> bool {
    let (Ok(a), Ok(b)) = (first.trim().parse::<f64>(), second.trim().parse::<f64>()) else {
        return false;
    };
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    diff <= ABSOLUTE_EPSILON || diff < RELATIVE_EPSILON * a.abs().max(b.abs())
}

/// Strip redundant trailing zeros from plain decimal text.
///
/// `"2.00"` becomes `"2"`, `"2.50"` becomes `"2.5"`. Anything that is not
/// `[-]digits.digits` (exponents, text, integers) is returned unchanged so
/// that only engine formatting differences are absorbed.
#[must_use]
pub fn strip_trailing_fraction_zeros(value: &str) -> String {
    let Some((int_part, frac_part)) = value.split_once('.') else {
        return value.to_owned();
    };
    let digits = int_part.strip_prefix('-').unwrap_or(int_part);
    let is_decimal = !digits.is_empty()
        && !frac_part.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit());
    if !is_decimal {
        return value.to_owned();
    }
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part.to_owned()
    } else {
        format!("{int_part}.{frac}")
    }
}
