use crate::models::Coverage;

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use registry_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by half an ULP at the target precision so exact midpoints round up.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();
    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        // "0.50" -> ".50"
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format a count with thousands separators.
///
/// ```
/// use registry_core::formatting::format_count;
///
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// assert_eq!(format_count(12), "12");
/// ```
pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

/// Signed variant of [`format_count`] for gaps that may go negative.
pub fn format_signed_count(value: i64) -> String {
    if value < 0 {
        format!("-{}", group_thousands(&value.unsigned_abs().to_string()))
    } else {
        group_thousands(&value.to_string())
    }
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `None` when `whole` is zero: the share is undefined, not zero.
///
/// ```
/// use registry_core::formatting::percentage;
///
/// assert_eq!(percentage(50.0, 200.0, 1), Some(25.0));
/// assert_eq!(percentage(3.0, 0.0, 2), None);
/// ```
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> Option<f64> {
    if whole == 0.0 {
        return None;
    }
    let raw = (part / whole) * 100.0;
    let factor = 10_f64.powi(decimal_places as i32);
    Some((raw * factor).round() / factor)
}

/// Render a coverage percentage for humans; undefined shows as `n/a`.
///
/// ```
/// use registry_core::formatting::format_coverage;
/// use registry_core::models::Coverage;
///
/// assert_eq!(format_coverage(Coverage::Defined(80.0)), "80.0%");
/// assert_eq!(format_coverage(Coverage::Undefined), "n/a");
/// ```
pub fn format_coverage(coverage: Coverage) -> String {
    match coverage {
        Coverage::Defined(pct) => format!("{}%", format_number(pct, 1)),
        Coverage::Undefined => "n/a".to_string(),
    }
}

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_zero() {
        assert_eq!(format_number(0.0, 0), "0");
        assert_eq!(format_number(0.0, 2), "0.00");
    }

    #[test]
    fn test_format_number_rounds_up() {
        assert_eq!(format_number(1.005, 2), "1.01");
    }

    #[test]
    fn test_format_number_negative() {
        assert_eq!(format_number(-9_876.5, 1), "-9,876.5");
    }

    #[test]
    fn test_format_count_grouping() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(12_345_678), "12,345,678");
    }

    #[test]
    fn test_format_signed_count() {
        assert_eq!(format_signed_count(-1_500), "-1,500");
        assert_eq!(format_signed_count(20), "20");
        assert_eq!(format_signed_count(i64::MIN), "-9,223,372,036,854,775,808");
    }

    #[test]
    fn test_percentage_rounding() {
        let p = percentage(1.0, 3.0, 2).unwrap();
        assert!((p - 33.33).abs() < 1e-9, "percentage = {p}");
    }

    #[test]
    fn test_percentage_zero_whole_is_undefined() {
        assert_eq!(percentage(0.0, 0.0, 2), None);
    }

    #[test]
    fn test_format_coverage() {
        assert_eq!(format_coverage(Coverage::Defined(66.666)), "66.7%");
        assert_eq!(format_coverage(Coverage::Defined(1234.5)), "1,234.5%");
        assert_eq!(format_coverage(Coverage::Undefined), "n/a");
    }
}
