/// Parse a free-text amount ("₹ 1,20,000.50", "USD 99", "-42") to a number.
///
/// Commas and whitespace are removed, then every character other than a digit,
/// `.` or `-` is dropped. Returns `None` when nothing parseable remains.
pub fn clean_amount(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if kept.is_empty() {
        return None;
    }
    kept.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format a spend value for table output. Integral values drop the fraction.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{value:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_symbols_and_separators() {
        assert_eq!(clean_amount("1,200.50"), Some(1200.5));
        assert_eq!(clean_amount("₹ 1,20,000"), Some(120000.0));
        assert_eq!(clean_amount(" USD 99 "), Some(99.0));
        assert_eq!(clean_amount("-42"), Some(-42.0));
        // parentheses are dropped like any other symbol
        assert_eq!(clean_amount("(100)"), Some(100.0));
    }

    #[test]
    fn unparseable_is_none() {
        assert_eq!(clean_amount(""), None);
        assert_eq!(clean_amount("n/a"), None);
        assert_eq!(clean_amount("-"), None);
        assert_eq!(clean_amount("1.2.3"), None);
        assert_eq!(clean_amount("12-5"), None);
        assert_eq!(clean_amount("100-"), None);
    }

    #[test]
    fn formats_cleanly() {
        assert_eq!(format_amount(1200.0), "1200");
        assert_eq!(format_amount(1200.5), "1200.5");
        assert_eq!(format_amount(-0.25), "-0.25");
        assert_eq!(format_amount(1.0 / 3.0), "0.333333");
    }
}
