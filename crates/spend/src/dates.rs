//! Date standardization for purchase-register dates.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DAY_FIRST_FORMATS: &[&str] = &[
    "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%y", "%d/%m/%y", "%d.%m.%y",
];

const MONTH_FIRST_FORMATS: &[&str] = &[
    "%m-%d-%Y", "%m/%d/%Y", "%m.%d.%Y", "%m-%d-%y", "%m/%d/%y", "%m.%d.%y",
];

const NAMED_MONTH_FORMATS: &[&str] = &[
    "%d-%b-%Y", "%d %b %Y", "%d-%b-%y", "%d %B %Y", "%b %d, %Y", "%B %d, %Y", "%b %d %Y",
];

/// Excel serial day numbers accepted as dates (1954-10-03 .. 2119-01-10).
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 20000.0..=80000.0;

/// Parse a date written in any of the common register formats.
///
/// `day_first` resolves ambiguous numeric orders like `03/04/2025`. ISO
/// forms always win over the ambiguous ones. A trailing time part is ignored.
pub fn standardize_date(raw: &str, day_first: bool) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(d) = s.parse::<f64>().ok().and_then(from_excel_serial) {
        return Some(d);
    }

    if s.len() >= 4 && s.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        for fmt in ISO_DATE_FORMATS {
            if let Some(d) = parse_with(s, fmt) {
                return Some(d);
            }
        }
        for fmt in ISO_DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(dt.date());
            }
        }
    }

    // Drop a trailing time part ("03/04/2025 10:15") before the ambiguous forms
    let date_part = match s.split_once(' ') {
        Some((head, tail)) if tail.contains(':') => head,
        _ => s,
    };

    let (first, second) = if day_first {
        (DAY_FIRST_FORMATS, MONTH_FIRST_FORMATS)
    } else {
        (MONTH_FIRST_FORMATS, DAY_FIRST_FORMATS)
    };
    for fmt in first.iter().chain(second).chain(NAMED_MONTH_FORMATS) {
        if let Some(d) = parse_with(date_part, fmt) {
            return Some(d);
        }
    }

    None
}

/// `%Y` also accepts short years ("25" → year 25), which must fall through to
/// the `%y` variants instead.
fn parse_with(s: &str, fmt: &str) -> Option<NaiveDate> {
    let d = NaiveDate::parse_from_str(s, fmt).ok()?;
    if fmt.contains("%Y") && d.year() < 1000 {
        return None;
    }
    Some(d)
}

/// Convert an Excel serial day number (1900 date system) to a date.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !EXCEL_SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// ISO `YYYY-MM-DD` rendering used for the `_date_iso` column.
pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
