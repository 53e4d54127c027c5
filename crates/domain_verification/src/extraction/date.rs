//! Receipt date extraction

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use super::collapse_whitespace;

/// "11 set 2025", "3 noviembre 2025"
static SPANISH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2})\s+(ene|feb|mar|abr|may|jun|jul|ago|set|sep|oct|nov|dic)[a-z]*\s+(\d{4})")
        .expect("Invalid month name date regex")
});

/// "2025-11-13" or "13/11/2025"
static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})|(\d{1,2})/(\d{1,2})/(\d{4})")
        .expect("Invalid numeric date regex")
});

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "ene" => 1,
        "feb" => 2,
        "mar" => 3,
        "abr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "ago" => 8,
        "set" | "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dic" => 12,
        _ => return None,
    };
    Some(month)
}

/// Returns the first recognisable date, month-name form first
pub fn extract_receipt_date(text: &str) -> Option<NaiveDate> {
    let clean = collapse_whitespace(text);
    month_name_date(&clean).or_else(|| numeric_date(&clean))
}

fn month_name_date(text: &str) -> Option<NaiveDate> {
    SPANISH_DATE.captures_iter(text).find_map(|caps| {
        let day = caps.get(1)?.as_str().parse().ok()?;
        let month = month_number(caps.get(2)?.as_str())?;
        let year = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// First numeric date that exists on the calendar
fn numeric_date(text: &str) -> Option<NaiveDate> {
    NUMERIC_DATE.captures_iter(text).find_map(|caps| {
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        if let (Some(year), Some(month), Some(day)) = (number(1), number(2), number(3)) {
            return NaiveDate::from_ymd_opt(year as i32, month, day);
        }
        let (day, month, year) = (number(4)?, number(5)?, number(6)?);
        NaiveDate::from_ymd_opt(year as i32, month, day)
    })
}
