//! Deterministic date/time and name extraction.
//!
//! All functions take the text (and, for dates, an explicit `now` anchor)
//! and return owned values; nothing here touches a clock or any store.

use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default meeting hour when the user names a date but no time.
const DEFAULT_HOUR: u32 = 10;

/// A resolved date/time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDateTime {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timestamp: NaiveDateTime,
}

impl ExtractedDateTime {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            date,
            time,
            timestamp: date.and_time(time),
        }
    }

    /// `HH:MM` rendering used in confirmation messages.
    pub fn hhmm(&self) -> String {
        self.time.format("%H:%M").to_string()
    }

    /// Shift by whole hours, rolling the date over when the shift crosses
    /// midnight.
    pub fn plus_hours(&self, hours: i64) -> Self {
        let ts = self.timestamp + Duration::hours(hours);
        Self {
            date: ts.date(),
            time: ts.time(),
            timestamp: ts,
        }
    }
}

/// Extract a date/time from free text, anchored at `now`.
///
/// Handles relative dates ("today", "tomorrow", "next friday", bare
/// weekday names), ISO dates, 12-hour clock with am/pm, and 24-hour
/// clock. A date without a time defaults to 10:00; a time without a date
/// lands on today. Returns `None` when the text carries neither.
pub fn extract_date_time(now: NaiveDateTime, text: &str) -> Option<ExtractedDateTime> {
    let lower = text.to_lowercase();
    let date = extract_date(now, &lower);
    let time = extract_time(&lower);

    match (date, time) {
        (Some(d), Some(t)) => Some(ExtractedDateTime::new(d, t)),
        (Some(d), None) => Some(ExtractedDateTime::new(
            d,
            NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0).expect("valid default hour"),
        )),
        (None, Some(t)) => Some(ExtractedDateTime::new(now.date(), t)),
        (None, None) => None,
    }
}

fn extract_date(now: NaiveDateTime, lower: &str) -> Option<NaiveDate> {
    let today = now.date();

    if let Some(caps) = iso_date_re().captures(lower) {
        let y: i32 = caps[1].parse().ok()?;
        let m: u32 = caps[2].parse().ok()?;
        let d: u32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }

    if lower.contains("day after tomorrow") {
        return Some(today + Duration::days(2));
    }
    if lower.contains("tomorrow") {
        return Some(today + Duration::days(1));
    }
    if lower.contains("today") || lower.contains("tonight") {
        return Some(today);
    }

    if let Some(caps) = weekday_re().captures(lower) {
        let target = parse_weekday(&caps[2])?;
        let explicit_next = caps.get(1).is_some();
        let mut ahead = days_until(today.weekday(), target);
        // "friday" on a Friday means the coming one, not right now;
        // "next friday" always skips into the following week.
        if ahead == 0 {
            ahead = 7;
        } else if explicit_next {
            ahead += 7;
        }
        return Some(today + Duration::days(ahead));
    }

    None
}

fn extract_time(lower: &str) -> Option<NaiveTime> {
    if lower.contains("noon") {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }
    if lower.contains("midnight") {
        return NaiveTime::from_hms_opt(0, 0, 0);
    }

    // Twelve-hour clock with am/pm wins over a bare 24-hour match.
    if let Some(caps) = twelve_hour_re().captures(lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        if hour == 0 || hour > 12 || minute > 59 {
            return None;
        }
        let meridiem = &caps[3];
        let hour24 = match (hour, meridiem) {
            (12, "am") => 0,
            (h, "am") => h,
            (12, "pm") => 12,
            (h, "pm") => h + 12,
            _ => return None,
        };
        return NaiveTime::from_hms_opt(hour24, minute, 0);
    }

    if let Some(caps) = twenty_four_hour_re().captures(lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    None
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn days_until(from: Weekday, to: Weekday) -> i64 {
    let from = from.num_days_from_monday() as i64;
    let to = to.num_days_from_monday() as i64;
    (to - from).rem_euclid(7)
}

// ── Name extraction ────────────────────────────────────────────────

/// Words that can follow a trigger without being a name.
const NAME_STOP_LIST: [&str; 26] = [
    "me", "them", "him", "her", "us", "you", "it", "the", "a", "an", "my", "our", "your", "at",
    "on", "in", "to", "tomorrow", "today", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday",
];

const NAME_TRIGGERS: [&str; 5] = ["with", "for", "call", "email", "remind"];

/// Extract a lead name after "with X", "for X", "call X", "email X",
/// "remind X". Accepts a single first name or `First Last`; trigger words
/// followed by stop-list words ("call me", "for tomorrow") yield `None`.
pub fn extract_lead_name(text: &str) -> Option<String> {
    let mut search = text;
    loop {
        let caps = name_re().captures(search)?;
        let first = caps.get(1)?;
        let word = first.as_str();

        // "a call with John" matches the trigger "call" and captures
        // "with"; restart the scan at the inner trigger instead.
        if NAME_TRIGGERS.contains(&word.to_lowercase().as_str()) {
            search = &search[first.start()..];
            continue;
        }

        if is_stop_word(word) {
            return None;
        }

        let mut name = word.to_string();
        if let Some(second) = caps.get(2) {
            let second = second.as_str();
            if !is_stop_word(second) {
                name.push(' ');
                name.push_str(second);
            }
        }
        return Some(name);
    }
}

fn is_stop_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    NAME_STOP_LIST.contains(&lower.as_str())
}

// ── Compiled patterns ──────────────────────────────────────────────

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"))
}

fn weekday_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(next\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
            .expect("valid regex")
    })
}

fn twelve_hour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("valid regex"))
}

fn twenty_four_hour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("valid regex"))
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:with|for|call|email|remind)\s+([A-Za-z][a-zA-Z'-]*)(?:\s+([A-Z][a-zA-Z'-]*))?")
            .expect("valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn tomorrow_at_2pm() {
        let now = anchor(2026, 2, 10, 10, 0);
        let dt = extract_date_time(now, "Schedule a call with John Smith tomorrow at 2pm").unwrap();
        assert_eq!(dt.date, NaiveDate::from_ymd_opt(2026, 2, 11).unwrap());
        assert_eq!(dt.hhmm(), "14:00");
    }

    #[test]
    fn tomorrow_rolls_over_near_midnight() {
        let now = anchor(2026, 12, 31, 23, 50);
        let dt = extract_date_time(now, "tomorrow").unwrap();
        assert_eq!(dt.date, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
        assert_eq!(dt.hhmm(), "10:00");
    }

    #[test]
    fn date_without_time_defaults_to_ten() {
        let now = anchor(2026, 2, 10, 8, 0);
        let dt = extract_date_time(now, "book a meeting tomorrow").unwrap();
        assert_eq!(dt.hhmm(), "10:00");
    }

    #[test]
    fn time_without_date_lands_today() {
        let now = anchor(2026, 2, 10, 8, 0);
        let dt = extract_date_time(now, "let's talk at 3:30 pm").unwrap();
        assert_eq!(dt.date, now.date());
        assert_eq!(dt.hhmm(), "15:30");
    }

    #[test]
    fn twenty_four_hour_clock() {
        let now = anchor(2026, 2, 10, 8, 0);
        let dt = extract_date_time(now, "tomorrow at 14:45").unwrap();
        assert_eq!(dt.hhmm(), "14:45");
    }

    #[test]
    fn twelve_pm_and_twelve_am() {
        let now = anchor(2026, 2, 10, 8, 0);
        assert_eq!(extract_date_time(now, "today at 12pm").unwrap().hhmm(), "12:00");
        assert_eq!(extract_date_time(now, "today at 12:15am").unwrap().hhmm(), "00:15");
    }

    #[test]
    fn next_weekday_skips_a_week() {
        // 2026-02-10 is a Tuesday.
        let now = anchor(2026, 2, 10, 9, 0);
        let friday = extract_date_time(now, "on friday").unwrap();
        assert_eq!(friday.date, NaiveDate::from_ymd_opt(2026, 2, 13).unwrap());

        let next_friday = extract_date_time(now, "next friday").unwrap();
        assert_eq!(next_friday.date, NaiveDate::from_ymd_opt(2026, 2, 20).unwrap());

        // Same weekday as today resolves to a week ahead either way.
        let tuesday = extract_date_time(now, "on tuesday").unwrap();
        assert_eq!(tuesday.date, NaiveDate::from_ymd_opt(2026, 2, 17).unwrap());
    }

    #[test]
    fn iso_date_is_honored() {
        let now = anchor(2026, 2, 10, 9, 0);
        let dt = extract_date_time(now, "put it on 2026-03-02 at 9am").unwrap();
        assert_eq!(dt.date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(dt.hhmm(), "09:00");
    }

    #[test]
    fn no_indicator_yields_none() {
        let now = anchor(2026, 2, 10, 9, 0);
        assert!(extract_date_time(now, "thanks, that works").is_none());
        assert!(extract_date_time(now, "").is_none());
    }

    #[test]
    fn plus_hours_rolls_the_date() {
        let dt = ExtractedDateTime::new(
            NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
        );
        let shifted = dt.plus_hours(1);
        assert_eq!(shifted.date, NaiveDate::from_ymd_opt(2026, 2, 11).unwrap());
        assert_eq!(shifted.hhmm(), "00:30");
    }

    // ── Names ──────────────────────────────────────────────────────

    #[test]
    fn extracts_first_and_last_name() {
        assert_eq!(
            extract_lead_name("Schedule a call with John Smith tomorrow at 2pm"),
            Some("John Smith".to_string())
        );
    }

    #[test]
    fn extracts_single_first_name() {
        assert_eq!(extract_lead_name("call Maria today"), Some("Maria".to_string()));
    }

    #[test]
    fn skips_stop_words() {
        assert_eq!(extract_lead_name("call me tomorrow"), None);
        assert_eq!(extract_lead_name("set a reminder for tomorrow"), None);
        assert_eq!(extract_lead_name("book a meeting for Monday"), None);
        assert_eq!(extract_lead_name("schedule a call with them"), None);
    }

    #[test]
    fn stops_before_trailing_stop_word() {
        // "Tomorrow" must not be glued onto the name even when capitalized.
        assert_eq!(
            extract_lead_name("call John Tomorrow at 5pm"),
            Some("John".to_string())
        );
    }

    #[test]
    fn no_trigger_yields_none() {
        assert_eq!(extract_lead_name("how many leads do we have"), None);
    }
}
