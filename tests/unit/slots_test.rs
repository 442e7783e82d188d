//! Property checks for slot generation across timezones

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use prometheus_publisher::core::{end_of_month, generate_slots_at, weekday_ordinal};
use prometheus_publisher::model::{PostingRule, TimeWindow};

const ZONES: &[&str] = &[
    "UTC",
    "America/New_York",
    "America/Los_Angeles",
    "Europe/London",
    "Europe/Berlin",
    "Asia/Kolkata",
    "Asia/Tokyo",
    "Australia/Sydney",
    "Pacific/Auckland",
];

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_slots_are_future_ascending_and_on_rule_days() {
    let now: DateTime<Utc> = Utc.with_ymd_and_hms(2030, 3, 12, 12, 0, 0).unwrap();
    for zone in ZONES {
        let tz: Tz = zone.parse().unwrap();
        for window in [TimeWindow::Morning, TimeWindow::Afternoon, TimeWindow::Evening] {
            let rule = PostingRule::new("t1", [1, 3, 6], window).with_timezone(tz);
            let slots =
                generate_slots_at(&rule, date(2030, 3, 1), end_of_month(date(2030, 3, 1)), tz, now)
                    .unwrap();

            assert!(!slots.is_empty(), "{zone} {window:?}");
            assert!(slots.iter().all(|s| *s > now), "{zone}: slot not in the future");
            assert!(slots.windows(2).all(|w| w[0] < w[1]), "{zone}: not strictly ascending");
            for slot in &slots {
                let local = slot.with_timezone(&tz);
                assert!(rule.days_of_week.contains(&weekday_ordinal(local.date_naive())));
                assert_eq!(local.time(), window.canonical_time(), "{zone}");
            }
        }
    }
}

#[test]
fn test_every_day_rule_yields_one_slot_per_remaining_day() {
    let tz: Tz = "Europe/Berlin".parse().unwrap();
    let rule = PostingRule::new("t1", 1..=7, TimeWindow::Evening).with_timezone(tz);
    // 2030-03-31 is the spring-forward day in Europe; 19:00 still exists.
    let now = Utc.with_ymd_and_hms(2030, 3, 1, 0, 0, 0).unwrap();
    let slots = generate_slots_at(&rule, date(2030, 3, 1), date(2030, 3, 31), tz, now).unwrap();
    assert_eq!(slots.len(), 31);
    let offsets: Vec<Duration> = slots
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d != Duration::hours(24))
        .collect();
    assert_eq!(offsets, vec![Duration::hours(23)]);
}

#[test]
fn test_fixed_time_overrides_window() {
    let tz: Tz = "Asia/Kolkata".parse().unwrap();
    let rule = PostingRule::new("t1", [4], TimeWindow::Custom)
        .with_fixed_time("07:45")
        .with_timezone(tz);
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let slots = generate_slots_at(&rule, date(2030, 5, 1), date(2030, 5, 31), tz, now).unwrap();
    // Thursdays in May 2030: 2, 9, 16, 23, 30; IST is UTC+05:30.
    assert_eq!(slots.len(), 5);
    assert_eq!(slots[0], Utc.with_ymd_and_hms(2030, 5, 2, 2, 15, 0).unwrap());
}
