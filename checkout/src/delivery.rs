//! Delivery schedule.
//!
//! Delivery is booked on one of the next five calendar days (today
//! included) and inside one two-hour window. The windows offered depend on
//! the weekday, and some are closed.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bookable days, today included
pub const BOOKING_DAYS: u64 = 5;

/// A delivery window within one day, on whole hours (24h clock)
///
/// Serialized as its label, e.g. `"09:00 AM - 11:00 AM"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeWindow {
    /// First hour of the window
    pub start_hour: u8,
    /// Hour the window closes
    pub end_hour: u8,
}

impl TimeWindow {
    /// Creates a window; `None` unless `start < end <= 24`
    #[must_use]
    pub const fn new(start_hour: u8, end_hour: u8) -> Option<Self> {
        if start_hour < end_hour && end_hour <= 24 {
            Some(Self {
                start_hour,
                end_hour,
            })
        } else {
            None
        }
    }

    /// Human readable label, e.g. `"01:00 PM - 03:00 PM"`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} - {}", clock_label(self.start_hour), clock_label(self.end_hour))
    }

    /// Parses a label produced by [`TimeWindow::label`]
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let (start, end) = label.split_once(" - ")?;
        // "12:00 AM" closing a window is midnight at the end of the day
        let end = match parse_clock(end)? {
            0 => 24,
            hour => hour,
        };
        Self::new(parse_clock(start)?, end)
    }
}

fn clock_label(hour: u8) -> String {
    let meridiem = if hour % 24 < 12 { "AM" } else { "PM" };
    let twelve = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{twelve:02}:00 {meridiem}")
}

fn parse_clock(text: &str) -> Option<u8> {
    let (hm, meridiem) = text.trim().split_once(' ')?;
    let (hour, minute) = hm.split_once(':')?;
    if minute != "00" {
        return None;
    }
    let hour: u8 = hour.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    match meridiem {
        "AM" => Some(hour % 12),
        "PM" => Some(hour % 12 + 12),
        _ => None,
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<TimeWindow> for String {
    fn from(window: TimeWindow) -> Self {
        window.label()
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid delivery window '{value}'"))
    }
}

/// A booked delivery: date plus window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySlot {
    /// Calendar date
    pub date: NaiveDate,
    /// Window on that date
    pub window: TimeWindow,
}

/// One window as offered for a date
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowOption {
    /// The window
    pub window: TimeWindow,
    /// Closed windows are shown but cannot be booked
    pub available: bool,
}

/// One bookable day
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryDay {
    /// Calendar date
    pub date: NaiveDate,
    /// Short weekday name, e.g. "Wed"
    pub weekday: String,
}

/// Windows offered on even weekdays (Sunday = 0), with availability
const EVEN_DAY_WINDOWS: [(u8, u8, bool); 4] =
    [(9, 11, true), (11, 13, true), (13, 15, false), (15, 17, true)];

/// Windows offered on odd weekdays
const ODD_DAY_WINDOWS: [(u8, u8, bool); 4] =
    [(10, 12, true), (12, 14, false), (14, 16, true), (16, 18, true)];

/// The rolling five-day window starting at `today`
#[must_use]
pub fn booking_days(today: NaiveDate) -> Vec<DeliveryDay> {
    (0..BOOKING_DAYS)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .map(|date| DeliveryDay {
            date,
            weekday: date.format("%a").to_string(),
        })
        .collect()
}

/// Windows offered on `date`
#[must_use]
pub fn windows_for(date: NaiveDate) -> Vec<WindowOption> {
    let table = if date.weekday().num_days_from_sunday() % 2 == 0 {
        &EVEN_DAY_WINDOWS
    } else {
        &ODD_DAY_WINDOWS
    };
    table
        .iter()
        .map(|&(start_hour, end_hour, available)| WindowOption {
            window: TimeWindow {
                start_hour,
                end_hour,
            },
            available,
        })
        .collect()
}

/// `true` when `slot` lies in the booking window from `today` and its window is open
#[must_use]
pub fn is_bookable(slot: &DeliverySlot, today: NaiveDate) -> bool {
    let in_range = booking_days(today).iter().any(|day| day.date == slot.date);
    in_range
        && windows_for(slot.date)
            .iter()
            .any(|option| option.window == slot.window && option.available)
}

/// Date and window picked so far
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotSelection {
    /// Picked date
    pub date: Option<NaiveDate>,
    /// Picked window
    pub time: Option<TimeWindow>,
}

impl SlotSelection {
    /// Picks a date; any previously picked window is cleared
    pub fn select_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
        self.time = None;
    }

    /// Picks a window for the current date
    pub fn select_time(&mut self, window: TimeWindow) {
        self.time = Some(window);
    }

    /// The complete slot, once both parts are picked
    #[must_use]
    pub fn slot(&self) -> Option<DeliverySlot> {
        Some(DeliverySlot {
            date: self.date?,
            window: self.time?,
        })
    }
}
