//! # Storefront Testing
//!
//! Testing utilities and helpers for the storefront checkout reducers.
//!
//! This crate provides:
//! - Deterministic implementations of core environment traits
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//! - Assertion helpers for effects
//!
//! Domain mocks (storage, payment gateway, order service) live next to the
//! traits they implement in `storefront-checkout::mocks`.
//!
//! ## Example
//!
//! ```ignore
//! use storefront_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(CheckoutReducer::new())
//!     .with_env(test_environment(test_clock()))
//!     .given_state(CheckoutState::default())
//!     .when_action(CheckoutAction::SubmitRequested)
//!     .then_state(|state| assert!(!state.errors.is_empty()))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use storefront_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of core environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::{NaiveDate, TimeZone};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_testing::mocks::FixedClock;
    /// use storefront_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Fixed clock at midday UTC of the given calendar date
        ///
        /// Returns `None` for a date that does not exist.
        #[must_use]
        pub fn on(year: i32, month: u32, day: u32) -> Option<Self> {
            let noon = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(12, 0, 0)?;
            Some(Self::new(Utc.from_utc_datetime(&noon)))
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn clock_on_calendar_date() {
        let clock = FixedClock::on(2025, 3, 14);
        assert!(clock.is_some());
        assert_eq!(clock.map(|c| c.now().day()), Some(14));
        assert!(FixedClock::on(2025, 2, 30).is_none());
    }
}
