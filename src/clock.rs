use chrono::{DateTime, NaiveDate, Utc};

/// ISO `YYYY-MM-DD` format used for progress entry dates and document ids.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Source of "now". Injected so write paths stamp deterministic times in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Today's calendar date as an ISO string, the default for new entries.
    fn today(&self) -> String {
        self.now().format(ISO_DATE_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Parse a strict ISO calendar date.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), ISO_DATE_FORMAT).ok()
}

/// Midnight (UTC) at the start of an ISO date.
pub fn start_of_day(value: &str) -> Option<DateTime<Utc>> {
    parse_iso_date(value)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_is_iso_formatted() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 0).unwrap());
        assert_eq!(clock.today(), "2024-03-07");
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 7, 23, 0, 0).unwrap());
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(clock.today(), "2024-03-08");
    }

    #[test]
    fn parse_iso_date_rejects_garbage() {
        assert!(parse_iso_date("2024-02-30").is_none());
        assert!(parse_iso_date("yesterday").is_none());
        assert!(parse_iso_date("").is_none());
        assert_eq!(
            parse_iso_date("2024-02-29"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn start_of_day_is_midnight_utc() {
        let midnight = start_of_day("2024-01-02").unwrap();
        assert_eq!(midnight, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert!(start_of_day("not-a-date").is_none());
    }
}
