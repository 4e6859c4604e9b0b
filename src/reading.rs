//! Point-in-time sensor readings.

use chrono::NaiveDateTime;

/// Number of channels sampled per reading (CH01..CH08).
pub const CHANNEL_COUNT: usize = 8;

/// Raw register block returned by one sensor exchange.
pub type RegisterBlock = [u16; CHANNEL_COUNT];

/// Date column format, e.g. `17-10-2026`.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Time column format, e.g. `10:00:05`.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Header row of every log file.
pub const HEADER: [&str; CHANNEL_COUNT + 2] = [
    "Date", "Time", "CH01", "CH02", "CH03", "CH04", "CH05", "CH06", "CH07", "CH08",
];

/// One successful sample, already transformed and ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    captured_at: NaiveDateTime,
    values: [f64; CHANNEL_COUNT],
}

impl Reading {
    /// Reading captured at `captured_at`.
    pub fn new(captured_at: NaiveDateTime, values: [f64; CHANNEL_COUNT]) -> Self {
        Self {
            captured_at,
            values,
        }
    }

    /// Local capture time.
    pub fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }

    /// Transformed channel values, channel 1 first.
    pub fn values(&self) -> &[f64; CHANNEL_COUNT] {
        &self.values
    }

    /// CSV record for this reading: date, time, then the channel values.
    pub fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(CHANNEL_COUNT + 2);
        record.push(self.captured_at.format(DATE_FORMAT).to_string());
        record.push(self.captured_at.format(TIME_FORMAT).to_string());
        record.extend(self.values.iter().map(|v| v.to_string()));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn record_has_date_time_and_eight_values() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(7, 5, 0))
            .unwrap();
        let reading = Reading::new(at, [1.0, 2.5, 0.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let record = reading.to_record();

        assert_eq!(record.len(), HEADER.len());
        assert_eq!(record[0], "09-03-2024");
        assert_eq!(record[1], "07:05:00");
        assert_eq!(record[2], "1");
        assert_eq!(record[3], "2.5");
        assert_eq!(record[4], "0");
    }
}
