use chrono::{DateTime, Local, TimeZone};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_stamp() -> String {
    format_timestamp(&Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn formats_with_zero_padding() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 4, 5, 6).unwrap();
        assert_eq!(format_timestamp(&at), "2024-03-07 04:05:06");
    }

    #[test]
    fn formats_in_the_given_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let at = Utc
            .with_ymd_and_hms(2024, 12, 31, 23, 30, 0)
            .unwrap()
            .with_timezone(&tz);
        assert_eq!(format_timestamp(&at), "2025-01-01 01:30:00");
    }

    #[test]
    fn now_stamp_has_fixed_width() {
        assert_eq!(now_stamp().len(), "2024-01-01 00:00:00".len());
    }
}
