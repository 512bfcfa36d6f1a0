use chrono::offset::Utc as UtcOffset;
use chrono::DateTime;
use std::time::SystemTime;

pub const RFC3339_VARIANT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub const SECOND: i64 = 1;
pub const MINUTE: i64 = SECOND * 60;
pub const HOUR: i64 = MINUTE * 60;
pub const DAY: i64 = HOUR * 24;

pub fn now() -> String {
    let dt: DateTime<UtcOffset> = SystemTime::now().into();
    format!("{}", dt.format(RFC3339_VARIANT))
}
