pub trait TimeSource {
    // Seconds since the Unix epoch, used to key aggregated messages
    fn unix_seconds(&self) -> i64;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn unix_seconds(&self) -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }
}
