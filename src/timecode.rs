//! CCSDS Day-Segmented timecode handling.
//!
//! Reference: [CCSDS Time Code Formats](https://public.ccsds.org/Pubs/301x0b4e1.pdf)

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;

/// CCSDS Day-Segmented timecode packed into a 64-bit word: 16 bits of days
/// since the 1958 epoch, 32 bits of milliseconds of day, 16 bits of
/// microseconds of millisecond.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct CdsTime {
    raw: u64,
}

impl CdsTime {
    /// Seconds between Unix epoch(1970) and CDS epoch(1958)
    pub const EPOCH_DELTA: i64 = 378_691_200;
    /// Size of the packed timecode in octets.
    pub const SIZE: usize = 8;

    #[must_use]
    pub fn new(raw: u64) -> CdsTime {
        CdsTime { raw }
    }

    #[must_use]
    pub fn raw(&self) -> u64 {
        self.raw
    }

    #[must_use]
    pub fn days(&self) -> u16 {
        (self.raw >> 48 & 0xffff) as u16
    }

    #[must_use]
    pub fn millis(&self) -> u32 {
        (self.raw >> 16 & 0xffff_ffff) as u32
    }

    #[must_use]
    pub fn micros(&self) -> u16 {
        (self.raw & 0xffff) as u16
    }

    #[must_use]
    pub fn utc(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(
            (u64::from(self.days()) * 86400 * (1e9 as u64)
                + u64::from(self.millis()) * (1e6 as u64)
                + u64::from(self.micros()) * (1e3 as u64)) as i64,
        ) - Duration::seconds(CdsTime::EPOCH_DELTA)
    }
}
