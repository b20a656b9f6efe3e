use skm_common::crypto;
use std::time::{SystemTime, UNIX_EPOCH};

/// [`crypto::Clock`] implementation based on the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdClock;

impl crypto::Clock for StdClock {
    fn now(&self) -> crypto::MillisecondsSinceEpoch {
        // A clock set before 1970 reads as the epoch itself.
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        crypto::MillisecondsSinceEpoch(millis)
    }
}
