pub mod receiver;
pub mod sender;

pub use receiver::{ReceiverReportBuilder, ReceiverReportInterceptor};
pub use sender::{SenderReportBuilder, SenderReportInterceptor};

use std::time::Duration;

pub(crate) const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Converts a duration since an arbitrary epoch into NTP 32.32 fixed point.
pub(crate) fn ntp_time(elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs();
    let frac = ((elapsed.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (secs << 32) | frac
}

#[cfg(test)]
mod ntp_test {
    use super::*;

    #[test]
    fn test_ntp_time() {
        assert_eq!(ntp_time(Duration::from_secs(1)), 1u64 << 32);
        // half a second is half the fractional range
        let half = ntp_time(Duration::from_millis(500));
        assert_eq!(half >> 32, 0);
        let frac = half & 0xFFFF_FFFF;
        assert!((frac as i64 - (1i64 << 31)).abs() < 1 << 12);
    }
}
