use std::time::{Duration, Instant};

const MAX_INIT_RETRANS: usize = 8;
const PATH_MAX_RETRANS: usize = 5;
const NO_MAX_RETRANS: usize = usize::MAX;
const TIMER_COUNT: usize = 5;

pub(crate) const RTO_INITIAL: u64 = 3000; // msec
pub(crate) const RTO_MIN: u64 = 1000; // msec
pub(crate) const RTO_MAX: u64 = 60000; // msec
const RTO_ALPHA: u64 = 1;
const RTO_BETA: u64 = 2;
const RTO_BASE: u64 = 8;

#[derive(Debug, Copy, Clone)]
pub(crate) struct TimerConfig {
    pub(crate) max_t1_init_retrans: usize,
    pub(crate) max_t1_cookie_retrans: usize,
    pub(crate) max_t2_shutdown_retrans: usize,
    pub(crate) max_t3_rtx_retrans: usize,
    pub(crate) max_reconfig_retrans: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_t1_init_retrans: MAX_INIT_RETRANS,
            max_t1_cookie_retrans: MAX_INIT_RETRANS,
            max_t2_shutdown_retrans: NO_MAX_RETRANS,
            max_t3_rtx_retrans: PATH_MAX_RETRANS,
            max_reconfig_retrans: PATH_MAX_RETRANS,
        }
    }
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub(crate) enum Timer {
    T1Init = 0,
    T1Cookie = 1,
    T2Shutdown = 2,
    T3RTX = 3,
    Reconfig = 4,
}

impl Timer {
    pub(crate) const VALUES: [Self; TIMER_COUNT] = [
        Timer::T1Init,
        Timer::T1Cookie,
        Timer::T2Shutdown,
        Timer::T3RTX,
        Timer::Reconfig,
    ];
}

/// A table of deadline and retransmission-count state for each timer kind.
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct TimerTable {
    data: [Option<Instant>; TIMER_COUNT],
    retrans: [usize; TIMER_COUNT],
    max_retrans: [usize; TIMER_COUNT],
}

impl TimerTable {
    pub(crate) fn new(config: TimerConfig) -> Self {
        TimerTable {
            max_retrans: [
                config.max_t1_init_retrans,
                config.max_t1_cookie_retrans,
                config.max_t2_shutdown_retrans,
                config.max_t3_rtx_retrans,
                config.max_reconfig_retrans,
            ],
            ..Default::default()
        }
    }

    /// Arms `timer` to fire `interval` milliseconds from `now`, applying the
    /// exponential backoff accumulated from expirations.
    pub(crate) fn start(&mut self, timer: Timer, now: Instant, interval: u64) {
        let interval = calculate_next_timeout(interval, self.retrans[timer as usize]);
        self.data[timer as usize] = Some(now + Duration::from_millis(interval));
    }

    pub(crate) fn is_running(&self, timer: Timer) -> bool {
        self.data[timer as usize].is_some()
    }

    pub(crate) fn stop(&mut self, timer: Timer) {
        self.data[timer as usize] = None;
        self.retrans[timer as usize] = 0;
    }

    pub(crate) fn next_timeout(&self) -> Option<Instant> {
        self.data.iter().filter_map(|&x| x).min()
    }

    /// Checks expiration. Returns `(expired, failure)`; `failure` is set once
    /// the retransmission budget is exhausted.
    pub(crate) fn is_expired(&mut self, timer: Timer, after: Instant) -> (bool, bool) {
        let expired = self.data[timer as usize].is_some_and(|x| x <= after);
        let mut failure = false;
        if expired {
            self.data[timer as usize] = None;
            self.retrans[timer as usize] += 1;
            if self.retrans[timer as usize] > self.max_retrans[timer as usize] {
                failure = true;
            }
        }
        (expired, failure)
    }
}

/// RtoManager manages retransmission timeout values, RFC 4960 §6.3.1.
#[derive(Default, Debug)]
pub(crate) struct RtoManager {
    pub(crate) srtt: u64,
    pub(crate) rttvar: f64,
    pub(crate) rto: u64,
}

impl RtoManager {
    pub(crate) fn new() -> Self {
        RtoManager {
            rto: RTO_INITIAL,
            ..Default::default()
        }
    }

    /// Feeds a new RTT measurement (msec) and returns the smoothed RTT.
    pub(crate) fn set_new_rtt(&mut self, rtt: u64) -> u64 {
        if self.srtt == 0 {
            // First measurement
            self.srtt = rtt;
            self.rttvar = rtt as f64 / 2.0;
        } else {
            self.rttvar = ((RTO_BASE - RTO_BETA) as f64 * self.rttvar
                + RTO_BETA as f64 * (self.srtt as i64 - rtt as i64).abs() as f64)
                / RTO_BASE as f64;
            self.srtt = ((RTO_BASE - RTO_ALPHA) * self.srtt + RTO_ALPHA * rtt) / RTO_BASE;
        }

        self.rto = (self.srtt + (4.0 * self.rttvar) as u64).clamp(RTO_MIN, RTO_MAX);

        self.srtt
    }

    pub(crate) fn get_rto(&self) -> u64 {
        self.rto
    }

    pub(crate) fn reset(&mut self) {
        self.srtt = 0;
        self.rttvar = 0.0;
        self.rto = RTO_INITIAL;
    }
}

/// RFC 4960 §6.3.3 E2: double the timeout per expiration, capped at RTO.max.
fn calculate_next_timeout(rto: u64, n_rtos: usize) -> u64 {
    if n_rtos < 31 {
        std::cmp::min(rto << n_rtos, RTO_MAX)
    } else {
        RTO_MAX
    }
}

#[cfg(test)]
mod timer_test {
    use super::*;

    #[test]
    fn test_rto_manager_initial() {
        let mgr = RtoManager::new();
        assert_eq!(mgr.get_rto(), RTO_INITIAL);
    }

    #[test]
    fn test_rto_manager_converges() {
        let mut mgr = RtoManager::new();
        for _ in 0..10 {
            mgr.set_new_rtt(200);
        }
        // srtt converges to the measurement, rto floors at RTO_MIN
        assert_eq!(mgr.srtt, 200);
        assert_eq!(mgr.get_rto(), RTO_MIN);

        mgr.reset();
        assert_eq!(mgr.get_rto(), RTO_INITIAL);
        assert_eq!(mgr.srtt, 0);
    }

    #[test]
    fn test_timeout_backoff() {
        assert_eq!(calculate_next_timeout(1000, 0), 1000);
        assert_eq!(calculate_next_timeout(1000, 1), 2000);
        assert_eq!(calculate_next_timeout(1000, 6), 60000, "capped at RTO.max");
        assert_eq!(calculate_next_timeout(1000, 40), 60000);
    }

    #[test]
    fn test_timer_table_expiry_and_failure() {
        let mut table = TimerTable::new(TimerConfig {
            max_t3_rtx_retrans: 2,
            ..Default::default()
        });

        let start = Instant::now();
        table.start(Timer::T3RTX, start, 100);
        assert!(table.is_running(Timer::T3RTX));
        assert!(table.next_timeout().is_some());

        let (expired, failure) =
            table.is_expired(Timer::T3RTX, start + Duration::from_millis(200));
        assert!(expired);
        assert!(!failure);

        // exhaust the retransmission budget
        table.start(Timer::T3RTX, start, 100);
        table.is_expired(Timer::T3RTX, start + Duration::from_secs(10));
        table.start(Timer::T3RTX, start, 100);
        let (expired, failure) =
            table.is_expired(Timer::T3RTX, start + Duration::from_secs(100));
        assert!(expired);
        assert!(failure);
    }
}
