use std::time::Duration;

/// Tuning knobs for [`wait_for_settled`](crate::wait_for_settled).
#[derive(Clone, Copy, Debug)]
pub struct SettleConfig {
    /// No-inflight interval after which the page counts as settled.
    pub quiet_window: Duration,
    /// Requests older than this are expired by the stall sweep.
    pub stall_age: Duration,
    /// Cadence of the stall sweep.
    pub sweep_interval: Duration,
    /// Hard deadline used when the caller does not override it.
    pub default_deadline: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            quiet_window: Duration::from_millis(500),
            stall_age: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(500),
            default_deadline: Duration::from_secs(30),
        }
    }
}
