//! Injectable pacing policy for the command sequencer.
//!
//! The controller needs a turnaround pause between receiving a command and
//! producing its reply; the observed deployment uses a fixed 100 ms settle
//! delay before and after each read. Expressing the delays as a value rather
//! than hard-coded sleeps lets tests run with no real-world delay while
//! production keeps device-appropriate settle times.

use std::time::Duration;

use crate::config::SerialLinkConfig;

/// Settle-delay and read-budget policy for one serial exchange.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Pause after writing a command before attempting to read its reply,
    /// and again before the next command. Accommodates device turnaround
    /// latency; not a correctness mechanism.
    pub settle: Duration,
    /// Budget for reading one terminated reply line.
    pub read_budget: Duration,
}

impl Pacing {
    /// Observed device turnaround allowance.
    pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

    /// Production pacing: fixed settle delay, read budget from the link
    /// configuration.
    pub fn from_link(link: &SerialLinkConfig) -> Self {
        Self {
            settle: Self::DEFAULT_SETTLE,
            read_budget: link.read_timeout(),
        }
    }

    /// Test pacing: no settle delay, short read budget.
    pub fn instant() -> Self {
        Self {
            settle: Duration::ZERO,
            read_budget: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_link_uses_configured_read_budget() {
        let link = SerialLinkConfig {
            read_timeout_ms: 750,
            ..SerialLinkConfig::default()
        };
        let pacing = Pacing::from_link(&link);
        assert_eq!(pacing.read_budget, Duration::from_millis(750));
        assert_eq!(pacing.settle, Pacing::DEFAULT_SETTLE);
    }
}
