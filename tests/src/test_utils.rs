//! Logging and timing helpers shared by the scenario tests

use std::time::Duration;

use nextgsim_common::SubcarrierSpacing;
use tokio::time::{sleep, Instant};
use tracing_subscriber::{fmt, EnvFilter};

/// Result type for test helpers
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Installs a test-writer subscriber once per test binary.
///
/// Honors `RUST_LOG`; without it only warnings are shown, since RACH and UE
/// lifecycle events log at info on every cell.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Wall-clock budget for a real-time run of `nof_slots` slots: twice their
/// air time plus `DEFAULT_TEST_TIMEOUT` for start-up and shutdown.
pub fn real_time_budget(scs: SubcarrierSpacing, nof_slots: u64) -> Duration {
    Duration::from_micros(2 * scs.slot_duration_us() * nof_slots) + DEFAULT_TEST_TIMEOUT
}

/// Polls `probe` every `DEFAULT_POLL_INTERVAL` until it returns `Some` or
/// `budget` elapses.
///
/// Returns the probed value together with the time it took to appear.
pub async fn wait_for<T>(budget: Duration, mut probe: impl FnMut() -> Option<T>) -> TestResult<(T, Duration)> {
    let start = Instant::now();
    loop {
        if let Some(value) = probe() {
            return Ok((value, start.elapsed()));
        }
        if start.elapsed() >= budget {
            return Err(format!("nothing observed within {budget:?}").into());
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Default timeout for test operations
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval of `wait_for`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_returns_probed_value() {
        let slots = Arc::new(AtomicU32::new(0));
        let writer = slots.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                sleep(Duration::from_millis(10)).await;
                writer.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (seen, elapsed) = wait_for(Duration::from_secs(1), || {
            let n = slots.load(Ordering::SeqCst);
            (n >= 5).then_some(n)
        })
        .await
        .unwrap();
        assert_eq!(seen, 5);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let result = wait_for(Duration::from_millis(60), || None::<()>).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_real_time_budget_scales_with_numerology() {
        let khz15 = real_time_budget(SubcarrierSpacing::Khz15, 1000);
        let khz30 = real_time_budget(SubcarrierSpacing::Khz30, 1000);
        assert_eq!(khz15, Duration::from_secs(2) + DEFAULT_TEST_TIMEOUT);
        assert_eq!(khz30, Duration::from_secs(1) + DEFAULT_TEST_TIMEOUT);
    }
}
