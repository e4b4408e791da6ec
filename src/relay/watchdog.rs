//! Per-connection deadline

use super::RelayError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// One-shot deadline armed when a connection is accepted.
///
/// The deadline counts from acceptance and is never reset by traffic. When
/// it fires the guarded future is dropped, which destroys every stream the
/// future owns. A zero duration disables the watchdog.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionWatchdog {
    deadline: Option<Duration>,
}

impl ConnectionWatchdog {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline: (!deadline.is_zero()).then_some(deadline),
        }
    }

    /// Armed deadline, if any
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Run `connection` to completion or until the deadline passes
    pub async fn guard<F>(
        &self,
        peer: impl std::fmt::Display,
        connection: F,
    ) -> Result<F::Output, RelayError>
    where
        F: Future,
    {
        let Some(deadline) = self.deadline else {
            return Ok(connection.await);
        };

        match tokio::time::timeout(deadline, connection).await {
            Ok(output) => Ok(output),
            Err(_) => {
                debug!("Watchdog fired for {} after {:?}", peer, deadline);
                Err(RelayError::WatchdogFired(deadline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_before_deadline() {
        let watchdog = ConnectionWatchdog::new(Duration::from_secs(5));
        let result = watchdog.guard("test", async { 7 }).await.unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn test_fires_on_slow_connection() {
        let watchdog = ConnectionWatchdog::new(Duration::from_millis(20));
        let result = watchdog
            .guard("test", tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(RelayError::WatchdogFired(d)) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_zero_disables() {
        let watchdog = ConnectionWatchdog::new(Duration::ZERO);
        assert!(watchdog.deadline().is_none());
        let result = watchdog
            .guard("test", async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                "done"
            })
            .await
            .unwrap();
        assert_eq!(result, "done");
    }
}
