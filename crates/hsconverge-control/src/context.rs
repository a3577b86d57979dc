//! Per-operation deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::error::{ReconcileError, Result};

/// Carries the deadline and cancellation signal for one reconciliation
/// operation.
///
/// Every remote call made on behalf of the operation goes through
/// [`OpContext::call`], so a cancelled or expired context aborts the call in
/// flight instead of letting it finish.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl OpContext {
    /// A context with no deadline and a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation token; cancelling it aborts in-flight calls.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the operation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the operation has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one remote call under this context.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Cancelled` or `ReconcileError::DeadlineExceeded`
    /// if the context ends first, or `ReconcileError::Rpc` with the verbatim
    /// status if the call fails.
    pub async fn call<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, Status>>,
    {
        if self.is_cancelled() {
            return Err(ReconcileError::Cancelled { operation });
        }

        let bounded = async {
            let outcome = match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .map_err(|_| ReconcileError::DeadlineExceeded { operation })?,
                None => call.await,
            };
            outcome.map_err(|status| ReconcileError::rpc(operation, status))
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::debug!(operation, "Call cancelled");
                Err(ReconcileError::Cancelled { operation })
            }
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_results_through() {
        let ctx = OpContext::new();
        let value = ctx.call("Op", async { Ok::<_, Status>(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = ctx
            .call("Op", async { Err::<(), _>(Status::internal("boom")) })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Rpc { operation: "Op", .. }));
    }

    #[tokio::test]
    async fn cancelled_context_never_starts_the_call() {
        let ctx = OpContext::new();
        ctx.cancel();

        let mut started = false;
        let err = ctx
            .call("Op", async {
                started = true;
                Ok::<_, Status>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled { operation: "Op" }));
        assert!(!started);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_call() {
        let token = CancellationToken::new();
        let ctx = OpContext::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = ctx
            .call("Slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, Status>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled { operation: "Slow" }));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_in_flight_call() {
        let ctx = OpContext::with_timeout(Duration::from_secs(1));

        let err = ctx
            .call("Slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, Status>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::DeadlineExceeded { operation: "Slow" }
        ));
    }
}
