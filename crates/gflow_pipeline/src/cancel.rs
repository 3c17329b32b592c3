//! Cancellation supervision for a running evaluation.
//!
//! The [`Supervisor`] owns the sending half of the event channel and the
//! run's cancellation token. Every suspension point in the pipeline goes
//! through [`Supervisor::guard`] or [`Supervisor::emit`], so a consumer that
//! drops the receiving half is noticed at the next await and the run unwinds
//! without sending anything further.

use std::future::Future;

use gflow_core::StreamEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Event sender plus cancellation state for one run.
#[derive(Debug, Clone)]
pub struct Supervisor {
    events: mpsc::Sender<StreamEvent>,
    token: CancellationToken,
}

impl Supervisor {
    pub fn new(events: mpsc::Sender<StreamEvent>, token: CancellationToken) -> Self {
        Self { events, token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the run was cancelled or the consumer went away.
    pub fn is_cancelled(&self) -> bool {
        if self.events.is_closed() {
            self.token.cancel();
        }
        self.token.is_cancelled()
    }

    /// Await `fut`, unless the run is cancelled or the consumer disconnects first.
    ///
    /// On cancellation `fut` is dropped before it completes.
    pub async fn guard<F: Future>(&self, fut: F) -> PipelineResult<F::Output> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PipelineError::Cancelled),
            _ = self.events.closed() => {
                debug!("Event consumer closed");
                self.token.cancel();
                Err(PipelineError::Cancelled)
            }
            output = fut => Ok(output),
        }
    }

    /// Deliver one event to the consumer.
    pub async fn emit(&self, event: StreamEvent) -> PipelineResult<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PipelineError::Cancelled),
            sent = self.events.send(event) => sent.map_err(|_| {
                self.token.cancel();
                PipelineError::Cancelled
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_emit_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let supervisor = Supervisor::new(tx, CancellationToken::new());

        supervisor.emit(StreamEvent::section("A")).await.unwrap();
        supervisor.emit(StreamEvent::Complete).await.unwrap();

        assert_eq!(rx.recv().await, Some(StreamEvent::section("A")));
        assert_eq!(rx.recv().await, Some(StreamEvent::Complete));
    }

    #[tokio::test]
    async fn test_closed_receiver_cancels() {
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let supervisor = Supervisor::new(tx, token.clone());
        drop(rx);

        assert_eq!(
            supervisor.emit(StreamEvent::content("x")).await,
            Err(PipelineError::Cancelled)
        );
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_aborts_pending_work_on_disconnect() {
        let (tx, rx) = mpsc::channel::<StreamEvent>(4);
        let supervisor = Supervisor::new(tx, CancellationToken::new());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(rx);
        });

        let result = supervisor
            .guard(tokio::time::sleep(Duration::from_secs(3600)))
            .await;
        assert_eq!(result, Err(PipelineError::Cancelled));
        assert!(supervisor.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_passes_output_through() {
        let (tx, _rx) = mpsc::channel::<StreamEvent>(1);
        let supervisor = Supervisor::new(tx, CancellationToken::new());
        assert_eq!(supervisor.guard(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_explicit_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let supervisor = Supervisor::new(tx, token.clone());
        token.cancel();

        assert_eq!(supervisor.emit(StreamEvent::Complete).await, Err(PipelineError::Cancelled));
        assert_eq!(supervisor.guard(async {}).await, Err(PipelineError::Cancelled));
    }
}
