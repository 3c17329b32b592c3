//! Per-request mutable state of a running evaluation.

use tokio_util::sync::CancellationToken;
use tracing::trace;
use uuid::Uuid;

use crate::rebuffer::ChunkStream;

/// Position of a run in the stage state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Announce,
    Streaming,
    StageDone,
    Finished,
    /// Absorbing; reached on failure or cancellation.
    Aborted,
}

impl SessionState {
    fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Aborted, _) | (Finished, _) => false,
            (_, Aborted) => true,
            (Idle, Announce) | (Idle, Finished) => true,
            (Announce, Streaming) => true,
            (Streaming, StageDone) => true,
            (StageDone, Announce) | (StageDone, Finished) => true,
            _ => false,
        }
    }
}

/// State owned by the single task servicing one request.
///
/// Holds the open upstream chunk stream of the current stage; dropping the
/// session or leaving a stage closes it.
pub struct PipelineSession {
    request_id: Uuid,
    state: SessionState,
    step: usize,
    total: usize,
    cancel: CancellationToken,
    upstream: Option<ChunkStream>,
}

impl PipelineSession {
    pub fn new(request_id: Uuid, total: usize, cancel: CancellationToken) -> Self {
        Self {
            request_id,
            state: SessionState::Idle,
            step: 0,
            total,
            cancel,
            upstream: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 1-based step of the current stage, 0 before the first.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn has_upstream(&self) -> bool {
        self.upstream.is_some()
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!("Session {}: {:?} -> {:?}", self.request_id, self.state, next);
        self.state = next;
    }

    pub fn begin_stage(&mut self, step: usize) {
        self.step = step;
        self.advance(SessionState::Announce);
    }

    /// Enter streaming, with the stage's chunk stream if it has one.
    pub fn attach(&mut self, upstream: Option<ChunkStream>) {
        self.upstream = upstream;
        self.advance(SessionState::Streaming);
    }

    pub fn upstream_mut(&mut self) -> Option<&mut ChunkStream> {
        self.upstream.as_mut()
    }

    pub fn finish_stage(&mut self) {
        self.close_upstream();
        self.advance(SessionState::StageDone);
    }

    pub fn finish(&mut self) {
        self.close_upstream();
        self.advance(SessionState::Finished);
    }

    pub fn abort(&mut self) {
        self.close_upstream();
        if !matches!(self.state, SessionState::Aborted | SessionState::Finished) {
            self.advance(SessionState::Aborted);
        }
    }

    /// Drop the current upstream stream, closing its connection.
    pub fn close_upstream(&mut self) {
        if self.upstream.take().is_some() {
            trace!("Session {}: upstream closed", self.request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> ChunkStream {
        Box::pin(futures::stream::empty())
    }

    #[test]
    fn test_stage_lifecycle() {
        let mut session = PipelineSession::new(Uuid::new_v4(), 2, CancellationToken::new());
        assert_eq!(session.state(), SessionState::Idle);

        for step in 1..=2 {
            session.begin_stage(step);
            assert_eq!(session.state(), SessionState::Announce);
            session.attach(Some(chunks()));
            assert!(session.has_upstream());
            session.finish_stage();
            assert!(!session.has_upstream());
            assert_eq!(session.step(), step);
        }
        session.finish();
        assert_eq!(session.state(), SessionState::Finished);
    }

    #[test]
    fn test_abort_closes_upstream() {
        let mut session = PipelineSession::new(Uuid::new_v4(), 1, CancellationToken::new());
        session.begin_stage(1);
        session.attach(Some(chunks()));
        session.abort();
        assert_eq!(session.state(), SessionState::Aborted);
        assert!(!session.has_upstream());
        // Aborting twice is harmless
        session.abort();
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        assert!(Idle.can_advance_to(Finished));
        assert!(StageDone.can_advance_to(Announce));
        assert!(Streaming.can_advance_to(Aborted));
        assert!(!Finished.can_advance_to(Aborted));
        assert!(!Announce.can_advance_to(StageDone));
    }
}
