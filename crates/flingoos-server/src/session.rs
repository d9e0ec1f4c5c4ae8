//! Session coordinator — connects the UI to the Session Manager.
//!
//! `SessionBackend` is the seam to the upstream API; `HttpSessionBackend` is
//! the production implementation over `SessionManagerClient`. The coordinator
//! owns the single active-session record and runs the post-session
//! upload/processing pipeline, pushing progress to browsers as `UiEvent`s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use flingoos_client::SessionManagerClient;
use flingoos_core::errors::ClientError;
use flingoos_core::events::{UiEvent, UploadStep};
use flingoos_core::ids::SessionId;
use flingoos_core::markdown::sanitize_markdown;
use flingoos_core::workflow::WorkflowView;

/// Post-session upload steps: message + pacing weight.
const UPLOAD_STEPS: &[(&str, u32)] = &[
    ("Starting data flush...", 1),
    ("Uploading audio...", 3),
    ("Uploading screenshots...", 2),
    ("Uploading telemetry (mouse, keyboard, window changes)...", 4),
    ("Verifying uploads...", 2),
];

/// Forge processing steps. The final step performs the workflow fetch.
const FORGE_STEPS: &[(&str, u32)] = &[
    ("Generating forge trigger JSON...", 1),
    ("Triggering forge processing pipeline...", 2),
    ("Processing workflow (stages A-F)...", 5),
    ("Uploading results to Firestore...", 2),
    ("Retrieving processed workflow...", 1),
];

/// Errors surfaced to the browser. None of these are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is already active")]
    AlreadyActive,
    #[error("No active session to stop")]
    NotActive,
    #[error("session {0} is not the active session")]
    WrongSession(SessionId),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Seam to the external Session Manager.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn start(&self) -> Result<SessionId, ClientError>;
    async fn stop(&self, session_id: &SessionId) -> Result<(), ClientError>;
    /// Probe the upstream status endpoint. Ok means reachable.
    async fn upstream_active(&self) -> Result<bool, ClientError>;
    async fn workflow(&self, session_id: &SessionId) -> Result<WorkflowView, ClientError>;
}

/// Production backend over the Session Manager REST API.
pub struct HttpSessionBackend {
    client: SessionManagerClient,
}

impl HttpSessionBackend {
    pub fn new(client: SessionManagerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn start(&self) -> Result<SessionId, ClientError> {
        let resp = self.client.start_session().await?;
        Ok(resp.session_id)
    }

    async fn stop(&self, session_id: &SessionId) -> Result<(), ClientError> {
        self.client.stop_session(session_id).await?;
        Ok(())
    }

    async fn upstream_active(&self) -> Result<bool, ClientError> {
        let status = self.client.status().await?;
        Ok(status.session_active)
    }

    async fn workflow(&self, session_id: &SessionId) -> Result<WorkflowView, ClientError> {
        let payload = self.client.workflow(session_id).await?;
        Ok(WorkflowView {
            id: payload.workflow_id,
            title: payload.title,
            score: payload.productivity_score,
            guide_markdown: payload.guide_markdown,
            source: payload.source.unwrap_or_else(|| "session-manager".into()),
        })
    }
}

/// How long each pipeline step takes per unit of weight. Tests run at zero.
#[derive(Clone, Copy, Debug)]
pub struct PipelinePacing {
    pub unit: Duration,
}

impl Default for PipelinePacing {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
        }
    }
}

impl PipelinePacing {
    pub fn instant() -> Self {
        Self {
            unit: Duration::ZERO,
        }
    }
}

/// Local session status reported to browsers and the REST surface.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub session_active: bool,
    pub session_id: Option<SessionId>,
    pub elapsed_secs: u64,
    pub has_workflow: bool,
    pub upstream_connected: bool,
}

struct ActiveSession {
    id: SessionId,
    started_at: Instant,
}

/// Owns the one active session and the progress pipeline.
pub struct SessionCoordinator {
    backend: Arc<dyn SessionBackend>,
    event_tx: broadcast::Sender<UiEvent>,
    active: Mutex<Option<ActiveSession>>,
    workflow: Mutex<Option<WorkflowView>>,
    pacing: PipelinePacing,
}

impl SessionCoordinator {
    pub fn new(backend: Arc<dyn SessionBackend>, event_tx: broadcast::Sender<UiEvent>) -> Self {
        Self {
            backend,
            event_tx,
            active: Mutex::new(None),
            workflow: Mutex::new(None),
            pacing: PipelinePacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: PipelinePacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Start a session upstream. Rejected locally while one is active, so no
    /// duplicate request ever reaches the Session Manager.
    pub async fn start(&self) -> Result<SessionId, SessionError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let session_id = self.backend.start().await?;
        *active = Some(ActiveSession {
            id: session_id.clone(),
            started_at: Instant::now(),
        });
        drop(active);

        *self.workflow.lock().await = None;
        tracing::info!(session_id = %session_id, "Session started");
        self.emit(UiEvent::SessionStarted { session_id: session_id.clone() });
        Ok(session_id)
    }

    /// Stop the active session and kick off the processing pipeline.
    ///
    /// `expected` pins the stop to a specific session id (the REST route);
    /// `None` stops whatever is active (the WebSocket command). The stopped
    /// event is pushed before processing so the UI flips immediately.
    pub async fn stop(
        self: &Arc<Self>,
        expected: Option<&SessionId>,
    ) -> Result<SessionId, SessionError> {
        let mut active = self.active.lock().await;
        let Some(session) = active.take() else {
            return Err(SessionError::NotActive);
        };
        if let Some(expected) = expected {
            if expected != &session.id {
                *active = Some(session);
                return Err(SessionError::WrongSession(expected.clone()));
            }
        }
        drop(active);

        tracing::info!(session_id = %session.id, "Session stopping");
        self.emit(UiEvent::SessionStopped {
            session_id: session.id.clone(),
        });

        if let Err(e) = self.backend.stop(&session.id).await {
            // The upstream stop failing does not abort local processing;
            // surface it and continue, matching the audio-stop behavior.
            tracing::warn!(error = %e, kind = e.error_kind(), "Upstream stop failed");
            self.emit(UiEvent::SessionError {
                error: e.to_string(),
            });
        }

        let coordinator = Arc::clone(self);
        let session_id = session.id.clone();
        tokio::spawn(async move {
            coordinator.run_pipeline(session_id).await;
        });

        Ok(session.id)
    }

    /// Local status merged with an upstream reachability probe.
    pub async fn status(&self) -> StatusSnapshot {
        let upstream_connected = self.backend.upstream_active().await.is_ok();
        let active = self.active.lock().await;
        let workflow = self.workflow.lock().await;
        StatusSnapshot {
            session_active: active.is_some(),
            session_id: active.as_ref().map(|s| s.id.clone()),
            elapsed_secs: active
                .as_ref()
                .map(|s| s.started_at.elapsed().as_secs())
                .unwrap_or(0),
            has_workflow: workflow.is_some(),
            upstream_connected,
        }
    }

    /// Status as a push event, for the WebSocket command path.
    pub async fn status_event(&self) -> UiEvent {
        let snapshot = self.status().await;
        UiEvent::Status {
            active: snapshot.session_active,
            session_id: snapshot.session_id,
            elapsed_secs: snapshot.elapsed_secs,
            has_workflow: snapshot.has_workflow,
        }
    }

    /// Fetch the workflow result for a session, preferring the one already
    /// retrieved by the pipeline. Markdown is always sanitized.
    pub async fn workflow(&self, session_id: &SessionId) -> Result<WorkflowView, SessionError> {
        if let Some(wf) = self.workflow.lock().await.clone() {
            return Ok(wf);
        }
        let wf = self.backend.workflow(session_id).await?;
        Ok(sanitized(wf))
    }

    async fn run_pipeline(&self, session_id: SessionId) {
        let steps: Vec<(&str, u32)> = UPLOAD_STEPS
            .iter()
            .chain(FORGE_STEPS.iter())
            .copied()
            .collect();
        let total = steps.len();
        let mut completed: Vec<UploadStep> = Vec::new();

        for (idx, (message, weight)) in steps.iter().enumerate() {
            let mut current = completed.clone();
            current.push(UploadStep::uploading(*message));
            self.emit(UiEvent::UploadStatus {
                current_step: (*message).to_string(),
                percent: percent(idx, total),
                is_uploading: true,
                steps: current,
            });

            if idx == total - 1 {
                self.retrieve_workflow(&session_id).await;
            } else {
                tokio::time::sleep(self.pacing.unit * *weight).await;
            }

            completed.push(UploadStep::completed(*message));
        }

        completed.push(UploadStep::completed(
            "Workflow processing completed! Ready to view results.",
        ));
        self.emit(UiEvent::UploadStatus {
            current_step: "Processing complete".into(),
            percent: 100,
            is_uploading: false,
            steps: completed,
        });

        let workflow = self.workflow.lock().await.clone();
        let has_workflow = workflow.is_some();
        if let Some(workflow) = workflow {
            self.emit(UiEvent::WorkflowReady { workflow });
        }
        self.emit(UiEvent::UploadComplete { has_workflow });
        tracing::info!(session_id = %session_id, has_workflow, "Pipeline complete");
    }

    async fn retrieve_workflow(&self, session_id: &SessionId) {
        match self.backend.workflow(session_id).await {
            Ok(wf) => {
                let wf = if wf.guide_markdown.trim().is_empty() {
                    WorkflowView::fallback()
                } else {
                    sanitized(wf)
                };
                tracing::info!(workflow_id = %wf.id, title = %wf.title, "Retrieved workflow");
                *self.workflow.lock().await = Some(wf);
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.error_kind(), "Workflow retrieval failed");
                self.emit(UiEvent::SessionError {
                    error: e.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: UiEvent) {
        // No receivers just means no browser is watching.
        let _ = self.event_tx.send(event);
    }
}

fn sanitized(mut wf: WorkflowView) -> WorkflowView {
    wf.guide_markdown = sanitize_markdown(&wf.guide_markdown);
    wf
}

fn percent(done: usize, total: usize) -> u8 {
    ((done * 100) / total.max(1)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        starts: AtomicUsize,
        stops: AtomicUsize,
        workflow_fetches: AtomicUsize,
        fail_start: bool,
        fail_workflow: bool,
        guide_markdown: String,
    }

    impl MockBackend {
        fn ok() -> Self {
            Self {
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                workflow_fetches: AtomicUsize::new(0),
                fail_start: false,
                fail_workflow: false,
                guide_markdown: "# Guide\n\n1. Do the thing".into(),
            }
        }

        fn failing_start() -> Self {
            Self {
                fail_start: true,
                ..Self::ok()
            }
        }

        fn failing_workflow() -> Self {
            Self {
                fail_workflow: true,
                ..Self::ok()
            }
        }

        fn with_guide(guide: &str) -> Self {
            Self {
                guide_markdown: guide.into(),
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl SessionBackend for MockBackend {
        async fn start(&self) -> Result<SessionId, ClientError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(ClientError::from_status(503, "unavailable".into()));
            }
            Ok(SessionId::from_raw("sess_mock"))
        }

        async fn stop(&self, _session_id: &SessionId) -> Result<(), ClientError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn upstream_active(&self) -> Result<bool, ClientError> {
            Ok(true)
        }

        async fn workflow(&self, _session_id: &SessionId) -> Result<WorkflowView, ClientError> {
            self.workflow_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_workflow {
                return Err(ClientError::Network("connection refused".into()));
            }
            Ok(WorkflowView {
                id: "wf-1".into(),
                title: "Test workflow".into(),
                score: 0.9,
                guide_markdown: self.guide_markdown.clone(),
                source: "firestore".into(),
            })
        }
    }

    fn setup(backend: MockBackend) -> (Arc<SessionCoordinator>, Arc<MockBackend>, broadcast::Receiver<UiEvent>) {
        let backend = Arc::new(backend);
        let (tx, rx) = broadcast::channel(256);
        let coordinator = Arc::new(
            SessionCoordinator::new(Arc::clone(&backend) as Arc<dyn SessionBackend>, tx)
                .with_pacing(PipelinePacing::instant()),
        );
        (coordinator, backend, rx)
    }

    async fn next_event(rx: &mut broadcast::Receiver<UiEvent>) -> UiEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Drain events until upload_complete, returning everything seen.
    async fn drain_until_complete(rx: &mut broadcast::Receiver<UiEvent>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        loop {
            let event = next_event(rx).await;
            let done = matches!(event, UiEvent::UploadComplete { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn start_emits_session_started() {
        let (coordinator, _backend, mut rx) = setup(MockBackend::ok());

        let id = coordinator.start().await.unwrap();
        assert_eq!(id.as_str(), "sess_mock");

        match next_event(&mut rx).await {
            UiEvent::SessionStarted { session_id } => assert_eq!(session_id, id),
            other => panic!("expected session_started, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_start_rejected_without_upstream_call() {
        let (coordinator, backend, _rx) = setup(MockBackend::ok());

        coordinator.start().await.unwrap();
        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive));
        // The second start never reached the backend.
        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_start_leaves_state_unchanged() {
        let (coordinator, _backend, _rx) = setup(MockBackend::failing_start());

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, SessionError::Client(ClientError::Upstream { status: 503, .. })));

        let status = coordinator.status().await;
        assert!(!status.session_active);
        assert!(status.session_id.is_none());
    }

    #[tokio::test]
    async fn stop_without_active_session_is_rejected() {
        let (coordinator, backend, _rx) = setup(MockBackend::ok());

        let err = coordinator.stop(None).await.unwrap_err();
        assert!(matches!(err, SessionError::NotActive));
        assert_eq!(backend.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_with_wrong_id_is_rejected() {
        let (coordinator, backend, _rx) = setup(MockBackend::ok());
        coordinator.start().await.unwrap();

        let other = SessionId::from_raw("sess_other");
        let err = coordinator.stop(Some(&other)).await.unwrap_err();
        assert!(matches!(err, SessionError::WrongSession(_)));
        assert_eq!(backend.stops.load(Ordering::SeqCst), 0);

        // The real session is still active.
        assert!(coordinator.status().await.session_active);
    }

    #[tokio::test]
    async fn pipeline_emits_ordered_progress_and_workflow() {
        let (coordinator, _backend, mut rx) = setup(MockBackend::ok());

        let id = coordinator.start().await.unwrap();
        assert!(matches!(next_event(&mut rx).await, UiEvent::SessionStarted { .. }));

        coordinator.stop(Some(&id)).await.unwrap();
        let events = drain_until_complete(&mut rx).await;

        assert!(matches!(events[0], UiEvent::SessionStopped { .. }));

        // Progress is monotonically nondecreasing and ends at 100.
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::UploadStatus { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "percents: {percents:?}");
        assert_eq!(*percents.last().unwrap(), 100);

        // Workflow arrives before completion.
        let wf_pos = events
            .iter()
            .position(|e| matches!(e, UiEvent::WorkflowReady { .. }))
            .expect("workflow_ready missing");
        assert_eq!(wf_pos, events.len() - 2);

        match events.last().unwrap() {
            UiEvent::UploadComplete { has_workflow } => assert!(has_workflow),
            other => panic!("expected upload_complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pipeline_sanitizes_workflow_markdown() {
        let (coordinator, _backend, mut rx) =
            setup(MockBackend::with_guide("# Hi\n<script>alert(1)</script>"));

        let id = coordinator.start().await.unwrap();
        coordinator.stop(Some(&id)).await.unwrap();
        let events = drain_until_complete(&mut rx).await;

        let workflow = events
            .iter()
            .find_map(|e| match e {
                UiEvent::WorkflowReady { workflow } => Some(workflow.clone()),
                _ => None,
            })
            .expect("workflow_ready missing");
        assert!(workflow.guide_markdown.contains("&lt;script&gt;"));
        assert!(!workflow.guide_markdown.contains("<script>"));
    }

    #[tokio::test]
    async fn workflow_failure_degrades_to_no_workflow() {
        let (coordinator, _backend, mut rx) = setup(MockBackend::failing_workflow());

        let id = coordinator.start().await.unwrap();
        coordinator.stop(Some(&id)).await.unwrap();
        let events = drain_until_complete(&mut rx).await;

        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::SessionError { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, UiEvent::WorkflowReady { .. })));
        match events.last().unwrap() {
            UiEvent::UploadComplete { has_workflow } => assert!(!has_workflow),
            other => panic!("expected upload_complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_guide_falls_back_to_sample_workflow() {
        let (coordinator, _backend, mut rx) = setup(MockBackend::with_guide("  "));

        let id = coordinator.start().await.unwrap();
        coordinator.stop(Some(&id)).await.unwrap();
        let events = drain_until_complete(&mut rx).await;

        let workflow = events
            .iter()
            .find_map(|e| match e {
                UiEvent::WorkflowReady { workflow } => Some(workflow.clone()),
                _ => None,
            })
            .expect("workflow_ready missing");
        assert_eq!(workflow.source, "fallback");
    }

    #[tokio::test]
    async fn status_reports_elapsed_and_workflow() {
        let (coordinator, _backend, mut rx) = setup(MockBackend::ok());

        let status = coordinator.status().await;
        assert!(!status.session_active);
        assert!(status.upstream_connected);
        assert!(!status.has_workflow);

        let id = coordinator.start().await.unwrap();
        let status = coordinator.status().await;
        assert!(status.session_active);
        assert_eq!(status.session_id, Some(id.clone()));

        coordinator.stop(None).await.unwrap();
        drain_until_complete(&mut rx).await;

        let status = coordinator.status().await;
        assert!(!status.session_active);
        assert!(status.has_workflow);
    }

    #[tokio::test]
    async fn workflow_prefers_pipeline_result() {
        let (coordinator, backend, mut rx) = setup(MockBackend::ok());

        let id = coordinator.start().await.unwrap();
        coordinator.stop(None).await.unwrap();
        drain_until_complete(&mut rx).await;
        let fetches_after_pipeline = backend.workflow_fetches.load(Ordering::SeqCst);

        let wf = coordinator.workflow(&id).await.unwrap();
        assert_eq!(wf.id, "wf-1");
        // Served from the stored result, not a second upstream fetch.
        assert_eq!(backend.workflow_fetches.load(Ordering::SeqCst), fetches_after_pipeline);
    }

    #[test]
    fn percent_is_bounded() {
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(5, 10), 50);
        assert_eq!(percent(10, 10), 100);
        assert_eq!(percent(0, 0), 0);
    }
}
