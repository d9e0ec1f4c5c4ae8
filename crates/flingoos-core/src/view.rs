use serde::{Deserialize, Serialize};

use crate::events::UiEvent;
use crate::ids::SessionId;
use crate::workflow::WorkflowView;

/// Session lifecycle status as mirrored in the browser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// State of the push channel itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Per-browser mirror of server-reported session state.
///
/// Created on page load, mutated only by applying pushed events, discarded on
/// disconnect. The server owns the truth; this is a faithful reflection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub session_id: Option<SessionId>,
    pub elapsed_secs: u64,
    pub upload_progress: u8,
    pub workflow: Option<WorkflowView>,
    pub connection: ConnectionState,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            session_id: None,
            elapsed_secs: 0,
            upload_progress: 0,
            workflow: None,
            connection: ConnectionState::Connected,
        }
    }
}

impl SessionView {
    /// Fold one pushed event into the view. This is the single UI update path.
    pub fn apply(&mut self, event: &UiEvent) {
        match event {
            UiEvent::Connected { .. } => {
                self.connection = ConnectionState::Connected;
            }
            UiEvent::SessionStarted { session_id } => {
                self.status = SessionStatus::Running;
                self.session_id = Some(session_id.clone());
                self.elapsed_secs = 0;
                self.upload_progress = 0;
                self.workflow = None;
            }
            UiEvent::SessionStopped { .. } => {
                self.status = SessionStatus::Stopping;
            }
            UiEvent::SessionError { .. } => {
                // Errors are surfaced, not fatal; session state is untouched
                // unless nothing was running.
                if self.status == SessionStatus::Idle {
                    self.status = SessionStatus::Error;
                }
            }
            UiEvent::Status {
                active,
                session_id,
                elapsed_secs,
                ..
            } => {
                self.elapsed_secs = *elapsed_secs;
                if *active {
                    self.status = SessionStatus::Running;
                    self.session_id = session_id.clone();
                } else if self.status == SessionStatus::Running {
                    self.status = SessionStatus::Idle;
                }
            }
            UiEvent::UploadStatus { percent, .. } => {
                self.upload_progress = *percent;
            }
            UiEvent::WorkflowReady { workflow } => {
                self.workflow = Some(workflow.clone());
            }
            UiEvent::UploadComplete { .. } => {
                self.status = SessionStatus::Stopped;
                self.session_id = None;
            }
        }
    }

    /// Record a push-channel state change. The last known session status is
    /// deliberately preserved across drops and reconnect attempts.
    pub fn apply_connection(&mut self, state: ConnectionState) {
        self.connection = state;
    }
}
