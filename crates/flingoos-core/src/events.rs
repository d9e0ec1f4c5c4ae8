use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::workflow::WorkflowView;

/// State of one step in the post-session upload/processing sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Uploading,
    Completed,
}

/// One entry in the upload step list shown in the browser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadStep {
    pub message: String,
    pub status: StepStatus,
}

impl UploadStep {
    pub fn uploading(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StepStatus::Uploading,
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StepStatus::Completed,
        }
    }
}

/// Events pushed from the server to connected browsers over the WebSocket.
/// These drive every UI transition; the browser never invents state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiEvent {
    #[serde(rename = "connected")]
    Connected { message: String },

    #[serde(rename = "session_started")]
    SessionStarted { session_id: SessionId },

    #[serde(rename = "session_stopped")]
    SessionStopped { session_id: SessionId },

    #[serde(rename = "session_error")]
    SessionError { error: String },

    #[serde(rename = "status")]
    Status {
        active: bool,
        session_id: Option<SessionId>,
        elapsed_secs: u64,
        has_workflow: bool,
    },

    #[serde(rename = "upload_status")]
    UploadStatus {
        current_step: String,
        percent: u8,
        is_uploading: bool,
        steps: Vec<UploadStep>,
    },

    #[serde(rename = "workflow_ready")]
    WorkflowReady { workflow: WorkflowView },

    #[serde(rename = "upload_complete")]
    UploadComplete { has_workflow: bool },
}

impl UiEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionStopped { .. } => "session_stopped",
            Self::SessionError { .. } => "session_error",
            Self::Status { .. } => "status",
            Self::UploadStatus { .. } => "upload_status",
            Self::WorkflowReady { .. } => "workflow_ready",
            Self::UploadComplete { .. } => "upload_complete",
        }
    }
}
