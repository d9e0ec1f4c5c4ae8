use serde::{Deserialize, Serialize};

/// A processed workflow as shown in the UI: a titled markdown guide with a
/// productivity score, retrieved from the Session Manager after a session ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowView {
    pub id: String,
    pub title: String,
    pub score: f64,
    pub guide_markdown: String,
    /// Where the workflow came from ("firestore", "fallback", ...).
    pub source: String,
}

impl WorkflowView {
    /// Placeholder workflow used when the upstream has nothing to return.
    pub fn fallback() -> Self {
        Self {
            id: "fallback-001".into(),
            title: "Sample Workflow".into(),
            score: 0.85,
            guide_markdown: "# Sample Workflow Guide\n\n\
                This is a fallback workflow shown when no processed workflow is available.\n\n\
                ## Steps\n1. Review the session data\n2. Analyze patterns\n3. Generate insights"
                .into(),
            source: "fallback".into(),
        }
    }
}
