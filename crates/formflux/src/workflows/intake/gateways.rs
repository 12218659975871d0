use serde::{Deserialize, Serialize};

use super::session::IntakeSession;
use crate::workflows::documents::OutputArtifact;

/// Access gate in front of the wizard.
pub trait Authenticator: Send + Sync {
    fn check(&self, code: &str) -> bool;
}

/// Fixed allow-list of access codes.
#[derive(Debug, Clone, Default)]
pub struct AccessCodeList {
    codes: Vec<String>,
}

impl AccessCodeList {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(Into::into)
                .filter(|code: &String| !code.trim().is_empty())
                .collect(),
        }
    }
}

impl Authenticator for AccessCodeList {
    fn check(&self, code: &str) -> bool {
        let code = code.trim();
        !code.is_empty() && self.codes.iter().any(|allowed| allowed == code)
    }
}

/// Turns a field description into the question shown to the client. Never fails: any
/// backend problem resolves to a plain rendering of the description.
pub trait QuestionPhraser: Send + Sync {
    fn phrase(&self, description: &str, language: &str) -> String;
}

/// Envelope fields sent alongside a compiled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMetadata {
    pub client_name: String,
    pub form_name: String,
}

/// Outcome of a send attempt. Transports report failure here instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub success: bool,
    pub detail: String,
}

impl DispatchReceipt {
    pub fn sent(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Outbound delivery of compiled documents (e-mail relay or similar).
pub trait Dispatcher: Send + Sync {
    fn send(
        &self,
        document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> DispatchReceipt;
}

/// Best-effort staff notification (SMS or similar). Failures are logged, never surfaced.
pub trait AlertChannel: Send + Sync {
    fn send(
        &self,
        document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> DispatchReceipt;
}

/// Session storage keyed by id so the HTTP layer can drive many independent sessions.
pub trait SessionRepository: Send + Sync {
    fn insert(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError>;
    fn update(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &SessionId) -> Result<Option<IntakeSession>, RepositoryError>;
    fn remove(&self, id: &SessionId) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("session already exists")]
    Conflict,
    #[error("session not found")]
    NotFound,
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}
