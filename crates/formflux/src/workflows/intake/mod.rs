//! Client intake: form catalog, the per-client wizard state machine, and the service that
//! delivers finished submissions.

mod catalog;
pub mod domain;
pub mod gateways;
pub mod router;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, FormCatalog};
pub use domain::{
    AnswerMap, ArtifactKind, FieldDefinition, FieldKind, FormDefinition, IdentityArtifacts,
    SharedFieldPolicy, TemplateRef, ValidationError,
};
pub use gateways::{
    AccessCodeList, AlertChannel, Authenticator, DispatchMetadata, DispatchReceipt, Dispatcher,
    QuestionPhraser, RepositoryError, SessionId, SessionRepository,
};
pub use router::intake_router;
pub use service::{
    Credential, DeliveryReport, FormSummary, IntakeService, IntakeSettings, QuestionView,
    ReviewDecision, ServiceError, SessionRequest, SessionView, SubmissionReport,
};
pub use session::{
    FieldPrompt, IntakeError, IntakeSession, IntakeStage, ReviewEntry, SessionOptions,
    SessionState, SubmissionOutput, DEFAULT_LANGUAGE,
};
