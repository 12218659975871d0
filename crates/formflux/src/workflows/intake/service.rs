use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::catalog::FormCatalog;
use super::domain::SharedFieldPolicy;
use super::gateways::{
    AccessCodeList, AlertChannel, Authenticator, DispatchMetadata, DispatchReceipt, Dispatcher,
    QuestionPhraser, RepositoryError, SessionId, SessionRepository,
};
use super::session::{
    FieldPrompt, IntakeError, IntakeSession, IntakeStage, ReviewEntry, SessionOptions,
    SubmissionOutput, DEFAULT_LANGUAGE,
};
use crate::workflows::documents::DocumentCompiler;
use crate::workflows::ledger::{LedgerError, SubmissionLog, SubmissionRecord, SubmissionStatus};
use crate::workflows::phrasing::PlainPhraser;

/// Service-wide knobs shared by every session.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub shared_fields: SharedFieldPolicy,
    pub default_language: String,
    /// Staff number alerted after each delivered document. `None` disables alerts.
    pub alert_recipient: Option<String>,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            shared_fields: SharedFieldPolicy::default(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            alert_recipient: None,
        }
    }
}

/// How a new session proves access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    AccessCode(String),
    /// Issued by a magic-link front end that already verified the client.
    PreAuthenticated,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub credential: Credential,
    pub forms: Vec<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Confirm,
    Edit,
}

/// Snapshot of a session for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub stage: IntakeStage,
    pub stage_label: &'static str,
    pub form_queue: Vec<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub review: Vec<ReviewEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<SubmissionOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub text: String,
    #[serde(flatten)]
    pub prompt: FieldPrompt,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormSummary {
    pub name: String,
    pub description: String,
    pub field_count: usize,
    pub bundle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub form_name: String,
    pub file_name: String,
    pub recipient: String,
    pub receipt: DispatchReceipt,
}

/// Outcome of a submit or retry. `complete` means every output was delivered and the
/// session was cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReport {
    pub session_id: SessionId,
    pub client_name: String,
    pub complete: bool,
    pub deliveries: Vec<DeliveryReport>,
}

impl SubmissionReport {
    pub fn failures(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|delivery| !delivery.receipt.success)
            .count()
    }
}

/// Drives intake sessions held in a repository and delivers finished submissions.
pub struct IntakeService<R, D, A, L> {
    catalog: Arc<FormCatalog>,
    compiler: Arc<DocumentCompiler>,
    authenticator: Arc<dyn Authenticator>,
    phraser: Arc<dyn QuestionPhraser>,
    sessions: Arc<R>,
    dispatcher: Arc<D>,
    alerts: Arc<A>,
    log: Arc<L>,
    settings: IntakeSettings,
    /// One gate per live session; every mutating call holds it from load to store.
    gates: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl<R, D, A, L> IntakeService<R, D, A, L>
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    /// Starts with an empty access-code list and plain question phrasing.
    pub fn new(
        catalog: Arc<FormCatalog>,
        compiler: DocumentCompiler,
        sessions: Arc<R>,
        dispatcher: Arc<D>,
        alerts: Arc<A>,
        log: Arc<L>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            catalog,
            compiler: Arc::new(compiler),
            authenticator: Arc::new(AccessCodeList::default()),
            phraser: Arc::new(PlainPhraser),
            sessions,
            dispatcher,
            alerts,
            log,
            settings,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn with_phraser(mut self, phraser: Arc<dyn QuestionPhraser>) -> Self {
        self.phraser = phraser;
        self
    }

    pub fn catalog(&self) -> &FormCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &IntakeSettings {
        &self.settings
    }

    pub fn forms(&self) -> Vec<FormSummary> {
        self.catalog
            .forms()
            .iter()
            .map(|form| FormSummary {
                name: form.name.clone(),
                description: form.description.clone(),
                field_count: form.fields.len(),
                bundle: form.is_bundle(),
            })
            .collect()
    }

    /// Create and store a session after checking the credential.
    pub fn open(&self, request: SessionRequest) -> Result<SessionView, ServiceError> {
        let language = request
            .language
            .filter(|language| !language.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_language.clone());
        let mut session = IntakeSession::new(
            Arc::clone(&self.catalog),
            SessionOptions {
                form_queue: request.forms,
                authenticated: request.credential == Credential::PreAuthenticated,
                language,
                shared_fields: self.settings.shared_fields,
            },
        )?;

        if let Credential::AccessCode(code) = &request.credential {
            if let Err(err) = session.authenticate(self.authenticator.as_ref(), code) {
                warn!("rejected intake access code");
                return Err(err.into());
            }
        }

        let id = SessionId::generate();
        self.sessions.insert(&id, session.clone())?;
        info!(session = %id.0, forms = session.form_queue().len(), "intake session opened");
        Ok(self.view_of(&id, &session))
    }

    pub fn view(&self, id: &SessionId) -> Result<SessionView, ServiceError> {
        let session = self.load(id)?;
        Ok(self.view_of(id, &session))
    }

    pub fn start(&self, id: &SessionId) -> Result<SessionView, ServiceError> {
        self.step(id, |session| session.start().map(|_| ()))
    }

    pub fn answer(&self, id: &SessionId, answer: &str) -> Result<SessionView, ServiceError> {
        self.step(id, |session| session.advance(answer).map(|_| ()))
    }

    pub fn back(&self, id: &SessionId) -> Result<SessionView, ServiceError> {
        self.step(id, |session| session.retreat().map(|_| ()))
    }

    pub fn set_language(&self, id: &SessionId, language: &str) -> Result<SessionView, ServiceError> {
        self.step(id, |session| {
            session.set_language(language);
            Ok(())
        })
    }

    pub fn biometrics(
        &self,
        id: &SessionId,
        selfie: Vec<u8>,
        government_id: Vec<u8>,
    ) -> Result<SessionView, ServiceError> {
        self.step(id, move |session| {
            session.submit_biometrics(selfie, government_id).map(|_| ())
        })
    }

    pub fn review(
        &self,
        id: &SessionId,
        decision: ReviewDecision,
    ) -> Result<SessionView, ServiceError> {
        self.step(id, |session| match decision {
            ReviewDecision::Confirm => session.confirm_review().map(|_| ()),
            ReviewDecision::Edit => session.edit().map(|_| ()),
        })
    }

    /// Compile the signed submission and deliver every output. The completed session is
    /// stored before delivery so a failed send can be retried without recompiling.
    pub fn submit(
        &self,
        id: &SessionId,
        signature: Vec<u8>,
    ) -> Result<SubmissionReport, ServiceError> {
        self.exclusive(id, || {
            let mut session = self.load(id)?;
            let outputs = session.finalize(signature, &self.compiler)?;
            if let Err(err) = self.sessions.update(id, session.clone()) {
                for output in &outputs {
                    if let Err(cleanup) = output.discard() {
                        warn!(path = %output.path.display(), error = %cleanup, "failed to discard output");
                    }
                }
                return Err(err.into());
            }
            self.deliver(id, session)
        })
    }

    /// Re-send outputs that have not reached their recipient yet.
    pub fn retry(&self, id: &SessionId) -> Result<SubmissionReport, ServiceError> {
        self.exclusive(id, || {
            let session = self.load(id)?;
            if !session.is_complete() {
                return Err(IntakeError::InvalidStage {
                    operation: "retry",
                    stage: session.stage(),
                }
                .into());
            }
            self.deliver(id, session)
        })
    }

    /// Drop a session and everything it collected.
    pub fn abandon(&self, id: &SessionId) -> Result<(), ServiceError> {
        self.exclusive(id, || {
            let session = self.load(id)?;
            for output in session.outputs().iter().filter(|output| !output.delivered) {
                if let Err(err) = output.artifact.discard() {
                    warn!(path = %output.artifact.path.display(), error = %err, "failed to discard output");
                }
            }
            self.sessions.remove(id)?;
            self.release(id);
            info!(session = %id.0, "intake session abandoned");
            Ok(())
        })
    }

    pub fn submissions(&self) -> Result<Vec<SubmissionRecord>, ServiceError> {
        Ok(self.log.entries()?)
    }

    fn load(&self, id: &SessionId) -> Result<IntakeSession, ServiceError> {
        Ok(self
            .sessions
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    fn step<F>(&self, id: &SessionId, operation: F) -> Result<SessionView, ServiceError>
    where
        F: FnOnce(&mut IntakeSession) -> Result<(), IntakeError>,
    {
        self.exclusive(id, || {
            let mut session = self.load(id)?;
            operation(&mut session)?;
            let view = self.view_of(id, &session);
            self.sessions.update(id, session)?;
            Ok(view)
        })
    }

    /// Run `operation` while holding the session's gate, so concurrent requests for one
    /// session see each other's writes instead of racing on stale copies.
    fn exclusive<T, F>(&self, id: &SessionId, operation: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Result<T, ServiceError>,
    {
        let gate = {
            let mut gates = self.gates.lock().map_err(|_| gate_poisoned())?;
            Arc::clone(gates.entry(id.clone()).or_default())
        };
        let _held = gate.lock().map_err(|_| gate_poisoned())?;
        operation()
    }

    fn release(&self, id: &SessionId) {
        if let Ok(mut gates) = self.gates.lock() {
            gates.remove(id);
        }
    }

    fn deliver(
        &self,
        id: &SessionId,
        mut session: IntakeSession,
    ) -> Result<SubmissionReport, ServiceError> {
        let client_name = session.client_name();
        let pending: Vec<(usize, SubmissionOutput)> = session
            .outputs()
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, output)| !output.delivered)
            .collect();

        let mut deliveries = Vec::with_capacity(pending.len());
        for (index, output) in pending {
            let recipient = self
                .catalog
                .get(&output.artifact.form_name)
                .map_err(IntakeError::from)?
                .recipient
                .clone();
            let metadata = DispatchMetadata {
                client_name: client_name.clone(),
                form_name: output.artifact.form_name.clone(),
            };

            let receipt = self.dispatcher.send(&output.artifact, &recipient, &metadata);
            let status = if receipt.success {
                SubmissionStatus::Success
            } else {
                SubmissionStatus::DispatchFailed
            };
            if let Err(err) = self
                .log
                .record(SubmissionRecord::new(&client_name, &metadata.form_name, status))
            {
                warn!(error = %err, "failed to record submission");
            }

            if receipt.success {
                session.mark_delivered(index);
                info!(form = %metadata.form_name, recipient = %recipient, "submission delivered");
                self.notify(&output, &metadata);
            } else {
                warn!(
                    form = %metadata.form_name,
                    detail = %receipt.detail,
                    "submission dispatch failed"
                );
            }

            deliveries.push(DeliveryReport {
                form_name: metadata.form_name,
                file_name: output.artifact.file_name(),
                recipient,
                receipt,
            });
        }

        let complete = session.outputs().iter().all(|output| output.delivered);
        if complete {
            self.sessions.remove(id)?;
            self.release(id);
        } else {
            self.sessions.update(id, session)?;
        }

        let report = SubmissionReport {
            session_id: id.clone(),
            client_name,
            complete,
            deliveries,
        };
        if complete {
            Ok(report)
        } else {
            Err(ServiceError::Dispatch(report))
        }
    }

    fn notify(&self, output: &SubmissionOutput, metadata: &DispatchMetadata) {
        let Some(number) = self.settings.alert_recipient.as_deref() else {
            return;
        };
        let receipt = self.alerts.send(&output.artifact, number, metadata);
        if !receipt.success {
            warn!(detail = %receipt.detail, "staff alert failed");
        }
    }

    fn view_of(&self, id: &SessionId, session: &IntakeSession) -> SessionView {
        let stage = session.stage();
        let question = session.current_prompt().map(|prompt| QuestionView {
            text: self
                .phraser
                .phrase(&prompt.field.description, session.language()),
            prompt,
        });
        let review = match stage {
            IntakeStage::Review | IntakeStage::Signature => session.review_summary(),
            _ => Vec::new(),
        };

        SessionView {
            session_id: id.clone(),
            stage,
            stage_label: stage.label(),
            form_queue: session.form_queue().to_vec(),
            language: session.language().to_string(),
            question,
            review,
            outputs: session.outputs().to_vec(),
        }
    }
}

fn gate_poisoned() -> RepositoryError {
    RepositoryError::Unavailable("session gate poisoned".to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("{} document(s) could not be delivered", .0.failures())]
    Dispatch(SubmissionReport),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("background worker failed: {0}")]
    Worker(String),
}
