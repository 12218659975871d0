use chrono::Utc;
use formflux::config::IntakeConfig;
use formflux::error::AppError;
use formflux::workflows::documents::OutputArtifact;
use formflux::workflows::intake::{
    AlertChannel, DispatchMetadata, DispatchReceipt, Dispatcher, FormCatalog, IntakeSession,
    QuestionPhraser, RepositoryError, SessionId, SessionRepository,
};
use formflux::workflows::ledger::{BugLedger, SubmissionLedger};
use formflux::workflows::phrasing::{OpenAiPhraser, PlainPhraser};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) admin_pass: Arc<str>,
    pub(crate) submissions: Arc<SubmissionLedger>,
    pub(crate) bugs: Arc<BugLedger>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySessionRepository {
    sessions: Arc<Mutex<HashMap<SessionId, IntakeSession>>>,
}

impl InMemorySessionRepository {
    fn guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, IntakeSession>>, RepositoryError>
    {
        self.sessions
            .lock()
            .map_err(|_| RepositoryError::Unavailable("session mutex poisoned".to_string()))
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn insert(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError> {
        let mut guard = self.guard()?;
        if guard.contains_key(id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(id.clone(), session);
        Ok(())
    }

    fn update(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError> {
        let mut guard = self.guard()?;
        match guard.get_mut(id) {
            Some(slot) => {
                *slot = session;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<IntakeSession>, RepositoryError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn remove(&self, id: &SessionId) -> Result<(), RepositoryError> {
        self.guard()?
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

/// Envelope written beside each spooled document for the mail relay to pick up.
#[derive(Debug, Serialize)]
pub(crate) struct OutboxEnvelope {
    pub(crate) to: String,
    pub(crate) subject: String,
    pub(crate) body: String,
    pub(crate) form_name: String,
    pub(crate) attachment: String,
    pub(crate) content_type: String,
    pub(crate) queued_at: chrono::DateTime<Utc>,
}

/// Spools documents into an outbox directory instead of talking SMTP directly.
#[derive(Debug, Clone)]
pub(crate) struct OutboxDispatcher {
    outbox_dir: PathBuf,
}

impl OutboxDispatcher {
    pub(crate) fn new(outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            outbox_dir: outbox_dir.into(),
        }
    }

    fn spool(
        &self,
        document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.outbox_dir)?;
        let attachment = document.file_name();
        std::fs::copy(&document.path, self.outbox_dir.join(&attachment))?;

        let envelope = OutboxEnvelope {
            to: recipient.to_string(),
            subject: format!("FormFlux Submission: {}", metadata.client_name),
            body: format!(
                "New secure submission attached for {}.",
                metadata.client_name
            ),
            form_name: metadata.form_name.clone(),
            content_type: mime_guess::from_path(&document.path)
                .first_or_octet_stream()
                .to_string(),
            attachment,
            queued_at: Utc::now(),
        };
        let path = self
            .outbox_dir
            .join(format!("{}.envelope.json", document.file_name()));
        let bytes = serde_json::to_vec_pretty(&envelope).map_err(std::io::Error::other)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

impl Dispatcher for OutboxDispatcher {
    fn send(
        &self,
        document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> DispatchReceipt {
        match self.spool(document, recipient, metadata) {
            Ok(path) => DispatchReceipt::sent(path.display().to_string()),
            Err(err) => {
                warn!(error = %err, "failed to spool submission");
                DispatchReceipt::failed(err.to_string())
            }
        }
    }
}

/// Records staff alerts in the log; an SMS gateway can replace it behind the same trait.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogAlertChannel;

impl LogAlertChannel {
    pub(crate) fn message(metadata: &DispatchMetadata) -> String {
        format!(
            "FormFlux Alert: New submission from {}.",
            metadata.client_name
        )
    }
}

impl AlertChannel for LogAlertChannel {
    fn send(
        &self,
        document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> DispatchReceipt {
        let message = Self::message(metadata);
        info!(to = %recipient, document = %document.file_name(), "{message}");
        DispatchReceipt::sent(message)
    }
}

pub(crate) fn load_catalog(config: &IntakeConfig) -> Result<FormCatalog, AppError> {
    match &config.catalog_path {
        Some(path) => {
            let catalog = FormCatalog::from_path(path)?;
            info!(path = %path.display(), forms = catalog.len(), "loaded form catalog");
            Ok(catalog)
        }
        None => Ok(FormCatalog::standard()),
    }
}

pub(crate) fn phraser(config: &IntakeConfig) -> Arc<dyn QuestionPhraser> {
    match &config.phraser.api_key {
        Some(key) => Arc::new(OpenAiPhraser::new(key.clone(), config.phraser.timeout)),
        None => Arc::new(PlainPhraser),
    }
}

pub(crate) fn ensure_dir(path: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(path)?;
    Ok(())
}
