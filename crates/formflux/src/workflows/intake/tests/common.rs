use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::workflows::documents::{CompilerConfig, DocumentCompiler, OutputArtifact};
use crate::workflows::intake::domain::{FieldDefinition, FormDefinition, SharedFieldPolicy};
use crate::workflows::intake::gateways::{
    AccessCodeList, AlertChannel, DispatchMetadata, DispatchReceipt, Dispatcher, RepositoryError,
    SessionId, SessionRepository,
};
use crate::workflows::intake::service::{IntakeService, IntakeSettings};
use crate::workflows::intake::session::{IntakeSession, SessionOptions};
use crate::workflows::intake::FormCatalog;
use crate::workflows::ledger::{LedgerError, SubmissionLog, SubmissionRecord};

pub(super) const ACCESS_CODE: &str = "FLUX-DEMO";
pub(super) const VISA: &str = "Visa Intake (Standard)";
pub(super) const RETAINER: &str = "Retainer Agreement";
pub(super) const PACKET: &str = "New Client Packet";

pub(super) const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
pub(super) const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

pub(super) fn standard_catalog() -> Arc<FormCatalog> {
    Arc::new(FormCatalog::standard())
}

/// Two forms sharing `client_name`, plus the single-form `F` used for the name/over18 flow.
pub(super) fn shared_catalog() -> Arc<FormCatalog> {
    Arc::new(
        FormCatalog::from_forms(vec![
            FormDefinition {
                name: "F".to_string(),
                description: String::new(),
                fields: vec![
                    FieldDefinition::text("name", "Full name"),
                    FieldDefinition::checkbox("over18", "Are you over 18?"),
                ],
                template: None,
                recipient: "f@formflux.example".to_string(),
            },
            FormDefinition {
                name: "Intake".to_string(),
                description: String::new(),
                fields: vec![
                    FieldDefinition::text("client_name", "Client name"),
                    FieldDefinition::text("matter", "Describe the matter"),
                ],
                template: None,
                recipient: "intake@formflux.example".to_string(),
            },
            FormDefinition {
                name: "Engagement".to_string(),
                description: String::new(),
                fields: vec![
                    FieldDefinition::text("client_name", "Client name"),
                    FieldDefinition::radio("fee", "Fee arrangement", &["Flat Fee", "Hourly"]),
                ],
                template: None,
                recipient: "billing@formflux.example".to_string(),
            },
        ])
        .expect("fixture catalog is valid"),
    )
}

pub(super) fn session_for(
    catalog: Arc<FormCatalog>,
    forms: &[&str],
    policy: SharedFieldPolicy,
) -> IntakeSession {
    IntakeSession::new(
        catalog,
        SessionOptions {
            form_queue: forms.iter().map(|name| name.to_string()).collect(),
            authenticated: true,
            shared_fields: policy,
            ..SessionOptions::default()
        },
    )
    .expect("session builds")
}

pub(super) fn compiler(root: &Path) -> DocumentCompiler {
    DocumentCompiler::new(CompilerConfig {
        template_dir: root.join("templates"),
        output_dir: root.join("output"),
    })
}

/// Answer every question with `answers` in order and land on the biometrics stage.
pub(super) fn answer_all(session: &mut IntakeSession, answers: &[&str]) {
    session.start().expect("start");
    for answer in answers {
        session.advance(answer).expect("answer accepted");
    }
}

pub(super) fn output_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root.join("output"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[derive(Default)]
pub(super) struct MemorySessions {
    sessions: Mutex<HashMap<SessionId, IntakeSession>>,
    failing_updates: AtomicBool,
}

impl MemorySessions {
    pub(super) fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub(super) fn set_failing_updates(&self, failing: bool) {
        self.failing_updates.store(failing, Ordering::SeqCst);
    }
}

impl SessionRepository for MemorySessions {
    fn insert(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError> {
        let mut guard = self.sessions.lock().unwrap();
        if guard.contains_key(id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(id.clone(), session);
        Ok(())
    }

    fn update(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError> {
        if self.failing_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        let mut guard = self.sessions.lock().unwrap();
        match guard.get_mut(id) {
            Some(slot) => {
                *slot = session;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<IntakeSession>, RepositoryError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    fn remove(&self, id: &SessionId) -> Result<(), RepositoryError> {
        self.sessions
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SentDocument {
    pub(super) file_name: String,
    pub(super) recipient: String,
    pub(super) metadata: DispatchMetadata,
}

/// Dispatcher that records sends and can be switched into a failing mode.
#[derive(Default)]
pub(super) struct RecordingDispatcher {
    pub(super) sent: Mutex<Vec<SentDocument>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl RecordingDispatcher {
    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every send open for `delay`, like a slow mail relay.
    pub(super) fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(super) fn sent(&self) -> Vec<SentDocument> {
        self.sent.lock().unwrap().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn send(
        &self,
        document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> DispatchReceipt {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.failing.load(Ordering::SeqCst) {
            return DispatchReceipt::failed("relay refused connection");
        }
        self.sent.lock().unwrap().push(SentDocument {
            file_name: document.file_name(),
            recipient: recipient.to_string(),
            metadata: metadata.clone(),
        });
        DispatchReceipt::sent("queued")
    }
}

#[derive(Default)]
pub(super) struct RecordingAlerts {
    pub(super) alerts: Mutex<Vec<(String, String)>>,
}

impl AlertChannel for RecordingAlerts {
    fn send(
        &self,
        _document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> DispatchReceipt {
        self.alerts
            .lock()
            .unwrap()
            .push((recipient.to_string(), metadata.client_name.clone()));
        DispatchReceipt::sent("sms queued")
    }
}

#[derive(Default)]
pub(super) struct MemoryLog {
    pub(super) entries: Mutex<Vec<SubmissionRecord>>,
}

impl SubmissionLog for MemoryLog {
    fn record(&self, entry: SubmissionRecord) -> Result<(), LedgerError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<SubmissionRecord>, LedgerError> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

pub(super) type TestService =
    IntakeService<MemorySessions, RecordingDispatcher, RecordingAlerts, MemoryLog>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) sessions: Arc<MemorySessions>,
    pub(super) dispatcher: Arc<RecordingDispatcher>,
    pub(super) alerts: Arc<RecordingAlerts>,
    pub(super) log: Arc<MemoryLog>,
}

pub(super) fn harness(root: &Path, catalog: Arc<FormCatalog>, settings: IntakeSettings) -> Harness {
    let sessions = Arc::new(MemorySessions::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let alerts = Arc::new(RecordingAlerts::default());
    let log = Arc::new(MemoryLog::default());

    let service = IntakeService::new(
        catalog,
        compiler(root),
        Arc::clone(&sessions),
        Arc::clone(&dispatcher),
        Arc::clone(&alerts),
        Arc::clone(&log),
        settings,
    )
    .with_authenticator(Arc::new(AccessCodeList::new([ACCESS_CODE])));

    Harness {
        service: Arc::new(service),
        sessions,
        dispatcher,
        alerts,
        log,
    }
}
