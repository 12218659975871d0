use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use formflux::workflows::documents::{CompilerConfig, DocumentCompiler, OutputArtifact};
use formflux::workflows::intake::{
    AccessCodeList, AlertChannel, Credential, DispatchMetadata, DispatchReceipt, Dispatcher,
    FormCatalog, IntakeService, IntakeSettings, IntakeStage, RepositoryError, ReviewDecision,
    SessionId, SessionRepository, SessionRequest, IntakeSession,
};
use formflux::workflows::ledger::{SubmissionLedger, SubmissionLog, SubmissionStatus};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 7];

#[derive(Default)]
struct Sessions(Mutex<HashMap<SessionId, IntakeSession>>);

impl SessionRepository for Sessions {
    fn insert(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError> {
        self.0.lock().unwrap().insert(id.clone(), session);
        Ok(())
    }

    fn update(&self, id: &SessionId, session: IntakeSession) -> Result<(), RepositoryError> {
        self.insert(id, session)
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<IntakeSession>, RepositoryError> {
        Ok(self.0.lock().unwrap().get(id).cloned())
    }

    fn remove(&self, id: &SessionId) -> Result<(), RepositoryError> {
        self.0.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Copies each artifact into a mailbox directory, like an outbox relay would.
struct MailboxDispatcher {
    mailbox: std::path::PathBuf,
}

impl Dispatcher for MailboxDispatcher {
    fn send(
        &self,
        document: &OutputArtifact,
        recipient: &str,
        metadata: &DispatchMetadata,
    ) -> DispatchReceipt {
        let target = self.mailbox.join(recipient).join(document.file_name());
        let copied = std::fs::create_dir_all(target.parent().unwrap())
            .and_then(|_| std::fs::copy(&document.path, &target));
        match copied {
            Ok(_) => DispatchReceipt::sent(format!("delivered for {}", metadata.client_name)),
            Err(err) => DispatchReceipt::failed(err.to_string()),
        }
    }
}

#[derive(Default)]
struct SilentAlerts(Mutex<usize>);

impl AlertChannel for SilentAlerts {
    fn send(&self, _: &OutputArtifact, _: &str, _: &DispatchMetadata) -> DispatchReceipt {
        *self.0.lock().unwrap() += 1;
        DispatchReceipt::sent("ok")
    }
}

#[test]
fn client_completes_two_forms_and_both_reach_the_mailbox() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = Arc::new(SubmissionLedger::new(dir.path().join("submission_log.csv")));
    let alerts = Arc::new(SilentAlerts::default());
    let service = IntakeService::new(
        Arc::new(FormCatalog::standard()),
        DocumentCompiler::new(CompilerConfig {
            template_dir: dir.path().join("templates"),
            output_dir: dir.path().join("output"),
        }),
        Arc::new(Sessions::default()),
        Arc::new(MailboxDispatcher {
            mailbox: dir.path().join("mailbox"),
        }),
        Arc::clone(&alerts),
        Arc::clone(&ledger),
        IntakeSettings {
            alert_recipient: Some("+15555550100".to_string()),
            ..IntakeSettings::default()
        },
    )
    .with_authenticator(Arc::new(AccessCodeList::new(["WHITE-LEGAL"])));

    let id = service
        .open(SessionRequest {
            credential: Credential::AccessCode("WHITE-LEGAL".to_string()),
            forms: vec![
                "Visa Intake (Standard)".to_string(),
                "Retainer Agreement".to_string(),
            ],
            language: None,
        })
        .expect("session opens")
        .session_id;

    service.start(&id).expect("start");
    let mut asked = Vec::new();
    for answer in ["Jane", "yes", "Green card renewal", "contingency", "y"] {
        let view = service.view(&id).expect("view");
        asked.push(view.question.expect("question pending").prompt.field.key);
        service.answer(&id, answer).expect("answer");
    }
    assert_eq!(
        asked,
        vec![
            "txt_FirstName",
            "chk_Citizen",
            "txt_Story",
            "rad_FeeArrangement",
            "chk_Consent"
        ]
    );

    let view = service.back(&id).expect("back");
    assert_eq!(view.stage, IntakeStage::Question { field: 2 });
    service.answer(&id, "y").expect("re-answer");

    service
        .biometrics(&id, PNG.to_vec(), PNG.to_vec())
        .expect("biometrics");
    let view = service
        .review(&id, ReviewDecision::Confirm)
        .expect("confirm");
    assert_eq!(view.review.len(), 6);

    let report = service.submit(&id, PNG.to_vec()).expect("submitted");
    assert!(report.complete);
    assert_eq!(report.client_name, "Jane");

    let delivered: Vec<_> = std::fs::read_dir(dir.path().join("mailbox/intake@formflux.example"))
        .expect("mailbox exists")
        .filter_map(Result::ok)
        .collect();
    assert_eq!(delivered.len(), 2);
    assert_eq!(*alerts.0.lock().unwrap(), 2);

    let entries = ledger.entries().expect("ledger readable");
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|entry| entry.status == SubmissionStatus::Success));
    assert_eq!(entries[1].form_type, "Retainer Agreement");
}
