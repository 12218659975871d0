use super::common::*;

use crate::workflows::intake::domain::{ArtifactKind, SharedFieldPolicy, ValidationError};
use crate::workflows::intake::gateways::AccessCodeList;
use crate::workflows::intake::session::{IntakeError, IntakeSession, IntakeStage, SessionOptions};
use crate::workflows::intake::CatalogError;

#[test]
fn empty_queue_defaults_to_first_catalog_form() {
    let session = IntakeSession::new(standard_catalog(), SessionOptions::default()).unwrap();
    assert_eq!(session.form_queue(), [VISA.to_string()]);
    assert_eq!(session.stage(), IntakeStage::Welcome);
    assert_eq!(session.language(), "English");
    assert!(!session.is_authenticated());
}

#[test]
fn unknown_forms_are_rejected_at_construction() {
    let err = IntakeSession::new(
        standard_catalog(),
        SessionOptions {
            form_queue: vec!["Divorce Filing".to_string()],
            ..SessionOptions::default()
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        IntakeError::Catalog(CatalogError::FormNotFound(name)) if name == "Divorce Filing"
    ));
}

#[test]
fn operations_require_authentication() {
    let mut session = IntakeSession::new(standard_catalog(), SessionOptions::default()).unwrap();
    assert!(matches!(session.start(), Err(IntakeError::Unauthenticated)));

    let gate = AccessCodeList::new([ACCESS_CODE]);
    assert!(matches!(
        session.authenticate(&gate, "WRONG"),
        Err(IntakeError::Unauthenticated)
    ));
    assert!(!session.is_authenticated());

    session.authenticate(&gate, ACCESS_CODE).unwrap();
    assert_eq!(session.start().unwrap(), IntakeStage::Question { field: 0 });
}

#[test]
fn single_form_takes_one_advance_per_field() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    session.start().unwrap();

    let mut steps = 0;
    for answer in ["Maria", "no", "Asylum claim"] {
        assert!(matches!(session.stage(), IntakeStage::Question { .. }));
        session.advance(answer).unwrap();
        steps += 1;
    }

    assert_eq!(steps, 3);
    assert_eq!(session.stage(), IntakeStage::Biometrics);
    assert_eq!(session.answers().get("chk_Citizen"), Some("No"));
    assert_eq!(session.answers().get("txt_Story"), Some("Asylum claim"));
}

#[test]
fn rejected_answers_leave_the_session_untouched() {
    let mut session = session_for(standard_catalog(), &[RETAINER], SharedFieldPolicy::Reuse);
    session.start().unwrap();
    session.advance("Maria").unwrap();
    let before = session.state().clone();

    let err = session.advance("Pro Bono").unwrap_err();
    assert!(matches!(
        err,
        IntakeError::Validation(ValidationError::UnknownOption { .. })
    ));
    assert_eq!(session.stage(), before.stage);
    assert_eq!(session.answers(), &before.answers);

    session.advance("hourly").unwrap();
    assert_eq!(session.answers().get("rad_FeeArrangement"), Some("Hourly"));

    let before = session.state().clone();
    assert!(session.advance("").is_err());
    assert!(session.advance("maybe").is_err());
    assert_eq!(session.stage(), before.stage);
    assert_eq!(session.answers(), &before.answers);
}

#[test]
fn empty_text_answer_is_rejected() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    session.start().unwrap();
    let err = session.advance("   ").unwrap_err();
    assert!(matches!(
        err,
        IntakeError::Validation(ValidationError::EmptyAnswer { field }) if field == "txt_FirstName"
    ));
    assert_eq!(session.stage(), IntakeStage::Question { field: 0 });
    assert!(session.answers().is_empty());
}

#[test]
fn retreat_clamps_at_first_field_and_keeps_answers_as_defaults() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    session.start().unwrap();
    assert_eq!(session.retreat().unwrap(), IntakeStage::Question { field: 0 });

    session.advance("Maria").unwrap();
    assert_eq!(session.retreat().unwrap(), IntakeStage::Question { field: 0 });
    let prompt = session.current_prompt().unwrap();
    assert_eq!(prompt.field.key, "txt_FirstName");
    assert_eq!(prompt.default.as_deref(), Some("Maria"));

    session.advance("Maria").unwrap();
    assert_eq!(session.stage(), IntakeStage::Question { field: 1 });
}

#[test]
fn retreat_from_biometrics_returns_to_last_question() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    answer_all(&mut session, &["Maria", "yes", "Work visa renewal"]);
    assert_eq!(session.stage(), IntakeStage::Biometrics);

    assert_eq!(session.retreat().unwrap(), IntakeStage::Question { field: 2 });
    assert_eq!(session.current_form_index(), 0);
    assert_eq!(
        session.current_prompt().unwrap().default.as_deref(),
        Some("Work visa renewal")
    );
}

#[test]
fn name_and_over18_flow_compiles_with_rendered_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(shared_catalog(), &["F"], SharedFieldPolicy::Reuse);
    session.start().unwrap();

    session.advance("Jane Doe").unwrap();
    assert_eq!(session.stage(), IntakeStage::Question { field: 1 });
    assert_eq!(session.answers().get("name"), Some("Jane Doe"));

    session.advance("Yes").unwrap();
    assert_eq!(session.stage(), IntakeStage::Biometrics);
    assert_eq!(session.answers().len(), 2);
    assert_eq!(session.answers().get("over18"), Some("Yes"));

    session
        .submit_biometrics(JPEG_BYTES.to_vec(), PNG_BYTES.to_vec())
        .unwrap();
    session.confirm_review().unwrap();
    let outputs = session
        .finalize(PNG_BYTES.to_vec(), &compiler(dir.path()))
        .unwrap();

    assert_eq!(outputs.len(), 1);
    assert_eq!(session.stage(), IntakeStage::Complete);
    let documents = outputs[0].documents().unwrap();
    assert_eq!(documents[0].value("name"), Some("Jane Doe"));
    assert_eq!(documents[0].template, "placeholder");
    assert_eq!(
        documents[0].exhibit.kinds(),
        vec![
            ArtifactKind::Signature,
            ArtifactKind::Selfie,
            ArtifactKind::GovernmentId
        ]
    );
}

#[test]
fn shared_keys_are_asked_once_when_reused() {
    let mut session = session_for(
        shared_catalog(),
        &["Intake", "Engagement"],
        SharedFieldPolicy::Reuse,
    );
    session.start().unwrap();

    session.advance("Jane Doe").unwrap();
    session.advance("Landlord dispute").unwrap();
    let prompt = session.current_prompt().unwrap();
    assert_eq!(prompt.form_name, "Engagement");
    assert_eq!(prompt.field.key, "fee");
    assert_eq!(prompt.form_position, 2);

    session.advance("Flat Fee").unwrap();
    assert_eq!(session.stage(), IntakeStage::Biometrics);
    assert_eq!(session.client_name(), "Jane Doe");
}

#[test]
fn shared_keys_are_prefilled_when_reprompted() {
    let mut session = session_for(
        shared_catalog(),
        &["Intake", "Engagement"],
        SharedFieldPolicy::Reprompt,
    );
    session.start().unwrap();
    session.advance("Jane Doe").unwrap();
    session.advance("Landlord dispute").unwrap();

    let prompt = session.current_prompt().unwrap();
    assert_eq!(prompt.form_name, "Engagement");
    assert_eq!(prompt.field.key, "client_name");
    assert_eq!(prompt.default.as_deref(), Some("Jane Doe"));

    session.advance("Jane Q. Doe").unwrap();
    session.advance("Hourly").unwrap();
    assert_eq!(session.stage(), IntakeStage::Biometrics);
    assert_eq!(session.answers().get("client_name"), Some("Jane Q. Doe"));
}

#[test]
fn retreat_crosses_back_into_previous_form() {
    let mut session = session_for(
        shared_catalog(),
        &["Intake", "Engagement"],
        SharedFieldPolicy::Reuse,
    );
    session.start().unwrap();
    session.advance("Jane Doe").unwrap();
    session.advance("Landlord dispute").unwrap();
    assert_eq!(session.current_form_index(), 1);

    assert_eq!(session.retreat().unwrap(), IntakeStage::Question { field: 1 });
    assert_eq!(session.current_form_index(), 0);
    assert_eq!(session.current_prompt().unwrap().field.key, "matter");
}

#[test]
fn biometrics_require_both_images() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    answer_all(&mut session, &["Maria", "yes", "Renewal"]);

    let err = session
        .submit_biometrics(Vec::new(), PNG_BYTES.to_vec())
        .unwrap_err();
    assert!(matches!(
        err,
        IntakeError::Validation(ValidationError::MissingArtifact(ArtifactKind::Selfie))
    ));
    let err = session
        .submit_biometrics(JPEG_BYTES.to_vec(), Vec::new())
        .unwrap_err();
    assert!(matches!(
        err,
        IntakeError::Validation(ValidationError::MissingArtifact(ArtifactKind::GovernmentId))
    ));
    assert_eq!(session.stage(), IntakeStage::Biometrics);
    assert!(session.artifacts().present().is_empty());
}

#[test]
fn stage_guards_reject_out_of_order_calls() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    assert!(matches!(
        session.advance("Maria"),
        Err(IntakeError::InvalidStage {
            operation: "advance",
            stage: IntakeStage::Welcome
        })
    ));
    assert!(session.confirm_review().is_err());
    assert!(session.edit().is_err());

    session.start().unwrap();
    assert!(matches!(
        session.start(),
        Err(IntakeError::InvalidStage { operation: "start", .. })
    ));
    assert!(session
        .submit_biometrics(PNG_BYTES.to_vec(), PNG_BYTES.to_vec())
        .is_err());
}

#[test]
fn edit_restarts_questions_with_previous_answers() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    answer_all(&mut session, &["Maria", "yes", "Renewal"]);
    session
        .submit_biometrics(JPEG_BYTES.to_vec(), PNG_BYTES.to_vec())
        .unwrap();
    assert_eq!(session.review_summary().len(), 3);
    session.confirm_review().unwrap();

    assert_eq!(session.edit().unwrap(), IntakeStage::Question { field: 0 });
    assert_eq!(
        session.current_prompt().unwrap().default.as_deref(),
        Some("Maria")
    );
    assert_eq!(session.answers().len(), 3);
    assert!(session.artifacts().has(ArtifactKind::Selfie));
}

#[test]
fn failed_finalize_keeps_signature_stage() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("templates")).unwrap();
    std::fs::write(dir.path().join("templates/retainer.json"), "{ not json").unwrap();

    let mut session = session_for(
        standard_catalog(),
        &[VISA, RETAINER],
        SharedFieldPolicy::Reuse,
    );
    answer_all(&mut session, &["Maria", "yes", "Renewal", "Hourly", "yes"]);
    session
        .submit_biometrics(JPEG_BYTES.to_vec(), PNG_BYTES.to_vec())
        .unwrap();
    session.confirm_review().unwrap();

    let err = session
        .finalize(PNG_BYTES.to_vec(), &compiler(dir.path()))
        .unwrap_err();
    assert!(matches!(err, IntakeError::Compile(_)));
    assert_eq!(session.stage(), IntakeStage::Signature);
    assert!(session.outputs().is_empty());
    assert!(!session.artifacts().has(ArtifactKind::Signature));
    assert!(output_files(dir.path()).is_empty());
}

#[test]
fn finalize_rejects_empty_signature() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    answer_all(&mut session, &["Maria", "yes", "Renewal"]);
    session
        .submit_biometrics(JPEG_BYTES.to_vec(), PNG_BYTES.to_vec())
        .unwrap();
    session.confirm_review().unwrap();

    let err = session
        .finalize(Vec::new(), &compiler(dir.path()))
        .unwrap_err();
    assert!(matches!(
        err,
        IntakeError::Validation(ValidationError::MissingArtifact(ArtifactKind::Signature))
    ));
    assert_eq!(session.stage(), IntakeStage::Signature);
}

#[test]
fn reset_clears_collected_data() {
    let mut session = session_for(standard_catalog(), &[VISA], SharedFieldPolicy::Reuse);
    answer_all(&mut session, &["Maria", "yes", "Renewal"]);
    session
        .submit_biometrics(JPEG_BYTES.to_vec(), PNG_BYTES.to_vec())
        .unwrap();

    session.reset();
    assert_eq!(session.stage(), IntakeStage::Welcome);
    assert!(session.answers().is_empty());
    assert!(session.artifacts().present().is_empty());
    assert_eq!(session.current_form_index(), 0);
    assert!(session.is_authenticated());
}

#[test]
fn client_name_falls_back_when_no_name_field_is_answered() {
    let mut session = session_for(shared_catalog(), &["Engagement"], SharedFieldPolicy::Reuse);
    assert_eq!(session.client_name(), "Client");
    session.start().unwrap();
    session.advance("Ada Lovelace").unwrap();
    assert_eq!(session.client_name(), "Ada Lovelace");
}
