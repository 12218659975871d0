use crate::infra::{load_catalog, InMemorySessionRepository, LogAlertChannel, OutboxDispatcher};
use clap::Args;
use formflux::config::AppConfig;
use formflux::error::AppError;
use formflux::workflows::documents::{CompilerConfig, DocumentCompiler};
use formflux::workflows::intake::{
    Credential, FieldDefinition, FieldKind, IntakeService, ReviewDecision, SessionRequest,
    SubmissionReport,
};
use formflux::workflows::ledger::SubmissionLedger;
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_SELFIE: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];
const DEMO_ID_SCAN: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
const DEMO_SIGNATURE: &[u8] = DEMO_ID_SCAN;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Forms to queue, in order. Defaults to the visa intake and retainer.
    #[arg(long = "form")]
    pub(crate) forms: Vec<String>,
    /// Directory for compiled documents, the outbox and the demo submission log.
    #[arg(long, default_value = "demo-output")]
    pub(crate) output_dir: PathBuf,
    /// Client name typed into every name field.
    #[arg(long, default_value = "Jane Doe")]
    pub(crate) client: String,
    /// Language the questions are phrased in.
    #[arg(long)]
    pub(crate) language: Option<String>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        forms,
        output_dir,
        client,
        language,
    } = args;

    let config = AppConfig::load()?;
    let catalog = Arc::new(load_catalog(&config.intake)?);
    let forms = if forms.is_empty() {
        vec![
            "Visa Intake (Standard)".to_string(),
            "Retainer Agreement".to_string(),
        ]
    } else {
        forms
    };

    let compiler = DocumentCompiler::new(CompilerConfig {
        template_dir: config.intake.template_dir.clone(),
        output_dir: output_dir.join("documents"),
    });
    let ledger = Arc::new(SubmissionLedger::new(output_dir.join("submission_log.csv")));
    let service = IntakeService::new(
        catalog,
        compiler,
        Arc::new(InMemorySessionRepository::default()),
        Arc::new(OutboxDispatcher::new(output_dir.join("outbox"))),
        Arc::new(LogAlertChannel),
        Arc::clone(&ledger),
        config.intake.settings(),
    );

    println!("FormFlux intake demo");
    let view = service.open(SessionRequest {
        credential: Credential::PreAuthenticated,
        forms,
        language,
    })?;
    let id = view.session_id.clone();
    println!(
        "- session {} | {} form(s) queued | language {}",
        id.0,
        view.form_queue.len(),
        view.language
    );
    for (position, name) in view.form_queue.iter().enumerate() {
        println!("  {}. {}", position + 1, name);
    }

    let mut view = service.start(&id)?;
    println!("\nQuestions");
    while let Some(question) = view.question.take() {
        let answer = sample_answer(&question.prompt.field, &client);
        println!(
            "- [{} {}/{}] {} -> {}",
            question.prompt.form_name,
            question.prompt.field_position + 1,
            question.prompt.field_count,
            question.text,
            answer
        );
        view = service.answer(&id, &answer)?;
    }

    let view = service.biometrics(&id, DEMO_SELFIE.to_vec(), DEMO_ID_SCAN.to_vec())?;
    println!("\nReview ({} answers)", view.review.len());
    for entry in &view.review {
        println!(
            "- {} / {}: {}",
            entry.form_name,
            entry.key,
            entry.answer.as_deref().unwrap_or("(skipped)")
        );
    }

    service.review(&id, ReviewDecision::Confirm)?;
    let report = service.submit(&id, DEMO_SIGNATURE.to_vec())?;
    render_report(&report);

    println!("\nSubmission log: {}", ledger.path().display());
    Ok(())
}

fn sample_answer(field: &FieldDefinition, client: &str) -> String {
    match &field.kind {
        FieldKind::Checkbox => "Yes".to_string(),
        FieldKind::Radio { options } => options.first().cloned().unwrap_or_default(),
        FieldKind::Text if field.key.to_ascii_lowercase().contains("name") => client.to_string(),
        FieldKind::Text => format!("Sample {}", field.description.to_ascii_lowercase()),
    }
}

fn render_report(report: &SubmissionReport) {
    println!("\nDelivery for {}", report.client_name);
    for delivery in &report.deliveries {
        let status = if delivery.receipt.success {
            "sent"
        } else {
            "FAILED"
        };
        println!(
            "- {} -> {} [{}] {}",
            delivery.file_name, delivery.recipient, status, delivery.receipt.detail
        );
    }
    if report.complete {
        println!("All documents delivered; session closed.");
    } else {
        println!(
            "{} document(s) still pending; retry from the portal.",
            report.failures()
        );
    }
}
