use crate::cli::ServeArgs;
use crate::infra::{
    ensure_dir, load_catalog, phraser, AppState, InMemorySessionRepository, LogAlertChannel,
    OutboxDispatcher,
};
use crate::routes::with_portal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use formflux::config::AppConfig;
use formflux::error::AppError;
use formflux::telemetry;
use formflux::workflows::documents::DocumentCompiler;
use formflux::workflows::intake::{AccessCodeList, IntakeService};
use formflux::workflows::ledger::{BugLedger, SubmissionLedger};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let intake = &config.intake;
    let catalog = Arc::new(load_catalog(intake)?);
    ensure_dir(&intake.output_dir)?;
    if intake.access_codes.is_empty() {
        warn!("FORMFLUX_ACCESS_CODES is empty; every access code will be rejected");
    }
    if intake.phraser.api_key.is_none() {
        info!("no phrasing API key configured, questions use plain descriptions");
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let submissions = Arc::new(SubmissionLedger::new(&intake.submission_log));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        admin_pass: Arc::from(intake.admin_pass.as_str()),
        submissions: Arc::clone(&submissions),
        bugs: Arc::new(BugLedger::new(&intake.bug_log)),
    };

    let service = IntakeService::new(
        catalog,
        DocumentCompiler::new(intake.compiler_config()),
        Arc::new(InMemorySessionRepository::default()),
        Arc::new(OutboxDispatcher::new(&intake.outbox_dir)),
        Arc::new(LogAlertChannel),
        submissions,
        intake.settings(),
    )
    .with_authenticator(Arc::new(AccessCodeList::new(intake.access_codes.clone())))
    .with_phraser(phraser(intake));

    let app = with_portal_routes(Arc::new(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "formflux intake portal ready");

    axum::serve(listener, app).await?;
    Ok(())
}
