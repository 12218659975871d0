use crate::demo::{run_demo, DemoArgs};
use crate::infra::load_catalog;
use crate::server;
use clap::{Args, Parser, Subcommand};
use formflux::config::AppConfig;
use formflux::error::AppError;
use formflux::workflows::ledger::{SubmissionLedger, SubmissionLog};

#[derive(Parser, Debug)]
#[command(
    name = "FormFlux",
    about = "Run the FormFlux client intake portal and inspect its records",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// List the forms in the configured catalog
    Forms,
    /// Print the submission log (admin view)
    Submissions,
    /// Walk a scripted client through the intake wizard end to end
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Forms => list_forms(),
        Command::Submissions => list_submissions(),
        Command::Demo(args) => run_demo(args),
    }
}

fn list_forms() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let catalog = load_catalog(&config.intake)?;

    println!("{} form(s) available", catalog.len());
    for form in catalog.forms() {
        let layout = if form.is_bundle() { "bundle" } else { "single" };
        println!("- {} ({} fields, {layout})", form.name, form.fields.len());
        if !form.description.is_empty() {
            println!("  {}", form.description);
        }
    }
    Ok(())
}

fn list_submissions() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let ledger = SubmissionLedger::new(&config.intake.submission_log);
    let entries = ledger.entries()?;

    if entries.is_empty() {
        println!("No submissions recorded in {}", ledger.path().display());
        return Ok(());
    }
    println!("{:<8}  {:<20}  {:<24}  {:<28}  Status", "ID", "Time", "Client", "Type");
    for entry in entries {
        println!(
            "{:<8}  {:<20}  {:<24}  {:<28}  {}",
            entry.id,
            entry.time.format("%Y-%m-%d %H:%M:%S"),
            entry.client,
            entry.form_type,
            entry.status.label()
        );
    }
    Ok(())
}
