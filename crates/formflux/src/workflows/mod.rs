pub mod documents;
pub mod intake;
pub mod ledger;
pub mod phrasing;

pub use documents::{CompileError, CompilerConfig, DocumentCompiler, OutputArtifact};
pub use intake::{intake_router, FormCatalog, IntakeService, IntakeSession};
pub use ledger::{BugLedger, BugReport, BugSeverity, SubmissionLedger, SubmissionLog};
pub use phrasing::{OpenAiPhraser, PlainPhraser};
