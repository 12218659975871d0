//! Intake state machine for one client working through a queue of forms.
//!
//! Multi-form queues use the batched flow: every queued form's questions are asked back to
//! back, followed by one shared biometrics, review, and signature step that covers the
//! whole queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::catalog::{CatalogError, FormCatalog};
use super::domain::{
    AnswerMap, ArtifactKind, FieldDefinition, FormDefinition, IdentityArtifacts,
    SharedFieldPolicy, ValidationError,
};
use super::gateways::Authenticator;
use crate::workflows::documents::{CompileError, DocumentCompiler, OutputArtifact};

pub const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum IntakeStage {
    Welcome,
    Question { field: usize },
    Biometrics,
    Review,
    Signature,
    Complete,
}

impl IntakeStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Welcome => "Welcome",
            Self::Question { .. } => "Question",
            Self::Biometrics => "Identity Verification",
            Self::Review => "Review",
            Self::Signature => "Signature",
            Self::Complete => "Complete",
        }
    }
}

/// Constructor inputs. A magic-link front end supplies a pre-selected queue and marks the
/// session as already authenticated.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub form_queue: Vec<String>,
    pub authenticated: bool,
    pub language: String,
    pub shared_fields: SharedFieldPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            form_queue: Vec::new(),
            authenticated: false,
            language: DEFAULT_LANGUAGE.to_string(),
            shared_fields: SharedFieldPolicy::default(),
        }
    }
}

/// Everything that changes while a client works through the wizard.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub form_queue: Vec<String>,
    pub current_form_index: usize,
    pub stage: IntakeStage,
    pub answers: AnswerMap,
    pub artifacts: IdentityArtifacts,
    pub authenticated: bool,
    pub language: String,
    pub outputs: Vec<SubmissionOutput>,
}

/// A compiled output and whether it has reached its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutput {
    pub artifact: OutputArtifact,
    pub delivered: bool,
}

/// The field currently being asked, with any earlier answer as its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPrompt {
    pub form_name: String,
    pub form_position: usize,
    pub form_count: usize,
    pub field: FieldDefinition,
    pub field_position: usize,
    pub field_count: usize,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewEntry {
    pub form_name: String,
    pub key: String,
    pub description: String,
    pub answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntakeSession {
    catalog: Arc<FormCatalog>,
    shared_fields: SharedFieldPolicy,
    state: SessionState,
}

impl IntakeSession {
    /// An empty queue defaults to the first catalog form.
    pub fn new(catalog: Arc<FormCatalog>, options: SessionOptions) -> Result<Self, IntakeError> {
        let SessionOptions {
            mut form_queue,
            authenticated,
            language,
            shared_fields,
        } = options;

        if form_queue.is_empty() {
            let first = catalog
                .list_names()
                .first()
                .map(|name| name.to_string())
                .ok_or(IntakeError::EmptyQueue)?;
            form_queue.push(first);
        }
        for name in &form_queue {
            catalog.get(name)?;
        }

        let language = if language.trim().is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            language
        };

        Ok(Self {
            catalog,
            shared_fields,
            state: SessionState {
                form_queue,
                current_form_index: 0,
                stage: IntakeStage::Welcome,
                answers: AnswerMap::new(),
                artifacts: IdentityArtifacts::default(),
                authenticated,
                language,
                outputs: Vec::new(),
            },
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stage(&self) -> IntakeStage {
        self.state.stage
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.state.answers
    }

    pub fn artifacts(&self) -> &IdentityArtifacts {
        &self.state.artifacts
    }

    pub fn form_queue(&self) -> &[String] {
        &self.state.form_queue
    }

    pub fn current_form_index(&self) -> usize {
        self.state.current_form_index
    }

    pub fn language(&self) -> &str {
        &self.state.language
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.authenticated
    }

    pub fn shared_fields(&self) -> SharedFieldPolicy {
        self.shared_fields
    }

    pub fn outputs(&self) -> &[SubmissionOutput] {
        &self.state.outputs
    }

    pub fn is_complete(&self) -> bool {
        self.state.stage == IntakeStage::Complete
    }

    pub fn catalog(&self) -> &FormCatalog {
        &self.catalog
    }

    pub fn authenticate(
        &mut self,
        authenticator: &dyn Authenticator,
        code: &str,
    ) -> Result<(), IntakeError> {
        if authenticator.check(code) {
            self.state.authenticated = true;
            Ok(())
        } else {
            Err(IntakeError::Unauthenticated)
        }
    }

    pub fn set_language(&mut self, language: &str) {
        if !language.trim().is_empty() {
            self.state.language = language.trim().to_string();
        }
    }

    /// Leave the welcome screen for the first question.
    pub fn start(&mut self) -> Result<IntakeStage, IntakeError> {
        self.require_authenticated()?;
        self.require_stage("start", |stage| stage == IntakeStage::Welcome)?;
        self.enter_first_question()?;
        Ok(self.state.stage)
    }

    /// Record an answer for the current field and move to the next asked field.
    pub fn advance(&mut self, answer: &str) -> Result<IntakeStage, IntakeError> {
        self.require_authenticated()?;
        let field_index = match self.state.stage {
            IntakeStage::Question { field } => field,
            stage => {
                return Err(IntakeError::InvalidStage {
                    operation: "advance",
                    stage,
                })
            }
        };

        let form_index = self.state.current_form_index;
        let (key, value) = {
            let form = self.form_at(form_index)?;
            let field = &form.fields[field_index];
            let value = field.kind.normalize(&field.key, answer)?;
            (field.key.clone(), value)
        };

        debug!(form_index, field = %key, "answer recorded");
        self.state.answers.insert(key, value);
        let next = self.next_position(form_index, field_index + 1)?;
        self.move_to(next);
        Ok(self.state.stage)
    }

    /// Step back one asked field. Answers stay recorded and reappear as defaults.
    pub fn retreat(&mut self) -> Result<IntakeStage, IntakeError> {
        self.require_authenticated()?;
        let previous = match self.state.stage {
            IntakeStage::Question { field } => {
                self.previous_position(self.state.current_form_index, field)?
            }
            IntakeStage::Biometrics => self.previous_position(self.state.form_queue.len(), 0)?,
            stage => {
                return Err(IntakeError::InvalidStage {
                    operation: "retreat",
                    stage,
                })
            }
        };

        if let Some((form_index, field)) = previous {
            self.state.current_form_index = form_index;
            self.state.stage = IntakeStage::Question { field };
        }
        Ok(self.state.stage)
    }

    pub fn submit_biometrics(
        &mut self,
        selfie: Vec<u8>,
        government_id: Vec<u8>,
    ) -> Result<IntakeStage, IntakeError> {
        self.require_authenticated()?;
        self.require_stage("submit_biometrics", |stage| {
            stage == IntakeStage::Biometrics
        })?;
        if selfie.is_empty() {
            return Err(ValidationError::MissingArtifact(ArtifactKind::Selfie).into());
        }
        if government_id.is_empty() {
            return Err(ValidationError::MissingArtifact(ArtifactKind::GovernmentId).into());
        }

        self.state.artifacts.set(ArtifactKind::Selfie, selfie);
        self.state
            .artifacts
            .set(ArtifactKind::GovernmentId, government_id);
        self.state.stage = IntakeStage::Review;
        Ok(self.state.stage)
    }

    pub fn confirm_review(&mut self) -> Result<IntakeStage, IntakeError> {
        self.require_authenticated()?;
        self.require_stage("confirm_review", |stage| stage == IntakeStage::Review)?;
        self.state.stage = IntakeStage::Signature;
        Ok(self.state.stage)
    }

    /// Restart question entry from the first form. Recorded answers become defaults.
    pub fn edit(&mut self) -> Result<IntakeStage, IntakeError> {
        self.require_authenticated()?;
        self.require_stage("edit", |stage| {
            matches!(stage, IntakeStage::Review | IntakeStage::Signature)
        })?;
        self.enter_first_question()?;
        Ok(self.state.stage)
    }

    /// Compile every queued form with the shared answers and artifacts. Nothing changes on
    /// failure, so the client can retry from the signature step.
    pub fn finalize(
        &mut self,
        signature: Vec<u8>,
        compiler: &DocumentCompiler,
    ) -> Result<Vec<OutputArtifact>, IntakeError> {
        self.require_authenticated()?;
        self.require_stage("finalize", |stage| stage == IntakeStage::Signature)?;
        if signature.is_empty() {
            return Err(ValidationError::MissingArtifact(ArtifactKind::Signature).into());
        }
        for kind in [ArtifactKind::Selfie, ArtifactKind::GovernmentId] {
            if !self.state.artifacts.has(kind) {
                return Err(ValidationError::MissingArtifact(kind).into());
            }
        }

        let mut artifacts = self.state.artifacts.clone();
        artifacts.set(ArtifactKind::Signature, signature);

        let forms = self.queued_forms()?;
        let outputs = compiler.compile_queue(&forms, &self.state.answers, &artifacts)?;

        info!(
            forms = outputs.len(),
            answers = self.state.answers.len(),
            "intake session finalized"
        );
        self.state.artifacts = artifacts;
        self.state.outputs = outputs
            .iter()
            .cloned()
            .map(|artifact| SubmissionOutput {
                artifact,
                delivered: false,
            })
            .collect();
        self.state.stage = IntakeStage::Complete;
        Ok(outputs)
    }

    pub(crate) fn mark_delivered(&mut self, index: usize) {
        if let Some(output) = self.state.outputs.get_mut(index) {
            output.delivered = true;
        }
    }

    /// Abandon everything collected so far and return to the welcome screen.
    pub fn reset(&mut self) {
        self.state.current_form_index = 0;
        self.state.stage = IntakeStage::Welcome;
        self.state.answers = AnswerMap::new();
        self.state.artifacts = IdentityArtifacts::default();
        self.state.outputs.clear();
    }

    pub fn current_form(&self) -> Option<&FormDefinition> {
        self.state
            .form_queue
            .get(self.state.current_form_index)
            .and_then(|name| self.catalog.get(name).ok())
    }

    pub fn current_prompt(&self) -> Option<FieldPrompt> {
        let IntakeStage::Question { field } = self.state.stage else {
            return None;
        };
        let form = self.current_form()?;
        let definition = form.fields.get(field)?;

        Some(FieldPrompt {
            form_name: form.name.clone(),
            form_position: self.state.current_form_index + 1,
            form_count: self.state.form_queue.len(),
            field: definition.clone(),
            field_position: field + 1,
            field_count: form.fields.len(),
            default: self
                .state
                .answers
                .get(&definition.key)
                .map(str::to_string),
        })
    }

    /// Every field of every queued form with its recorded answer, in interview order.
    pub fn review_summary(&self) -> Vec<ReviewEntry> {
        self.state
            .form_queue
            .iter()
            .filter_map(|name| self.catalog.get(name).ok())
            .flat_map(|form| {
                form.fields.iter().map(|field| ReviewEntry {
                    form_name: form.name.clone(),
                    key: field.key.clone(),
                    description: field.description.clone(),
                    answer: self.state.answers.get(&field.key).map(str::to_string),
                })
            })
            .collect()
    }

    /// Answer for the first queued field whose key mentions a name, else `"Client"`.
    pub fn client_name(&self) -> String {
        self.state
            .form_queue
            .iter()
            .filter_map(|name| self.catalog.get(name).ok())
            .flat_map(|form| form.fields.iter())
            .filter(|field| field.key.to_ascii_lowercase().contains("name"))
            .find_map(|field| self.state.answers.get(&field.key))
            .unwrap_or("Client")
            .to_string()
    }

    pub(crate) fn queued_forms(&self) -> Result<Vec<&FormDefinition>, IntakeError> {
        self.state
            .form_queue
            .iter()
            .map(|name| self.catalog.get(name).map_err(IntakeError::from))
            .collect()
    }

    fn form_at(&self, index: usize) -> Result<&FormDefinition, IntakeError> {
        let name = self
            .state
            .form_queue
            .get(index)
            .ok_or(IntakeError::InvalidStage {
                operation: "lookup",
                stage: self.state.stage,
            })?;
        Ok(self.catalog.get(name)?)
    }

    fn enter_first_question(&mut self) -> Result<(), IntakeError> {
        let first = self.next_position(0, 0)?;
        self.move_to(first);
        Ok(())
    }

    fn move_to(&mut self, position: Option<(usize, usize)>) {
        match position {
            Some((form_index, field)) => {
                self.state.current_form_index = form_index;
                self.state.stage = IntakeStage::Question { field };
            }
            None => {
                self.state.current_form_index = self.state.form_queue.len();
                self.state.stage = IntakeStage::Biometrics;
                debug!("all queued questions answered");
            }
        }
    }

    /// Whether the field is asked, or skipped because an earlier form already asked its key.
    fn is_asked(&self, forms: &[&FormDefinition], form_index: usize, key: &str) -> bool {
        match self.shared_fields {
            SharedFieldPolicy::Reprompt => true,
            SharedFieldPolicy::Reuse => !forms[..form_index]
                .iter()
                .any(|earlier| earlier.has_field(key)),
        }
    }

    /// First asked position at or after `(form_index, field)`.
    fn next_position(
        &self,
        form_index: usize,
        field: usize,
    ) -> Result<Option<(usize, usize)>, IntakeError> {
        let forms = self.queued_forms()?;
        let mut start = field;
        for (index, form) in forms.iter().enumerate().skip(form_index) {
            for (position, definition) in form.fields.iter().enumerate().skip(start) {
                if self.is_asked(&forms, index, &definition.key) {
                    return Ok(Some((index, position)));
                }
            }
            start = 0;
        }
        Ok(None)
    }

    /// Last asked position strictly before `(form_index, field)`.
    fn previous_position(
        &self,
        form_index: usize,
        field: usize,
    ) -> Result<Option<(usize, usize)>, IntakeError> {
        let forms = self.queued_forms()?;
        let last = form_index.min(forms.len().saturating_sub(1));
        for index in (0..=last).rev() {
            let form = forms[index];
            let limit = if index == form_index {
                field.min(form.fields.len())
            } else {
                form.fields.len()
            };
            for position in (0..limit).rev() {
                if self.is_asked(&forms, index, &form.fields[position].key) {
                    return Ok(Some((index, position)));
                }
            }
        }
        Ok(None)
    }

    fn require_authenticated(&self) -> Result<(), IntakeError> {
        if self.state.authenticated {
            Ok(())
        } else {
            Err(IntakeError::Unauthenticated)
        }
    }

    fn require_stage(
        &self,
        operation: &'static str,
        allowed: impl Fn(IntakeStage) -> bool,
    ) -> Result<(), IntakeError> {
        if allowed(self.state.stage) {
            Ok(())
        } else {
            Err(IntakeError::InvalidStage {
                operation,
                stage: self.state.stage,
            })
        }
    }
}

/// Errors raised by session operations. None of them alter the session.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("session is not authenticated")]
    Unauthenticated,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("cannot {operation} while in the {} stage", .stage.label())]
    InvalidStage {
        operation: &'static str,
        stage: IntakeStage,
    },
    #[error("no forms queued and the catalog is empty")]
    EmptyQueue,
    #[error(transparent)]
    Compile(#[from] CompileError),
}
