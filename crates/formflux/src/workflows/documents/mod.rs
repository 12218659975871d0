//! Document compilation: maps a collected answer set onto one or more templates, appends
//! the identity exhibit, and writes a single dispatchable artifact.
//!
//! Compiled documents are JSON. A single-template form yields one `.json` document; a
//! bundle form yields one `.zip` archive holding a document per template. Output files are
//! written under a temporary name and only renamed into place once complete.

mod bundle;
mod exhibit;
mod template;

pub use exhibit::{ExhibitEntry, IdentityExhibit};
pub use template::{DocumentTemplate, TemplateSlot};

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::workflows::intake::domain::{
    AnswerMap, FieldKind, FormDefinition, IdentityArtifacts, TemplateRef, CHECKBOX_YES,
};
use template::LoadedTemplate;

/// Filesystem locations used by the compiler.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub template_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// A template after answers were written into its slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilledDocument {
    pub form_name: String,
    pub template: String,
    pub title: String,
    pub preamble: Vec<String>,
    pub slots: Vec<FilledSlot>,
    pub exhibit: IdentityExhibit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilledSlot {
    pub key: String,
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl FilledDocument {
    /// Rendered value of a slot; blank slots yield `Some("")`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|slot| slot.key == key)
            .map(|slot| slot.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    Document,
    Archive,
}

impl ArtifactFormat {
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Document => "application/json",
            Self::Archive => "application/zip",
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::Document => "json",
            Self::Archive => "zip",
        }
    }
}

/// Handle to one finished output, opaque to dispatchers beyond its path and format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub form_name: String,
    pub path: PathBuf,
    pub format: ArtifactFormat,
    pub document_count: usize,
}

impl OutputArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Read the compiled document(s) back from disk.
    pub fn documents(&self) -> Result<Vec<FilledDocument>, CompileError> {
        let file = File::open(&self.path)?;
        match self.format {
            ArtifactFormat::Document => {
                let document = serde_json::from_reader(BufReader::new(file))
                    .map_err(CompileError::Decode)?;
                Ok(vec![document])
            }
            ArtifactFormat::Archive => bundle::read_archive(file),
        }
    }

    /// Remove the artifact from disk. Already-removed files are not an error.
    pub fn discard(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentCompiler {
    config: CompilerConfig,
}

impl DocumentCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile one form into a document, or into an archive when the form is a bundle.
    pub fn compile(
        &self,
        form: &FormDefinition,
        answers: &AnswerMap,
        artifacts: &IdentityArtifacts,
    ) -> Result<OutputArtifact, CompileError> {
        let scratch = tempfile::Builder::new()
            .prefix("formflux-exhibit-")
            .tempdir()?;
        let exhibit = exhibit::assemble(scratch.path(), artifacts);
        let result = exhibit.and_then(|exhibit| self.compile_with_exhibit(form, answers, &exhibit));

        if let Err(err) = scratch.close() {
            warn!(error = %err, "failed to remove exhibit scratch directory");
        }

        let artifact = result?;
        info!(
            form = %form.name,
            path = %artifact.path.display(),
            documents = artifact.document_count,
            "compiled intake document"
        );
        Ok(artifact)
    }

    /// Compile every form in order. Either all outputs are produced or none are left on disk.
    pub fn compile_queue(
        &self,
        forms: &[&FormDefinition],
        answers: &AnswerMap,
        artifacts: &IdentityArtifacts,
    ) -> Result<Vec<OutputArtifact>, CompileError> {
        let mut outputs = Vec::with_capacity(forms.len());
        for form in forms {
            match self.compile(form, answers, artifacts) {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    for produced in &outputs {
                        if let Err(cleanup) = produced.discard() {
                            warn!(
                                path = %produced.path.display(),
                                error = %cleanup,
                                "failed to discard partial submission output"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(outputs)
    }

    fn compile_with_exhibit(
        &self,
        form: &FormDefinition,
        answers: &AnswerMap,
        exhibit: &IdentityExhibit,
    ) -> Result<OutputArtifact, CompileError> {
        match &form.template {
            Some(TemplateRef::Bundle(paths)) => {
                if paths.is_empty() {
                    return Err(CompileError::EmptyBundle(form.name.clone()));
                }
                let mut members = Vec::with_capacity(paths.len());
                for (index, reference) in paths.iter().enumerate() {
                    let loaded = template::load_or_placeholder(
                        &self.config.template_dir,
                        Some(reference),
                        form,
                    )?;
                    let document = fill(form, &loaded, answers, exhibit);
                    let bytes = serde_json::to_vec_pretty(&document).map_err(CompileError::Encode)?;
                    members.push((bundle::entry_name(index, reference), bytes));
                }
                let count = members.len();
                self.persist(form, ArtifactFormat::Archive, count, |file| {
                    bundle::write_archive(file, &members).map(|_| ())
                })
            }
            Some(TemplateRef::Single(reference)) => {
                self.compile_single(form, Some(reference), answers, exhibit)
            }
            None => self.compile_single(form, None, answers, exhibit),
        }
    }

    fn compile_single(
        &self,
        form: &FormDefinition,
        reference: Option<&str>,
        answers: &AnswerMap,
        exhibit: &IdentityExhibit,
    ) -> Result<OutputArtifact, CompileError> {
        let loaded = template::load_or_placeholder(&self.config.template_dir, reference, form)?;
        let document = fill(form, &loaded, answers, exhibit);
        let bytes = serde_json::to_vec_pretty(&document).map_err(CompileError::Encode)?;
        self.persist(form, ArtifactFormat::Document, 1, |file| {
            file.write_all(&bytes)?;
            Ok(())
        })
    }

    fn persist<F>(
        &self,
        form: &FormDefinition,
        format: ArtifactFormat,
        document_count: usize,
        write: F,
    ) -> Result<OutputArtifact, CompileError>
    where
        F: FnOnce(&mut tempfile::NamedTempFile) -> Result<(), CompileError>,
    {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let mut staging = tempfile::Builder::new()
            .prefix(".formflux-")
            .suffix(".partial")
            .tempfile_in(&self.config.output_dir)?;

        write(&mut staging)?;
        staging.as_file().sync_all()?;

        let path = output_path(&self.config.output_dir, &form.name, format);
        staging
            .persist(&path)
            .map_err(|err| CompileError::Io(err.error))?;

        Ok(OutputArtifact {
            form_name: form.name.clone(),
            path,
            format,
            document_count,
        })
    }
}

fn fill(
    form: &FormDefinition,
    loaded: &LoadedTemplate,
    answers: &AnswerMap,
    exhibit: &IdentityExhibit,
) -> FilledDocument {
    let slots = loaded
        .template
        .slots
        .iter()
        .map(|slot| {
            let field = form.field(&slot.key);
            let answer = field.and_then(|field| answers.get(&field.key));
            let value = answer.unwrap_or_default().to_string();
            let checked = match field.map(|field| &field.kind) {
                Some(FieldKind::Checkbox) => answer.map(|answer| answer == CHECKBOX_YES),
                Some(FieldKind::Text) | Some(FieldKind::Radio { .. }) | None => None,
            };
            if field.is_none() {
                debug!(form = %form.name, slot = %slot.key, "template slot has no matching field");
            }
            FilledSlot {
                key: slot.key.clone(),
                label: slot.label.clone(),
                value,
                checked,
            }
        })
        .collect();

    FilledDocument {
        form_name: form.name.clone(),
        template: loaded.source.clone(),
        title: loaded.template.title.clone(),
        preamble: loaded.template.preamble.clone(),
        slots,
        exhibit: exhibit.clone(),
    }
}

fn output_path(output_dir: &Path, form_name: &str, format: ArtifactFormat) -> PathBuf {
    let token = uuid::Uuid::new_v4().simple().to_string();
    output_dir.join(format!(
        "{}-{}.{}",
        slugify(form_name),
        &token[..8],
        format.extension()
    ))
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "form".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Failure to produce a dispatchable document. Retrying is safe.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("document io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("template {} could not be read: {source}", .path.display())]
    UnreadableTemplate {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("template {} is malformed: {source}", .path.display())]
    MalformedTemplate {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("bundle form '{0}' lists no templates")]
    EmptyBundle(String),
    #[error("failed to encode compiled document: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode compiled document: {0}")]
    Decode(serde_json::Error),
    #[error("archive failure: {0}")]
    Archive(#[from] zip::result::ZipError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Visa Intake (Standard)"), "visa-intake-standard");
        assert_eq!(slugify("!!!"), "form");
    }
}
