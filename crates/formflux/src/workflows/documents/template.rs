use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::CompileError;
use crate::workflows::intake::domain::FormDefinition;

pub(crate) const PLACEHOLDER_SOURCE: &str = "placeholder";

/// Fillable document layout: a title, optional fixed text, and named slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTemplate {
    pub title: String,
    #[serde(default)]
    pub preamble: Vec<String>,
    pub slots: Vec<TemplateSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub key: String,
    #[serde(default)]
    pub label: String,
}

impl DocumentTemplate {
    /// Stand-in used when no template file exists: one slot per form field.
    pub fn placeholder(form: &FormDefinition) -> Self {
        Self {
            title: form.name.clone(),
            preamble: vec![format!(
                "Generated without a firm template for '{}'.",
                form.name
            )],
            slots: form
                .fields
                .iter()
                .map(|field| TemplateSlot {
                    key: field.key.clone(),
                    label: field.description.clone(),
                })
                .collect(),
        }
    }
}

/// A template as resolved for one compile step.
#[derive(Debug, Clone)]
pub(crate) struct LoadedTemplate {
    pub(crate) source: String,
    pub(crate) template: DocumentTemplate,
}

pub(crate) fn resolve(template_dir: &Path, reference: &str) -> PathBuf {
    let candidate = Path::new(reference);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        template_dir.join(candidate)
    }
}

/// Load a template from disk, synthesizing the placeholder when the file is absent.
pub(crate) fn load_or_placeholder(
    template_dir: &Path,
    reference: Option<&str>,
    form: &FormDefinition,
) -> Result<LoadedTemplate, CompileError> {
    let Some(reference) = reference else {
        return Ok(placeholder(form));
    };

    let path = resolve(template_dir, reference);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!(
                form = %form.name,
                path = %path.display(),
                "template missing, synthesizing placeholder"
            );
            return Ok(placeholder(form));
        }
        Err(source) => return Err(CompileError::UnreadableTemplate { path, source }),
    };

    let template: DocumentTemplate = serde_json::from_str(&raw)
        .map_err(|source| CompileError::MalformedTemplate {
            path: path.clone(),
            source,
        })?;

    Ok(LoadedTemplate {
        source: reference.to_string(),
        template,
    })
}

fn placeholder(form: &FormDefinition) -> LoadedTemplate {
    LoadedTemplate {
        source: PLACEHOLDER_SOURCE.to_string(),
        template: DocumentTemplate::placeholder(form),
    }
}
