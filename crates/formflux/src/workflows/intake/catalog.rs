use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::domain::{FieldDefinition, FieldKind, FormDefinition, TemplateRef};

/// Immutable registry of form definitions, in registration order.
#[derive(Debug)]
pub struct FormCatalog {
    forms: Vec<FormDefinition>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    forms: Vec<FormDefinition>,
}

impl FormCatalog {
    /// Built-in catalog used when no catalog file is configured.
    pub fn standard() -> Self {
        Self {
            forms: standard_forms(),
        }
    }

    pub fn from_forms(forms: Vec<FormDefinition>) -> Result<Self, CatalogError> {
        validate(&forms)?;
        Ok(Self { forms })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_reader(reader)?;
        Self::from_forms(file.forms)
    }

    pub fn get(&self, name: &str) -> Result<&FormDefinition, CatalogError> {
        self.forms
            .iter()
            .find(|form| form.name == name)
            .ok_or_else(|| CatalogError::FormNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.forms.iter().any(|form| form.name == name)
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.forms.iter().map(|form| form.name.as_str()).collect()
    }

    pub fn forms(&self) -> &[FormDefinition] {
        &self.forms
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

fn validate(forms: &[FormDefinition]) -> Result<(), CatalogError> {
    let mut names = HashSet::new();
    // A key answered once is reused by later forms, so every form must agree on its kind.
    let mut shared: HashMap<&str, (&str, &FieldKind)> = HashMap::new();
    for form in forms {
        if form.name.trim().is_empty() {
            return Err(CatalogError::EmptyFormName);
        }
        if !names.insert(form.name.as_str()) {
            return Err(CatalogError::DuplicateForm(form.name.clone()));
        }

        let mut keys = HashSet::new();
        for field in &form.fields {
            if field.key.trim().is_empty() {
                return Err(CatalogError::EmptyFieldKey {
                    form: form.name.clone(),
                });
            }
            if !keys.insert(field.key.as_str()) {
                return Err(CatalogError::DuplicateField {
                    form: form.name.clone(),
                    key: field.key.clone(),
                });
            }
            match &field.kind {
                FieldKind::Radio { options } if options.is_empty() => {
                    return Err(CatalogError::RadioWithoutOptions {
                        form: form.name.clone(),
                        key: field.key.clone(),
                    });
                }
                FieldKind::Text | FieldKind::Radio { .. } | FieldKind::Checkbox => {}
            }
            let (first_form, kind) = *shared
                .entry(field.key.as_str())
                .or_insert((form.name.as_str(), &field.kind));
            if kind != &field.kind {
                return Err(CatalogError::ConflictingSharedField {
                    key: field.key.clone(),
                    first_form: first_form.to_string(),
                    form: form.name.clone(),
                });
            }
        }

        match &form.template {
            Some(TemplateRef::Bundle(paths)) if paths.is_empty() => {
                return Err(CatalogError::EmptyBundle(form.name.clone()));
            }
            Some(TemplateRef::Single(path)) if path.trim().is_empty() => {
                return Err(CatalogError::EmptyTemplatePath(form.name.clone()));
            }
            _ => {}
        }
    }

    Ok(())
}

fn standard_forms() -> Vec<FormDefinition> {
    vec![
        FormDefinition {
            name: "Visa Intake (Standard)".to_string(),
            description: "Standard intake for new visa applicants.".to_string(),
            fields: vec![
                FieldDefinition::text("txt_FirstName", "Client's First Name"),
                FieldDefinition::checkbox("chk_Citizen", "Are you a US Citizen?"),
                FieldDefinition::text("txt_Story", "Brief explanation of the case"),
            ],
            template: Some(TemplateRef::Single("immigration.json".to_string())),
            recipient: "intake@formflux.example".to_string(),
        },
        FormDefinition {
            name: "Retainer Agreement".to_string(),
            description: "Engagement terms and fee arrangement for new matters.".to_string(),
            fields: vec![
                FieldDefinition::text("txt_FirstName", "Client's First Name"),
                FieldDefinition::radio(
                    "rad_FeeArrangement",
                    "Preferred fee arrangement",
                    &["Flat Fee", "Hourly", "Contingency"],
                ),
                FieldDefinition::checkbox(
                    "chk_Consent",
                    "I consent to the digital processing of my data via FormFlux.",
                ),
            ],
            template: Some(TemplateRef::Single("retainer.json".to_string())),
            recipient: "intake@formflux.example".to_string(),
        },
        FormDefinition {
            name: "New Client Packet".to_string(),
            description: "Intake summary and engagement letter compiled as one archive."
                .to_string(),
            fields: vec![
                FieldDefinition::text("client_name", "Client's full legal name"),
                FieldDefinition::text("txt_Phone", "Best phone number to reach you"),
                FieldDefinition::checkbox("chk_Over18", "Are you at least 18 years old?"),
            ],
            template: Some(TemplateRef::Bundle(vec![
                "intake_summary.json".to_string(),
                "engagement_letter.json".to_string(),
            ])),
            recipient: "intake@formflux.example".to_string(),
        },
    ]
}

/// Catalog load and lookup failures. Load failures halt startup.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("form '{0}' is not in the catalog")]
    FormNotFound(String),
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog contains a form without a name")]
    EmptyFormName,
    #[error("form '{0}' is registered more than once")]
    DuplicateForm(String),
    #[error("form '{form}' has a field without a key")]
    EmptyFieldKey { form: String },
    #[error("form '{form}' declares field '{key}' more than once")]
    DuplicateField { form: String, key: String },
    #[error("radio field '{key}' in form '{form}' has no options")]
    RadioWithoutOptions { form: String, key: String },
    #[error("field '{key}' in form '{form}' has a different type than in form '{first_form}'")]
    ConflictingSharedField {
        key: String,
        first_form: String,
        form: String,
    },
    #[error("bundle form '{0}' lists no templates")]
    EmptyBundle(String),
    #[error("form '{0}' has an empty template path")]
    EmptyTemplatePath(String),
}
