use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const CHECKBOX_YES: &str = "Yes";
pub const CHECKBOX_NO: &str = "No";

/// Answer shape accepted by a field. Every consumer matches exhaustively so a new kind
/// is a compile-time change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Radio { options: Vec<String> },
    Checkbox,
}

impl FieldKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Radio { .. } => "radio",
            Self::Checkbox => "checkbox",
        }
    }

    /// Choices presented to the client; empty for free text.
    pub fn options(&self) -> Vec<String> {
        match self {
            Self::Text => Vec::new(),
            Self::Radio { options } => options.clone(),
            Self::Checkbox => vec![CHECKBOX_YES.to_string(), CHECKBOX_NO.to_string()],
        }
    }

    /// Validate a raw answer and return the value stored in the answer map.
    pub fn normalize(&self, key: &str, raw: &str) -> Result<String, ValidationError> {
        let trimmed = raw.trim();
        match self {
            Self::Text => {
                if trimmed.is_empty() {
                    Err(ValidationError::EmptyAnswer {
                        field: key.to_string(),
                    })
                } else {
                    Ok(trimmed.to_string())
                }
            }
            Self::Radio { options } => options
                .iter()
                .find(|option| option.trim().eq_ignore_ascii_case(trimmed))
                .cloned()
                .ok_or_else(|| ValidationError::UnknownOption {
                    field: key.to_string(),
                    answer: trimmed.to_string(),
                    options: options.clone(),
                }),
            Self::Checkbox => match trimmed.to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" => Ok(CHECKBOX_YES.to_string()),
                "no" | "n" | "false" => Ok(CHECKBOX_NO.to_string()),
                _ => Err(ValidationError::NotBoolean {
                    field: key.to_string(),
                    answer: trimmed.to_string(),
                }),
            },
        }
    }
}

/// One question in a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDefinition {
    pub fn text(key: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            kind: FieldKind::Text,
        }
    }

    pub fn checkbox(key: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            kind: FieldKind::Checkbox,
        }
    }

    pub fn radio(key: &str, description: &str, options: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            kind: FieldKind::Radio {
                options: options.iter().map(|option| option.to_string()).collect(),
            },
        }
    }
}

/// Where a form's output template lives. A list means bundle mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateRef {
    Single(String),
    Bundle(Vec<String>),
}

/// One fillable document in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub template: Option<TemplateRef>,
    pub recipient: String,
}

impl FormDefinition {
    pub fn is_bundle(&self) -> bool {
        matches!(self.template, Some(TemplateRef::Bundle(_)))
    }

    pub fn field(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }
}

/// Field key to submitted value. Keys from every queued form share one map so a key
/// reused across forms carries the same client data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMap(BTreeMap<String, String>);

impl AnswerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for AnswerMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Signature,
    Selfie,
    GovernmentId,
}

impl ArtifactKind {
    /// Exhibit order.
    pub const fn ordered() -> [Self; 3] {
        [Self::Signature, Self::Selfie, Self::GovernmentId]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Signature => "Signature",
            Self::Selfie => "Selfie",
            Self::GovernmentId => "Government ID",
        }
    }

    pub(crate) const fn file_stem(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Selfie => "selfie",
            Self::GovernmentId => "government_id",
        }
    }
}

/// Identity images captured once per session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IdentityArtifacts {
    pub signature: Option<Vec<u8>>,
    pub selfie: Option<Vec<u8>>,
    pub government_id: Option<Vec<u8>>,
}

impl IdentityArtifacts {
    pub fn get(&self, kind: ArtifactKind) -> Option<&[u8]> {
        let slot = match kind {
            ArtifactKind::Signature => &self.signature,
            ArtifactKind::Selfie => &self.selfie,
            ArtifactKind::GovernmentId => &self.government_id,
        };
        slot.as_deref().filter(|bytes| !bytes.is_empty())
    }

    pub fn set(&mut self, kind: ArtifactKind, bytes: Vec<u8>) {
        let slot = match kind {
            ArtifactKind::Signature => &mut self.signature,
            ArtifactKind::Selfie => &mut self.selfie,
            ArtifactKind::GovernmentId => &mut self.government_id,
        };
        *slot = Some(bytes);
    }

    pub fn has(&self, kind: ArtifactKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn present(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ordered()
            .into_iter()
            .filter(|kind| self.has(*kind))
            .collect()
    }
}

impl fmt::Debug for IdentityArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = |slot: &Option<Vec<u8>>| slot.as_ref().map(Vec::len);
        f.debug_struct("IdentityArtifacts")
            .field("signature_bytes", &len(&self.signature))
            .field("selfie_bytes", &len(&self.selfie))
            .field("government_id_bytes", &len(&self.government_id))
            .finish()
    }
}

/// How a field key that already appeared in an earlier queued form is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedFieldPolicy {
    /// Skip the repeat and keep the earlier answer.
    #[default]
    Reuse,
    /// Ask again with the earlier answer pre-filled.
    Reprompt,
}

impl SharedFieldPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reuse" | "prefill" => Some(Self::Reuse),
            "reprompt" | "ask" => Some(Self::Reprompt),
            _ => None,
        }
    }
}

/// Rejected client input. The session never changes state when one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("an answer is required for '{field}'")]
    EmptyAnswer { field: String },
    #[error("'{answer}' is not a valid choice for '{field}' (expected one of {options:?})")]
    UnknownOption {
        field: String,
        answer: String,
        options: Vec<String>,
    },
    #[error("'{answer}' is not a yes/no answer for '{field}'")]
    NotBoolean { field: String, answer: String },
    #[error("{} is required", .0.label())]
    MissingArtifact(ArtifactKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rejects_blank_and_trims() {
        let kind = FieldKind::Text;
        assert!(matches!(
            kind.normalize("name", "   "),
            Err(ValidationError::EmptyAnswer { .. })
        ));
        assert_eq!(kind.normalize("name", " Jane Doe ").unwrap(), "Jane Doe");
    }

    #[test]
    fn radio_returns_canonical_option() {
        let kind = FieldKind::Radio {
            options: vec!["Flat Fee".to_string(), "Hourly".to_string()],
        };
        assert_eq!(kind.normalize("fee", "hourly").unwrap(), "Hourly");
        assert!(matches!(
            kind.normalize("fee", "Contingency"),
            Err(ValidationError::UnknownOption { .. })
        ));
    }

    #[test]
    fn checkbox_maps_boolean_words() {
        let kind = FieldKind::Checkbox;
        assert_eq!(kind.normalize("over18", "true").unwrap(), CHECKBOX_YES);
        assert_eq!(kind.normalize("over18", "NO").unwrap(), CHECKBOX_NO);
        assert!(kind.normalize("over18", "maybe").is_err());
        assert_eq!(kind.options(), vec!["Yes", "No"]);
    }

    #[test]
    fn field_definitions_deserialize_with_inline_type_tag() {
        let json = r#"{"key":"fee","description":"Fee","type":"radio","options":["A","B"]}"#;
        let field: FieldDefinition = serde_json::from_str(json).expect("field parses");
        assert_eq!(field, FieldDefinition::radio("fee", "Fee", &["A", "B"]));
    }

    #[test]
    fn template_ref_accepts_single_or_list() {
        let single: TemplateRef = serde_json::from_str(r#""intake.json""#).unwrap();
        assert_eq!(single, TemplateRef::Single("intake.json".to_string()));
        let bundle: TemplateRef = serde_json::from_str(r#"["a.json","b.json"]"#).unwrap();
        assert!(matches!(bundle, TemplateRef::Bundle(paths) if paths.len() == 2));
    }

    #[test]
    fn empty_artifacts_count_as_absent() {
        let mut artifacts = IdentityArtifacts::default();
        artifacts.set(ArtifactKind::Selfie, Vec::new());
        artifacts.set(ArtifactKind::GovernmentId, vec![1, 2, 3]);
        assert!(!artifacts.has(ArtifactKind::Selfie));
        assert_eq!(artifacts.present(), vec![ArtifactKind::GovernmentId]);
    }
}
