use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CompileError;
use crate::workflows::intake::domain::{ArtifactKind, IdentityArtifacts};

/// Identity-verification section appended after a document's answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityExhibit {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ExhibitEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExhibitEntry {
    pub artifact: ArtifactKind,
    pub label: String,
    pub media_type: String,
    pub data_base64: String,
}

impl IdentityExhibit {
    pub fn entry(&self, kind: ArtifactKind) -> Option<&ExhibitEntry> {
        self.entries.iter().find(|entry| entry.artifact == kind)
    }

    pub fn kinds(&self) -> Vec<ArtifactKind> {
        self.entries.iter().map(|entry| entry.artifact).collect()
    }
}

impl ExhibitEntry {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data_base64)
    }
}

/// Write each present artifact into `scratch` so the exhibit is assembled from files,
/// then read them back. The caller owns `scratch` and removes it.
pub(crate) fn assemble(
    scratch: &Path,
    artifacts: &IdentityArtifacts,
) -> Result<IdentityExhibit, CompileError> {
    let staged = stage(scratch, artifacts)?;

    let mut entries = Vec::with_capacity(staged.len());
    for (kind, path) in staged {
        let bytes = std::fs::read(&path)?;
        entries.push(ExhibitEntry {
            artifact: kind,
            label: kind.label().to_string(),
            media_type: sniff_media_type(&bytes).to_string(),
            data_base64: STANDARD.encode(&bytes),
        });
    }

    Ok(IdentityExhibit {
        generated_at: Utc::now(),
        entries,
    })
}

fn stage(
    scratch: &Path,
    artifacts: &IdentityArtifacts,
) -> Result<Vec<(ArtifactKind, PathBuf)>, CompileError> {
    let mut staged = Vec::new();
    for kind in ArtifactKind::ordered() {
        let Some(bytes) = artifacts.get(kind) else {
            tracing::debug!(artifact = kind.label(), "artifact absent, skipping exhibit entry");
            continue;
        };
        let path = scratch.join(format!("{}.img", kind.file_stem()));
        std::fs::write(&path, bytes)?;
        staged.push((kind, path));
    }
    Ok(staged)
}

pub(crate) fn sniff_media_type(bytes: &[u8]) -> mime::Mime {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        mime::IMAGE_PNG
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        mime::IMAGE_JPEG
    } else if bytes.starts_with(b"GIF8") {
        mime::IMAGE_GIF
    } else if bytes.starts_with(b"BM") {
        mime::IMAGE_BMP
    } else {
        mime::APPLICATION_OCTET_STREAM
    }
}
