//! The immutable unit of work for one review run.
//!
//! An artifact is opaque source text plus a stable identity. Nothing in the
//! engine parses the source language; the text is only embedded in prompts
//! and compared against model output.
use crate::util::sha256_hex;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Stable identity of an artifact: display name plus content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactId {
    pub name: String,
    pub sha256: String,
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.sha256.get(..12).unwrap_or(&self.sha256);
        write!(f, "{}@{}", self.name, short)
    }
}

/// Source text under review. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct Artifact {
    id: ArtifactId,
    text: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let id = ArtifactId {
            name: name.into(),
            sha256: sha256_hex(text.as_bytes()),
        };
        Self { id, text }
    }

    /// Read an artifact from disk, naming it after the file.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("artifact path has no file name: {}", path.display()))?;
        let text = fs::read_to_string(path)
            .with_context(|| format!("read artifact {}", path.display()))?;
        Ok(Self::new(name, text))
    }

    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// File stem used to name per-artifact outputs.
    pub fn stem(&self) -> &str {
        Path::new(&self.id.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.id.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_only_on_content() {
        let a = Artifact::new("a.sql", "BEGIN NULL; END;");
        let b = Artifact::new("b.sql", "BEGIN NULL; END;");
        let c = Artifact::new("a.sql", "BEGIN NULL; END; ");
        assert_eq!(a.id().sha256, b.id().sha256);
        assert_ne!(a.id().sha256, c.id().sha256);
    }

    #[test]
    fn display_uses_short_fingerprint() {
        let artifact = Artifact::new("get_invoice.sql", "x");
        let shown = artifact.id().to_string();
        assert!(shown.starts_with("get_invoice.sql@"));
        assert_eq!(shown.len(), "get_invoice.sql@".len() + 12);
    }

    #[test]
    fn stem_drops_extension() {
        assert_eq!(Artifact::new("pkg_billing.pkb", "").stem(), "pkg_billing");
        assert_eq!(Artifact::new("noext", "").stem(), "noext");
    }

    #[test]
    fn load_reads_file_and_names_artifact() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("proc.sql");
        std::fs::write(&path, "BEGIN NULL; END;").expect("write artifact");
        let artifact = Artifact::load(&path).expect("load artifact");
        assert_eq!(artifact.name(), "proc.sql");
        assert_eq!(artifact.text(), "BEGIN NULL; END;");
    }
}
