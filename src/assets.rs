//! Assets – the styles and scripts injected into a page before capture, and
//! the pipeline that orders them.
//!
//! Final order is always: default assets, then the template's declared
//! includes, then the generated table script. Later assets can override
//! earlier ones (CSS cascade, script redefinition), so the order is part of
//! the contract.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FillerError, Result};

/// Baseline page and table styling.
pub const BASE_CSS: &str = include_str!("../assets/base.css");
/// Helper library used by the table generator.
pub const DOM_HELPERS_JS: &str = include_str!("../assets/dom-helpers.js");

/// What an asset is injected as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Style,
    Script,
}

impl AssetKind {
    /// Infer the kind from a file extension (`.css`, `.js`, `.mjs`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "css" => Some(AssetKind::Style),
            "js" | "mjs" => Some(AssetKind::Script),
            _ => None,
        }
    }
}

/// Where an asset's text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetSource {
    Content(String),
    Path(PathBuf),
}

/// A style or script resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub source: AssetSource,
    /// Explicit kind; inferred from the path extension when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssetKind>,
}

impl Asset {
    /// A file asset whose kind is inferred from its extension.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: AssetSource::Path(path.into()),
            kind: None,
        }
    }

    /// Inline CSS.
    pub fn style(content: impl Into<String>) -> Self {
        Self {
            source: AssetSource::Content(content.into()),
            kind: Some(AssetKind::Style),
        }
    }

    /// Inline JavaScript.
    pub fn script(content: impl Into<String>) -> Self {
        Self {
            source: AssetSource::Content(content.into()),
            kind: Some(AssetKind::Script),
        }
    }

    /// Override the inferred kind.
    pub fn with_kind(mut self, kind: AssetKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Explicit kind if set, otherwise inferred from the file extension.
    pub fn kind(&self) -> Option<AssetKind> {
        self.kind.or_else(|| match &self.source {
            AssetSource::Path(path) => AssetKind::from_path(path),
            AssetSource::Content(_) => None,
        })
    }

    /// Resolve a relative path against `base_dir`. Absolute paths and inline
    /// content are returned unchanged.
    pub fn resolved_against(&self, base_dir: &Path) -> Asset {
        match &self.source {
            AssetSource::Path(path) if path.is_relative() => Asset {
                source: AssetSource::Path(base_dir.join(path)),
                kind: self.kind,
            },
            _ => self.clone(),
        }
    }

    /// Read the asset's text. Returns `Ok(None)` when the kind cannot be
    /// determined; such assets are skipped.
    pub async fn load(&self) -> Result<Option<LoadedAsset>> {
        let Some(kind) = self.kind() else {
            log::warn!("Skipping asset with unknown kind: {}", self.describe());
            return Ok(None);
        };

        let loaded = match &self.source {
            AssetSource::Content(content) => LoadedAsset {
                kind,
                content: content.clone(),
                origin: None,
            },
            AssetSource::Path(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|source| {
                    FillerError::Asset {
                        path: path.clone(),
                        source,
                    }
                })?;
                LoadedAsset {
                    kind,
                    content,
                    origin: Some(path.clone()),
                }
            }
        };
        Ok(Some(loaded))
    }

    /// Short human-readable label for logs.
    pub fn describe(&self) -> String {
        match &self.source {
            AssetSource::Path(path) => path.display().to_string(),
            AssetSource::Content(content) => format!("<inline, {} bytes>", content.len()),
        }
    }
}

/// An asset whose text has been read and whose kind is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAsset {
    pub kind: AssetKind,
    pub content: String,
    /// File the content was read from, if any.
    pub origin: Option<PathBuf>,
}

/// Builds the ordered asset list for a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPipeline {
    defaults: Vec<Asset>,
}

impl Default for AssetPipeline {
    fn default() -> Self {
        Self::new(vec![Asset::style(BASE_CSS), Asset::script(DOM_HELPERS_JS)])
    }
}

impl AssetPipeline {
    /// A pipeline with custom baseline assets.
    pub fn new(defaults: Vec<Asset>) -> Self {
        Self { defaults }
    }

    /// A pipeline without baseline assets.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn defaults(&self) -> &[Asset] {
        &self.defaults
    }

    /// Defaults, then `includes`, then the table script if there is one.
    pub fn assemble(&self, includes: &[Asset], table_script: Option<Asset>) -> Vec<Asset> {
        let mut assets = Vec::with_capacity(self.defaults.len() + includes.len() + 1);
        assets.extend(self.defaults.iter().cloned());
        assets.extend(includes.iter().cloned());
        assets.extend(table_script);
        assets
    }
}
