//! Planned visual assets and the images generated for them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifier for a planned visual asset, derived from its sanitized name.
///
/// Doubles as the image file stem, so it only ever contains
/// `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    /// Build an id from a human-readable asset name, replacing every
    /// character outside `[A-Za-z0-9_-]` with an underscore.
    pub fn from_name(name: &str) -> Self {
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        if safe.is_empty() {
            Self("asset".to_string())
        } else {
            Self(safe)
        }
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse visual category steering slide layout selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    /// Mechanism-of-action or biological imagery; rendered full-bleed.
    Mechanism,
    /// Informational or trial-logistics imagery; rendered in split layout.
    #[default]
    Informational,
}

impl AssetCategory {
    /// Map a free-form category keyword from a generation model onto one of
    /// the two layout families. Unknown keywords fall back to
    /// `Informational`.
    pub fn from_keyword(keyword: &str) -> Self {
        let k = keyword.to_lowercase();
        if k.contains("mechan") || k.contains("biolog") || k.contains("anatom") {
            AssetCategory::Mechanism
        } else {
            AssetCategory::Informational
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Mechanism => "mechanism",
            AssetCategory::Informational => "informational",
        }
    }
}

/// One planned visual element for a segment, not yet generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Stable id; also the image file stem.
    pub id: AssetId,

    /// Human-readable name from the planning stage.
    pub name: String,

    /// Visual style hint (e.g. "flat medical illustration").
    pub style: String,

    /// What the asset is for.
    pub purpose: String,

    /// Full text-to-image prompt.
    pub prompt: String,

    /// Layout family this asset belongs to.
    #[serde(default)]
    pub category: AssetCategory,

    /// Index of the owning segment.
    pub segment_index: usize,
}

/// A generated image on disk, keyed by the asset it realizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub asset_id: AssetId,

    /// Location of the image bytes inside the run directory.
    pub path: PathBuf,

    /// Prompt that actually produced the bytes.
    pub prompt_used: String,

    /// True when the simplified prompt variant was used.
    #[serde(default)]
    pub simplified: bool,

    /// True when generation failed and the flat-color placeholder was
    /// substituted.
    #[serde(default)]
    pub placeholder: bool,

    /// Background-removed variant, when the removal stage produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_bg_path: Option<PathBuf>,
}

impl GeneratedImage {
    /// Path downstream consumers should composite with: the transparent
    /// variant when present, the original otherwise.
    pub fn display_path(&self) -> &Path {
        self.no_bg_path.as_deref().unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_sanitizes_name() {
        let id = AssetId::from_name("Drug Mechanism (3D)");
        assert_eq!(id.as_str(), "Drug_Mechanism__3D_");
    }

    #[test]
    fn test_asset_id_keeps_safe_chars() {
        let id = AssetId::from_name("tablet_daily-dose1");
        assert_eq!(id.as_str(), "tablet_daily-dose1");
    }

    #[test]
    fn test_asset_id_never_empty() {
        assert_eq!(AssetId::from_name("").as_str(), "asset");
    }

    #[test]
    fn test_category_from_keyword() {
        assert_eq!(
            AssetCategory::from_keyword("Mechanism of action"),
            AssetCategory::Mechanism
        );
        assert_eq!(
            AssetCategory::from_keyword("biological process"),
            AssetCategory::Mechanism
        );
        assert_eq!(
            AssetCategory::from_keyword("trial logistics"),
            AssetCategory::Informational
        );
        assert_eq!(AssetCategory::from_keyword(""), AssetCategory::Informational);
    }

    #[test]
    fn test_display_path_prefers_no_bg() {
        let mut img = GeneratedImage {
            asset_id: AssetId::from_name("pill"),
            path: PathBuf::from("images/pill.png"),
            prompt_used: "a pill".to_string(),
            simplified: false,
            placeholder: false,
            no_bg_path: None,
        };
        assert_eq!(img.display_path(), Path::new("images/pill.png"));

        img.no_bg_path = Some(PathBuf::from("images/no_bg/pill_nobg.png"));
        assert_eq!(img.display_path(), Path::new("images/no_bg/pill_nobg.png"));
    }
}
