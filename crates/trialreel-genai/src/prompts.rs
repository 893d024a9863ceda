//! Prompt templates for the generation stages.
//!
//! Defaults are embedded in the binary; a directory of overrides can be
//! layered on top. Whatever set is active gets copied into each run's
//! `prompts/` directory so a finished run records exactly what it was
//! asked.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::GenAiResult;

const SCRIPT_TEMPLATE: &str = include_str!("../prompts/script_prompt.txt");
const ASSETS_TEMPLATE: &str = include_str!("../prompts/assets_prompt.txt");
const LAYOUT_TEMPLATE: &str = include_str!("../prompts/layout_prompt.txt");
const SIMPLIFY_TEMPLATE: &str = include_str!("../prompts/simplify_prompt.txt");

/// The four templates the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Script,
    Assets,
    Layout,
    Simplify,
}

impl PromptKind {
    pub const ALL: [PromptKind; 4] = [
        PromptKind::Script,
        PromptKind::Assets,
        PromptKind::Layout,
        PromptKind::Simplify,
    ];

    /// File name used both for overrides and for run-directory copies.
    pub fn file_name(&self) -> &'static str {
        match self {
            PromptKind::Script => "script_prompt.txt",
            PromptKind::Assets => "assets_prompt.txt",
            PromptKind::Layout => "layout_prompt.txt",
            PromptKind::Simplify => "simplify_prompt.txt",
        }
    }

    fn embedded(&self) -> &'static str {
        match self {
            PromptKind::Script => SCRIPT_TEMPLATE,
            PromptKind::Assets => ASSETS_TEMPLATE,
            PromptKind::Layout => LAYOUT_TEMPLATE,
            PromptKind::Simplify => SIMPLIFY_TEMPLATE,
        }
    }
}

/// Active set of prompt templates.
#[derive(Debug, Clone)]
pub struct PromptStore {
    script: String,
    assets: String,
    layout: String,
    simplify: String,
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::embedded()
    }
}

impl PromptStore {
    /// The built-in templates.
    pub fn embedded() -> Self {
        Self {
            script: SCRIPT_TEMPLATE.to_string(),
            assets: ASSETS_TEMPLATE.to_string(),
            layout: LAYOUT_TEMPLATE.to_string(),
            simplify: SIMPLIFY_TEMPLATE.to_string(),
        }
    }

    /// Load templates from a directory, falling back to the embedded
    /// default for any file that is absent.
    pub fn from_dir(dir: &Path) -> GenAiResult<Self> {
        let mut store = Self::embedded();
        for kind in PromptKind::ALL {
            let path = dir.join(kind.file_name());
            match fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(template = kind.file_name(), "Loaded prompt override");
                    *store.slot_mut(kind) = text;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(store)
    }

    /// Raw template text.
    pub fn template(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::Script => &self.script,
            PromptKind::Assets => &self.assets,
            PromptKind::Layout => &self.layout,
            PromptKind::Simplify => &self.simplify,
        }
    }

    fn slot_mut(&mut self, kind: PromptKind) -> &mut String {
        match kind {
            PromptKind::Script => &mut self.script,
            PromptKind::Assets => &mut self.assets,
            PromptKind::Layout => &mut self.layout,
            PromptKind::Simplify => &mut self.simplify,
        }
    }

    /// Copy the active templates into `dir` for reproducibility.
    pub fn copy_into(&self, dir: &Path) -> GenAiResult<()> {
        fs::create_dir_all(dir)?;
        for kind in PromptKind::ALL {
            fs::write(dir.join(kind.file_name()), self.template(kind))?;
        }
        Ok(())
    }

    /// Full prompt for the script stage.
    pub fn script_prompt(&self, trial_summary: &str) -> String {
        format!(
            "{}\n\nClinical Trial Summary:\n{}\n\nRespond with a JSON object containing \
             video_title, video_intro, and segments as described.",
            self.script, trial_summary
        )
    }

    /// Full prompt for one segment of the asset-planning stage.
    pub fn assets_prompt(&self, script_json: &str, image_description: &str) -> String {
        format!(
            "Previous Stage Output (Video Script):\n{}\n\nUse this complete video script as \
             context when generating visual assets.\n\n{}\n\nImage description:\n{}\n\nReturn a \
             JSON list of assets with fields: name, style, purpose, prompt, category. Keep items \
             short and simple.",
            script_json, self.assets, image_description
        )
    }

    /// Full prompt for one segment of the layout stage.
    pub fn layout_prompt(
        &self,
        script_json: &str,
        assets_json: &str,
        available_images: &[String],
        segment_json: &str,
    ) -> String {
        format!(
            "Previous Stage Outputs:\n\nSTAGE 1 - Video Script:\n{}\n\nSTAGE 2 - Visual Assets \
             Plan:\n{}\n\nUse all of the above context when designing slide layouts to ensure \
             consistency with the overall video narrative and available visual \
             assets.\n\n{}\n\nSegment:\n{}\n\nAvailable images: {}",
            script_json,
            assets_json,
            self.layout,
            segment_json,
            available_images.join(", ")
        )
    }

    /// Full prompt asking the text model to simplify a failed image prompt.
    pub fn simplify_prompt(&self, original_prompt: &str) -> String {
        format!(
            "{}\n\nOriginal prompt: {}\n\nSimplified prompt:",
            self.simplify, original_prompt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_templates_are_nonempty() {
        let store = PromptStore::embedded();
        for kind in PromptKind::ALL {
            assert!(!store.template(kind).trim().is_empty());
        }
    }

    #[test]
    fn test_from_dir_overrides_present_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("script_prompt.txt"), "custom script template").unwrap();

        let store = PromptStore::from_dir(dir.path()).unwrap();
        assert_eq!(store.template(PromptKind::Script), "custom script template");
        assert_eq!(store.template(PromptKind::Assets), ASSETS_TEMPLATE);
    }

    #[test]
    fn test_copy_into_writes_all_templates() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("prompts");
        PromptStore::embedded().copy_into(&target).unwrap();

        for kind in PromptKind::ALL {
            assert!(target.join(kind.file_name()).exists());
        }
    }

    #[test]
    fn test_script_prompt_embeds_summary() {
        let prompt = PromptStore::embedded().script_prompt("A study of a daily tablet.");
        assert!(prompt.contains("Clinical Trial Summary:\nA study of a daily tablet."));
        assert!(prompt.contains("video_title"));
    }

    #[test]
    fn test_layout_prompt_lists_available_images() {
        let prompt = PromptStore::embedded().layout_prompt(
            "{}",
            "[]",
            &["pill_bottle".to_string(), "calendar".to_string()],
            "{}",
        );
        assert!(prompt.contains("Available images: pill_bottle, calendar"));
    }
}
