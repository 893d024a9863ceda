//! Run directory layout.

use std::path::{Path, PathBuf};

use trialreel_models::{AssetId, RunId};

use crate::error::PipelineResult;

/// Directory layout of one run under `<run_root>/<trial_id>/<run_id>/`.
///
/// The whole tree is created up front so stages can write without
/// checking for parents. Partial runs are never deleted.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_id: RunId,
    pub root: PathBuf,
    pub outputs: PathBuf,
    pub images: PathBuf,
    pub no_bg: PathBuf,
    pub slides: PathBuf,
    pub audio: PathBuf,
    pub prompts: PathBuf,
}

impl RunPaths {
    /// Create the run directory tree.
    ///
    /// When a directory for `run_id` already exists (a second run landing
    /// on the same second), a disambiguated id is used instead so runs
    /// never share a directory.
    pub fn create(run_root: &Path, trial_id: &str, run_id: RunId) -> PipelineResult<Self> {
        let trial_dir = run_root.join(sanitize_trial_id(trial_id));

        let mut run_id = run_id;
        if trial_dir.join(run_id.as_str()).exists() {
            run_id = run_id.disambiguated();
        }
        let root = trial_dir.join(run_id.as_str());

        let paths = Self {
            outputs: root.join("outputs"),
            images: root.join("images"),
            no_bg: root.join("images").join("no_bg"),
            slides: root.join("slides"),
            audio: root.join("audio"),
            prompts: root.join("prompts"),
            run_id,
            root,
        };

        for dir in [
            &paths.outputs,
            &paths.no_bg,
            &paths.slides,
            &paths.audio,
            &paths.prompts,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(paths)
    }

    pub fn script_json(&self) -> PathBuf {
        self.outputs.join("step1_script.json")
    }

    /// Raw model response for the script stage, persisted before parsing
    /// so malformed output stays inspectable.
    pub fn script_raw_json(&self) -> PathBuf {
        self.outputs.join("step1_script_raw.json")
    }

    pub fn assets_json(&self) -> PathBuf {
        self.outputs.join("step2_assets.json")
    }

    /// Raw model response for one segment's asset planning, persisted
    /// before parsing so malformed output stays inspectable.
    pub fn segment_raw_json(&self, segment_index: usize) -> PathBuf {
        self.outputs
            .join(format!("step2_segment{segment_index}_raw.json"))
    }

    pub fn slides_json(&self) -> PathBuf {
        self.outputs.join("step4_slides.json")
    }

    /// Raw model response for one segment's slide layout.
    pub fn layout_segment_raw_json(&self, segment_index: usize) -> PathBuf {
        self.outputs
            .join(format!("step4_segment{segment_index}_raw.json"))
    }

    pub fn input_summary(&self) -> PathBuf {
        self.outputs.join("input_summary.txt")
    }

    pub fn image_png(&self, id: &AssetId) -> PathBuf {
        self.images.join(format!("{id}.png"))
    }

    pub fn no_bg_png(&self, id: &AssetId) -> PathBuf {
        self.no_bg.join(format!("{id}_nobg.png"))
    }

    pub fn slide_png(&self, segment_index: usize) -> PathBuf {
        self.slides.join(format!("slide_{segment_index}.png"))
    }

    /// Audio output path without an extension; the synthesis tier that
    /// produces the waveform appends its own.
    pub fn audio_stem(&self, segment_index: usize) -> PathBuf {
        self.audio.join(format!("segment_{segment_index}"))
    }

    pub fn final_video(&self) -> PathBuf {
        self.root.join("final_video.mp4")
    }

    pub fn metadata_json(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    pub fn error_json(&self) -> PathBuf {
        self.root.join("error.json")
    }
}

/// Make a trial id safe to use as a directory name: everything outside
/// `[A-Za-z0-9._-]` becomes an underscore, and ids that sanitize to
/// nothing (or to a relative-path component) become `"trial"`.
fn sanitize_trial_id(trial_id: &str) -> String {
    let safe: String = trial_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.is_empty() || safe == "." || safe == ".." {
        "trial".to_string()
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_builds_full_tree() {
        let root = tempdir().unwrap();
        let paths = RunPaths::create(
            root.path(),
            "NCT01234567",
            RunId::from_string("20250314_092653"),
        )
        .unwrap();

        assert!(paths.outputs.is_dir());
        assert!(paths.no_bg.is_dir());
        assert!(paths.slides.is_dir());
        assert!(paths.audio.is_dir());
        assert!(paths.prompts.is_dir());
        assert!(paths.root.ends_with("NCT01234567/20250314_092653"));
    }

    #[test]
    fn test_same_run_id_gets_disambiguated() {
        let root = tempdir().unwrap();
        let id = RunId::from_string("20250314_092653");

        let first = RunPaths::create(root.path(), "NCT01234567", id.clone()).unwrap();
        let second = RunPaths::create(root.path(), "NCT01234567", id).unwrap();

        assert_ne!(first.root, second.root);
        assert!(second
            .run_id
            .as_str()
            .starts_with("20250314_092653_"));
    }

    #[test]
    fn test_trial_id_is_sanitized() {
        assert_eq!(sanitize_trial_id("NCT 123/456"), "NCT_123_456");
        assert_eq!(sanitize_trial_id("nct-01.b_2"), "nct-01.b_2");
        assert_eq!(sanitize_trial_id(".."), "trial");
        assert_eq!(sanitize_trial_id(""), "trial");
    }

    #[test]
    fn test_artifact_paths_land_in_their_directories() {
        let root = tempdir().unwrap();
        let paths = RunPaths::create(
            root.path(),
            "NCT01234567",
            RunId::from_string("20250314_092653"),
        )
        .unwrap();

        assert!(paths.script_json().ends_with("outputs/step1_script.json"));
        assert!(paths.script_raw_json().ends_with("outputs/step1_script_raw.json"));
        assert!(paths.segment_raw_json(2).ends_with("outputs/step2_segment2_raw.json"));
        assert!(paths.layout_segment_raw_json(1).ends_with("outputs/step4_segment1_raw.json"));
        assert!(paths
            .image_png(&AssetId::from_string("pill"))
            .ends_with("images/pill.png"));
        assert!(paths
            .no_bg_png(&AssetId::from_string("pill"))
            .ends_with("images/no_bg/pill_nobg.png"));
        assert!(paths.slide_png(0).ends_with("slides/slide_0.png"));
        assert!(paths.audio_stem(3).ends_with("audio/segment_3"));
        assert!(paths.final_video().ends_with("final_video.mp4"));
    }
}
