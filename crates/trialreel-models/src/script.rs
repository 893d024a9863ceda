//! Narration script models produced by the script-synthesis stage.

use serde::{Deserialize, Serialize};

/// Complete narration script for one trial video.
///
/// Produced once per run by the text-generation stage and immutable
/// afterward; every later stage reads from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Short, patient-friendly video title.
    pub video_title: String,

    /// One or two welcoming intro sentences.
    pub video_intro: String,

    /// Ordered narration segments.
    pub segments: Vec<Segment>,
}

/// One scripted chunk of narration with its visual intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Position within the script (0-based). Assigned after parsing;
    /// generation models do not emit it.
    #[serde(default)]
    pub index: usize,

    /// Short on-screen heading, ideally 3-6 words.
    pub section_title: String,

    /// Spoken narration text.
    pub narration: String,

    /// What the accompanying visual should show.
    pub image_description: String,

    /// What the viewer should take away from this segment.
    pub educational_goal: String,
}

/// Outcome of structural script validation.
///
/// `problems` are contract violations that fail the run; `warnings` are
/// logged but tolerated (e.g., an over-long section title).
#[derive(Debug, Clone, Default)]
pub struct ScriptValidation {
    pub problems: Vec<String>,
    pub warnings: Vec<String>,
}

impl ScriptValidation {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

impl Script {
    /// Check the structural contract: non-empty title/intro, at least one
    /// segment, and all four text fields present on every segment.
    pub fn validate(&self) -> ScriptValidation {
        let mut v = ScriptValidation::default();

        if self.video_title.trim().is_empty() {
            v.problems.push("video_title is empty".to_string());
        }
        if self.video_intro.trim().is_empty() {
            v.problems.push("video_intro is empty".to_string());
        }
        if self.segments.is_empty() {
            v.problems.push("script has no segments".to_string());
        }

        for (i, seg) in self.segments.iter().enumerate() {
            for (field, value) in [
                ("section_title", &seg.section_title),
                ("narration", &seg.narration),
                ("image_description", &seg.image_description),
                ("educational_goal", &seg.educational_goal),
            ] {
                if value.trim().is_empty() {
                    v.problems.push(format!("segment {i}: {field} is empty"));
                }
            }
            if seg.section_title.split_whitespace().count() > 10 {
                v.warnings
                    .push(format!("segment {i}: section_title longer than 10 words"));
            }
        }

        v
    }

    /// Total narration word count across all segments.
    pub fn word_count(&self) -> usize {
        self.segments.iter().map(Segment::word_count).sum()
    }
}

impl Segment {
    /// Narration word count.
    pub fn word_count(&self) -> usize {
        self.narration.split_whitespace().count()
    }

    /// Default visual hold for this segment when the layout stage does not
    /// specify one: half a second per narrated word, clamped to 5-12s.
    pub fn estimated_duration_secs(&self) -> f64 {
        (self.word_count() / 2).clamp(5, 12) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(narration: &str) -> Segment {
        Segment {
            index: 0,
            section_title: "What This Trial Tests".to_string(),
            narration: narration.to_string(),
            image_description: "a researcher holding a vial".to_string(),
            educational_goal: "understand the trial purpose".to_string(),
        }
    }

    fn script() -> Script {
        Script {
            video_title: "Understanding the BT-401 Study".to_string(),
            video_intro: "Welcome! Let's walk through this study together.".to_string(),
            segments: vec![segment("This study looks at a new tablet taken once a day.")],
        }
    }

    #[test]
    fn test_valid_script_passes() {
        let v = script().validate();
        assert!(v.is_valid());
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn test_empty_narration_is_a_problem() {
        let mut s = script();
        s.segments[0].narration = "  ".to_string();
        let v = s.validate();
        assert!(!v.is_valid());
        assert!(v.problems[0].contains("narration"));
    }

    #[test]
    fn test_no_segments_is_a_problem() {
        let mut s = script();
        s.segments.clear();
        assert!(!s.validate().is_valid());
    }

    #[test]
    fn test_long_section_title_is_only_a_warning() {
        let mut s = script();
        s.segments[0].section_title =
            "a very long heading that keeps going well past ten words total".to_string();
        let v = s.validate();
        assert!(v.is_valid());
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn test_estimated_duration_clamps() {
        assert_eq!(segment("short one").estimated_duration_secs(), 5.0);

        let sixteen = "word ".repeat(16);
        assert_eq!(segment(&sixteen).estimated_duration_secs(), 8.0);

        let long = "word ".repeat(80);
        assert_eq!(segment(&long).estimated_duration_secs(), 12.0);
    }

    #[test]
    fn test_segment_index_defaults_on_deserialize() {
        let json = r#"{
            "section_title": "Who Can Join",
            "narration": "Adults aged 18 to 65 may be eligible.",
            "image_description": "diverse group of adults",
            "educational_goal": "know the age range"
        }"#;
        let seg: Segment = serde_json::from_str(json).unwrap();
        assert_eq!(seg.index, 0);
    }
}
