//! Slide layout plans and the rasterized frames built from them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::script::Segment;

/// Layout family for one slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlideLayout {
    /// One image fills the frame with minimal text overlay.
    FullBleed,
    /// Text and key statistics on the left, imagery on the right.
    #[default]
    Split,
}

/// Placement of one image within a slide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePlacement {
    /// Asset name as referenced by the layout model; resolved against
    /// generated images by fuzzy match at render time.
    #[serde(alias = "name")]
    pub image_name: String,

    /// Free-form anchor keyword: "center" or combinations of
    /// left/right/top/bottom (e.g. "top_left").
    #[serde(default = "default_position")]
    pub position: String,

    /// Fraction of the frame width the image should occupy.
    #[serde(default = "default_size_ratio")]
    pub size_ratio: f64,
}

fn default_position() -> String {
    "center".to_string()
}

fn default_size_ratio() -> f64 {
    0.4
}

impl ImagePlacement {
    pub fn centered(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            position: default_position(),
            size_ratio: default_size_ratio(),
        }
    }
}

/// Composition instructions for one segment's slide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidePlan {
    /// Index of the segment this slide belongs to.
    pub segment_index: usize,

    /// Heading rendered at the top of the frame.
    pub slide_title: String,

    /// Caption rendered in the bottom band.
    #[serde(default)]
    pub caption: String,

    /// Seconds of visual hold; the narration track can lengthen it.
    pub slide_duration: f64,

    /// Layout family, derived from the segment's asset categories.
    #[serde(default)]
    pub layout: SlideLayout,

    /// Images to composite, in paint order.
    #[serde(default)]
    pub images: Vec<ImagePlacement>,
}

impl SlidePlan {
    /// Plan used when the layout stage returns nothing usable for a
    /// segment: title/caption lifted from the segment, duration from the
    /// narration estimate, no imagery.
    pub fn fallback_for(segment: &Segment) -> Self {
        Self {
            segment_index: segment.index,
            slide_title: segment.section_title.clone(),
            caption: segment.educational_goal.clone(),
            slide_duration: segment.estimated_duration_secs(),
            layout: SlideLayout::default(),
            images: Vec::new(),
        }
    }
}

/// A rasterized frame corresponding 1:1 to a [`SlidePlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    pub segment_index: usize,

    /// PNG location inside the run directory.
    pub path: PathBuf,

    /// Visual hold carried over from the plan.
    pub planned_duration: f64,

    /// True when rendering failed and a blank frame was substituted.
    #[serde(default)]
    pub is_blank: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_plan_lifts_segment_fields() {
        let seg = Segment {
            index: 3,
            section_title: "Visit Schedule".to_string(),
            narration: "You will visit the clinic every four weeks for checkups.".to_string(),
            image_description: "calendar with marked dates".to_string(),
            educational_goal: "know how often visits happen".to_string(),
        };
        let plan = SlidePlan::fallback_for(&seg);
        assert_eq!(plan.segment_index, 3);
        assert_eq!(plan.slide_title, "Visit Schedule");
        assert_eq!(plan.caption, "know how often visits happen");
        assert_eq!(plan.slide_duration, 5.0);
        assert!(plan.images.is_empty());
    }

    #[test]
    fn test_placement_defaults_on_deserialize() {
        let json = r#"{"image_name": "calendar"}"#;
        let p: ImagePlacement = serde_json::from_str(json).unwrap();
        assert_eq!(p.position, "center");
        assert_eq!(p.size_ratio, 0.4);
    }
}
