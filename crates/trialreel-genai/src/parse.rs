//! Robust parsing of model output into pipeline data types.
//!
//! Generation models wrap JSON in markdown fences, lead with prose, or nest
//! lists under surprise keys. Parsing here tolerates all of that; a failure
//! after extraction means the output really is malformed.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use trialreel_models::{
    AssetCategory, AssetId, AssetSpec, ImagePlacement, Script, Segment, SlideLayout, SlidePlan,
};

use crate::error::{GenAiError, GenAiResult};

fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    let t = t.strip_prefix("```json").unwrap_or(t);
    let t = t.strip_prefix("```").unwrap_or(t);
    let t = t.strip_suffix("```").unwrap_or(t);
    t.trim()
}

/// Extract the first JSON value from model text.
///
/// Tries a direct parse, then the outermost `{...}` / `[...]` span in order
/// of appearance.
pub fn extract_json(text: &str) -> GenAiResult<Value> {
    let cleaned = strip_fences(text);

    if let Ok(v) = serde_json::from_str(cleaned) {
        return Ok(v);
    }

    let mut spans: Vec<(usize, usize)> = Vec::new();
    if let (Some(s), Some(e)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if s < e {
            spans.push((s, e));
        }
    }
    if let (Some(s), Some(e)) = (cleaned.find('['), cleaned.rfind(']')) {
        if s < e {
            spans.push((s, e));
        }
    }
    spans.sort_by_key(|&(s, _)| s);

    for (s, e) in spans {
        if let Ok(v) = serde_json::from_str(&cleaned[s..=e]) {
            return Ok(v);
        }
    }

    Err(GenAiError::malformed_output(
        "no JSON value found in model output",
    ))
}

/// Parse the script stage's output and assign segment indices.
pub fn parse_script(raw: &str) -> GenAiResult<Script> {
    let value = extract_json(raw)?;
    let mut script: Script = serde_json::from_value(value)
        .map_err(|e| GenAiError::malformed_output(format!("script JSON shape: {e}")))?;
    for (i, seg) in script.segments.iter_mut().enumerate() {
        seg.index = i;
    }
    Ok(script)
}

#[derive(Debug, Deserialize)]
struct AssetWire {
    name: String,
    style: String,
    purpose: String,
    prompt: String,
    #[serde(default)]
    category: Option<String>,
}

/// Pull the asset list out of the parsed value, tolerating the nesting
/// patterns models actually produce: a bare list,
/// `{"segments": [{"visual_assets": [...]}]}`, `{"visual_assets": [...]}`,
/// or `{"assets": [...]}`.
fn asset_entries(value: Value) -> GenAiResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            if let Some(Value::Array(segments)) = map.get("segments") {
                if let Some(Value::Object(first)) = segments.first() {
                    if let Some(Value::Array(items)) = first.get("visual_assets") {
                        info!("Extracted assets from nested segments[0].visual_assets");
                        return Ok(items.clone());
                    }
                }
            }
            if let Some(Value::Array(items)) = map.get("visual_assets") {
                info!("Extracted assets from visual_assets key");
                return Ok(items.clone());
            }
            if let Some(Value::Array(items)) = map.get("assets") {
                info!("Extracted assets from assets key");
                return Ok(items.clone());
            }
            Err(GenAiError::malformed_output(
                "asset output is an object with no recognizable asset list",
            ))
        }
        other => Err(GenAiError::malformed_output(format!(
            "asset output is not a list or object: {other}"
        ))),
    }
}

/// Parse one segment's asset-planning output into specs.
///
/// `used_ids` spans the whole run so a repeated asset name gets a numeric
/// suffix instead of overwriting an earlier image.
pub fn parse_assets(
    raw: &str,
    segment_index: usize,
    used_ids: &mut HashSet<String>,
) -> GenAiResult<Vec<AssetSpec>> {
    let value = extract_json(raw)?;
    let entries = asset_entries(value)?;

    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let wire: AssetWire = serde_json::from_value(entry).map_err(|e| {
            GenAiError::malformed_output(format!("segment {segment_index} asset shape: {e}"))
        })?;

        let prompt = if wire.prompt.trim().is_empty() {
            wire.name.clone()
        } else {
            wire.prompt
        };

        let mut id = AssetId::from_name(&wire.name);
        if !used_ids.insert(id.as_str().to_string()) {
            let mut n = 2;
            loop {
                let candidate = format!("{}_{}", id.as_str(), n);
                if used_ids.insert(candidate.clone()) {
                    id = AssetId::from_string(candidate);
                    break;
                }
                n += 1;
            }
        }

        let category = wire
            .category
            .as_deref()
            .map(AssetCategory::from_keyword)
            .unwrap_or_default();

        specs.push(AssetSpec {
            id,
            name: wire.name,
            style: wire.style,
            purpose: wire.purpose,
            prompt,
            category,
            segment_index,
        });
    }
    Ok(specs)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlacementWire {
    Named(String),
    Full(ImagePlacement),
}

#[derive(Debug, Deserialize)]
struct SlidePlanWire {
    #[serde(default)]
    slide_title: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    slide_duration: Option<f64>,
    #[serde(default)]
    images: Vec<PlacementWire>,
}

/// Parse one segment's layout output into a plan, filling every missing
/// field from the segment itself. A non-object value falls back to the
/// text-only plan; an unextractable response is an error.
pub fn parse_slide_plan(
    raw: &str,
    segment: &Segment,
    layout: SlideLayout,
) -> GenAiResult<SlidePlan> {
    let mut value = extract_json(raw)?;

    // Some layout responses arrive as {"slides": [{...}]}.
    if let Value::Object(ref map) = value {
        if let Some(Value::Array(slides)) = map.get("slides") {
            if let Some(first) = slides.first() {
                value = first.clone();
            }
        }
    }

    if !value.is_object() {
        debug!(
            segment = segment.index,
            "Layout output is not an object; using fallback plan"
        );
        let mut plan = SlidePlan::fallback_for(segment);
        plan.layout = layout;
        return Ok(plan);
    }

    let wire: SlidePlanWire = serde_json::from_value(value).map_err(|e| {
        GenAiError::malformed_output(format!("segment {} slide shape: {e}", segment.index))
    })?;

    let images = wire
        .images
        .into_iter()
        .map(|p| match p {
            PlacementWire::Named(name) => ImagePlacement::centered(name),
            PlacementWire::Full(p) => p,
        })
        .collect();

    Ok(SlidePlan {
        segment_index: segment.index,
        slide_title: wire
            .slide_title
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| segment.section_title.clone()),
        caption: wire
            .caption
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| segment.educational_goal.clone()),
        slide_duration: wire
            .slide_duration
            .unwrap_or_else(|| segment.estimated_duration_secs()),
        layout,
        images,
    })
}
