//! Slide compositing via FFmpeg.
//!
//! Each SlidePlan becomes one 1920x1080 PNG: a solid background, scaled
//! image overlays, and drawtext rows for title, caption, and statistic
//! call-outs. Two modes exist. Full-bleed covers the frame with the
//! first image (mechanism and biology visuals). Split puts narration
//! text and extracted statistics in the left column and anchors images
//! to the right.
//!
//! Rendering a slide must never abort a run: any failure logs a warning
//! and substitutes a blank slide carrying only the title.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use trialreel_models::{GeneratedImage, Slide, SlideLayout, SlidePlan};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::text::{escape_drawtext, extract_stats, find_font, fit_text};

/// Frame width in pixels.
pub const SLIDE_WIDTH: u32 = 1920;
/// Frame height in pixels.
pub const SLIDE_HEIGHT: u32 = 1080;
/// Background color for every slide.
pub const SLIDE_BACKGROUND: &str = "0x2d3436";

const TITLE_SIZE: u32 = 64;
const TITLE_MIN_SIZE: u32 = 36;
const TITLE_Y: u32 = 40;
const CAPTION_SIZE: u32 = 42;
const CAPTION_MIN_SIZE: u32 = 24;
const STAT_SIZE: u32 = 48;
const MARGIN: u32 = 50;
const COLUMN_X: u32 = 90;
const COLUMN_WIDTH: u32 = 820;
const MAX_STATS: usize = 3;

const CAPTION_BOX: &str = ":box=1:boxcolor=black@0.7:boxborderw=12";
const STAT_BOX: &str = ":box=1:boxcolor=0x0984e3@0.85:boxborderw=16";

/// A scaled image placed onto the frame.
#[derive(Debug, Clone)]
struct Overlay {
    source: PathBuf,
    width: u32,
    height: u32,
    x: i64,
    y: i64,
}

/// One drawtext row of the filter graph.
#[derive(Debug, Clone)]
struct TextRow {
    text: String,
    font_size: u32,
    /// drawtext x expression ("(w-text_w)/2" or a pixel column)
    x: String,
    y: u32,
    boxed: Option<&'static str>,
    shadow: bool,
}

/// Seam for rasterizing slide plans into frames.
#[async_trait]
pub trait SlideCompositor: Send + Sync {
    /// Render one slide for `plan`, resolving image names against `pool`.
    async fn render(
        &self,
        plan: &SlidePlan,
        narration: &str,
        pool: &[GeneratedImage],
        out_path: &Path,
    ) -> MediaResult<Slide>;
}

/// Renders SlidePlans to PNG frames.
pub struct SlideRenderer {
    font: Option<PathBuf>,
    timeout_secs: u64,
}

impl Default for SlideRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideRenderer {
    /// Create a renderer, discovering a font from the environment.
    pub fn new() -> Self {
        let font = find_font();
        if font.is_none() {
            warn!("No slide font found, text overlays will be skipped");
        }
        Self {
            font,
            timeout_secs: 120,
        }
    }

    /// Use a specific font file.
    pub fn with_font(mut self, font: impl Into<PathBuf>) -> Self {
        self.font = Some(font.into());
        self
    }

    /// Set the per-slide FFmpeg timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    async fn render_plan(
        &self,
        plan: &SlidePlan,
        narration: &str,
        pool: &[GeneratedImage],
        out_path: &Path,
    ) -> MediaResult<()> {
        let overlays = self.collect_overlays(plan, pool);
        if overlays.is_empty() && !plan.images.is_empty() {
            info!(
                "Slide {}: no requested image resolved, rendering text-only layout",
                plan.segment_index
            );
        }

        let texts = self.collect_texts(plan, narration, !overlays.is_empty());
        let graph = build_filtergraph(&overlays, &texts, self.font.as_deref());

        let mut cmd = FfmpegCommand::new(out_path).lavfi(format!(
            "color=c={}:s={}x{}:d=1",
            SLIDE_BACKGROUND, SLIDE_WIDTH, SLIDE_HEIGHT
        ));
        for overlay in &overlays {
            cmd = cmd.input(&overlay.source);
        }
        cmd = cmd
            .filter_complex(graph)
            .output_args(["-map", "[vout]"])
            .frames(1);

        FfmpegRunner::new()
            .with_timeout(self.timeout_secs)
            .run(&cmd)
            .await
    }

    /// Background and title only.
    async fn render_blank(&self, plan: &SlidePlan, out_path: &Path) -> MediaResult<()> {
        let texts = self.title_rows(&plan.slide_title);
        let graph = build_filtergraph(&[], &texts, self.font.as_deref());

        let cmd = FfmpegCommand::new(out_path)
            .lavfi(format!(
                "color=c={}:s={}x{}:d=1",
                SLIDE_BACKGROUND, SLIDE_WIDTH, SLIDE_HEIGHT
            ))
            .filter_complex(graph)
            .output_args(["-map", "[vout]"])
            .frames(1);

        FfmpegRunner::new()
            .with_timeout(self.timeout_secs)
            .run(&cmd)
            .await
    }

    /// Resolve the plan's image placements against the generated pool.
    fn collect_overlays(&self, plan: &SlidePlan, pool: &[GeneratedImage]) -> Vec<Overlay> {
        let mut overlays = Vec::new();

        for placement in &plan.images {
            let Some(image) = resolve_image(&placement.image_name, pool) else {
                warn!(
                    "Slide {}: no generated image matches '{}'",
                    plan.segment_index, placement.image_name
                );
                continue;
            };

            let source = image.display_path().to_path_buf();
            let (src_w, src_h) = match image::image_dimensions(&source) {
                Ok(dims) => dims,
                Err(e) => {
                    warn!(
                        "Slide {}: cannot read {} ({}), skipping placement",
                        plan.segment_index,
                        source.display(),
                        e
                    );
                    continue;
                }
            };
            if src_w == 0 || src_h == 0 {
                continue;
            }

            if plan.layout == SlideLayout::FullBleed {
                // Full-bleed uses a single covering image.
                let (width, height, x, y) = cover_geometry(src_w, src_h);
                overlays.push(Overlay {
                    source,
                    width,
                    height,
                    x,
                    y,
                });
                break;
            }

            let (width, height) = scaled_size(src_w, src_h, placement.size_ratio);
            let position = split_position(&placement.position, plan.layout);
            let (x, y) = anchored_position(&position, width, height);
            overlays.push(Overlay {
                source,
                width,
                height,
                x,
                y,
            });
        }

        overlays
    }

    fn title_rows(&self, title: &str) -> Vec<TextRow> {
        if title.trim().is_empty() {
            return Vec::new();
        }

        let fitted = fit_text(title, SLIDE_WIDTH - 2 * MARGIN, 160, TITLE_SIZE, TITLE_MIN_SIZE);
        fitted
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| TextRow {
                text: line.clone(),
                font_size: fitted.font_size,
                x: "(w-text_w)/2".to_string(),
                y: TITLE_Y + i as u32 * fitted.line_height,
                boxed: None,
                shadow: true,
            })
            .collect()
    }

    /// Title, caption, and (split mode) statistic call-outs.
    fn collect_texts(&self, plan: &SlidePlan, narration: &str, has_image: bool) -> Vec<TextRow> {
        let mut rows = self.title_rows(&plan.slide_title);

        let split = plan.layout == SlideLayout::Split || !has_image;
        if split {
            // Left column: caption first, statistics beneath it.
            let caption_width = if has_image {
                COLUMN_WIDTH
            } else {
                SLIDE_WIDTH - 2 * COLUMN_X
            };
            let fitted = fit_text(&plan.caption, caption_width, 380, CAPTION_SIZE, CAPTION_MIN_SIZE);
            let mut y = 240;
            for line in &fitted.lines {
                rows.push(TextRow {
                    text: line.clone(),
                    font_size: fitted.font_size,
                    x: COLUMN_X.to_string(),
                    y,
                    boxed: None,
                    shadow: false,
                });
                y += fitted.line_height;
            }

            y += 60;
            for stat in extract_stats(narration, MAX_STATS) {
                rows.push(TextRow {
                    text: stat,
                    font_size: STAT_SIZE,
                    x: COLUMN_X.to_string(),
                    y,
                    boxed: Some(STAT_BOX),
                    shadow: false,
                });
                y += STAT_SIZE + 36;
            }
        } else if !plan.caption.trim().is_empty() {
            // Full-bleed: caption band along the bottom.
            let fitted = fit_text(
                &plan.caption,
                SLIDE_WIDTH - 2 * MARGIN,
                260,
                CAPTION_SIZE,
                CAPTION_MIN_SIZE,
            );
            let base = SLIDE_HEIGHT - 100 - fitted.block_height();
            for (i, line) in fitted.lines.iter().enumerate() {
                rows.push(TextRow {
                    text: line.clone(),
                    font_size: fitted.font_size,
                    x: "(w-text_w)/2".to_string(),
                    y: base + i as u32 * fitted.line_height,
                    boxed: Some(CAPTION_BOX),
                    shadow: false,
                });
            }
        }

        rows
    }
}

#[async_trait]
impl SlideCompositor for SlideRenderer {
    /// Render one slide, substituting a blank slide on failure.
    async fn render(
        &self,
        plan: &SlidePlan,
        narration: &str,
        pool: &[GeneratedImage],
        out_path: &Path,
    ) -> MediaResult<Slide> {
        match self.render_plan(plan, narration, pool, out_path).await {
            Ok(()) => {
                debug!("Rendered slide {} to {}", plan.segment_index, out_path.display());
                Ok(Slide {
                    segment_index: plan.segment_index,
                    path: out_path.to_path_buf(),
                    planned_duration: plan.slide_duration,
                    is_blank: false,
                })
            }
            Err(e) => {
                warn!(
                    "Slide {} render failed ({}), substituting a blank slide",
                    plan.segment_index, e
                );
                self.render_blank(plan, out_path).await?;
                Ok(Slide {
                    segment_index: plan.segment_index,
                    path: out_path.to_path_buf(),
                    planned_duration: plan.slide_duration,
                    is_blank: true,
                })
            }
        }
    }
}

/// In split mode, unpositioned images belong to the right column.
fn split_position(position: &str, layout: SlideLayout) -> String {
    if layout == SlideLayout::Split && position.eq_ignore_ascii_case("center") {
        "right".to_string()
    } else {
        position.to_string()
    }
}

/// Map a placement keyword to pixel coordinates for a w x h overlay.
///
/// Axes are independent substring checks, so "top-left" and
/// "bottom right" both work; anything unrecognized centers.
fn anchored_position(position: &str, w: u32, h: u32) -> (i64, i64) {
    let position = position.to_lowercase();
    // Signed math: an overlay taller than the frame overhangs with a
    // negative offset instead of underflowing.
    let (frame_w, frame_h) = (SLIDE_WIDTH as i64, SLIDE_HEIGHT as i64);
    let (w, h) = (w as i64, h as i64);

    let x = if position.contains("left") {
        MARGIN as i64
    } else if position.contains("right") {
        frame_w - w - MARGIN as i64
    } else {
        (frame_w - w) / 2
    };

    let y = if position.contains("top") {
        100
    } else if position.contains("bottom") {
        frame_h - h - 100
    } else {
        (frame_h - h) / 2
    };

    (x, y)
}

/// Scale to `ratio` of the frame width, preserving aspect.
fn scaled_size(src_w: u32, src_h: u32, ratio: f64) -> (u32, u32) {
    let ratio = ratio.clamp(0.1, 1.0);
    let width = (SLIDE_WIDTH as f64 * ratio).round() as u32;
    let height = ((width as u64 * src_h as u64) / src_w as u64) as u32;
    (width.max(1), height.max(1))
}

/// Scale to cover the whole frame, centered, overflow clipped.
fn cover_geometry(src_w: u32, src_h: u32) -> (u32, u32, i64, i64) {
    let scale = f64::max(
        SLIDE_WIDTH as f64 / src_w as f64,
        SLIDE_HEIGHT as f64 / src_h as f64,
    );
    let width = (src_w as f64 * scale).ceil() as u32;
    let height = (src_h as f64 * scale).ceil() as u32;
    let x = (SLIDE_WIDTH as i64 - width as i64) / 2;
    let y = (SLIDE_HEIGHT as i64 - height as i64) / 2;
    (width, height, x, y)
}

/// Find the generated image a plan refers to.
///
/// Layout output rarely repeats asset ids byte for byte, so matching
/// runs through widening tiers: exact stem, case-insensitive,
/// `_nobg`-stripped, separator-normalized, substring containment, and
/// finally word overlap of at least half the requested words.
pub fn resolve_image<'a>(requested: &str, pool: &'a [GeneratedImage]) -> Option<&'a GeneratedImage> {
    let requested = strip_extension(requested);
    if requested.is_empty() {
        return None;
    }

    let keys: Vec<(Vec<String>, &GeneratedImage)> = pool
        .iter()
        .map(|img| {
            let mut names = vec![img.asset_id.as_str().to_string()];
            if let Some(stem) = img.path.file_stem().and_then(|s| s.to_str()) {
                if stem != img.asset_id.as_str() {
                    names.push(stem.to_string());
                }
            }
            (names, img)
        })
        .collect();

    // Exact, then case-insensitive.
    for (names, img) in &keys {
        if names.iter().any(|n| n == requested) {
            return Some(img);
        }
    }
    for (names, img) in &keys {
        if names.iter().any(|n| n.eq_ignore_ascii_case(requested)) {
            return Some(img);
        }
    }

    // `_nobg` variants on either side.
    let requested_base = strip_nobg(requested);
    for (names, img) in &keys {
        if names
            .iter()
            .any(|n| strip_nobg(n).eq_ignore_ascii_case(requested_base))
        {
            return Some(img);
        }
    }

    // Separators removed entirely.
    let requested_norm = normalize(requested);
    for (names, img) in &keys {
        if names.iter().any(|n| normalize(n) == requested_norm) {
            return Some(img);
        }
    }

    // Substring containment, both directions.
    if requested_norm.len() >= 4 {
        for (names, img) in &keys {
            if names.iter().any(|n| {
                let norm = normalize(n);
                norm.len() >= 4 && (norm.contains(&requested_norm) || requested_norm.contains(&norm))
            }) {
                return Some(img);
            }
        }
    }

    // Word overlap.
    let requested_words = word_set(requested);
    if requested_words.is_empty() {
        return None;
    }
    for (names, img) in &keys {
        for name in names {
            let candidate_words = word_set(name);
            let shared = requested_words
                .iter()
                .filter(|w| candidate_words.contains(*w))
                .count();
            if shared * 2 >= requested_words.len() {
                return Some(img);
            }
        }
    }

    None
}

fn strip_extension(name: &str) -> &str {
    let name = name.trim();
    for ext in [".png", ".jpg", ".jpeg", ".webp"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            return stripped;
        }
    }
    name
}

fn strip_nobg(name: &str) -> &str {
    name.strip_suffix("_nobg").unwrap_or(name)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn word_set(name: &str) -> Vec<String> {
    let mut words: Vec<String> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect();
    words.sort();
    words.dedup();
    words
}

/// Assemble the full filter graph string.
fn build_filtergraph(overlays: &[Overlay], texts: &[TextRow], font: Option<&Path>) -> String {
    let mut chains: Vec<String> = Vec::new();
    let mut last = "0:v".to_string();

    for (i, overlay) in overlays.iter().enumerate() {
        chains.push(format!(
            "[{}:v]scale={}:{}[img{}]",
            i + 1,
            overlay.width,
            overlay.height,
            i
        ));
        let next = format!("v{}", i);
        chains.push(format!(
            "[{}][img{}]overlay={}:{}[{}]",
            last, i, overlay.x, overlay.y, next
        ));
        last = next;
    }

    let draws: Vec<String> = match font {
        Some(font) if !texts.is_empty() => {
            texts.iter().map(|row| drawtext_filter(font, row)).collect()
        }
        _ => Vec::new(),
    };

    if draws.is_empty() {
        chains.push(format!("[{}]null[vout]", last));
    } else {
        chains.push(format!("[{}]{}[vout]", last, draws.join(",")));
    }

    chains.join(";")
}

fn drawtext_filter(font: &Path, row: &TextRow) -> String {
    let mut filter = format!(
        "drawtext=fontfile='{}':text='{}':fontsize={}:fontcolor=white:x={}:y={}",
        font.display(),
        escape_drawtext(&row.text),
        row.font_size,
        row.x,
        row.y
    );
    if row.shadow {
        filter.push_str(":shadowcolor=black:shadowx=2:shadowy=2");
    }
    if let Some(spec) = row.boxed {
        filter.push_str(spec);
    }
    filter
}
