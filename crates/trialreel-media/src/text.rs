//! Text measurement and drawtext helpers for slide rendering.
//!
//! FFmpeg's drawtext centers text exactly (`x=(w-text_w)/2`), but wrap
//! and shrink decisions have to happen before the filter graph is built.
//! Line breaks are computed here with an average-advance estimate per
//! glyph, which is close enough for caption-length strings.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Average glyph advance as a fraction of the font size.
///
/// Measured against DejaVu Sans Bold; slightly wide so wraps err on
/// the early side rather than overflowing the frame.
const GLYPH_ADVANCE_RATIO: f64 = 0.58;

/// Extra pixels between wrapped lines.
const LINE_GAP: u32 = 8;

/// Font files probed when `SLIDE_FONT` is unset.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
];

/// A wrapped text block with the font size that made it fit.
#[derive(Debug, Clone)]
pub struct FittedText {
    pub font_size: u32,
    pub lines: Vec<String>,
    pub line_height: u32,
}

impl FittedText {
    /// Total height of the block in pixels.
    pub fn block_height(&self) -> u32 {
        self.lines.len() as u32 * self.line_height
    }
}

/// Locate a usable font file.
///
/// `SLIDE_FONT` wins when set and present; otherwise the first existing
/// candidate is used. `None` means text overlays are skipped entirely.
pub fn find_font() -> Option<PathBuf> {
    if let Ok(configured) = std::env::var("SLIDE_FONT") {
        let path = PathBuf::from(&configured);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("SLIDE_FONT set to {} but the file does not exist", configured);
    }

    FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Estimated rendered width of `text` at `font_size`, in pixels.
pub fn estimated_width(text: &str, font_size: u32) -> f64 {
    text.chars().count() as f64 * font_size as f64 * GLYPH_ADVANCE_RATIO
}

/// Greedy word wrap against an estimated pixel width.
///
/// A single word wider than the limit gets its own line rather than
/// being split mid-word.
pub fn wrap_lines(text: &str, max_width_px: u32, font_size: u32) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if estimated_width(&candidate, font_size) <= max_width_px as f64 || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Wrap `text` into a bounding box, stepping the font size down until
/// both the longest line and the block height fit.
///
/// At `min_size` the block is truncated to the lines that fit, with an
/// ellipsis on the last kept line.
pub fn fit_text(
    text: &str,
    max_width_px: u32,
    max_height_px: u32,
    start_size: u32,
    min_size: u32,
) -> FittedText {
    let mut size = start_size.max(min_size);

    loop {
        let lines = wrap_lines(text, max_width_px, size);
        let line_height = size + LINE_GAP;
        let widest = lines
            .iter()
            .map(|l| estimated_width(l, size))
            .fold(0.0, f64::max);
        let height = lines.len() as u32 * line_height;

        if widest <= max_width_px as f64 && height <= max_height_px {
            return FittedText {
                font_size: size,
                lines,
                line_height,
            };
        }

        if size <= min_size {
            let capacity = (max_height_px / line_height).max(1) as usize;
            let mut kept: Vec<String> = lines.into_iter().take(capacity).collect();
            if let Some(last) = kept.last_mut() {
                if !last.ends_with('…') {
                    last.push('…');
                }
            }
            return FittedText {
                font_size: size,
                lines: kept,
                line_height,
            };
        }

        size = size.saturating_sub(2).max(min_size);
    }
}

/// Escape text for a single-quoted drawtext `text` value.
///
/// Inside the quoted value only `'` and `\` need care at the filter
/// level; `%{` would still trigger drawtext expansion, so it is escaped
/// as well.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("'\\''"),
            _ => out.push(ch),
        }
    }
    out.replace("%{", "\\%{")
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?\s*%").unwrap())
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b\d+(?:\s*[–-]\s*\d+)?\s*(?:weeks?|months?|years?|days?)\b").unwrap()
    })
}

fn count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b\d[\d,]*\s*(?:participants?|patients?|adults?|people|subjects?|volunteers?)\b")
            .unwrap()
    })
}

/// Scan narration text for call-out statistics.
///
/// Matches percentages (`38%`), durations (`48 weeks`, `2-4 months`),
/// and enrollment counts (`120 participants`), returned in text order
/// and capped at `max`.
pub fn extract_stats(text: &str, max: usize) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for re in [percent_re(), duration_re(), count_re()] {
        for m in re.find_iter(text) {
            found.push((m.start(), m.as_str().trim().to_string()));
        }
    }

    found.sort_by_key(|(start, _)| *start);

    let mut stats: Vec<String> = Vec::new();
    for (_, value) in found {
        if !stats.contains(&value) {
            stats.push(value);
        }
        if stats.len() == max {
            break;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_splits_on_words() {
        let lines = wrap_lines("one two three four five six seven eight", 300, 42);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(estimated_width(line, 42) <= 300.0 || !line.contains(' '));
        }
    }

    #[test]
    fn test_wrap_keeps_overlong_word_whole() {
        let lines = wrap_lines("pharmacokinetically short", 100, 42);
        assert_eq!(lines[0], "pharmacokinetically");
    }

    #[test]
    fn test_fit_shrinks_until_block_fits() {
        let text = "This treatment reduced symptom scores substantially across every \
                    prespecified subgroup of the enrolled population";
        let fitted = fit_text(text, 800, 200, 42, 22);
        assert!(fitted.font_size <= 42);
        assert!(fitted.block_height() <= 200);
    }

    #[test]
    fn test_fit_truncates_at_min_size() {
        let text = "word ".repeat(400);
        let fitted = fit_text(&text, 400, 120, 30, 24);
        assert_eq!(fitted.font_size, 24);
        assert!(fitted.block_height() <= 120 + fitted.line_height);
        assert!(fitted.lines.last().unwrap().ends_with('…'));
    }

    #[test]
    fn test_escape_drawtext_quotes_and_expansion() {
        assert_eq!(escape_drawtext("Bob's trial"), "Bob'\\''s trial");
        assert_eq!(escape_drawtext(r"a\b"), r"a\\b");
        assert_eq!(escape_drawtext("50% vs %{n}"), "50% vs \\%{n}");
    }

    #[test]
    fn test_extract_stats_in_text_order() {
        let text = "Of 120 participants, 38% improved within 12 weeks, and 5% withdrew.";
        let stats = extract_stats(text, 3);
        assert_eq!(stats, vec!["120 participants", "38%", "12 weeks"]);
    }

    #[test]
    fn test_extract_stats_dedupes_and_caps() {
        let text = "38% at week 12, 38% at week 24, 40% overall, 41% sustained, over 6 months";
        let stats = extract_stats(text, 3);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0], "38%");
        assert_eq!(stats[1], "40%");
    }
}
