//! Markdown reconstruction from annotated recognition text.
//!
//! The recognizer returns a `raw_text` stream where layout regions are
//! wrapped in `<|ref|>`/`<|det|>` tags ([`tags`]). Assembly rewrites that
//! stream into plain Markdown: structural noise labels disappear, detection
//! coordinates are matched back to the recognizer's bounding boxes, and
//! matched regions become image links into the extracted-figure map. The
//! pass is pure: same result plus same image map gives the same Markdown.

pub mod tags;

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::error::AssembleError;
use crate::model::{ImageDims, LabeledBox, RecognitionResult};
use tags::{lex, Segment};

/// Maximum per-coordinate distance for a det quadruple to match a box.
const MATCH_TOLERANCE: f64 = 10.0;

/// Minimum vertical overlap for two figures to render side by side.
const SIDE_BY_SIDE_SLACK: f64 = 10.0;

/// Detection coordinates may arrive on a 0..=1000 normalized axis.
const NORMALIZED_RANGE: f64 = 1000.0;

/// Ref labels that mark layout structure rather than content.
static NOISE_LABELS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "title", "text", "image", "figure", "table", "caption", "header", "footer",
    ]
    .into_iter()
    .collect()
});

// ── content chunks ──────────────────────────────────────────────────────────

/// A run of output Markdown, carrying its source box when it is a figure.
struct Chunk {
    text: String,
    rect: Option<[f64; 4]>,
}

impl Chunk {
    fn text(text: String) -> Self {
        Chunk { text, rect: None }
    }
}

// ── public entry point ──────────────────────────────────────────────────────

/// Rebuild a page's Markdown from its recognition result.
///
/// `image_map` maps a box index (as a decimal string) to the identifier of
/// the image extracted for that box. Matched det regions become inline
/// `![Figure N](scandoc-img:<id>)` links; map entries never referenced by
/// the text are appended under a trailing `## Figures` heading so no
/// extracted image is silently lost.
pub fn assemble(
    result: &RecognitionResult,
    image_map: &HashMap<String, String>,
) -> Result<String, AssembleError> {
    let raw = result
        .raw_text
        .as_deref()
        .ok_or(AssembleError::MissingRawText)?;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut consumed: HashSet<String> = HashSet::new();
    let mut figure = 1usize;

    for segment in lex(raw) {
        match segment {
            Segment::Text(text) => chunks.push(Chunk::text(text)),
            Segment::Ref(inner) => {
                // Structural labels are dropped; real content (captions,
                // headings) is unwrapped in place.
                if !NOISE_LABELS.contains(inner.trim().to_lowercase().as_str()) {
                    chunks.push(Chunk::text(inner));
                }
            }
            Segment::Det(quads) => {
                for quad in quads {
                    let Some(idx) = find_matching_box(quad, &result.boxes, result.image_dims)
                    else {
                        continue;
                    };
                    let key = idx.to_string();
                    let Some(image_id) = image_map.get(&key) else {
                        continue;
                    };
                    consumed.insert(key);
                    chunks.push(Chunk {
                        text: format!("![Figure {figure}](scandoc-img:{image_id})"),
                        rect: Some(result.boxes[idx].rect),
                    });
                    figure += 1;
                }
            }
        }
    }

    let mut out = render(chunks);

    let mut remaining: Vec<&String> = image_map
        .keys()
        .filter(|key| !consumed.contains(key.as_str()))
        .collect();
    if !remaining.is_empty() {
        remaining.sort_by(|a, b| index_order(a, b));
        out.push_str("\n\n## Figures\n");
        for (offset, key) in remaining.iter().enumerate() {
            if offset > 0 {
                out.push('\n');
            }
            out.push_str(&format!("![Figure {figure}](scandoc-img:{})", image_map[*key]));
            figure += 1;
        }
    }

    Ok(out.trim().to_string())
}

// ── box matching ────────────────────────────────────────────────────────────

/// Locate the box a det quadruple refers to.
///
/// The raw coordinates are tried against every box first; only when no box
/// is within tolerance is the normalized interpretation (scaled by the page
/// dimensions) tried. The two hypotheses never mix per coordinate.
fn find_matching_box(target: [f64; 4], boxes: &[LabeledBox], dims: ImageDims) -> Option<usize> {
    let scaled = [
        target[0] / NORMALIZED_RANGE * dims.w,
        target[1] / NORMALIZED_RANGE * dims.h,
        target[2] / NORMALIZED_RANGE * dims.w,
        target[3] / NORMALIZED_RANGE * dims.h,
    ];
    for candidate in [target, scaled] {
        let hit = boxes.iter().position(|b| {
            (0..4).all(|k| (b.rect[k] - candidate[k]).abs() <= MATCH_TOLERANCE)
        });
        if hit.is_some() {
            return hit;
        }
    }
    None
}

// ── rendering ───────────────────────────────────────────────────────────────

/// Flatten chunks to Markdown, pairing vertically-aligned figures into a
/// two-column HTML table.
fn render(chunks: Vec<Chunk>) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < chunks.len() {
        let Some(a) = chunks[i].rect else {
            out.push_str(&chunks[i].text);
            i += 1;
            continue;
        };

        // Whitespace between two figures does not break their adjacency.
        let mut j = i + 1;
        while j < chunks.len()
            && chunks[j].rect.is_none()
            && chunks[j].text.trim().is_empty()
        {
            j += 1;
        }

        if let Some(b) = chunks.get(j).and_then(|c| c.rect) {
            if vertical_overlap(a, b) > SIDE_BY_SIDE_SLACK {
                out.push_str(&side_by_side(&chunks[i].text, a, &chunks[j].text, b));
                i = j + 1;
                continue;
            }
        }

        out.push_str(&chunks[i].text);
        i += 1;
    }
    out
}

fn vertical_overlap(a: [f64; 4], b: [f64; 4]) -> f64 {
    a[3].min(b[3]) - a[1].max(b[1])
}

fn side_by_side(left: &str, a: [f64; 4], right: &str, b: [f64; 4]) -> String {
    let wa = (a[2] - a[0]).max(1.0);
    let wb = (b[2] - b[0]).max(1.0);
    let pa = (wa / (wa + wb) * 100.0).round() as i64;
    let pb = 100 - pa;
    format!(
        "\n<table><tr><td style=\"width: {pa}%\">{left}</td>\
         <td style=\"width: {pb}%\">{right}</td></tr></table>\n"
    )
}

/// Appendix ordering: numeric keys ascending, then the rest lexically.
fn index_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ── tests ───────────────────────────────────────────────────────────────────
