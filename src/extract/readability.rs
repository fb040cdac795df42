//! Readability-style candidate scoring.
//!
//! Paragraph-bearing elements contribute their text length to their parent
//! (and half to their grandparent); the candidate with the best
//! density-adjusted score wins. Link-heavy blocks (navigation, related-story
//! boxes) score low because anchor text is discounted via link density.

use scraper::{ElementRef, Html, Selector};

use crate::util::collapse_whitespace;

/// Elements whose subtrees never contribute paragraphs: page chrome and
/// machine content.
const SKIPPED_CONTAINERS: &[&str] = &[
    "nav", "header", "footer", "aside", "form", "script", "style", "noscript", "template",
];

/// Class/id fragments that mark likely article containers
const POSITIVE_HINTS: &[&str] = &[
    "article", "body", "content", "entry", "main", "page", "post", "story", "text",
];

/// Class/id fragments that mark boilerplate
const NEGATIVE_HINTS: &[&str] = &[
    "comment", "sidebar", "share", "social", "widget", "promo", "sponsor", "advert", "related",
    "footer", "nav", "masthead",
];

pub(crate) struct ScoreOptions {
    /// Paragraphs shorter than this (in collapsed chars) are ignored
    pub min_paragraph_chars: usize,
    /// Whether class/id hints bias the candidate score
    pub use_class_hints: bool,
}

impl ScoreOptions {
    pub(crate) fn primary() -> Self {
        Self {
            min_paragraph_chars: 25,
            use_class_hints: true,
        }
    }

    /// Relaxed pass: accept shorter passages and ignore markup hints, for
    /// pages whose structure defeats the primary heuristics.
    pub(crate) fn relaxed() -> Self {
        Self {
            min_paragraph_chars: 10,
            use_class_hints: false,
        }
    }
}

/// Return the serialized HTML of the best-scoring content block, or `None`
/// when no paragraph cleared the threshold.
pub(crate) fn best_candidate_html(document: &Html, opts: &ScoreOptions) -> Option<String> {
    let paragraph_sel =
        Selector::parse("p, pre, td, blockquote").expect("static selector");

    // Accumulate paragraph scores onto parent/grandparent candidates.
    // Candidate identity is the node id; the list stays small enough that a
    // linear scan beats a map.
    let mut candidates: Vec<(ElementRef, f64)> = Vec::new();

    for para in document.select(&paragraph_sel) {
        if in_skipped_region(&para) {
            continue;
        }
        let text = element_text(&para);
        let chars = text.chars().count();
        if chars < opts.min_paragraph_chars {
            continue;
        }
        let score = chars as f64;

        if let Some(parent) = para.parent().and_then(ElementRef::wrap) {
            bump(&mut candidates, parent, score);
            if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap) {
                bump(&mut candidates, grandparent, score / 2.0);
            }
        }
    }

    let mut best: Option<(ElementRef, f64)> = None;
    for (el, base) in candidates {
        if el.value().name() == "html" {
            continue;
        }
        let mut score = base * (1.0 - link_density(&el));
        if opts.use_class_hints {
            score *= hint_multiplier(&el);
        }
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((el, score));
        }
    }

    best.map(|(el, _)| el.html())
}

fn bump<'a>(candidates: &mut Vec<(ElementRef<'a>, f64)>, el: ElementRef<'a>, score: f64) {
    for (existing, total) in candidates.iter_mut() {
        if existing.id() == el.id() {
            *total += score;
            return;
        }
    }
    candidates.push((el, score));
}

fn in_skipped_region(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| SKIPPED_CONTAINERS.contains(&a.value().name()))
}

fn element_text(el: &ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Fraction of the block's text that sits inside anchors
fn link_density(el: &ElementRef) -> f64 {
    let total = element_text(el).chars().count();
    if total == 0 {
        return 1.0;
    }
    let anchor_sel = Selector::parse("a").expect("static selector");
    let linked: usize = el
        .select(&anchor_sel)
        .map(|a| element_text(&a).chars().count())
        .sum();
    (linked.min(total) as f64) / (total as f64)
}

fn hint_multiplier(el: &ElementRef) -> f64 {
    let mut hints = String::new();
    if let Some(class) = el.value().attr("class") {
        hints.push_str(&class.to_ascii_lowercase());
    }
    hints.push(' ');
    if let Some(id) = el.value().attr("id") {
        hints.push_str(&id.to_ascii_lowercase());
    }

    let mut multiplier = 1.0;
    if POSITIVE_HINTS.iter().any(|h| hints.contains(h)) {
        multiplier *= 1.5;
    }
    if NEGATIVE_HINTS.iter().any(|h| hints.contains(h)) {
        multiplier *= 0.5;
    }
    multiplier
}
