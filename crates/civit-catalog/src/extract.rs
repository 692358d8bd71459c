//! Usage hints scraped from free-form model descriptions.
//!
//! Authors write recommended settings in prose ("Weight: 0.6-0.8",
//! "CFG 7", "Clip skip 2"). The patterns below pick up the common
//! phrasings; anything they miss simply stays `None`.

use std::sync::LazyLock;

use civit_types::Model;
use regex::Regex;
use serde::Serialize;

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*br\s*/?\s*>|</\s*(?:p|div|li|h[1-6]|tr|blockquote)\s*>").unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static TRIGGER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:trigger|activation|trained)\s*(?:words?|tokens?|prompts?|tags?)?\s*[:：]\s*(.+)$")
        .unwrap()
});
static LORA_TAG_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<lora:[^:>]+:(\d+(?:\.\d+)?)>").unwrap());
static WEIGHT_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:weight|strength)\b[^0-9\n]{0,20}(\d+(?:\.\d+)?)\s*(?:-|~|–|to)\s*(\d+(?:\.\d+)?)").unwrap()
});
static WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:weight|strength)\b[^0-9\n]{0,20}(\d+(?:\.\d+)?)").unwrap());
static CFG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcfg(?:\s*scale)?\b[^0-9\n]{0,10}(\d+(?:\.\d+)?)").unwrap());
static STEPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:sampling\s+)?steps?\b[^0-9\n]{0,10}(\d{1,3})\b").unwrap());
static SAMPLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\bsampler(?:\s*name)?\s*[:=]\s*([^,;\n]+)").unwrap());
static CLIP_SKIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bclip\s*skip\b[^0-9\n]{0,10}(\d{1,2})\b").unwrap());

/// Settings recommended by a model's author.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageHints {
    pub trigger_words: Vec<String>,
    pub weight: Option<f32>,
    pub weight_range: Option<(f32, f32)>,
    pub cfg_scale: Option<f32>,
    pub steps: Option<u32>,
    pub sampler: Option<String>,
    pub clip_skip: Option<u32>,
}

impl UsageHints {
    pub fn is_empty(&self) -> bool {
        *self == UsageHints::default()
    }
}

/// Strip markup from a description, one paragraph or list item per line.
pub fn html_to_text(html: &str) -> String {
    let broken = BLOCK_BREAK.replace_all(html, "\n");
    let stripped = TAG.replace_all(&broken, "");
    let decoded = decode_entities(&stripped);
    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Hints from plain text plus any known trained words, which come first.
pub fn extract_from_text(text: &str, trained_words: &[String]) -> UsageHints {
    let mut trigger_words: Vec<String> = Vec::new();
    let mut push = |w: &str| {
        let w = w.trim().trim_matches(|c| c == '"' || c == '`' || c == '\'').trim();
        if !w.is_empty() && !trigger_words.iter().any(|t| t.eq_ignore_ascii_case(w)) {
            trigger_words.push(w.to_owned());
        }
    };
    for w in trained_words {
        push(w);
    }
    for caps in TRIGGER_LINE.captures_iter(text) {
        for w in caps[1].split([',', ';', '|']) {
            push(w);
        }
    }

    let weight_range = WEIGHT_RANGE.captures(text).and_then(|c| {
        let lo: f32 = c[1].parse().ok()?;
        let hi: f32 = c[2].parse().ok()?;
        Some(if lo <= hi { (lo, hi) } else { (hi, lo) })
    });
    let weight = LORA_TAG_WEIGHT
        .captures(text)
        .or_else(|| WEIGHT.captures(text))
        .and_then(|c| c[1].parse().ok())
        .or_else(|| weight_range.map(|(lo, hi)| (lo + hi) / 2.0));

    UsageHints {
        trigger_words,
        weight,
        weight_range,
        cfg_scale: CFG.captures(text).and_then(|c| c[1].parse().ok()),
        steps: STEPS.captures(text).and_then(|c| c[1].parse().ok()),
        sampler: SAMPLER
            .captures(text)
            .map(|c| c[1].trim().to_owned())
            .filter(|s| !s.is_empty()),
        clip_skip: CLIP_SKIP.captures(text).and_then(|c| c[1].parse().ok()),
    }
}

/// Hints for a model: its description and the latest version's notes.
pub fn extract_hints(model: &Model) -> UsageHints {
    let mut text = model.description.as_deref().map(html_to_text).unwrap_or_default();
    if let Some(notes) = model.latest_version().and_then(|v| v.description.as_deref()) {
        text.push('\n');
        text.push_str(&html_to_text(notes));
    }
    extract_from_text(&text, &model.trained_words())
}
