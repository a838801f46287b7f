//! Best-effort place metadata extraction from noisy document text.
//!
//! Each heuristic is an independent strategy; a chain tries them in order
//! until one produces a value. Extraction never fails — the chain bottoms
//! out at a literal "no information" marker.

use crate::analyzer::{CATEGORY_GROUPS, DISTRICTS};
use crate::types::Document;
use std::sync::LazyLock;

/// Placeholder for fields no heuristic could fill.
pub const UNKNOWN: &str = "정보 없음";

static ADDRESS_LABEL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?:위치|주소|address|location)\s*[:：]\s*([^\n]+)")
        .expect("address label regex is valid")
});
static NAME_LABEL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?:이름|장소명|상호|title|name)\s*[:：]\s*([^\n]+)")
        .expect("name label regex is valid")
});
static BOLD_ITEM_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\*\*\s*\d+\.\s*\[?([^\]\n*]+?)\]?\s*\*\*")
        .expect("bold item regex is valid")
});
static EVENT_ITEM_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"🎯\s*\[?([^\]\n]+?)\]?\s*$").expect("event item regex is valid"));

/// One extraction heuristic. Returns `None` when it has nothing to say,
/// handing over to the next strategy in the chain.
pub trait Extract: Send + Sync {
    fn extract(&self, doc: &Document) -> Option<String>;
}

/// Ordered strategy chain with a literal fallback.
pub struct Chain {
    steps: Vec<Box<dyn Extract>>,
}

impl Chain {
    pub fn new(steps: Vec<Box<dyn Extract>>) -> Self {
        Self { steps }
    }

    pub fn extract(&self, doc: &Document) -> String {
        self.steps
            .iter()
            .find_map(|step| step.extract(doc))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Display-name chain: metadata title → labeled line → first text line.
    pub fn name() -> Self {
        Self::new(vec![
            Box::new(MetadataTitle),
            Box::new(LabeledLine(&NAME_LABEL_RE)),
            Box::new(FirstLine),
        ])
    }

    /// Address chain: metadata address/location → labeled line →
    /// district-anchored search.
    pub fn address() -> Self {
        Self::new(vec![
            Box::new(MetadataAddress),
            Box::new(LabeledLine(&ADDRESS_LABEL_RE)),
            Box::new(DistrictAnchor),
        ])
    }
}

struct MetadataTitle;

impl Extract for MetadataTitle {
    fn extract(&self, doc: &Document) -> Option<String> {
        doc.metadata
            .title
            .as_deref()
            .filter(|t| !t.is_empty() && *t != "None")
            .map(String::from)
    }
}

struct MetadataAddress;

impl Extract for MetadataAddress {
    fn extract(&self, doc: &Document) -> Option<String> {
        if !doc.metadata.address.is_empty() {
            return Some(doc.metadata.address.clone());
        }
        if !doc.metadata.location.is_empty() {
            return Some(doc.metadata.location.clone());
        }
        None
    }
}

struct LabeledLine(&'static LazyLock<regex::Regex>);

impl Extract for LabeledLine {
    fn extract(&self, doc: &Document) -> Option<String> {
        self.0
            .captures(&doc.text)
            .map(|c| c[1].trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Fall back to the district name the text mentions — an approximate area
/// is better than nothing for the prompt.
struct DistrictAnchor;

impl Extract for DistrictAnchor {
    fn extract(&self, doc: &Document) -> Option<String> {
        for district in DISTRICTS {
            let short = district.trim_start_matches("서울 ");
            if doc.text.contains(district) || doc.text.contains(short) {
                return Some(district.to_string());
            }
        }
        None
    }
}

struct FirstLine;

impl Extract for FirstLine {
    fn extract(&self, doc: &Document) -> Option<String> {
        let line = doc.text.lines().map(str::trim).find(|l| !l.is_empty())?;
        let name: String = line.chars().take(40).collect();
        Some(name)
    }
}

/// Category: explicit metadata first, else the first category group with a
/// keyword in the text.
pub fn extract_category(doc: &Document) -> String {
    if let Some(category) = doc.metadata.category.as_deref().filter(|c| !c.is_empty()) {
        return category.to_string();
    }
    let lower = doc.text.to_lowercase();
    for (category, keywords) in CATEGORY_GROUPS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return category.to_string();
        }
    }
    UNKNOWN.to_string()
}

pub fn extract_link(doc: &Document) -> String {
    doc.metadata
        .url
        .as_deref()
        .filter(|u| !u.is_empty() && *u != "None")
        .map(String::from)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Place names the generated answer mentions, in order of appearance.
/// Matches the bolded numbered items of the general template and the 🎯
/// headers of the event template; bracket tags like
/// "[네이버 검색 결과 - 장소명]" lose their source prefix.
pub fn scan_answer_places(answer: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut names = Vec::new();

    let candidates = BOLD_ITEM_RE
        .captures_iter(answer)
        .map(|c| c[1].to_string())
        .chain(
            answer
                .lines()
                .filter_map(|line| EVENT_ITEM_RE.captures(line).map(|c| c[1].to_string())),
        );

    for raw in candidates {
        let name = raw
            .rsplit(" - ")
            .next()
            .unwrap_or(raw.as_str())
            .trim()
            .to_string();
        if !name.is_empty() && seen.insert(name.clone()) {
            names.push(name);
        }
    }
    names
}
