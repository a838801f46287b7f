//! Query analysis: maps a raw question to structured filters.
//!
//! Pure substring matching against fixed lookup tables — deterministic,
//! total, and side-effect free. Unmatched input yields all-empty filters.

use crate::types::QueryFilters;
use std::sync::LazyLock;

/// Seoul administrative districts, long form. Short form is the same name
/// without the city prefix.
pub const DISTRICTS: [&str; 25] = [
    "서울 종로구",
    "서울 중구",
    "서울 용산구",
    "서울 성동구",
    "서울 광진구",
    "서울 동대문구",
    "서울 중랑구",
    "서울 성북구",
    "서울 강북구",
    "서울 도봉구",
    "서울 노원구",
    "서울 은평구",
    "서울 서대문구",
    "서울 마포구",
    "서울 양천구",
    "서울 강서구",
    "서울 구로구",
    "서울 금천구",
    "서울 영등포구",
    "서울 동작구",
    "서울 관악구",
    "서울 서초구",
    "서울 강남구",
    "서울 송파구",
    "서울 강동구",
];

/// Category keyword groups, first match wins.
pub const CATEGORY_GROUPS: [(&str, &[&str]); 5] = [
    ("카페", &["카페", "커피", "브런치", "디저트"]),
    ("맛집", &["맛집", "음식점", "식당", "레스토랑", "맛있는"]),
    ("공연", &["공연", "연극", "뮤지컬", "오페라"]),
    ("전시", &["전시", "전시회", "갤러리", "미술관"]),
    ("콘서트", &["콘서트", "공연장", "라이브", "음악"]),
];

/// Categories whose presence marks the question as an event query.
pub const EVENT_GROUPS: [(&str, &[&str]); 3] = [
    ("전시", &["전시", "전시회", "갤러리", "미술관"]),
    ("공연", &["공연", "연극", "뮤지컬", "오페라"]),
    ("콘서트", &["콘서트", "라이브", "공연장"]),
];

/// Minor-intent keyword groups used to bias ranking toward non-mainstream
/// recommendations.
pub const MINOR_GROUPS: [(&str, &[&str]); 3] = [
    (
        "숨은",
        &[
            "숨은",
            "숨겨진",
            "알려지지 않은",
            "비밀",
            "히든",
            "hidden",
            "secret",
            "잘 모르는",
            "남들이 모르는",
            "나만 아는",
            "나만 알고 있는",
            "붐비지 않는",
            "한적한",
        ],
    ),
    (
        "우연",
        &[
            "우연히",
            "우연한",
            "우연히 발견한",
            "우연히 알게 된",
            "우연히 찾은",
            "우연히 방문한",
            "우연히 가게 된",
        ],
    ),
    (
        "로컬",
        &["로컬", "현지인", "주민", "동네", "단골", "local", "근처", "주변"],
    ),
];

/// The restaurant category gets a lexical-heavy weight profile.
pub const RESTAURANT_CATEGORY: &str = "맛집";

static TOKEN_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[\w\d가-힣]+").expect("token regex is valid"));

/// Lowercase word/hangul tokens, shared by the analyzer and BM25 scoring.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extract the long-form district name mentioned in the question, if any.
/// Long form is checked first so "서울 마포구" does not resolve via the
/// bare "마포구" path.
pub fn extract_district(question: &str) -> Option<String> {
    for district in DISTRICTS {
        if question.contains(district) {
            return Some(district.to_string());
        }
    }
    for district in DISTRICTS {
        let short = district.trim_start_matches("서울 ");
        if question.contains(short) {
            return Some(district.to_string());
        }
    }
    None
}

/// First category group with any keyword present in the question.
pub fn extract_category(question: &str) -> Option<String> {
    let lower = question.to_lowercase();
    for (category, keywords) in CATEGORY_GROUPS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(category.to_string());
        }
    }
    None
}

/// Keyword list for a category name, for downstream filtering.
pub fn category_keywords(category: &str) -> Option<&'static [&'static str]> {
    CATEGORY_GROUPS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, keywords)| *keywords)
}

/// All minor-intent groups matched by the text.
pub fn extract_minor_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    MINOR_GROUPS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(group, _)| group.to_string())
        .collect()
}

fn is_event_query(question: &str) -> bool {
    let lower = question.to_lowercase();
    EVENT_GROUPS
        .iter()
        .any(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
}

/// Analyze one question. Event classification runs before category
/// extraction because it changes downstream filtering behavior.
pub fn analyze(question: &str) -> QueryFilters {
    let question = question.trim();
    if question.is_empty() {
        return QueryFilters::default();
    }

    let is_event = is_event_query(question);
    let category = extract_category(question);
    let district = extract_district(question);
    let minor_tags = extract_minor_tags(question).into_iter().collect();

    let filters = QueryFilters {
        category,
        district,
        minor_tags,
        is_event,
    };
    tracing::debug!(
        category = ?filters.category,
        district = ?filters.district,
        minor_tags = ?filters.minor_tags,
        is_event = filters.is_event,
        "query analyzed"
    );
    filters
}
