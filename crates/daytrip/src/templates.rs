//! Prompt templates and context formatting for answer generation.
//!
//! Two layouts: general questions ask for six recommendations (three from
//! the live local search, three from the corpus), event questions ask for
//! three. Markup/emoji in the templates is presentation carried through to
//! the transport as-is.

use crate::extract::{self, Chain};
use crate::types::{PlaceResult, ScoredDocument};

pub const SYSTEM_PROMPT: &str = "\
당신은 한국어로 응답하는 여행 및 맛집 추천 전문가입니다.
사용자의 질문과 검색 결과를 바탕으로 가장 적합한 장소 또는 이벤트를 추천해주세요.
각 추천에는 장소 이름, 주소, 특징, 그리고 추천 이유를 포함해주세요.
모든 응답은 한국어로 작성해야 합니다.

응답 형식 규칙:
1. 제목이나 중요한 부분은 \"**텍스트**\" 형식으로 굵게 표시합니다.
2. 각 항목은 명확히 구분되어야 합니다.
3. 이모티콘을 적절히 사용하여 가독성을 높입니다.
4. 장소 목록은 번호를 붙여 구분합니다.";

const GENERAL_TEMPLATE: &str = "\
질문: {question}

내부 검색 결과:
{context}

네이버 검색 결과:
{places}
{exclusions}
위 정보를 바탕으로 유용하고 상세한 답변을 한국어로 제공해주세요.

중요: 반드시 두 검색 결과를 모두 활용하여 총 6개의 추천 장소를 제공하세요.
네이버 검색 결과에서 3개, 내부 검색 결과에서 3개를 선택해 각각 상세히 설명해주세요.

다음 형식으로 작성해주세요:

**✨ 안녕하세요!** 질문에 대한 답변입니다.

**🔍 종합 추천 의견:**
(전체적인 추천 장소들의 특징을 비교하며 설명)

**📍 추천 장소 목록:**

**1. [네이버 검색 결과 - 장소명]**
- 위치: [정확한 주소]
- 특징:
  • [특징 1]
  • [특징 2]
- 추천 이유: [질문자의 요구사항과 어떻게 부합하는지]

(2~3번은 네이버 검색 결과, 4~6번은 내부 검색 결과로 같은 형식을 반복)

**💡 추가 팁:**
[방문 시 알아두면 좋을 정보]";

const EVENT_TEMPLATE: &str = "\
질문: {question}

검색된 이벤트 정보:
{context}
{exclusions}
위 정보를 바탕으로 질문자의 요구사항에 맞는 이벤트 3개를 추천해주세요.
각 이벤트는 다음 형식으로 상세히 설명해주세요:

**💡 종합 추천 의견**
[추천 이벤트들의 특징을 질문자의 목적에 적합한 순서대로 설명]

===== 추천 이벤트 목록 =====

🎯 [이벤트명]
📍 위치: [정확한 주소]
⏰ 기간: [진행 기간]
🏷️ 주요 특징:
- [특징 1]
- [특징 2]
💫 추천 이유: [질문자의 요구사항과 어떻게 부합하는지]
👥 추천 관람객: [누구와 함께 가면 좋을지]";

/// Fallback when generation comes back empty.
pub fn apology(question: &str) -> String {
    format!(
        "죄송합니다, '{}'에 대한 정보를 찾을 수 없습니다. 다른 질문이나 다른 지역에 대해 물어봐주시겠어요?",
        question
    )
}

/// Fallback when generation fails outright.
pub const GENERATION_ERROR_APOLOGY: &str =
    "죄송합니다, 요청을 처리하는 중에 문제가 발생했습니다. 잠시 후 다시 시도해주세요.";

/// Per-document context block with best-effort extracted fields.
pub fn format_documents(docs: &[ScoredDocument]) -> String {
    if docs.is_empty() {
        return "관련 문서를 찾지 못했습니다.".to_string();
    }
    let name_chain = Chain::name();
    let address_chain = Chain::address();

    let mut out = String::from("=== 내부 검색 결과 ===\n");
    for (i, item) in docs.iter().enumerate() {
        let doc = &item.doc;
        let snippet: String = doc.text.chars().take(150).collect();
        let ellipsis = if doc.text.chars().count() > 150 { "..." } else { "" };
        out.push_str(&format!(
            "\n{}. {}\n   📍 위치: {}\n   🏷️ 분류: {}\n   📝 설명: {}{}\n   🔍 URL: {}\n",
            i + 1,
            name_chain.extract(doc),
            address_chain.extract(doc),
            extract::extract_category(doc),
            snippet,
            ellipsis,
            extract::extract_link(doc),
        ));
    }
    out
}

pub fn format_places(places: &[PlaceResult]) -> String {
    if places.is_empty() {
        return "네이버 검색 결과가 없습니다.".to_string();
    }
    let mut out = String::from("=== 네이버 검색 결과 ===\n");
    for (i, place) in places.iter().enumerate() {
        let address: &str = if !place.road_address.is_empty() {
            &place.road_address
        } else if !place.address.is_empty() {
            &place.address
        } else {
            extract::UNKNOWN
        };
        let link: &str = if place.link.is_empty() { "N/A" } else { &place.link };
        out.push_str(&format!(
            "\n{}. {}\n   📍 주소: {}\n   🏷️ 분류: {}\n   🔍 링크: {}\n",
            i + 1,
            place.title,
            address,
            place.category,
            link,
        ));
    }
    out
}

fn format_exclusions(excluded_names: &[String]) -> String {
    if excluded_names.is_empty() {
        return String::new();
    }
    format!(
        "\n이미 추천했던 장소이므로 다시 추천하지 마세요: {}\n",
        excluded_names.join(", ")
    )
}

/// User prompt for a general question: 6 recommendations, 3 + 3.
pub fn general_prompt(
    question: &str,
    docs: &[ScoredDocument],
    places: &[PlaceResult],
    excluded_names: &[String],
) -> String {
    GENERAL_TEMPLATE
        .replace("{question}", question)
        .replace("{context}", &format_documents(docs))
        .replace("{places}", &format_places(places))
        .replace("{exclusions}", &format_exclusions(excluded_names))
}

/// User prompt for an event question: 3 recommendations, corpus only.
pub fn event_prompt(question: &str, docs: &[ScoredDocument], excluded_names: &[String]) -> String {
    EVENT_TEMPLATE
        .replace("{question}", question)
        .replace("{context}", &format_documents(docs))
        .replace("{exclusions}", &format_exclusions(excluded_names))
}
