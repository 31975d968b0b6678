//! Term-overlap relevance scoring.

use crate::models::CanonicalPaper;

const TITLE_WEIGHT: u32 = 3;
const ABSTRACT_WEIGHT: u32 = 1;
const JOURNAL_WEIGHT: u32 = 1;
const KEYWORD_WEIGHT: u32 = 2;

/// Split a query into case-folded whitespace terms
pub fn query_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

/// Score a paper against already case-folded query terms
///
/// Each term earns 3 for a title hit, 1 for an abstract hit, 1 for a journal
/// hit and 2 when any keyword contains it. Matching is case-insensitive
/// substring containment.
pub fn score(paper: &CanonicalPaper, terms: &[String]) -> u32 {
    let title = paper.title.to_lowercase();
    let abstract_text = paper.r#abstract.as_deref().unwrap_or_default().to_lowercase();
    let journal = paper.journal.as_deref().unwrap_or_default().to_lowercase();
    let keywords: Vec<String> = paper.keywords.iter().map(|k| k.to_lowercase()).collect();

    terms
        .iter()
        .filter(|term| !term.is_empty())
        .map(|term| {
            let term = term.as_str();
            let mut points = 0;
            if title.contains(term) {
                points += TITLE_WEIGHT;
            }
            if abstract_text.contains(term) {
                points += ABSTRACT_WEIGHT;
            }
            if journal.contains(term) {
                points += JOURNAL_WEIGHT;
            }
            if keywords.iter().any(|k| k.contains(term)) {
                points += KEYWORD_WEIGHT;
            }
            points
        })
        .sum()
}

/// Set `relevance_score` on every paper
pub fn score_all(papers: &mut [CanonicalPaper], terms: &[String]) {
    for paper in papers.iter_mut() {
        paper.relevance_score = Some(score(paper, terms));
    }
}
