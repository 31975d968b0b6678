//! Deduplication of standardized papers across providers.

use std::collections::HashMap;

use crate::models::CanonicalPaper;
use crate::utils::normalize_doi;

/// Key a paper is grouped under: its DOI when present, else its lower-cased title
///
/// Records with neither a DOI nor a real title get no key and are never
/// grouped with anything.
pub fn dedup_key(paper: &CanonicalPaper) -> Option<String> {
    if let Some(doi) = paper.doi.as_deref().and_then(normalize_doi) {
        return Some(format!("doi:{}", doi));
    }
    let title = paper.title.trim();
    if title.is_empty() || paper.has_placeholder_title() {
        return None;
    }
    Some(format!("title:{}", title.to_lowercase()))
}

/// Whether `candidate` should replace `current` as a group's representative
///
/// Higher relevance wins; then having an abstract; then having any citations.
/// A full tie keeps the record seen first.
fn beats(candidate: &CanonicalPaper, current: &CanonicalPaper) -> bool {
    if candidate.score() != current.score() {
        return candidate.score() > current.score();
    }
    if candidate.has_abstract() != current.has_abstract() {
        return candidate.has_abstract();
    }
    (candidate.citation_count > 0) && current.citation_count == 0
}

/// Collapse duplicates, keeping one representative per group
///
/// Output order is the first-seen order of each group, so the result only
/// depends on the input order through the final full-tie rule.
pub fn deduplicate_papers(papers: Vec<CanonicalPaper>) -> Vec<CanonicalPaper> {
    let mut slots: Vec<CanonicalPaper> = Vec::with_capacity(papers.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for paper in papers {
        let Some(key) = dedup_key(&paper) else {
            slots.push(paper);
            continue;
        };
        match index.get(&key) {
            Some(&slot) => {
                if beats(&paper, &slots[slot]) {
                    slots[slot] = paper;
                }
            }
            None => {
                index.insert(key, slots.len());
                slots.push(paper);
            }
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperBuilder, ProviderTag};

    fn paper(title: &str, doi: Option<&str>, source: ProviderTag) -> CanonicalPaper {
        PaperBuilder::new(title, source)
            .doi(doi.map(String::from))
            .build()
    }

    fn scored(mut p: CanonicalPaper, score: u32) -> CanonicalPaper {
        p.relevance_score = Some(score);
        p
    }

    #[test]
    fn test_deduplicate_by_doi_keeps_higher_score() {
        let papers = vec![
            scored(paper("Paper A", Some("10.1234/test"), ProviderTag::Crossref), 2),
            scored(
                paper("Paper A (preprint)", Some("10.1234/TEST"), ProviderTag::OpenAlex),
                5,
            ),
        ];

        let result = deduplicate_papers(papers);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].score(), 5);
        assert_eq!(result[0].source_provider, ProviderTag::OpenAlex);
    }

    #[test]
    fn test_deduplicate_by_doi_ignores_resolver_prefix() {
        let papers = vec![
            paper("X", Some("https://doi.org/10.1/abc"), ProviderTag::Crossref),
            paper("X", Some("10.1/abc"), ProviderTag::Scopus),
        ];
        assert_eq!(deduplicate_papers(papers).len(), 1);
    }

    #[test]
    fn test_deduplicate_by_title() {
        let papers = vec![
            paper("Machine Learning for Everyone", None, ProviderTag::Exa),
            paper("machine learning for everyone", None, ProviderTag::SemanticScholar),
        ];

        let result = deduplicate_papers(papers);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source_provider, ProviderTag::Exa);
    }

    #[test]
    fn test_title_match_does_not_merge_different_dois() {
        let papers = vec![
            paper("Same Title", Some("10.1/a"), ProviderTag::Crossref),
            paper("Same Title", Some("10.1/b"), ProviderTag::OpenAlex),
        ];
        assert_eq!(deduplicate_papers(papers).len(), 2);
    }

    #[test]
    fn test_tie_prefers_abstract_then_citations() {
        let bare = paper("T", Some("10.1/t"), ProviderTag::Crossref);
        let mut cited = paper("T", Some("10.1/t"), ProviderTag::Scopus);
        cited.citation_count = 12;
        let mut with_abstract = paper("T", Some("10.1/t"), ProviderTag::OpenAlex);
        with_abstract.r#abstract = Some("Text".to_string());

        let result = deduplicate_papers(vec![bare.clone(), cited.clone(), with_abstract]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source_provider, ProviderTag::OpenAlex);

        let result = deduplicate_papers(vec![bare, cited]);
        assert_eq!(result[0].source_provider, ProviderTag::Scopus);
    }

    #[test]
    fn test_full_tie_keeps_first_seen() {
        let papers = vec![
            paper("T", Some("10.1/t"), ProviderTag::Scopus),
            paper("T", Some("10.1/t"), ProviderTag::Crossref),
        ];
        let result = deduplicate_papers(papers);
        assert_eq!(result[0].source_provider, ProviderTag::Scopus);
    }

    #[test]
    fn test_untitled_records_without_doi_stay_separate() {
        let papers = vec![
            paper("", None, ProviderTag::Exa),
            paper("", None, ProviderTag::Crossref),
            paper("", None, ProviderTag::Scopus),
        ];

        assert_eq!(dedup_key(&papers[0]), None);
        let result = deduplicate_papers(papers);
        assert_eq!(result.len(), 3);
        assert_eq!(result[2].source_provider, ProviderTag::Scopus);
    }

    #[test]
    fn test_untitled_records_sharing_doi_still_merge() {
        let papers = vec![
            paper("", Some("10.1/u"), ProviderTag::Exa),
            paper("", Some("10.1/U"), ProviderTag::Crossref),
        ];
        assert_eq!(deduplicate_papers(papers).len(), 1);
    }

    #[test]
    fn test_deduplicate_empty_list() {
        assert!(deduplicate_papers(Vec::new()).is_empty());
    }
}
