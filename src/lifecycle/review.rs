//! Cleanup flags assigned while a paper is in `processing`.

use serde::{Deserialize, Serialize};

use super::{PaperId, ReviewPaper};
use crate::models::CanonicalPaper;

/// Metadata a reviewer needs before coding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    Journal,
    PublicationDate,
    Abstract,
    Authors,
}

impl MissingField {
    pub fn label(&self) -> &'static str {
        match self {
            MissingField::Journal => "journal",
            MissingField::PublicationDate => "publication date",
            MissingField::Abstract => "abstract",
            MissingField::Authors => "authors",
        }
    }
}

/// Outcome of the cleanup check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewFlag {
    Clean,
    /// Another paper in the collection has the identical title
    Duplicate { of: PaperId },
    Incomplete { missing: Vec<MissingField> },
}

impl ReviewFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewFlag::Clean => "clean",
            ReviewFlag::Duplicate { .. } => "duplicate",
            ReviewFlag::Incomplete { .. } => "incomplete",
        }
    }

    /// Human-readable reason, `None` for clean papers
    pub fn reason(&self) -> Option<String> {
        match self {
            ReviewFlag::Clean => None,
            ReviewFlag::Duplicate { of } => Some(format!("Potential duplicate of paper ID {}", of)),
            ReviewFlag::Incomplete { missing } => Some(format!(
                "Missing metadata: {}",
                missing
                    .iter()
                    .map(MissingField::label)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// Whether a PDF can be fetched for the paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfStatus {
    Available,
    Missing,
}

impl PdfStatus {
    pub fn of(paper: &CanonicalPaper) -> Self {
        match paper.open_access_url.as_deref() {
            Some(url) if !url.trim().is_empty() => PdfStatus::Available,
            _ => PdfStatus::Missing,
        }
    }
}

fn blank(text: &Option<String>) -> bool {
    text.as_deref().map_or(true, |t| t.trim().is_empty())
}

/// Flag one paper of a collection
///
/// Duplicate takes precedence over incomplete. Missing fields are listed in
/// the order journal, publication date, abstract, authors.
pub fn review_flag(paper: &ReviewPaper, collection: &[ReviewPaper]) -> ReviewFlag {
    if let Some(other) = collection
        .iter()
        .find(|other| other.id != paper.id && other.paper.title == paper.paper.title)
    {
        return ReviewFlag::Duplicate { of: other.id };
    }

    let record = &paper.paper;
    let mut missing = Vec::new();
    if blank(&record.journal) {
        missing.push(MissingField::Journal);
    }
    if record.publication_date.is_none() {
        missing.push(MissingField::PublicationDate);
    }
    if !record.has_abstract() {
        missing.push(MissingField::Abstract);
    }
    if record.has_placeholder_authors() {
        missing.push(MissingField::Authors);
    }

    if missing.is_empty() {
        ReviewFlag::Clean
    } else {
        ReviewFlag::Incomplete { missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, PaperBuilder, ProviderTag};
    use chrono::NaiveDate;

    fn complete(id: PaperId, title: &str) -> ReviewPaper {
        ReviewPaper::imported(
            id,
            PaperBuilder::new(title, ProviderTag::Crossref)
                .authors(vec![Author::new("Ada Lovelace")])
                .journal(Some("Nature".into()))
                .publication_date(NaiveDate::from_ymd_opt(2020, 1, 1))
                .abstract_text(Some("Abstract".into()))
                .build(),
        )
    }

    #[test]
    fn test_clean() {
        let paper = complete(1, "Alpha");
        let collection = vec![paper.clone(), complete(2, "Beta")];
        assert_eq!(review_flag(&paper, &collection), ReviewFlag::Clean);
        assert_eq!(ReviewFlag::Clean.reason(), None);
    }

    #[test]
    fn test_duplicate_wins_over_incomplete() {
        let mut first = complete(1, "Same title");
        first.paper.journal = None;
        let second = complete(2, "Same title");
        let collection = vec![first.clone(), second];

        let flag = review_flag(&first, &collection);
        assert_eq!(flag, ReviewFlag::Duplicate { of: 2 });
        assert_eq!(flag.reason().as_deref(), Some("Potential duplicate of paper ID 2"));
    }

    #[test]
    fn test_incomplete_lists_fields_in_order() {
        let paper = ReviewPaper::imported(3, PaperBuilder::new("Bare", ProviderTag::Exa).build());
        let flag = review_flag(&paper, std::slice::from_ref(&paper));

        assert_eq!(flag.as_str(), "incomplete");
        assert_eq!(
            flag.reason().as_deref(),
            Some("Missing metadata: journal, publication date, abstract, authors")
        );
        assert_eq!(paper.pdf_status(), PdfStatus::Missing);
    }
}
