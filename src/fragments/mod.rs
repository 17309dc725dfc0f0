//! Testimony fragments and their classification.
//!
//! A [`Fragment`] is an excerpt of witness or victim testimony tagged with a
//! [`FragmentCategory`]. Only the category and the unusual flag change after
//! creation; content and owning accident are fixed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic category of a testimony fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentCategory {
    /// Observed and established fact.
    VerifiedFact,
    /// Interpretation or judgement of the witness.
    Opinion,
    /// Statement requiring further verification.
    ToVerify,
    /// Anything else, including unrecognized categories.
    #[default]
    #[serde(other)]
    Other,
}

impl FragmentCategory {
    /// Parse a category, falling back to [`FragmentCategory::Other`].
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Get the category name as stored and exchanged.
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentCategory::VerifiedFact => "verified_fact",
            FragmentCategory::Opinion => "opinion",
            FragmentCategory::ToVerify => "to_verify",
            FragmentCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for FragmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FragmentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "verified_fact" => Ok(FragmentCategory::VerifiedFact),
            "opinion" => Ok(FragmentCategory::Opinion),
            "to_verify" => Ok(FragmentCategory::ToVerify),
            "other" => Ok(FragmentCategory::Other),
            _ => Err(format!("Unknown fragment category: {}", s)),
        }
    }
}

/// A classified excerpt of testimony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Unique fragment identifier.
    pub id: String,
    /// Owning accident.
    pub accident_id: String,
    /// Witness who gave the testimony; `None` for the victim.
    pub witness_id: Option<String>,
    /// Excerpt text.
    pub content: String,
    /// Semantic category.
    pub category: FragmentCategory,
    /// Whether the fact departs from usual work conditions.
    pub is_unusual: bool,
    /// When the fragment was recorded.
    pub created_at: DateTime<Utc>,
}

impl Fragment {
    /// Create a fragment for an accident.
    pub fn classify(
        accident_id: impl Into<String>,
        content: impl Into<String>,
        category: FragmentCategory,
        witness_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            accident_id: accident_id.into(),
            witness_id,
            content: content.into(),
            category,
            is_unusual: false,
            created_at: Utc::now(),
        }
    }

    /// Set the unusual flag
    pub fn with_unusual(mut self, is_unusual: bool) -> Self {
        self.is_unusual = is_unusual;
        self
    }

    /// Change the category.
    pub fn reclassify(&mut self, category: FragmentCategory) {
        self.category = category;
    }

    /// Set the unusual flag, leaving the category alone.
    pub fn toggle_unusual(&mut self, flag: bool) {
        self.is_unusual = flag;
    }

    /// Whether this fragment is a verified fact.
    pub fn is_verified_fact(&self) -> bool {
        self.category == FragmentCategory::VerifiedFact
    }
}

/// Caller input for recording a fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentDraft {
    /// Excerpt text.
    pub content: String,
    /// Category; unknown values are read as `other`.
    #[serde(default, alias = "type")]
    pub category: FragmentCategory,
    /// Witness who gave the testimony.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_id: Option<String>,
    /// Unusual flag.
    #[serde(default)]
    pub is_unusual: bool,
}

impl FragmentDraft {
    /// Create a draft with content and category
    pub fn new(content: impl Into<String>, category: FragmentCategory) -> Self {
        Self {
            content: content.into(),
            category,
            witness_id: None,
            is_unusual: false,
        }
    }

    /// Attribute the draft to a witness
    pub fn with_witness(mut self, witness_id: impl Into<String>) -> Self {
        self.witness_id = Some(witness_id.into());
        self
    }

    /// Turn the draft into a fragment of `accident_id`.
    pub fn into_fragment(self, accident_id: &str) -> Fragment {
        Fragment::classify(accident_id, self.content, self.category, self.witness_id)
            .with_unusual(self.is_unusual)
    }
}

/// Fragment counts per category, always recomputed from the fragment set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub verified_fact: usize,
    pub opinion: usize,
    pub to_verify: usize,
    pub other: usize,
    /// Fragments flagged unusual, whatever their category.
    pub unusual: usize,
}

impl CategoryCounts {
    /// Count fragments per category.
    pub fn from_fragments<'a>(fragments: impl IntoIterator<Item = &'a Fragment>) -> Self {
        fragments
            .into_iter()
            .fold(CategoryCounts::default(), |mut counts, fragment| {
                match fragment.category {
                    FragmentCategory::VerifiedFact => counts.verified_fact += 1,
                    FragmentCategory::Opinion => counts.opinion += 1,
                    FragmentCategory::ToVerify => counts.to_verify += 1,
                    FragmentCategory::Other => counts.other += 1,
                }
                if fragment.is_unusual {
                    counts.unusual += 1;
                }
                counts
            })
    }

    /// Total number of fragments counted.
    pub fn total(&self) -> usize {
        self.verified_fact + self.opinion + self.to_verify + self.other
    }
}

/// Contents of the verified facts, in recording order.
pub fn verified_facts(fragments: &[Fragment]) -> Vec<String> {
    fragments
        .iter()
        .filter(|f| f.is_verified_fact())
        .map(|f| f.content.clone())
        .collect()
}
