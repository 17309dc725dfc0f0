//! Material evidence catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to an uploaded file backing a piece of evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_name: String,
    pub file_url: String,
}

/// A material evidence item collected for an accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialEvidence {
    /// Unique evidence identifier.
    pub id: String,
    /// Owning accident.
    pub accident_id: String,
    /// What the evidence is.
    pub description: String,
    /// Whether the evidence helps the analysis.
    pub is_useful: bool,
    /// Optional attached file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<FileRef>,
    /// When the evidence was catalogued.
    pub created_at: DateTime<Utc>,
}

impl MaterialEvidence {
    /// Create a new evidence item
    pub fn new(accident_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            accident_id: accident_id.into(),
            description: description.into(),
            is_useful: false,
            file_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Set usefulness
    pub fn with_useful(mut self, is_useful: bool) -> Self {
        self.is_useful = is_useful;
        self
    }

    /// Attach a file
    pub fn with_file(mut self, file_ref: FileRef) -> Self {
        self.file_ref = Some(file_ref);
        self
    }

    /// Merge a partial update.
    pub fn apply(&mut self, update: EvidenceUpdate) {
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(is_useful) = update.is_useful {
            self.is_useful = is_useful;
        }
        if let Some(file_ref) = update.file_ref {
            self.file_ref = Some(file_ref);
        }
    }
}

/// Caller input for cataloguing evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceDraft {
    pub description: String,
    #[serde(default)]
    pub is_useful: bool,
    #[serde(default)]
    pub file_ref: Option<FileRef>,
}

impl EvidenceDraft {
    /// Turn the draft into evidence of `accident_id`.
    pub fn into_evidence(self, accident_id: &str) -> MaterialEvidence {
        let evidence = MaterialEvidence::new(accident_id, self.description).with_useful(self.is_useful);
        match self.file_ref {
            Some(file_ref) => evidence.with_file(file_ref),
            None => evidence,
        }
    }
}

/// Partial update of an evidence item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_useful: Option<bool>,
    #[serde(default)]
    pub file_ref: Option<FileRef>,
}

/// Number of evidence items flagged useful.
pub fn useful_count(evidence: &[MaterialEvidence]) -> usize {
    evidence.iter().filter(|e| e.is_useful).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_evidence_is_not_useful() {
        let evidence = MaterialEvidence::new("acc-1", "Échelle cassée");
        assert!(!evidence.is_useful);
        assert!(evidence.file_ref.is_none());
    }

    #[test]
    fn test_apply_merges_only_given_fields() {
        let mut evidence = MaterialEvidence::new("acc-1", "Échelle cassée").with_useful(true);
        evidence.apply(EvidenceUpdate {
            file_ref: Some(FileRef {
                file_name: "echelle.jpg".to_string(),
                file_url: "/files/echelle.jpg".to_string(),
            }),
            ..Default::default()
        });

        assert_eq!(evidence.description, "Échelle cassée");
        assert!(evidence.is_useful);
        assert_eq!(evidence.file_ref.unwrap().file_name, "echelle.jpg");
    }

    #[test]
    fn test_useful_count() {
        let evidence = vec![
            MaterialEvidence::new("a", "1").with_useful(true),
            MaterialEvidence::new("a", "2"),
            MaterialEvidence::new("a", "3").with_useful(true),
        ];
        assert_eq!(useful_count(&evidence), 2);
    }

    #[test]
    fn test_draft_into_evidence() {
        let draft: EvidenceDraft =
            serde_json::from_str(r#"{"description": "Chaussures usées", "is_useful": true}"#).unwrap();
        let evidence = draft.into_evidence("acc-2");
        assert_eq!(evidence.accident_id, "acc-2");
        assert!(evidence.is_useful);
    }
}
