//! Accident analysis workflow.
//!
//! An [`Accident`] moves through four [`AnalysisStage`]s, forward only:
//! declared, testimony classified, summary validated, tree built. The
//! [`AnalysisWorkflow`] orchestrator owns every transition; data of earlier
//! stages stays editable whatever the current stage.

mod orchestrator;

pub use orchestrator::*;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::MaterialEvidence;
use crate::fragments::CategoryCounts;
use crate::tree::CauseTree;

/// Stage reached by an accident analysis.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    #[default]
    Declared,
    TestimonyClassified,
    SummaryValidated,
    TreeBuilt,
}

impl AnalysisStage {
    /// Get the stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Declared => "declared",
            AnalysisStage::TestimonyClassified => "testimony_classified",
            AnalysisStage::SummaryValidated => "summary_validated",
            AnalysisStage::TreeBuilt => "tree_built",
        }
    }

    /// Lifecycle status shown to users.
    pub fn status(&self) -> AccidentStatus {
        match self {
            AnalysisStage::Declared => AccidentStatus::Draft,
            AnalysisStage::TestimonyClassified | AnalysisStage::SummaryValidated => {
                AccidentStatus::InProgress
            }
            AnalysisStage::TreeBuilt => AccidentStatus::Completed,
        }
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AnalysisStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declared" => Ok(AnalysisStage::Declared),
            "testimony_classified" => Ok(AnalysisStage::TestimonyClassified),
            "summary_validated" => Ok(AnalysisStage::SummaryValidated),
            "tree_built" => Ok(AnalysisStage::TreeBuilt),
            _ => Err(format!("Unknown analysis stage: {}", s)),
        }
    }
}

/// Lifecycle status derived from the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccidentStatus {
    Draft,
    InProgress,
    Completed,
}

/// Accident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    /// Get the severity name
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(Severity::Minor),
            "moderate" => Ok(Severity::Moderate),
            "severe" => Ok(Severity::Severe),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Build the human-readable number of the `existing + 1`-th accident of `year`.
pub fn accident_number(year: i32, existing: u32) -> String {
    format!("ACC-{}-{:03}", year, existing + 1)
}

/// Root aggregate of an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accident {
    /// Unique accident identifier.
    pub id: String,
    /// `ACC-<year>-<NNN>`.
    pub accident_number: String,
    pub date: NaiveDate,
    /// Time of day as declared, e.g. `14:30`.
    pub time: String,
    pub location: String,
    pub establishment: String,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub victim_name: Option<String>,
    pub victim_first_name: Option<String>,
    pub victim_position: Option<String>,
    pub is_anonymized: bool,
    /// Furthest stage reached.
    pub stage: AnalysisStage,
    /// Mirrors `stage`; kept in sync by [`Accident::advance_to`].
    pub status: AccidentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Accident {
    /// Create a declared accident from a declaration.
    pub fn declare(declaration: &AccidentDeclaration, accident_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            accident_number: accident_number.into(),
            date: declaration.date,
            time: declaration.time.clone(),
            location: declaration.location.clone(),
            establishment: declaration.establishment.clone(),
            description: declaration.description.clone(),
            severity: declaration.severity,
            victim_name: declaration.victim_name.clone(),
            victim_first_name: declaration.victim_first_name.clone(),
            victim_position: declaration.victim_position.clone(),
            is_anonymized: declaration.is_anonymized,
            stage: AnalysisStage::Declared,
            status: AnalysisStage::Declared.status(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `stage` if it is further than the current one.
    ///
    /// Returns whether the stage changed.
    pub fn advance_to(&mut self, stage: AnalysisStage) -> bool {
        if stage <= self.stage {
            return false;
        }
        self.stage = stage;
        self.status = stage.status();
        self.updated_at = Utc::now();
        true
    }

    /// Whether the analysis reached `stage`.
    pub fn has_reached(&self, stage: AnalysisStage) -> bool {
        self.stage >= stage
    }

    /// Merge a partial update. The stage is never touched.
    pub fn apply(&mut self, update: AccidentUpdate) {
        if let Some(v) = update.date {
            self.date = v;
        }
        if let Some(v) = update.time {
            self.time = v;
        }
        if let Some(v) = update.location {
            self.location = v;
        }
        if let Some(v) = update.establishment {
            self.establishment = v;
        }
        if let Some(v) = update.description {
            self.description = Some(v);
        }
        if let Some(v) = update.severity {
            self.severity = Some(v);
        }
        if let Some(v) = update.victim_name {
            self.victim_name = Some(v);
        }
        if let Some(v) = update.victim_first_name {
            self.victim_first_name = Some(v);
        }
        if let Some(v) = update.victim_position {
            self.victim_position = Some(v);
        }
        if let Some(v) = update.is_anonymized {
            self.is_anonymized = v;
        }
        self.updated_at = Utc::now();
    }

    /// Text given to the tree generator as accident description.
    pub fn generation_context(&self) -> String {
        match self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(description) => description.to_string(),
            None => format!(
                "Accident survenu le {} à {} ({}, {})",
                self.date, self.time, self.location, self.establishment
            ),
        }
    }

    /// Year used for numbering.
    pub fn year(&self) -> i32 {
        self.created_at.year()
    }
}

/// Input of an accident declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccidentDeclaration {
    pub date: NaiveDate,
    pub time: String,
    pub location: String,
    pub establishment: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub victim_name: Option<String>,
    #[serde(default)]
    pub victim_first_name: Option<String>,
    #[serde(default)]
    pub victim_position: Option<String>,
    #[serde(default)]
    pub is_anonymized: bool,
    /// Witnesses known at declaration time.
    #[serde(default)]
    pub witnesses: Vec<WitnessDraft>,
}

impl AccidentDeclaration {
    /// Create a declaration with the mandatory fields
    pub fn new(
        date: NaiveDate,
        time: impl Into<String>,
        location: impl Into<String>,
        establishment: impl Into<String>,
    ) -> Self {
        Self {
            date,
            time: time.into(),
            location: location.into(),
            establishment: establishment.into(),
            description: None,
            severity: None,
            victim_name: None,
            victim_first_name: None,
            victim_position: None,
            is_anonymized: false,
            witnesses: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Add a witness
    pub fn with_witness(mut self, witness: WitnessDraft) -> Self {
        self.witnesses.push(witness);
        self
    }
}

/// Partial update of an accident.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccidentUpdate {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub establishment: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub victim_name: Option<String>,
    #[serde(default)]
    pub victim_first_name: Option<String>,
    #[serde(default)]
    pub victim_position: Option<String>,
    #[serde(default)]
    pub is_anonymized: Option<bool>,
}

/// A person who testified about the accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    pub id: String,
    pub accident_id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub testimony: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for adding a witness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessDraft {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub testimony: Option<String>,
}

impl WitnessDraft {
    /// Create a draft with a name
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            position: None,
            testimony: None,
        }
    }

    /// Set the testimony
    pub fn with_testimony(mut self, testimony: impl Into<String>) -> Self {
        self.testimony = Some(testimony.into());
        self
    }

    /// Turn the draft into a witness of `accident_id`.
    pub fn into_witness(self, accident_id: &str) -> Witness {
        Witness {
            id: Uuid::new_v4().to_string(),
            accident_id: accident_id.to_string(),
            first_name: self.first_name,
            last_name: self.last_name,
            position: self.position,
            testimony: self.testimony,
            created_at: Utc::now(),
        }
    }
}

/// Summary reviewed before building the cause tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub accident: Accident,
    pub counts: CategoryCounts,
    pub evidence_total: usize,
    pub useful_evidence: usize,
    /// Verified facts, as sent to the tree generator.
    pub verified_facts: Vec<String>,
}

/// Self-contained snapshot handed to document generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisExport {
    pub accident: Accident,
    pub witnesses: Vec<Witness>,
    pub counts: CategoryCounts,
    pub evidence: Vec<MaterialEvidence>,
    pub tree: CauseTree,
    pub generated_at: DateTime<Utc>,
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub draft: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl Statistics {
    /// Count accidents per status.
    pub fn from_accidents<'a>(accidents: impl IntoIterator<Item = &'a Accident>) -> Self {
        accidents
            .into_iter()
            .fold(Statistics::default(), |mut stats, accident| {
                stats.total += 1;
                match accident.status {
                    AccidentStatus::Draft => stats.draft += 1,
                    AccidentStatus::InProgress => stats.in_progress += 1,
                    AccidentStatus::Completed => stats.completed += 1,
                }
                stats
            })
    }
}
