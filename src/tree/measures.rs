//! Preventive measures attached to cause-tree facts.
//!
//! At most one measure exists per fact. A measure keeps a snapshot of its
//! fact's content taken when it was created; later edits of the node do not
//! update it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CauseNode, CauseTree, NodeCategory};
use crate::error::{TreeError, TreeResult};

/// Urgency of a preventive measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Parse a priority, falling back to [`Priority::Medium`].
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// A preventive measure linked to one fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreventiveMeasure {
    /// Fact the measure addresses.
    pub fact_id: String,
    /// Fact content at the time the measure was created.
    #[serde(default)]
    pub fact_content: String,
    /// The measure removes the fact.
    #[serde(default)]
    pub can_eliminate: bool,
    /// The measure reduces the effect of the fact.
    #[serde(default)]
    pub can_reduce: bool,
    /// Description of the measure.
    #[serde(default)]
    pub measure: String,
    #[serde(default)]
    pub priority: Priority,
}

impl PreventiveMeasure {
    /// Create an empty measure for a node
    pub fn for_node(node: &CauseNode) -> Self {
        Self {
            fact_id: node.id.clone(),
            fact_content: node.content.clone(),
            can_eliminate: false,
            can_reduce: false,
            measure: String::new(),
            priority: Priority::default(),
        }
    }

    fn apply(&mut self, update: MeasureUpdate) {
        if let Some(v) = update.can_eliminate {
            self.can_eliminate = v;
        }
        if let Some(v) = update.can_reduce {
            self.can_reduce = v;
        }
        if let Some(v) = update.measure {
            self.measure = v;
        }
        if let Some(v) = update.priority {
            self.priority = v;
        }
    }
}

/// Fields to merge into a measure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureUpdate {
    #[serde(default)]
    pub can_eliminate: Option<bool>,
    #[serde(default)]
    pub can_reduce: Option<bool>,
    #[serde(default)]
    pub measure: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl CauseTree {
    /// Measure attached to a fact, if any.
    pub fn measure_for(&self, fact_id: &str) -> Option<&PreventiveMeasure> {
        self.measures.iter().find(|m| m.fact_id == fact_id)
    }

    /// Merge fields into the measure of `fact_id`, creating it if needed.
    ///
    /// Creating a measure requires the fact to exist. Updating an existing
    /// measure works even if its fact has since been deleted.
    pub fn upsert_measure(
        &mut self,
        fact_id: &str,
        update: MeasureUpdate,
    ) -> TreeResult<&PreventiveMeasure> {
        if let Some(index) = self.measures.iter().position(|m| m.fact_id == fact_id) {
            self.measures[index].apply(update);
            return Ok(&self.measures[index]);
        }

        let node = self.node(fact_id).ok_or_else(|| TreeError::NodeNotFound {
            node_id: fact_id.to_string(),
        })?;
        if node.category != NodeCategory::Necessary {
            warn!(
                accident_id = %self.accident_id,
                fact_id = %fact_id,
                category = %node.category,
                "Preventive measure attached to a fact that is not necessary"
            );
        }

        let mut measure = PreventiveMeasure::for_node(node);
        measure.apply(update);
        self.measures.push(measure);
        Ok(&self.measures[self.measures.len() - 1])
    }

    /// Remove the measure of `fact_id`.
    pub fn remove_measure(&mut self, fact_id: &str) -> Option<PreventiveMeasure> {
        let index = self.measures.iter().position(|m| m.fact_id == fact_id)?;
        Some(self.measures.remove(index))
    }

    /// Necessary facts without any preventive measure.
    pub fn uncovered_necessary_facts(&self) -> Vec<&CauseNode> {
        self.nodes
            .iter()
            .filter(|n| n.category == NodeCategory::Necessary)
            .filter(|n| self.measure_for(&n.id).is_none())
            .collect()
    }

    /// Measures whose fact exists but is not necessary.
    pub fn measures_on_non_necessary(&self) -> Vec<&PreventiveMeasure> {
        self.measures
            .iter()
            .filter(|m| {
                self.node(&m.fact_id)
                    .map_or(false, |n| n.category != NodeCategory::Necessary)
            })
            .collect()
    }

    /// Measures whose fact no longer exists.
    pub fn orphaned_measures(&self) -> Vec<&PreventiveMeasure> {
        self.measures
            .iter()
            .filter(|m| !self.contains(&m.fact_id))
            .collect()
    }

    /// Owned snapshot of the three coverage checks.
    pub fn coverage(&self) -> MeasureCoverage {
        MeasureCoverage {
            uncovered_necessary_facts: self
                .uncovered_necessary_facts()
                .into_iter()
                .cloned()
                .collect(),
            measures_on_non_necessary: self
                .measures_on_non_necessary()
                .into_iter()
                .cloned()
                .collect(),
            orphaned_measures: self.orphaned_measures().into_iter().cloned().collect(),
        }
    }
}

/// How well the preventive measures cover the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureCoverage {
    pub uncovered_necessary_facts: Vec<CauseNode>,
    pub measures_on_non_necessary: Vec<PreventiveMeasure>,
    pub orphaned_measures: Vec<PreventiveMeasure>,
}

impl MeasureCoverage {
    /// True when every necessary fact has a measure and no measure is misplaced.
    pub fn is_complete(&self) -> bool {
        self.uncovered_necessary_facts.is_empty()
            && self.measures_on_non_necessary.is_empty()
            && self.orphaned_measures.is_empty()
    }
}
