use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    accident_number, Accident, AccidentDeclaration, AccidentUpdate, AnalysisExport,
    AnalysisStage, AnalysisSummary, Statistics, Witness, WitnessDraft,
};
use crate::ai::{
    ClassificationRequest, GenerationRequest, TestimonyAnalysis, TestimonyClassifier,
    TreeGenerator, CLASSIFIER_SERVICE, GENERATOR_SERVICE,
};
use crate::config::{PipeConfig, WorkflowConfig};
use crate::error::{AiError, AiResult, AppError, AppResult, TreeResult, WorkflowError};
use crate::evidence::{useful_count, EvidenceDraft, EvidenceUpdate, MaterialEvidence};
use crate::fragments::{verified_facts, CategoryCounts, Fragment, FragmentCategory, FragmentDraft};
use crate::storage::{Invocation, Storage};
use crate::tree::{
    CauseNode, CauseTree, MeasureCoverage, MeasureUpdate, NodeCategory, NodeIdAllocator, NodePatch, Position,
    PreventiveMeasure, Relation, UuidAllocator,
};

/// Result of an AI tree generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// The stored tree.
    pub tree: CauseTree,
    /// Measures dropped while validating the AI response.
    pub warnings: Vec<String>,
}

fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(WorkflowError::Validation {
            field: field.to_string(),
            reason: format!("{} cannot be empty", field),
        }
        .into());
    }
    Ok(())
}

/// Drives an accident analysis from declaration to cause tree.
///
/// Every mutating operation is persisted before it returns. All
/// collaborators are injected, so several workflows can share one store.
pub struct AnalysisWorkflow {
    storage: Arc<dyn Storage>,
    classifier: Arc<dyn TestimonyClassifier>,
    generator: Arc<dyn TreeGenerator>,
    ids: Arc<dyn NodeIdAllocator>,
    ai_deadline: Duration,
    pipes: Option<PipeConfig>,
}

impl AnalysisWorkflow {
    /// Create a workflow over a store and two AI collaborators
    pub fn new(
        storage: Arc<dyn Storage>,
        classifier: Arc<dyn TestimonyClassifier>,
        generator: Arc<dyn TreeGenerator>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            storage,
            classifier,
            generator,
            ids: Arc::new(UuidAllocator),
            ai_deadline: Duration::from_millis(config.ai_deadline_ms),
            pipes: None,
        }
    }

    /// Use a specific node id allocator
    pub fn with_id_allocator(mut self, ids: Arc<dyn NodeIdAllocator>) -> Self {
        self.ids = ids;
        self
    }

    /// Record pipe names in the invocation log
    pub fn with_pipes(mut self, pipes: PipeConfig) -> Self {
        self.pipes = Some(pipes);
        self
    }

    // Accidents

    /// Declare an accident and its initial witnesses.
    pub async fn declare_accident(&self, declaration: AccidentDeclaration) -> AppResult<Accident> {
        require_text("time", &declaration.time)?;
        require_text("location", &declaration.location)?;
        require_text("establishment", &declaration.establishment)?;
        for witness in &declaration.witnesses {
            require_text("first_name", &witness.first_name)?;
            require_text("last_name", &witness.last_name)?;
        }

        let year = Utc::now().year();
        let existing = self.storage.count_accidents_for_year(year).await?;
        let accident = Accident::declare(&declaration, accident_number(year, existing));
        self.storage.create_accident(&accident).await?;

        for draft in declaration.witnesses {
            let witness = draft.into_witness(&accident.id);
            self.storage.create_witness(&witness).await?;
        }

        info!(
            accident_id = %accident.id,
            accident_number = %accident.accident_number,
            "Accident declared"
        );
        Ok(accident)
    }

    /// Get an accident.
    pub async fn get_accident(&self, accident_id: &str) -> AppResult<Accident> {
        self.storage
            .get_accident(accident_id)
            .await?
            .ok_or_else(|| {
                WorkflowError::AccidentNotFound {
                    accident_id: accident_id.to_string(),
                }
                .into()
            })
    }

    /// Edit accident fields. Allowed at any stage.
    pub async fn update_accident(
        &self,
        accident_id: &str,
        update: AccidentUpdate,
    ) -> AppResult<Accident> {
        let mut accident = self.get_accident(accident_id).await?;
        accident.apply(update);
        require_text("time", &accident.time)?;
        require_text("location", &accident.location)?;
        require_text("establishment", &accident.establishment)?;

        self.storage.update_accident(&accident).await?;
        Ok(accident)
    }

    /// List accidents, most recent first.
    pub async fn list_accidents(&self) -> AppResult<Vec<Accident>> {
        Ok(self.storage.list_accidents().await?)
    }

    async fn advance(&self, accident: &mut Accident, stage: AnalysisStage) -> AppResult<()> {
        if accident.advance_to(stage) {
            self.storage.update_accident(accident).await?;
            info!(
                accident_id = %accident.id,
                stage = %stage,
                "Analysis stage reached"
            );
        }
        Ok(())
    }

    // Witnesses

    /// Add a witness to an accident.
    pub async fn add_witness(&self, accident_id: &str, draft: WitnessDraft) -> AppResult<Witness> {
        self.get_accident(accident_id).await?;
        require_text("first_name", &draft.first_name)?;
        require_text("last_name", &draft.last_name)?;

        let witness = draft.into_witness(accident_id);
        self.storage.create_witness(&witness).await?;
        Ok(witness)
    }

    /// List the witnesses of an accident.
    pub async fn list_witnesses(&self, accident_id: &str) -> AppResult<Vec<Witness>> {
        self.get_accident(accident_id).await?;
        Ok(self.storage.list_witnesses(accident_id).await?)
    }

    // Testimony

    /// Ask the classifier to split a testimony into fragments.
    ///
    /// Nothing is recorded: the caller reviews the suggestions and keeps the
    /// ones it wants with [`AnalysisWorkflow::record_fragments`]. Without an
    /// explicit context the accident description is used.
    pub async fn analyze_testimony(
        &self,
        accident_id: &str,
        testimony: &str,
        accident_context: Option<String>,
    ) -> AppResult<TestimonyAnalysis> {
        require_text("testimony", testimony)?;
        let accident = self.get_accident(accident_id).await?;

        let request = ClassificationRequest {
            testimony: testimony.to_string(),
            accident_context: accident_context.or(accident.description),
        };
        let pipe = self.pipes.as_ref().map(|p| p.testimony.clone());

        let analysis = self
            .invoke_ai(
                CLASSIFIER_SERVICE,
                accident_id,
                pipe,
                serde_json::to_value(&request).unwrap_or_default(),
                self.classifier.classify(request.clone()),
            )
            .await?;

        Ok(analysis)
    }

    /// Record reviewed fragments.
    pub async fn record_fragments(
        &self,
        accident_id: &str,
        drafts: Vec<FragmentDraft>,
    ) -> AppResult<Vec<Fragment>> {
        let mut accident = self.get_accident(accident_id).await?;

        for draft in &drafts {
            require_text("content", &draft.content)?;
            if let Some(witness_id) = &draft.witness_id {
                self.require_witness(accident_id, witness_id).await?;
            }
        }

        let mut fragments = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let fragment = draft.into_fragment(accident_id);
            self.storage.create_fragment(&fragment).await?;
            fragments.push(fragment);
        }

        if !fragments.is_empty() {
            self.advance(&mut accident, AnalysisStage::TestimonyClassified)
                .await?;
        }

        debug!(accident_id = %accident_id, count = fragments.len(), "Fragments recorded");
        Ok(fragments)
    }

    /// Record a single fragment.
    pub async fn add_fragment(&self, accident_id: &str, draft: FragmentDraft) -> AppResult<Fragment> {
        let mut recorded = self.record_fragments(accident_id, vec![draft]).await?;
        recorded.pop().ok_or_else(|| AppError::Internal {
            message: "fragment was not recorded".to_string(),
        })
    }

    async fn require_witness(&self, accident_id: &str, witness_id: &str) -> AppResult<Witness> {
        match self.storage.get_witness(witness_id).await? {
            Some(witness) if witness.accident_id == accident_id => Ok(witness),
            _ => Err(WorkflowError::WitnessNotFound {
                witness_id: witness_id.to_string(),
            }
            .into()),
        }
    }

    async fn get_fragment(&self, fragment_id: &str) -> AppResult<Fragment> {
        self.storage
            .get_fragment(fragment_id)
            .await?
            .ok_or_else(|| {
                WorkflowError::FragmentNotFound {
                    fragment_id: fragment_id.to_string(),
                }
                .into()
            })
    }

    /// Change a fragment's category.
    pub async fn reclassify_fragment(
        &self,
        fragment_id: &str,
        category: FragmentCategory,
    ) -> AppResult<Fragment> {
        let mut fragment = self.get_fragment(fragment_id).await?;
        fragment.reclassify(category);
        self.storage.update_fragment(&fragment).await?;
        Ok(fragment)
    }

    /// Set a fragment's unusual flag.
    pub async fn mark_unusual(&self, fragment_id: &str, flag: bool) -> AppResult<Fragment> {
        let mut fragment = self.get_fragment(fragment_id).await?;
        fragment.toggle_unusual(flag);
        self.storage.update_fragment(&fragment).await?;
        Ok(fragment)
    }

    /// List the fragments of an accident.
    pub async fn list_fragments(&self, accident_id: &str) -> AppResult<Vec<Fragment>> {
        self.get_accident(accident_id).await?;
        Ok(self.storage.list_fragments(accident_id).await?)
    }

    /// Count fragments per category.
    pub async fn fragment_counts(&self, accident_id: &str) -> AppResult<CategoryCounts> {
        let fragments = self.list_fragments(accident_id).await?;
        Ok(CategoryCounts::from_fragments(&fragments))
    }

    // Evidence

    /// Catalogue a material evidence item.
    pub async fn add_evidence(
        &self,
        accident_id: &str,
        draft: EvidenceDraft,
    ) -> AppResult<MaterialEvidence> {
        self.get_accident(accident_id).await?;
        require_text("description", &draft.description)?;

        let evidence = draft.into_evidence(accident_id);
        self.storage.create_evidence(&evidence).await?;
        Ok(evidence)
    }

    /// Edit an evidence item.
    pub async fn update_evidence(
        &self,
        evidence_id: &str,
        update: EvidenceUpdate,
    ) -> AppResult<MaterialEvidence> {
        let mut evidence = self
            .storage
            .get_evidence(evidence_id)
            .await?
            .ok_or_else(|| WorkflowError::EvidenceNotFound {
                evidence_id: evidence_id.to_string(),
            })?;
        evidence.apply(update);
        require_text("description", &evidence.description)?;

        self.storage.update_evidence(&evidence).await?;
        Ok(evidence)
    }

    /// List the evidence of an accident.
    pub async fn list_evidence(&self, accident_id: &str) -> AppResult<Vec<MaterialEvidence>> {
        self.get_accident(accident_id).await?;
        Ok(self.storage.list_evidence(accident_id).await?)
    }

    // Summary

    /// Review the collected data and close the testimony stage.
    ///
    /// Requires at least one verified fact.
    pub async fn validate_summary(&self, accident_id: &str) -> AppResult<AnalysisSummary> {
        let mut accident = self.get_accident(accident_id).await?;
        let fragments = self.storage.list_fragments(accident_id).await?;
        let evidence = self.storage.list_evidence(accident_id).await?;

        let facts = verified_facts(&fragments);
        if facts.is_empty() {
            return Err(WorkflowError::InsufficientFacts {
                accident_id: accident_id.to_string(),
            }
            .into());
        }

        self.advance(&mut accident, AnalysisStage::SummaryValidated)
            .await?;

        Ok(AnalysisSummary {
            accident,
            counts: CategoryCounts::from_fragments(&fragments),
            evidence_total: evidence.len(),
            useful_evidence: useful_count(&evidence),
            verified_facts: facts,
        })
    }

    // Cause tree

    /// Generate the cause tree from the verified facts and store it.
    ///
    /// The generator is never called without a verified fact. The stored
    /// tree is replaced only once the response is validated.
    pub async fn generate_tree(&self, accident_id: &str) -> AppResult<GenerationOutcome> {
        let mut accident = self.get_accident(accident_id).await?;
        let fragments = self.storage.list_fragments(accident_id).await?;

        let facts = verified_facts(&fragments);
        if facts.is_empty() {
            return Err(WorkflowError::InsufficientFacts {
                accident_id: accident_id.to_string(),
            }
            .into());
        }

        let request = GenerationRequest {
            facts,
            accident_description: accident.generation_context(),
        };
        let pipe = self.pipes.as_ref().map(|p| p.cause_tree.clone());

        let generated = self
            .invoke_ai(
                GENERATOR_SERVICE,
                accident_id,
                pipe,
                serde_json::to_value(&request).unwrap_or_default(),
                self.generator.generate(request.clone()),
            )
            .await?;

        let mut tree = self.load_tree(accident_id).await?;
        tree.replace_from_generated(generated.nodes, generated.measures)?;
        self.storage.save_cause_tree(&tree).await?;
        self.advance(&mut accident, AnalysisStage::TreeBuilt).await?;

        info!(
            accident_id = %accident_id,
            nodes = tree.nodes().len(),
            edges = tree.edge_count(),
            dropped_measures = generated.warnings.len(),
            "Cause tree generated"
        );
        Ok(GenerationOutcome {
            tree,
            warnings: generated.warnings,
        })
    }

    /// Run an AI call under the deadline and record it in the audit log.
    async fn invoke_ai<T, F>(
        &self,
        service: &str,
        accident_id: &str,
        pipe: Option<String>,
        input: serde_json::Value,
        call: F,
    ) -> AppResult<T>
    where
        T: Serialize,
        F: Future<Output = AiResult<T>>,
    {
        let start = Instant::now();
        let mut invocation = Invocation::new(service, input).with_accident(accident_id);
        if let Some(pipe) = pipe {
            invocation = invocation.with_pipe(pipe);
        }

        let result = match tokio::time::timeout(self.ai_deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Unavailable {
                service: service.to_string(),
                message: format!("no answer within {}ms", self.ai_deadline.as_millis()),
            }),
        };
        let latency = start.elapsed().as_millis() as i64;

        match result {
            Ok(output) => {
                invocation = invocation.success(
                    serde_json::to_value(&output).unwrap_or_default(),
                    latency,
                );
                self.record_invocation(&invocation).await;
                Ok(output)
            }
            Err(e) => {
                warn!(
                    accident_id = %accident_id,
                    service = %service,
                    latency_ms = latency,
                    error = %e,
                    "AI call failed"
                );
                invocation = invocation.failure(e.to_string(), latency);
                self.record_invocation(&invocation).await;
                Err(e.into())
            }
        }
    }

    /// Write the audit entry of an AI call. A failed write never changes the call's outcome.
    async fn record_invocation(&self, invocation: &Invocation) {
        if let Err(e) = self.storage.log_invocation(invocation).await {
            warn!(
                accident_id = ?invocation.accident_id,
                service = %invocation.service,
                error = %e,
                "Failed to record AI invocation"
            );
        }
    }

    async fn load_tree(&self, accident_id: &str) -> AppResult<CauseTree> {
        Ok(self
            .storage
            .get_cause_tree(accident_id)
            .await?
            .unwrap_or_else(|| CauseTree::new(accident_id)))
    }

    /// Get the cause tree of an accident, empty if none was built yet.
    pub async fn get_tree(&self, accident_id: &str) -> AppResult<CauseTree> {
        self.get_accident(accident_id).await?;
        self.load_tree(accident_id).await
    }

    /// Replace the stored tree as a whole.
    ///
    /// Concurrent saves of the same tree are not reconciled: the last one wins.
    pub async fn save_tree(&self, tree: CauseTree) -> AppResult<CauseTree> {
        let mut accident = self.get_accident(tree.accident_id()).await?;
        self.store_tree(&mut accident, &tree).await?;
        Ok(tree)
    }

    /// Load the tree, apply one edit and persist it.
    ///
    /// A failed edit leaves the stored tree untouched.
    async fn edit_tree<T>(
        &self,
        accident_id: &str,
        edit: impl FnOnce(&mut CauseTree) -> TreeResult<T>,
    ) -> AppResult<T> {
        let mut accident = self.get_accident(accident_id).await?;
        let mut tree = self.load_tree(accident_id).await?;

        let output = edit(&mut tree)?;

        self.store_tree(&mut accident, &tree).await?;
        Ok(output)
    }

    /// Persist a tree, completing the analysis once it can be completed.
    ///
    /// Completion needs a non-empty tree, classified testimony and at least
    /// one verified fact. Otherwise the tree is stored and the stage is kept.
    async fn store_tree(&self, accident: &mut Accident, tree: &CauseTree) -> AppResult<()> {
        self.storage.save_cause_tree(tree).await?;
        if tree.is_empty() || !accident.has_reached(AnalysisStage::TestimonyClassified) {
            return Ok(());
        }

        let fragments = self.storage.list_fragments(&accident.id).await?;
        if verified_facts(&fragments).is_empty() {
            debug!(
                accident_id = %accident.id,
                "Tree stored without verified facts; analysis not completed"
            );
            return Ok(());
        }
        self.advance(accident, AnalysisStage::TreeBuilt).await
    }

    /// Add a fact to the tree.
    pub async fn add_node(
        &self,
        accident_id: &str,
        content: &str,
        category: NodeCategory,
        position: Position,
    ) -> AppResult<CauseNode> {
        require_text("content", content)?;
        self.edit_tree(accident_id, |tree| {
            tree.add_node(self.ids.as_ref(), content, category, position)
                .map(CauseNode::clone)
        })
        .await
    }

    /// Edit a fact.
    pub async fn update_node(
        &self,
        accident_id: &str,
        node_id: &str,
        patch: NodePatch,
    ) -> AppResult<CauseNode> {
        if let Some(content) = &patch.content {
            require_text("content", content)?;
        }
        self.edit_tree(accident_id, |tree| {
            tree.update_node(node_id, patch).map(CauseNode::clone)
        })
        .await
    }

    /// Remove a fact and every edge pointing at it.
    pub async fn delete_node(&self, accident_id: &str, node_id: &str) -> AppResult<CauseNode> {
        self.edit_tree(accident_id, |tree| tree.delete_node(node_id))
            .await
    }

    /// Link two facts.
    pub async fn add_edge(
        &self,
        accident_id: &str,
        from: &str,
        to: &str,
        relation: Relation,
    ) -> AppResult<CauseTree> {
        self.edit_tree(accident_id, |tree| {
            tree.add_edge(from, to, relation)?;
            Ok(tree.clone())
        })
        .await
    }

    /// Unlink two facts, returning how many edges were removed.
    pub async fn remove_edge(
        &self,
        accident_id: &str,
        from: &str,
        to: &str,
        relation: Option<Relation>,
    ) -> AppResult<usize> {
        self.edit_tree(accident_id, |tree| tree.remove_edge(from, to, relation))
            .await
    }

    /// Create or edit the preventive measure of a fact.
    pub async fn upsert_measure(
        &self,
        accident_id: &str,
        fact_id: &str,
        update: MeasureUpdate,
    ) -> AppResult<PreventiveMeasure> {
        self.edit_tree(accident_id, |tree| {
            tree.upsert_measure(fact_id, update)
                .map(PreventiveMeasure::clone)
        })
        .await
    }

    /// Report which facts lack a measure and which measures are misplaced.
    pub async fn measure_coverage(&self, accident_id: &str) -> AppResult<MeasureCoverage> {
        Ok(self.get_tree(accident_id).await?.coverage())
    }

    // Export and dashboard

    /// Build the self-contained export of a completed analysis.
    pub async fn export_snapshot(&self, accident_id: &str) -> AppResult<AnalysisExport> {
        let accident = self.get_accident(accident_id).await?;
        if !accident.has_reached(AnalysisStage::TreeBuilt) {
            return Err(WorkflowError::StageNotReached {
                accident_id: accident_id.to_string(),
                required: AnalysisStage::TreeBuilt.to_string(),
            }
            .into());
        }

        let fragments = self.storage.list_fragments(accident_id).await?;
        let export = AnalysisExport {
            witnesses: self.storage.list_witnesses(accident_id).await?,
            counts: CategoryCounts::from_fragments(&fragments),
            evidence: self.storage.list_evidence(accident_id).await?,
            tree: self.load_tree(accident_id).await?,
            accident,
            generated_at: Utc::now(),
        };

        let uncovered = export.tree.uncovered_necessary_facts().len();
        if uncovered > 0 {
            warn!(
                accident_id = %accident_id,
                uncovered,
                "Exporting a tree with necessary facts lacking a preventive measure"
            );
        }
        Ok(export)
    }

    /// Count analyses per status.
    pub async fn statistics(&self) -> AppResult<Statistics> {
        let accidents = self.storage.list_accidents().await?;
        Ok(Statistics::from_accidents(&accidents))
    }
}
