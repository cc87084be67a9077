use std::sync::Arc;

use recordsmith_core::{Diagnostic, DiagnosticKind, ObjectSchema, Record, SchemaSnapshot};
use recordsmith_plan::{GenerationPlan, PlanCache};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::GenerationError;
use crate::generators::ValueGenerator;
use crate::model::{FieldSuggestions, GenerateOptions, GenerationReport, RecordState};
use crate::repair::{Repairer, ViolationDetector};
use crate::suggestions::RejectedSuggestion;

/// Records and report produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub plan: Arc<GenerationPlan>,
    pub records: Vec<Record>,
    pub rejected_suggestions: Vec<RejectedSuggestion>,
    pub report: GenerationReport,
}

/// Generate-then-repair driver for a single session.
///
/// Owns the plan cache so repeated runs over an unchanged object reuse the
/// same plan.
#[derive(Debug, Default)]
pub struct RecordPipeline {
    options: GenerateOptions,
    plans: PlanCache,
}

impl RecordPipeline {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            options,
            plans: PlanCache::new(),
        }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn plans(&self) -> &PlanCache {
        &self.plans
    }

    pub fn run_snapshot(
        &mut self,
        snapshot: &SchemaSnapshot,
        object_name: &str,
        count: u64,
        suggestions: Option<&FieldSuggestions>,
    ) -> Result<GenerationRun, GenerationError> {
        let object = snapshot
            .object(object_name)
            .ok_or_else(|| GenerationError::UnknownObject(object_name.to_string()))?;
        Ok(self.run(object, count, suggestions))
    }

    pub fn run(
        &mut self,
        object: &ObjectSchema,
        count: u64,
        suggestions: Option<&FieldSuggestions>,
    ) -> GenerationRun {
        let plan = self.plans.plan_for(object);
        let run_id = Uuid::new_v4().to_string();
        let mut report = GenerationReport::new(run_id.clone(), &object.name, &plan.fingerprint);
        report.records_requested = count;
        for diagnostic in &plan.diagnostics {
            report.record_warning(diagnostic.clone());
        }

        info!(
            run_id = %run_id,
            object = %object.name,
            count,
            seed = self.options.seed,
            steps = plan.steps.len(),
            "generation started"
        );

        let mut generator = ValueGenerator::new(self.options.clone());
        let rejected_suggestions = match suggestions {
            Some(suggestions) => {
                let rejected = generator.set_suggestions(object, suggestions);
                for item in &rejected {
                    warn!(field = %item.field, value = %item.value, reason = %item.reason, "suggestion dropped");
                }
                rejected
            }
            None => Vec::new(),
        };
        report.suggestions_rejected = rejected_suggestions.len() as u64;

        let detector = ViolationDetector::new(object, self.options.eval_context());
        for diagnostic in detector.diagnostics() {
            report.record_warning(diagnostic.clone());
        }
        let repairer = Repairer::new(
            object,
            &detector,
            self.options.max_repair_attempts,
            generator.reference_date(),
        );

        let mut records = Vec::with_capacity(count as usize);
        for index in 0..count {
            let candidate = generator.generate_record(object, &plan, index);
            let mut outcome = repairer.repair(candidate, &plan);
            if outcome.state != RecordState::Flagged {
                generator.reserve_repaired(
                    object,
                    &plan,
                    &mut outcome.record,
                    &outcome.repaired_fields,
                    index,
                );
            }
            for field in generator.unsatisfied_fields() {
                warn!(object = %object.name, field = %field, index, "unique field left duplicated");
                outcome.state = RecordState::Flagged;
                outcome.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::RepairExhausted,
                        format!("no unused value fits unique field {field}"),
                    )
                    .with_object(&object.name)
                    .with_field(field),
                );
            }
            report.record_outcome(index, &outcome);
            records.push(outcome.record);
        }

        for (heuristic, uses) in generator.heuristic_usage() {
            report.record_heuristic(heuristic, *uses);
        }
        report.fallback_count += generator.fallback_count();
        report.suggestions_used = generator.suggestions_used();

        info!(
            run_id = %run_id,
            object = %object.name,
            generated = report.records_generated,
            accepted = report.accepted,
            repaired = report.repaired,
            flagged = report.flagged,
            warnings = report.warnings.len(),
            "generation finished"
        );

        GenerationRun {
            plan,
            records,
            rejected_suggestions,
            report,
        }
    }
}
