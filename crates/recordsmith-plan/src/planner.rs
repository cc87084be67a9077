use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use recordsmith_core::{Diagnostic, DiagnosticKind, FieldType, ObjectSchema};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::analyzer::{DependencyKind, ObjectRuleAnalysis, RulePattern, analyze_object_rules};
use crate::picklist::{DecodedDependency, PicklistDecoder};

/// Constraint the generator must honor for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldConstraint {
    Required,
    Unique,
    MaxLength {
        max: u32,
    },
    NumericRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        inclusive: bool,
    },
    /// A validation rule requires a value, possibly only under a condition.
    RequiredByRule {
        rule_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStep {
    pub field: String,
    pub field_type: FieldType,
    pub constraints: Vec<FieldConstraint>,
    /// Fields that must be generated before this one.
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling: Option<DecodedDependency>,
}

impl GenerationStep {
    pub fn is_required(&self) -> bool {
        self.constraints
            .iter()
            .any(|constraint| matches!(constraint, FieldConstraint::Required))
    }

    pub fn is_unique(&self) -> bool {
        self.constraints
            .iter()
            .any(|constraint| matches!(constraint, FieldConstraint::Unique))
    }

    pub fn max_length(&self) -> Option<u32> {
        self.constraints.iter().find_map(|constraint| match constraint {
            FieldConstraint::MaxLength { max } => Some(*max),
            _ => None,
        })
    }

    pub fn numeric_range(&self) -> Option<(Option<f64>, Option<f64>, bool)> {
        self.constraints.iter().find_map(|constraint| match constraint {
            FieldConstraint::NumericRange {
                min,
                max,
                inclusive,
            } => Some((*min, *max, *inclusive)),
            _ => None,
        })
    }

    /// Whether any rule requires this field, conditionally or not.
    pub fn is_rule_required(&self) -> bool {
        self.constraints
            .iter()
            .any(|constraint| matches!(constraint, FieldConstraint::RequiredByRule { .. }))
    }
}

/// Ordered generation steps for one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub object: String,
    pub fingerprint: String,
    pub steps: Vec<GenerationStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl GenerationPlan {
    pub fn step(&self, field: &str) -> Option<&GenerationStep> {
        self.steps
            .iter()
            .find(|step| step.field.eq_ignore_ascii_case(field))
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.field.eq_ignore_ascii_case(field))
    }
}

/// SHA-256 over the object's fields and active rules.
pub fn plan_fingerprint(object: &ObjectSchema) -> String {
    let mut hasher = Sha256::new();
    hasher.update(object.name.as_bytes());
    for field in &object.fields {
        hasher.update(
            format!(
                "|f:{}:{}:{}:{}:{:?}:{:?}:{:?}:{:?}:{}{}{}",
                field.name,
                field.field_type.as_str(),
                field.required,
                field.unique,
                field.max_length,
                field.precision,
                field.scale,
                field.controlling_field,
                field.createable,
                field.calculated,
                field.auto_number,
            )
            .as_bytes(),
        );
        for option in &field.options {
            hasher.update(
                format!(
                    "|o:{}:{}:{:?}",
                    option.value, option.active, option.valid_for
                )
                .as_bytes(),
            );
        }
    }
    for rule in object.active_rules() {
        hasher.update(format!("|r:{}:{}", rule.id, rule.formula).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Order the object's generatable fields so every dependency source comes
/// before its target.
///
/// Circular dependencies never fail the plan: each cycle is reported as a
/// `dependency_cycle` diagnostic and its members keep declaration order.
pub fn build_plan(
    object: &ObjectSchema,
    analysis: &ObjectRuleAnalysis,
    decoder: &mut PicklistDecoder,
) -> GenerationPlan {
    let fields: Vec<_> = object
        .fields
        .iter()
        .filter(|field| field.is_generatable())
        .collect();
    let index_of = |name: &str| {
        fields
            .iter()
            .position(|field| field.name.eq_ignore_ascii_case(name))
    };

    // sources[target] = fields the target depends on, by declaration index
    let mut sources: Vec<Vec<usize>> = vec![Vec::new(); fields.len()];
    let mut add_edge = |source: usize, target: usize| {
        if source != target && !sources[target].contains(&source) {
            sources[target].push(source);
        }
    };

    for dependency in &analysis.dependencies {
        if let (Some(source), Some(target)) =
            (index_of(&dependency.source), index_of(&dependency.target))
        {
            add_edge(source, target);
        }
    }
    for (target, field) in fields.iter().enumerate() {
        if let Some(source) = field.controlling_field.as_deref().and_then(index_of) {
            add_edge(source, target);
        }
    }
    for list in &mut sources {
        list.sort_unstable();
    }

    let mut diagnostics = Vec::new();
    let components = strongly_connected(&sources);
    let mut order = Vec::with_capacity(fields.len());
    for mut component in components {
        component.sort_unstable();
        if component.len() > 1 {
            let members: Vec<&str> = component
                .iter()
                .map(|&index| fields[index].name.as_str())
                .collect();
            warn!(
                object = %object.name,
                fields = ?members,
                "dependency cycle; using declaration order"
            );
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::DependencyCycle,
                    format!(
                        "circular field dependencies among {}; declaration order used",
                        members.join(", ")
                    ),
                )
                .with_object(&object.name),
            );
        }
        order.extend(component);
    }

    let mut hints: BTreeMap<usize, (Option<f64>, Option<f64>, bool)> = BTreeMap::new();
    for hint in analysis.range_hints() {
        let Some(index) = index_of(&hint.field) else {
            continue;
        };
        let entry = hints.entry(index).or_insert((None, None, true));
        if let Some(min) = hint.min {
            entry.0 = Some(entry.0.map_or(min, |current: f64| current.max(min)));
        }
        if let Some(max) = hint.max {
            entry.1 = Some(entry.1.map_or(max, |current: f64| current.min(max)));
        }
        entry.2 &= hint.inclusive;
    }

    let mut steps = Vec::with_capacity(order.len());
    for index in order {
        let field = fields[index];
        let mut constraints = Vec::new();
        if field.required {
            constraints.push(FieldConstraint::Required);
        }
        if field.unique {
            constraints.push(FieldConstraint::Unique);
        }
        if let Some(max) = field.max_length.filter(|_| field.field_type.is_text()) {
            constraints.push(FieldConstraint::MaxLength { max });
        }
        if let Some((min, max, inclusive)) = hints.get(&index).copied() {
            if field.field_type.is_numeric() {
                constraints.push(FieldConstraint::NumericRange {
                    min,
                    max,
                    inclusive,
                });
            }
        }
        for rule in &analysis.rules {
            let dependent = rule.analysis.dependencies.iter().find(|dependency| {
                dependency.kind == DependencyKind::RequiredIf
                    && dependency.target.eq_ignore_ascii_case(&field.name)
            });
            let unconditional = rule.analysis.dependencies.is_empty()
                && rule.analysis.fields.len() == 1
                && rule.analysis.fields[0].eq_ignore_ascii_case(&field.name)
                && rule.analysis.patterns == [RulePattern::RequiredCheck];
            if let Some(dependency) = dependent {
                constraints.push(FieldConstraint::RequiredByRule {
                    rule_id: rule.rule_id.clone(),
                    condition: dependency.condition.clone(),
                });
            } else if unconditional {
                constraints.push(FieldConstraint::RequiredByRule {
                    rule_id: rule.rule_id.clone(),
                    condition: None,
                });
            }
        }

        let controlling = if field.controlling_field.is_some() {
            decoder.decode(object, field)
        } else {
            None
        };
        if let Some(diagnostic) = controlling
            .as_ref()
            .and_then(|decoded| decoded.diagnostic(&object.name))
        {
            diagnostics.push(diagnostic);
        }

        steps.push(GenerationStep {
            field: field.name.clone(),
            field_type: field.field_type,
            constraints,
            dependencies: sources[index]
                .iter()
                .map(|&source| fields[source].name.clone())
                .collect(),
            controlling,
        });
    }

    debug!(object = %object.name, steps = steps.len(), "generation plan built");

    GenerationPlan {
        object: object.name.clone(),
        fingerprint: plan_fingerprint(object),
        steps,
        diagnostics,
    }
}

/// Tarjan's algorithm over `sources` (target -> its sources). Components are
/// returned dependencies first; roots are visited in declaration order.
fn strongly_connected(sources: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State<'a> {
        sources: &'a [Vec<usize>],
        next_index: usize,
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        components: Vec<Vec<usize>>,
    }

    impl State<'_> {
        fn visit(&mut self, node: usize) {
            self.index[node] = Some(self.next_index);
            self.low[node] = self.next_index;
            self.next_index += 1;
            self.stack.push(node);
            self.on_stack[node] = true;

            let sources = self.sources;
            for &source in &sources[node] {
                match self.index[source] {
                    None => {
                        self.visit(source);
                        self.low[node] = self.low[node].min(self.low[source]);
                    }
                    Some(source_index) if self.on_stack[source] => {
                        self.low[node] = self.low[node].min(source_index);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.low[node]) == self.index[node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    let count = sources.len();
    let mut state = State {
        sources,
        next_index: 0,
        index: vec![None; count],
        low: vec![0; count],
        on_stack: vec![false; count],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for node in 0..count {
        if state.index[node].is_none() {
            state.visit(node);
        }
    }
    state.components
}

/// Per-object plan cache, rebuilt when the schema or rule fingerprint
/// changes. Owns the picklist decoder used while planning.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: HashMap<String, Arc<GenerationPlan>>,
    decoder: PicklistDecoder,
    hits: u64,
    misses: u64,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_for(&mut self, object: &ObjectSchema) -> Arc<GenerationPlan> {
        let key = object.name.to_ascii_lowercase();
        let fingerprint = plan_fingerprint(object);
        if let Some(plan) = self.plans.get(&key) {
            if plan.fingerprint == fingerprint {
                self.hits += 1;
                return Arc::clone(plan);
            }
            info!(object = %object.name, "schema changed; rebuilding generation plan");
        }

        self.misses += 1;
        let analysis = analyze_object_rules(&object.name, &object.validation_rules);
        let plan = Arc::new(build_plan(object, &analysis, &mut self.decoder));
        self.plans.insert(key, Arc::clone(&plan));
        plan
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
