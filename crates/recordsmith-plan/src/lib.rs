//! Static rule analysis and generation planning.
//!
//! The analyzer reads validation formulas as text to find which fields
//! constrain which; the planner turns that, plus dependent-picklist
//! metadata, into an ordered list of generation steps.

pub mod analyzer;
pub mod picklist;
pub mod planner;

pub use analyzer::{
    Complexity, DependencyKind, FieldDependency, FormulaAnalysis, ObjectRuleAnalysis, RangeHint,
    RiskLevel, RuleAnalysis, RulePattern, analyze_formula, analyze_object_rules,
};
pub use picklist::{
    DEFAULT_DECODER_CAPACITY, DecodedDependency, PicklistDecoder, decode_dependency,
    encode_valid_for,
};
pub use planner::{
    FieldConstraint, GenerationPlan, GenerationStep, PlanCache, build_plan, plan_fingerprint,
};
