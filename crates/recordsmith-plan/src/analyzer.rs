use std::collections::BTreeSet;
use std::sync::LazyLock;

use recordsmith_core::ValidationRule;
use recordsmith_formula::is_supported;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Field reference: optional `$`, identifier, optional dotted path.
const FIELD: &str = r"\$?[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*";

/// Function names the evaluator rejects but which must not be read as fields.
const KNOWN_UNSUPPORTED: &[&str] = &[
    "ISCHANGED",
    "ISNEW",
    "PRIORVALUE",
    "VLOOKUP",
    "GEOLOCATION",
    "DISTANCE",
    "HYPERLINK",
    "IMAGE",
    "GETRECORDIDS",
    "DATETIMEVALUE",
    "TIMEVALUE",
    "ISCLONE",
    "CURRENCYRATE",
    "PARENTGROUPVAL",
    "PREVGROUPVAL",
];

const KEYWORDS: &[&str] = &["TRUE", "FALSE", "NULL"];

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(FIELD).expect("field pattern"));

/// `name (` call sites; group 1 is the function name.
static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call pattern")
});

static VALUE_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"(?i)ISPICKVAL\s*\(|==?\s*"#\d+"|"#\d+"\s*==?"##).expect("value test pattern")
});

const NUMBER: &str = r"(-?\d+(?:\.\d+)?)";
const COMPARISON: &str = r"(<=|>=|<>|!=|==|<|>|=)";

/// `Field <op> number`.
static FIELD_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"({FIELD})\s*{COMPARISON}\s*{NUMBER}")).expect("comparison pattern")
});

/// `number <op> Field`.
static NUMBER_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{NUMBER}\s*{COMPARISON}\s*({FIELD})")).expect("comparison pattern")
});

static REQUIRED_IF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r##"(?i)\bIF\s*\(\s*(?:ISPICKVAL\s*\(\s*({FIELD})\s*,\s*"#(\d+)"\s*\)|({FIELD})\s*==?\s*"#(\d+)")\s*,\s*(?:ISBLANK|ISNULL)\s*\(\s*({FIELD})\s*\)"##
    ))
    .expect("required-if pattern")
});

static CONJUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:AND|OR)\s*\(").expect("conjunction pattern"));

static BLANK_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:ISBLANK|ISNULL)\s*\(\s*({FIELD})\s*\)"))
        .expect("blank test pattern")
});

const DATE_FUNCTIONS: &[&str] = &[
    "TODAY",
    "NOW",
    "DATE",
    "DATEVALUE",
    "DATETIMEVALUE",
    "YEAR",
    "MONTH",
    "DAY",
    "WEEKDAY",
    "ADDMONTHS",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Target must be non-blank when the source holds a given value.
    RequiredIf,
    /// Target's validity depends on the source in some conjunction.
    Conditional,
}

/// Directed edge: `target` is constrained by `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDependency {
    pub source: String,
    pub target: String,
    pub kind: DependencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    fn rank(self) -> f64 {
        match self {
            Complexity::Simple => 1.0,
            Complexity::Moderate => 2.0,
            Complexity::Complex => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn rank(self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 2.0,
            RiskLevel::High => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePattern {
    RequiredCheck,
    ConditionalRequirement,
    NumericRange,
    FormatCheck,
    CrossObjectReference,
    DateDependent,
}

/// Bound a field must satisfy for an error-condition comparison to stay false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeHint {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Whether `min`/`max` themselves are allowed.
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaAnalysis {
    pub fields: Vec<String>,
    pub dependencies: Vec<FieldDependency>,
    pub complexity: Complexity,
    pub risk_level: RiskLevel,
    pub patterns: Vec<RulePattern>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range_hints: Vec<RangeHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAnalysis {
    pub rule_id: String,
    pub analysis: FormulaAnalysis,
}

/// Aggregate over an object's active rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRuleAnalysis {
    pub object: String,
    pub rule_count: usize,
    pub fields: Vec<String>,
    pub dependencies: Vec<FieldDependency>,
    pub rules: Vec<RuleAnalysis>,
    pub complexity: Complexity,
    pub risk_level: RiskLevel,
}

impl ObjectRuleAnalysis {
    pub fn range_hints(&self) -> impl Iterator<Item = &RangeHint> {
        self.rules
            .iter()
            .flat_map(|rule| rule.analysis.range_hints.iter())
    }
}

/// Statically analyze one formula.
pub fn analyze_formula(formula: &str, object_name: &str) -> FormulaAnalysis {
    let (masked, literals) = mask_literals(formula);
    let fields = extract_fields(&masked);

    let mut patterns = BTreeSet::new();
    let has_blank_test = calls_any(&masked, &["ISBLANK", "ISNULL"]);
    if has_blank_test {
        patterns.insert(RulePattern::RequiredCheck);
    }
    if has_blank_test && calls_any(&masked, &["IF", "AND"]) && has_value_test(&masked) {
        patterns.insert(RulePattern::ConditionalRequirement);
    }
    let comparisons = numeric_comparisons(&masked);
    if !comparisons.is_empty() {
        patterns.insert(RulePattern::NumericRange);
    }
    if calls_any(&masked, &["REGEX", "CONTAINS", "BEGINS"]) {
        patterns.insert(RulePattern::FormatCheck);
    }
    let cross_object = fields.iter().any(|field| field.contains('.'));
    if cross_object {
        patterns.insert(RulePattern::CrossObjectReference);
    }
    let date_dependent = calls_any(&masked, DATE_FUNCTIONS);
    if date_dependent {
        patterns.insert(RulePattern::DateDependent);
    }

    let mut dependencies = required_if_dependencies(&masked, &literals);
    for dependency in conjunction_dependencies(&masked) {
        if !dependencies
            .iter()
            .any(|d| d.source == dependency.source && d.target == dependency.target)
        {
            dependencies.push(dependency);
        }
    }

    let conditional = patterns.contains(&RulePattern::ConditionalRequirement);
    let complexity = score_complexity(&masked, cross_object, conditional);
    let risk_level = if cross_object || date_dependent {
        RiskLevel::High
    } else if complexity == Complexity::Complex || conditional {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    // Comparisons inside a conditional only bind under that condition.
    let range_hints = if conditional || has_or(&masked) {
        Vec::new()
    } else {
        comparisons
            .into_iter()
            .filter_map(|(field, op, value)| invert_comparison(field, &op, value))
            .collect()
    };

    tracing::debug!(
        object = object_name,
        fields = fields.len(),
        dependencies = dependencies.len(),
        ?complexity,
        ?risk_level,
        "formula analyzed"
    );

    FormulaAnalysis {
        fields,
        dependencies,
        complexity,
        risk_level,
        patterns: patterns.into_iter().collect(),
        range_hints,
    }
}

/// Analyze every active rule of an object and aggregate the result.
pub fn analyze_object_rules(object_name: &str, rules: &[ValidationRule]) -> ObjectRuleAnalysis {
    let mut fields: Vec<String> = Vec::new();
    let mut dependencies: Vec<FieldDependency> = Vec::new();
    let mut analyses = Vec::new();

    for rule in rules.iter().filter(|rule| rule.active) {
        let analysis = analyze_formula(&rule.formula, object_name);
        for field in &analysis.fields {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        for dependency in &analysis.dependencies {
            if !dependencies
                .iter()
                .any(|d| d.source == dependency.source && d.target == dependency.target)
            {
                dependencies.push(dependency.clone());
            }
        }
        analyses.push(RuleAnalysis {
            rule_id: rule.id.clone(),
            analysis,
        });
    }

    let (complexity, risk_level) = if analyses.is_empty() {
        (Complexity::Simple, RiskLevel::Low)
    } else {
        let total: f64 = analyses
            .iter()
            .map(|rule| {
                0.6 * rule.analysis.complexity.rank() + 0.4 * rule.analysis.risk_level.rank()
            })
            .sum();
        let average = total / analyses.len() as f64;
        if average >= 2.5 {
            (Complexity::Complex, RiskLevel::High)
        } else if average >= 1.5 {
            (Complexity::Moderate, RiskLevel::Medium)
        } else {
            (Complexity::Simple, RiskLevel::Low)
        }
    };

    ObjectRuleAnalysis {
        object: object_name.to_string(),
        rule_count: analyses.len(),
        fields,
        dependencies,
        rules: analyses,
        complexity,
        risk_level,
    }
}

/// Replace each string literal with `"#<index>"` and collect the contents.
fn mask_literals(formula: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(formula.len());
    let mut literals = Vec::new();
    let mut chars = formula.chars();

    while let Some(ch) = chars.next() {
        if ch != '"' && ch != '\'' {
            masked.push(ch);
            continue;
        }
        let mut literal = String::new();
        while let Some(inner) = chars.next() {
            match inner {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        literal.push(escaped);
                    }
                }
                c if c == ch => break,
                c => literal.push(c),
            }
        }
        masked.push_str(&format!("\"#{}\"", literals.len()));
        literals.push(literal);
    }

    (masked, literals)
}

fn is_reserved(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    KEYWORDS.contains(&upper.as_str())
        || is_supported(&upper)
        || KNOWN_UNSUPPORTED.contains(&upper.as_str())
}

fn extract_fields(masked: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for found in FIELD_RE.find_iter(masked) {
        let preceding = masked[..found.start()].chars().next_back();
        if preceding.is_some_and(|c| c.is_ascii_alphanumeric() || c == '#' || c == '_') {
            continue;
        }
        let name = found.as_str();
        let is_call = masked[found.end()..].trim_start().starts_with('(');
        if is_call || name.starts_with('$') || is_reserved(name) {
            continue;
        }
        if !fields.iter().any(|field| field == name) {
            fields.push(name.to_string());
        }
    }
    fields
}

fn calls_any(masked: &str, names: &[&str]) -> bool {
    CALL_RE.captures_iter(masked).any(|caps| {
        let called = caps[1].to_ascii_uppercase();
        names.contains(&called.as_str())
    })
}

fn has_value_test(masked: &str) -> bool {
    VALUE_TEST_RE.is_match(masked)
}

fn has_or(masked: &str) -> bool {
    masked.contains("||") || calls_any(masked, &["OR", "NOT"])
}

/// `Field <op> number` comparisons, normalized so the field is on the left.
fn numeric_comparisons(masked: &str) -> Vec<(String, String, f64)> {
    let mut comparisons = Vec::new();

    for caps in FIELD_FIRST_RE.captures_iter(masked) {
        let name = &caps[1];
        if name.starts_with('$') || is_reserved(name) || starts_inside_word(masked, &caps, 1) {
            continue;
        }
        if let Ok(value) = caps[3].parse::<f64>() {
            comparisons.push((name.to_string(), caps[2].to_string(), value));
        }
    }

    for caps in NUMBER_FIRST_RE.captures_iter(masked) {
        let name = &caps[3];
        let end = caps.get(3).map_or(masked.len(), |m| m.end());
        let is_call = masked[end..].trim_start().starts_with('(');
        if is_call || name.starts_with('$') || is_reserved(name) {
            continue;
        }
        let flipped = match &caps[2] {
            "<" => ">",
            "<=" => ">=",
            ">" => "<",
            ">=" => "<=",
            other => other,
        };
        if let Ok(value) = caps[1].parse::<f64>() {
            comparisons.push((name.to_string(), flipped.to_string(), value));
        }
    }

    comparisons
}

fn starts_inside_word(masked: &str, caps: &regex::Captures<'_>, group: usize) -> bool {
    caps.get(group)
        .and_then(|m| masked[..m.start()].chars().next_back())
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '#')
}

/// An error condition `X < v` holds when the record is invalid, so the
/// field must satisfy the opposite: `X >= v`.
fn invert_comparison(field: String, op: &str, value: f64) -> Option<RangeHint> {
    let hint = match op {
        "<" => RangeHint {
            field,
            min: Some(value),
            max: None,
            inclusive: true,
        },
        "<=" => RangeHint {
            field,
            min: Some(value),
            max: None,
            inclusive: false,
        },
        ">" => RangeHint {
            field,
            min: None,
            max: Some(value),
            inclusive: true,
        },
        ">=" => RangeHint {
            field,
            min: None,
            max: Some(value),
            inclusive: false,
        },
        _ => return None,
    };
    Some(hint)
}

/// `IF(A = "V", ISBLANK(B) …)` and `IF(ISPICKVAL(A, "V"), ISBLANK(B) …)`.
fn required_if_dependencies(masked: &str, literals: &[String]) -> Vec<FieldDependency> {
    let mut dependencies = Vec::new();
    for caps in REQUIRED_IF_RE.captures_iter(masked) {
        let source = caps.get(1).or_else(|| caps.get(3));
        let literal = caps.get(2).or_else(|| caps.get(4));
        let (Some(source), Some(literal), Some(target)) = (source, literal, caps.get(5)) else {
            continue;
        };
        let value = literal
            .as_str()
            .parse::<usize>()
            .ok()
            .and_then(|index| literals.get(index))
            .cloned()
            .unwrap_or_default();
        if source.as_str() == target.as_str() {
            continue;
        }
        dependencies.push(FieldDependency {
            source: source.as_str().to_string(),
            target: target.as_str().to_string(),
            kind: DependencyKind::RequiredIf,
            condition: Some(format!("{} = \"{}\"", source.as_str(), value)),
        });
    }
    dependencies
}

/// Argument lists of `AND(…)`/`OR(…)` holding a blank test on B and a
/// reference to A yield `A → B`.
fn conjunction_dependencies(masked: &str) -> Vec<FieldDependency> {
    let mut dependencies: Vec<FieldDependency> = Vec::new();
    for found in CONJUNCTION_RE.find_iter(masked) {
        let Some(arguments) = balanced_arguments(&masked[found.end()..]) else {
            continue;
        };
        let targets: Vec<String> = BLANK_TEST_RE
            .captures_iter(arguments)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();
        if targets.is_empty() {
            continue;
        }
        let referenced = extract_fields(arguments);
        for target in &targets {
            for source in referenced.iter().filter(|field| *field != target) {
                let exists = dependencies
                    .iter()
                    .any(|d| &d.source == source && &d.target == target);
                if !exists {
                    dependencies.push(FieldDependency {
                        source: source.clone(),
                        target: target.clone(),
                        kind: DependencyKind::Conditional,
                        condition: None,
                    });
                }
            }
        }
    }
    dependencies
}

/// Text up to the parenthesis closing an already opened call.
fn balanced_arguments(rest: &str) -> Option<&str> {
    let mut depth = 1usize;
    for (index, ch) in rest.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..index]);
                }
            }
            _ => {}
        }
    }
    None
}

fn score_complexity(masked: &str, cross_object: bool, conditional: bool) -> Complexity {
    let mut score = 0;

    let length = masked.chars().count();
    score += if length > 200 {
        2
    } else if length > 80 {
        1
    } else {
        0
    };

    let mut variety: BTreeSet<String> = BTreeSet::new();
    for caps in CALL_RE.captures_iter(masked) {
        variety.insert(caps[1].to_ascii_uppercase());
    }
    for op in ["&&", "||", "<>", "!=", "<=", ">=", "<", ">", "=", "+", "-", "*", "/", "&", "^"] {
        if masked.contains(op) {
            variety.insert(op.to_string());
        }
    }
    score += if variety.len() > 5 {
        2
    } else if variety.len() > 2 {
        1
    } else {
        0
    };

    let mut depth = 0usize;
    let mut max_depth = 0usize;
    for ch in masked.chars() {
        match ch {
            '(' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    score += if max_depth > 6 {
        2
    } else if max_depth > 2 {
        1
    } else {
        0
    };

    if cross_object {
        score += 2;
    }
    if conditional {
        score += 1;
    }

    if score >= 5 {
        Complexity::Complex
    } else if score >= 2 {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}
