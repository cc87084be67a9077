use std::fs;
use std::path::PathBuf;

use recordsmith_core::{ObjectSchema, SchemaSnapshot};
use recordsmith_plan::{
    DependencyKind, FieldConstraint, GenerationPlan, PlanCache, analyze_object_rules,
};

fn load_snapshot(name: &str) -> SchemaSnapshot {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(format!("../../snapshots/examples/{name}"));
    let contents =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing json at {}", path.display()));
    serde_json::from_str(&contents).expect("parse snapshot")
}

fn first_object(snapshot: &SchemaSnapshot) -> &ObjectSchema {
    snapshot.objects.first().expect("object")
}

fn declaration_indices(object: &ObjectSchema, plan: &GenerationPlan) -> Vec<usize> {
    plan.steps
        .iter()
        .map(|step| {
            object
                .fields
                .iter()
                .position(|field| field.name == step.field)
                .expect("step field declared")
        })
        .collect()
}

#[test]
fn account_plan_orders_dependencies() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let plan = PlanCache::new().plan_for(account);

    let before = |a: &str, b: &str| plan.position(a).expect(a) < plan.position(b).expect(b);
    assert!(before("Type", "Industry"));
    assert!(before("BillingCountry", "BillingState"));
    assert!(before("Start_Date__c", "End_Date__c"));
    assert!(plan.step("Id").is_none());
    assert!(plan.step("Rating_Score__c").is_none());
    assert!(plan.diagnostics.is_empty());

    for step in &plan.steps {
        for dependency in &step.dependencies {
            assert!(
                plan.position(dependency) < plan.position(&step.field),
                "{dependency} must precede {}",
                step.field
            );
        }
    }

    let name = plan.step("Name").expect("name");
    assert!(name.is_required());
    assert_eq!(name.max_length(), Some(80));
    assert!(plan.step("AccountNumber").expect("number").is_unique());
    assert!(matches!(
        plan.step("AnnualRevenue").expect("revenue").constraints[..],
        [FieldConstraint::NumericRange { min: Some(min), .. }] if min == 0.0
    ));

    let state = plan.step("BillingState").expect("state");
    let decoded = state.controlling.as_ref().expect("decoded picklist");
    assert_eq!(decoded.values_for("AU"), ["NSW", "VIC"]);
    assert_eq!(decoded.values_for("US"), ["CA", "NY"]);
}

#[test]
fn inactive_rules_are_ignored() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let analysis = analyze_object_rules(&account.name, &account.validation_rules);
    assert_eq!(analysis.rule_count, 3);
    assert!(analysis.rules.iter().all(|rule| rule.rule_id != "Legacy_Geo_Check"));
    assert!(
        analysis
            .dependencies
            .iter()
            .any(|d| d.source == "Type" && d.target == "Industry" && d.kind == DependencyKind::RequiredIf)
    );
}

#[test]
fn anonymized_names_plan_identically() {
    let real = load_snapshot("account.snapshot.json");
    let anonymized = load_snapshot("anonymized.snapshot.json");
    let real_object = first_object(&real);
    let anonymized_object = first_object(&anonymized);

    let real_plan = PlanCache::new().plan_for(real_object);
    let anonymized_plan = PlanCache::new().plan_for(anonymized_object);

    assert_eq!(
        declaration_indices(real_object, &real_plan),
        declaration_indices(anonymized_object, &anonymized_plan)
    );
    for (left, right) in real_plan.steps.iter().zip(&anonymized_plan.steps) {
        assert_eq!(left.constraints.len(), right.constraints.len());
        assert_eq!(left.dependencies.len(), right.dependencies.len());
        assert_eq!(
            left.controlling.as_ref().map(|decoded| &decoded.mapping),
            right.controlling.as_ref().map(|decoded| &decoded.mapping)
        );
    }
}

#[test]
fn edited_valid_for_bitmaps_reach_the_rebuilt_plan() {
    let mut snapshot = load_snapshot("account.snapshot.json");
    let mut plans = PlanCache::new();
    let original = plans.plan_for(first_object(&snapshot));

    let state = snapshot.objects[0]
        .fields
        .iter_mut()
        .find(|field| field.name == "BillingState")
        .expect("billing state");
    for option in &mut state.options {
        option.valid_for = Some("QA==".to_string());
    }

    let rebuilt = plans.plan_for(first_object(&snapshot));
    assert_ne!(original.fingerprint, rebuilt.fingerprint);
    let decoded = rebuilt
        .step("BillingState")
        .and_then(|step| step.controlling.as_ref())
        .expect("decoded picklist");
    assert!(decoded.values_for("AU").is_empty());
    assert_eq!(decoded.values_for("US"), ["NSW", "VIC", "CA", "NY"]);
}
