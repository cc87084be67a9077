use recordsmith_core::snapshot_json_schema;

fn main() {
    let schema = snapshot_json_schema().expect("build snapshot json schema");
    let json = serde_json::to_string_pretty(&schema).expect("serialize json schema");
    println!("{json}");
}
