mod common;

use common::TestEnv;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

fn load_schema(name: &str) -> Value {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let raw = fs::read_to_string(root.join("docs/contracts").join(name)).expect("read schema");
    serde_json::from_str(&raw).expect("schema is json")
}

fn validate(schema_name: &str, data: &Value) {
    let schema = load_schema(schema_name);
    let validator = JSONSchema::compile(&schema).expect("compile schema");
    let msgs: Vec<String> = match validator.validate(data) {
        Ok(()) => return,
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    };
    panic!("schema validation failed: {}", msgs.join(" | "));
}

#[test]
fn contracts_check() {
    let env = TestEnv::new();
    let names = ["a.txt", "legacy.txt", "group.txt", "stranger.txt", "slow.txt", "missing.txt"];
    let paths: Vec<String> = names.iter().map(|n| env.file(n)).collect();
    env.write_input(&paths);

    let summary = env.audit_json(&["--no-log-file", "--batch-size", "2"]);
    validate("run_summary.schema.json", &summary);

    validate("cache_file.schema.json", &env.cache_json());

    let owners = env.run_json(&[
        "--no-log-file",
        "owner",
        "--backend",
        "fixture",
        "--fixture",
        "fixture.json",
        paths[0].as_str(),
        paths[5].as_str(),
    ]);
    validate("owner_lines.schema.json", &owners);
}
