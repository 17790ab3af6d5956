#![allow(dead_code)]

use grantscope::record::FIELD_NAMES;
use serde_json::{json, Map, Value};

/// A grant with every field present; unset fields are null.
pub fn grant(key: &str, amount: Value, overrides: &[(&str, Value)]) -> Value {
    let mut fields: Map<String, Value> = FIELD_NAMES
        .iter()
        .map(|name| (name.to_string(), Value::Null))
        .collect();

    fields.insert("grant_key".into(), json!(key));
    fields.insert("amount_usd".into(), amount);
    fields.insert("funder_name".into(), json!(format!("Funder {}", key)));
    fields.insert("funder_type".into(), json!("Independent foundation"));
    fields.insert("funder_state".into(), json!("CA"));
    fields.insert("recip_name".into(), json!(format!("Recipient {}", key)));
    fields.insert("year_issued".into(), json!("2020"));
    fields.insert("grant_description".into(), json!("General operating support"));

    for (name, value) in overrides {
        fields.insert(name.to_string(), value.clone());
    }
    Value::Object(fields)
}

pub fn document(grants: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({ "grants": grants })).expect("serialize fixture")
}

/// Three grants; grant A carries two subject codes.
pub fn three_grants() -> Vec<u8> {
    document(vec![
        grant(
            "A",
            json!(75000),
            &[
                ("grant_subject_code", json!("1;2")),
                ("grant_subject_tran", json!("Health;Education")),
                ("grant_population_tran", json!("Children and youth")),
                ("grant_strategy_tran", json!("Program support")),
            ],
        ),
        grant(
            "B",
            json!(1200000),
            &[
                ("funder_name", json!("Funder A")),
                ("grant_subject_code", json!("3")),
                ("grant_subject_tran", json!("Arts")),
                ("year_issued", json!("2021")),
            ],
        ),
        grant(
            "C",
            json!(30000),
            &[
                ("funder_type", json!("Community foundation")),
                ("year_issued", json!(2019)),
            ],
        ),
    ])
}
