//! JSON Schema validation for persisted devflow documents.

use jsonschema::validator_for;
use serde_json::Value;

use crate::error::{FlowError, Result};

pub const PLAN_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/plan/v1.schema.json"
));

pub const TRACKER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/tracker/v1.schema.json"
));

/// Validate `instance` against `schema`, returning every violation.
pub fn schema_errors(schema: &str, instance: &Value) -> Result<Vec<String>> {
    let schema_value: Value = serde_json::from_str(schema)
        .map_err(|err| anyhow::Error::new(err).context("parse embedded schema"))?;
    let compiled = validator_for(&schema_value)
        .map_err(|err| FlowError::Internal(anyhow::anyhow!("invalid schema: {err}")))?;
    Ok(compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect())
}
