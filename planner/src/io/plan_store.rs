//! Plan file load/save with schema and invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::types::ExecutionPlan;
use crate::core::validate::plan_issues;

/// JSON Schema (2020-12) of a canonical plan.
pub const EXECUTION_PLAN_SCHEMA: &str = include_str!("../../schemas/execution_plan.schema.json");

/// Load a plan written by [`write_plan`] (or by hand) and check it.
///
/// Fatal plan issues (duplicate step ids) are rejected here, since the
/// results map is keyed by id.
pub fn load_plan(path: &Path) -> Result<ExecutionPlan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse plan {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate plan {}", path.display()))?;
    let plan: ExecutionPlan = serde_json::from_value(value)
        .with_context(|| format!("deserialize plan {}", path.display()))?;

    let fatal: Vec<String> = plan_issues(&plan)
        .into_iter()
        .filter(|issue| issue.is_fatal())
        .map(|issue| issue.to_string())
        .collect();
    if !fatal.is_empty() {
        return Err(anyhow!(
            "plan {} is invalid: {}",
            path.display(),
            fatal.join("; ")
        ));
    }
    Ok(plan)
}

/// Write a plan as pretty JSON with a trailing newline (temp file + rename).
pub fn write_plan(path: &Path, plan: &ExecutionPlan) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
    buf.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp plan {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace plan {}", path.display()))
}

fn validate_schema(plan: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(EXECUTION_PLAN_SCHEMA).context("parse embedded plan schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(plan) {
        let messages = compiled
            .iter_errors(plan)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ParamValue;
    use crate::test_support::{invoice_plan, step};
    use serde_json::json;

    #[test]
    fn write_then_load_preserves_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plans").join("invoice.json");
        let plan = invoice_plan();

        write_plan(&path, &plan).expect("write");
        let written = fs::read_to_string(&path).expect("read");
        assert!(written.ends_with("}\n"));
        assert!(written.contains("\"client_id\": \"from_step_step_1\""));

        let loaded = load_plan(&path).expect("load");
        assert_eq!(loaded, plan);
        assert_eq!(
            loaded.steps[1].parameters["client_id"],
            ParamValue::step_output("step_1")
        );
    }

    #[test]
    fn rejects_schema_violations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        fs::write(
            &path,
            json!({
                "goal": "g",
                "steps": [],
                "total_estimated_duration": "1 minute",
                "complexity": "huge",
                "user_confirmations_required": 0
            })
            .to_string(),
        )
        .expect("write");

        let err = load_plan(&path).expect_err("invalid complexity");
        assert!(format!("{err:#}").contains("plan schema validation failed"));
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        let mut plan = invoice_plan();
        plan.steps.push(step("step_1", "global_search"));
        write_plan(&path, &plan).expect("write");

        let err = load_plan(&path).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate step id 'step_1'"));
    }

    #[test]
    fn schema_is_valid_json_schema() {
        let schema: Value = serde_json::from_str(EXECUTION_PLAN_SCHEMA).expect("json");
        assert!(validator_for(&schema).is_ok());
    }
}
