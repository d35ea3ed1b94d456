//! Tool-use payloads sent by AI coding agents to hook commands.
//!
//! The payload is a JSON object with `tool_name` and `tool_input`. Only the
//! tools that edit files or run shell commands map to an [`Action`]; every
//! other tool is outside the pipeline's concern.

use serde::Deserialize;
use serde_json::Value;

use super::Action;
use crate::error::{FlowError, Result};

#[derive(Debug, Deserialize)]
struct ToolPayload {
    tool_name: String,
    #[serde(default)]
    tool_input: Value,
}

/// Parse a payload into the action it gates, or `None` for tools the
/// pipeline ignores.
pub fn parse_tool_payload(raw: &str) -> Result<Option<Action>> {
    let payload: ToolPayload = serde_json::from_str(raw)
        .map_err(|err| anyhow::anyhow!("invalid hook payload: {err}"))?;
    let field = |key: &str| -> Result<String> {
        payload
            .tool_input
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                FlowError::from(anyhow::anyhow!(
                    "{} payload is missing tool_input.{key}",
                    payload.tool_name
                ))
            })
    };
    let action = match payload.tool_name.as_str() {
        "Edit" | "Write" | "MultiEdit" => Action::EditFile {
            path: field("file_path")?,
        },
        "NotebookEdit" => Action::EditFile {
            path: field("notebook_path")?,
        },
        "Bash" => Action::RunCommand {
            command: field("command")?,
        },
        _ => return Ok(None),
    };
    Ok(Some(action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_edit_tools_to_file_edits() {
        let raw = r#"{"tool_name":"Write","tool_input":{"file_path":"/repo/src/lib.rs","content":"x"}}"#;
        assert_eq!(
            parse_tool_payload(raw).expect("parse"),
            Some(Action::EditFile {
                path: "/repo/src/lib.rs".to_string()
            })
        );

        let raw = r#"{"tool_name":"NotebookEdit","tool_input":{"notebook_path":"nb/a.ipynb"}}"#;
        assert_eq!(
            parse_tool_payload(raw).expect("parse"),
            Some(Action::EditFile {
                path: "nb/a.ipynb".to_string()
            })
        );
    }

    #[test]
    fn maps_bash_to_command() {
        let raw = r#"{"tool_name":"Bash","tool_input":{"command":"git status"}}"#;
        assert_eq!(
            parse_tool_payload(raw).expect("parse"),
            Some(Action::RunCommand {
                command: "git status".to_string()
            })
        );
    }

    #[test]
    fn ignores_other_tools() {
        let raw = r#"{"tool_name":"Read","tool_input":{"file_path":"src/lib.rs"}}"#;
        assert_eq!(parse_tool_payload(raw).expect("parse"), None);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_tool_payload("not json").is_err());
        assert!(parse_tool_payload(r#"{"tool_name":"Edit","tool_input":{}}"#).is_err());
    }
}
