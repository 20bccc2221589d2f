use anyhow::{Context, Result};
use serde_json::Value;

/// Print a tool reply as JSON on stdout; a failed reply becomes the command's error.
pub fn print_reply(reply: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply["success"] == Value::Bool(true) {
        return Ok(());
    }

    let message = reply["error"].as_str().unwrap_or("tool call failed");
    anyhow::bail!("{message}")
}

/// Parse the JSON arguments of `calbridge call`.
pub fn parse_args(raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(text) => serde_json::from_str(text).context("Tool arguments must be a JSON object"),
        None => Ok(Value::Object(Default::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_print_reply_fails_on_unsuccessful_reply() {
        assert!(print_reply(json!({"success": true, "count": 0})).is_ok());

        let err = print_reply(json!({"success": false, "error": "Calendar not found: x"})).unwrap_err();
        assert_eq!(err.to_string(), "Calendar not found: x");
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(None).unwrap(), json!({}));
        assert_eq!(parse_args(Some(r#"{"limit": 3}"#)).unwrap(), json!({"limit": 3}));
        assert!(parse_args(Some("{not json")).is_err());
    }
}
