use crate::tool::BuiltinTool;
use async_trait::async_trait;
use flowcore::{FieldSchema, FieldType, NodeError, Value};
use std::collections::HashMap;

fn required_input<'a>(inputs: &'a HashMap<String, Value>, name: &str) -> Result<&'a Value, NodeError> {
    inputs
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| NodeError::MissingInput(name.to_string()))
}

/// Parse JSON string to Value
pub struct JsonParseTool;

#[async_trait]
impl BuiltinTool for JsonParseTool {
    fn name(&self) -> &str {
        "json_parse"
    }

    fn description(&self) -> &str {
        "Parse JSON string"
    }

    fn inputs(&self) -> Vec<FieldSchema> {
        vec![FieldSchema::new("json", FieldType::String).required()]
    }

    fn outputs(&self) -> Vec<FieldSchema> {
        vec![FieldSchema::new("parsed", FieldType::Any)]
    }

    async fn call(&self, inputs: &HashMap<String, Value>) -> Result<Value, NodeError> {
        let input = required_input(inputs, "json")?
            .as_str()
            .ok_or_else(|| NodeError::InvalidInputType {
                field: "json".to_string(),
                expected: "string".to_string(),
                actual: "other".to_string(),
            })?;

        let parsed: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(Value::object([("parsed", Value::from(parsed))]))
    }
}

/// Stringify Value to JSON
pub struct JsonStringifyTool;

#[async_trait]
impl BuiltinTool for JsonStringifyTool {
    fn name(&self) -> &str {
        "json_stringify"
    }

    fn description(&self) -> &str {
        "Convert value to JSON string"
    }

    fn inputs(&self) -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("value", FieldType::Any).required(),
            FieldSchema::new("pretty", FieldType::Boolean).with_default(false),
        ]
    }

    fn outputs(&self) -> Vec<FieldSchema> {
        vec![FieldSchema::new("json", FieldType::String)]
    }

    async fn call(&self, inputs: &HashMap<String, Value>) -> Result<Value, NodeError> {
        let value = required_input(inputs, "value")?;
        let pretty = inputs.get("pretty").and_then(Value::as_bool).unwrap_or(false);

        let json_str = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(Value::object([("json", Value::from(json_str))]))
    }
}

/// Character and word counts of a text.
pub struct TextLengthTool;

#[async_trait]
impl BuiltinTool for TextLengthTool {
    fn name(&self) -> &str {
        "text_length"
    }

    fn description(&self) -> &str {
        "Count characters and words in a text"
    }

    fn inputs(&self) -> Vec<FieldSchema> {
        vec![FieldSchema::new("text", FieldType::String).required()]
    }

    fn outputs(&self) -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("chars", FieldType::Integer),
            FieldSchema::new("words", FieldType::Integer),
        ]
    }

    async fn call(&self, inputs: &HashMap<String, Value>) -> Result<Value, NodeError> {
        let text = required_input(inputs, "text")?.to_display_string();
        Ok(Value::object([
            ("chars", Value::from(text.chars().count())),
            ("words", Value::from(text.split_whitespace().count())),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_json_parse() {
        let out = JsonParseTool
            .call(&inputs(&[("json", Value::from(r#"{"a": [1, 2]}"#))]))
            .await
            .unwrap();
        assert_eq!(out.get_path(&["parsed", "a", "1"]), Some(&Value::Integer(2)));

        let err = JsonParseTool
            .call(&inputs(&[("json", Value::from("{"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_json_stringify_compact() {
        let value = Value::from(serde_json::json!({"k": "v"}));
        let out = JsonStringifyTool
            .call(&inputs(&[("value", value)]))
            .await
            .unwrap();
        assert_eq!(out.get_path(&["json"]), Some(&Value::from(r#"{"k":"v"}"#)));
    }

    #[tokio::test]
    async fn test_text_length_counts_chars_not_bytes() {
        let out = TextLengthTool
            .call(&inputs(&[("text", Value::from("héllo wörld"))]))
            .await
            .unwrap();
        assert_eq!(out.get_path(&["chars"]), Some(&Value::Integer(11)));
        assert_eq!(out.get_path(&["words"]), Some(&Value::Integer(2)));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let err = TextLengthTool.call(&HashMap::new()).await.unwrap_err();
        assert!(matches!(err, NodeError::MissingInput(ref name) if name == "text"));
    }
}
