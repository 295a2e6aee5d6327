use wirecore::{NodeError, PortValues, Value};
use wireruntime::NodeExecutor;

/// `transform.json_parse` and `transform.json_stringify`
pub async fn register(executor: &NodeExecutor) {
    executor
        .register_executor("transform.json_parse", |_node, inputs, _ctx| async move {
            let text = inputs
                .get("json")
                .and_then(Value::as_str)
                .ok_or_else(|| NodeError::InvalidInput {
                    port: "json".into(),
                    expected: "string".into(),
                })?;

            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {e}")))?;

            Ok(PortValues::from([("parsed".to_string(), Value::from(parsed))]))
        })
        .await;

    executor
        .register_executor("transform.json_stringify", |_node, inputs, _ctx| async move {
            let value = inputs
                .get("value")
                .cloned()
                .ok_or_else(|| NodeError::MissingInput("value".into()))?;

            let json = serde_json::to_string_pretty(&serde_json::Value::from(value))
                .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {e}")))?;

            Ok(PortValues::from([("json".to_string(), Value::from(json))]))
        })
        .await;
}
