use wirecore::Value;
use wireruntime::NodeExecutor;

/// `debug.log` — logs its inputs and passes them through unchanged
pub async fn register(executor: &NodeExecutor) {
    executor
        .register_executor("debug.log", |node, inputs, _ctx| async move {
            let message = inputs
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("(no message)");
            tracing::info!(node_id = %node.id, message, "debug.log");
            for (port, value) in &inputs {
                tracing::debug!(node_id = %node.id, port = %port, ?value, "debug.log input");
            }
            Ok(inputs)
        })
        .await;
}
