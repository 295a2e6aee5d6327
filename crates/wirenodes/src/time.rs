use tokio::time::{sleep, Duration};
use wirecore::Value;
use wireruntime::NodeExecutor;

/// `time.delay` — sleeps for `delay_ms` (config, default 1000) and
/// passes its inputs through
pub async fn register(executor: &NodeExecutor) {
    executor
        .register_executor("time.delay", |node, inputs, _ctx| async move {
            let delay_ms = node
                .config
                .get("delay_ms")
                .and_then(Value::as_f64)
                .unwrap_or(1000.0) as u64;

            tracing::debug!(node_id = %node.id, delay_ms, "delaying");
            sleep(Duration::from_millis(delay_ms)).await;

            Ok(inputs)
        })
        .await;
}
