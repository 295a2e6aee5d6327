use wirecore::PortValues;
use wireruntime::NodeExecutor;

/// `util.constant` — emits its configuration entries as outputs, one
/// per configured key. The usual way to feed literal values into a graph.
pub async fn register(executor: &NodeExecutor) {
    executor
        .register_executor("util.constant", |node, _inputs, _ctx| async move {
            let outputs: PortValues = node.config.clone().into_iter().collect();
            Ok(outputs)
        })
        .await;
}
