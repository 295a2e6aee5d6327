use async_trait::async_trait;
use std::sync::Arc;
use wirecore::{Node, NodeError, PortValues, Value};
use wireruntime::{ExecutionContext, NodeBehavior, NodeExecutor};

/// `http.request` — performs an HTTP request.
///
/// Inputs: `url` (string, required), `body` (optional; objects are sent
/// as JSON, strings as-is). Config: `method` (GET/POST/PUT/DELETE,
/// default GET). Outputs: `status`, `body`, `success`.
pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeBehavior for HttpRequestNode {
    fn node_type(&self) -> &str {
        "http.request"
    }

    async fn execute(
        &self,
        node: &Node,
        inputs: PortValues,
        _ctx: &ExecutionContext,
    ) -> Result<PortValues, NodeError> {
        let url = inputs
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::MissingInput("url".into()))?;
        let method = node
            .config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();

        tracing::info!(node_id = %node.id, %method, url, "http request");

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            other => {
                return Err(NodeError::ExecutionFailed(format!(
                    "unsupported HTTP method: {other}"
                )))
            }
        };

        if let Some(body) = inputs.get("body") {
            request = match body {
                Value::String(text) => request.body(text.clone()),
                other => request.json(&serde_json::Value::from(other.clone())),
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("reading body failed: {e}")))?;

        Ok(PortValues::from([
            ("status".to_string(), Value::from(status.as_u16() as i64)),
            ("body".to_string(), Value::from(body)),
            ("success".to_string(), Value::from(status.is_success())),
        ]))
    }
}

pub async fn register(executor: &NodeExecutor) {
    executor.register_behavior(Arc::new(HttpRequestNode::new())).await;
}
