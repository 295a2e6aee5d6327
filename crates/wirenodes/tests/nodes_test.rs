use std::collections::HashMap;

use wirecore::{EventBus, Node, NodeError, PortValues, Value};
use wireruntime::{ExecutionContext, NodeExecutor};

async fn test_executor() -> NodeExecutor {
    let executor = NodeExecutor::new(EventBus::new());
    wirenodes::register_all(&executor).await;
    executor
}

fn test_context() -> ExecutionContext {
    ExecutionContext::new("test-wf", HashMap::new())
}

#[tokio::test]
async fn constant_emits_configured_values() {
    let executor = test_executor().await;
    let node = Node::new("c", "util.constant", "c")
        .with_config("v", 7.0)
        .with_config("label", "seven");

    let outputs = executor
        .execute_node(&node, PortValues::new(), &test_context())
        .await
        .unwrap();

    assert_eq!(outputs["v"].as_f64(), Some(7.0));
    assert_eq!(outputs["label"].as_str(), Some("seven"));
}

#[tokio::test]
async fn debug_log_passes_inputs_through() {
    let executor = test_executor().await;
    let node = Node::new("d", "debug.log", "d");
    let inputs = PortValues::from([("message".to_string(), Value::from("hello"))]);

    let outputs = executor
        .execute_node(&node, inputs.clone(), &test_context())
        .await
        .unwrap();
    assert_eq!(outputs, inputs);
}

#[tokio::test]
async fn json_parse_round_trips_through_stringify() {
    let executor = test_executor().await;
    let ctx = test_context();

    let parse = Node::new("p", "transform.json_parse", "p");
    let inputs = PortValues::from([(
        "json".to_string(),
        Value::from(r#"{"answer": 42, "ok": true}"#),
    )]);
    let parsed = executor.execute_node(&parse, inputs, &ctx).await.unwrap();
    let object = parsed["parsed"].as_object().unwrap();
    assert_eq!(object["answer"].as_f64(), Some(42.0));
    assert_eq!(object["ok"].as_bool(), Some(true));

    let stringify = Node::new("s", "transform.json_stringify", "s");
    let inputs = PortValues::from([("value".to_string(), parsed["parsed"].clone())]);
    let texted = executor.execute_node(&stringify, inputs, &ctx).await.unwrap();
    assert!(texted["json"].as_str().unwrap().contains("42"));
}

#[tokio::test]
async fn json_parse_rejects_non_string_input() {
    let executor = test_executor().await;
    let node = Node::new("p", "transform.json_parse", "p");
    let inputs = PortValues::from([("json".to_string(), Value::from(1.0))]);

    let err = executor
        .execute_node(&node, inputs, &test_context())
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidInput { port, .. } if port == "json"));
}

#[tokio::test]
async fn delay_waits_then_passes_through() {
    let executor = test_executor().await;
    let node = Node::new("t", "time.delay", "t").with_config("delay_ms", 10.0);
    let inputs = PortValues::from([("v".to_string(), Value::from(1.0))]);

    let started = std::time::Instant::now();
    let outputs = executor
        .execute_node(&node, inputs.clone(), &test_context())
        .await
        .unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_millis(10));
    assert_eq!(outputs, inputs);
}

#[tokio::test]
async fn http_request_requires_a_url() {
    let executor = test_executor().await;
    let node = Node::new("h", "http.request", "h");

    let err = executor
        .execute_node(&node, PortValues::new(), &test_context())
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::MissingInput(port) if port == "url"));
}
