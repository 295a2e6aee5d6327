//! End-to-end engine scenarios: linear and diamond data flow, cycle
//! rejection, cancellation, timeout, pause gating, and the boundary
//! behaviors around seeds and defaults.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wirecore::{
    EventBus, Node, NodeError, Port, PortValues, SubscribeOptions, Value, Workflow,
};
use wireruntime::{
    EngineError, ExecuteOptions, NodeExecutor, RunStatus, WorkflowEngine,
};

fn number_node(id: &str, node_type: &str) -> Node {
    Node::new(id, node_type, id)
        .with_input(Port::input("v", "number"))
        .with_output(Port::output("v", "number"))
}

fn outputs_of(value: f64) -> PortValues {
    PortValues::from([("v".to_string(), Value::from(value))])
}

async fn register_arithmetic(executor: &NodeExecutor) {
    executor
        .register_executor("const", |node, _inputs, _ctx| async move {
            let value = node.config.get("value").cloned().unwrap_or(Value::Null);
            Ok(PortValues::from([("v".to_string(), value)]))
        })
        .await;
    executor
        .register_executor("double", |_node, inputs, _ctx| async move {
            let v = inputs
                .get("v")
                .and_then(Value::as_f64)
                .ok_or_else(|| NodeError::MissingInput("v".into()))?;
            Ok(outputs_of(v * 2.0))
        })
        .await;
    executor
        .register_executor("sink", |_node, inputs, _ctx| async move { Ok(inputs) })
        .await;
}

/// Record `(event_type, nodeId?)` pairs for the given event types
async fn record_events(bus: &EventBus, event_types: &[&'static str]) -> Arc<Mutex<Vec<(String, String)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for event_type in event_types {
        let log = log.clone();
        bus.subscribe(
            *event_type,
            move |event| {
                let log = log.clone();
                async move {
                    let node_id = event
                        .payload
                        .as_object()
                        .and_then(|o| o.get("nodeId"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    log.lock().unwrap().push((event.event_type, node_id));
                    Ok(())
                }
            },
            SubscribeOptions { run_async: false, ..Default::default() },
        )
        .await;
    }
    log
}

#[tokio::test]
async fn linear_sum_threads_values_through_connections() {
    let engine = WorkflowEngine::new(EventBus::new());
    register_arithmetic(engine.executor()).await;

    let mut wf = Workflow::new("linear", "linear sum");
    wf.add_node(number_node("A", "const").with_config("value", 7.0)).unwrap();
    wf.add_node(number_node("B", "double")).unwrap();
    wf.add_node(number_node("C", "sink")).unwrap();
    wf.connect("A", "v", "B", "v").unwrap();
    wf.connect("B", "v", "C", "v").unwrap();
    wf.mark_entry("A");
    wf.mark_exit("C");

    let result = engine
        .execute_workflow(&wf, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.nodes_executed, 3);
    assert_eq!(result.outputs["C"]["v"].as_f64(), Some(14.0));
    assert_eq!(engine.workflow_status("linear").await, RunStatus::Completed);
}

#[tokio::test]
async fn diamond_under_parallel_mode_joins_levels() {
    let bus = EventBus::new();
    let events = record_events(
        &bus,
        &["node:execution:started", "node:execution:completed"],
    )
    .await;

    let engine = WorkflowEngine::new(bus);
    let executor = engine.executor();

    executor
        .register_executor("source", |_node, _inputs, _ctx| async move {
            Ok(PortValues::from([("x".to_string(), Value::from(1.0))]))
        })
        .await;
    executor
        .register_executor("left", |_node, inputs, _ctx| async move {
            let x = inputs.get("x").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(PortValues::from([("y".to_string(), Value::from(x + 1.0))]))
        })
        .await;
    executor
        .register_executor("right", |_node, inputs, _ctx| async move {
            let x = inputs.get("x").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(PortValues::from([("z".to_string(), Value::from(x + 2.0))]))
        })
        .await;
    executor
        .register_executor("join", |_node, inputs, _ctx| async move {
            let y = inputs.get("y").and_then(Value::as_f64).unwrap_or(0.0);
            let z = inputs.get("z").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(PortValues::from([("out".to_string(), Value::from(y + z))]))
        })
        .await;

    let mut wf = Workflow::new("diamond", "diamond");
    wf.add_node(Node::new("S", "source", "S").with_output(Port::output("x", "number")))
        .unwrap();
    wf.add_node(
        Node::new("L", "left", "L")
            .with_input(Port::input("x", "number"))
            .with_output(Port::output("y", "number")),
    )
    .unwrap();
    wf.add_node(
        Node::new("R", "right", "R")
            .with_input(Port::input("x", "number"))
            .with_output(Port::output("z", "number")),
    )
    .unwrap();
    wf.add_node(
        Node::new("J", "join", "J")
            .with_input(Port::input("y", "number"))
            .with_input(Port::input("z", "number"))
            .with_output(Port::output("out", "number")),
    )
    .unwrap();
    wf.connect("S", "x", "L", "x").unwrap();
    wf.connect("S", "x", "R", "x").unwrap();
    wf.connect("L", "y", "J", "y").unwrap();
    wf.connect("R", "z", "J", "z").unwrap();
    wf.mark_entry("S");
    wf.mark_exit("J");

    let result = engine
        .execute_workflow(&wf, ExecuteOptions { parallel: true, ..Default::default() })
        .await
        .unwrap();

    assert_eq!(result.outputs["J"]["out"].as_f64(), Some(5.0));
    assert_eq!(result.stats.nodes_executed, 4);

    // Dependency edges hold under concurrency: S completes before L or
    // R starts, and both complete before J starts
    let log = events.lock().unwrap().clone();
    let index_of = |event: &str, node: &str| {
        log.iter()
            .position(|(e, n)| e == event && n == node)
            .unwrap_or_else(|| panic!("missing {event} for {node}"))
    };
    assert!(index_of("node:execution:completed", "S") < index_of("node:execution:started", "L"));
    assert!(index_of("node:execution:completed", "S") < index_of("node:execution:started", "R"));
    assert!(index_of("node:execution:completed", "L") < index_of("node:execution:started", "J"));
    assert!(index_of("node:execution:completed", "R") < index_of("node:execution:started", "J"));
}

#[tokio::test]
async fn cycle_rejected_without_starting_nodes() {
    let bus = EventBus::new();
    let events = record_events(&bus, &["node:execution:started"]).await;

    let engine = WorkflowEngine::new(bus);
    register_arithmetic(engine.executor()).await;

    let mut wf = Workflow::new("cyclic", "cyclic");
    wf.add_node(number_node("A", "sink")).unwrap();
    wf.add_node(number_node("B", "sink")).unwrap();
    wf.connect("A", "v", "B", "v").unwrap();
    wf.connect("B", "v", "A", "v").unwrap();

    let err = engine
        .execute_workflow(&wf, ExecuteOptions::default())
        .await
        .unwrap_err();

    match err {
        EngineError::Graph(wirecore::GraphError::CycleDetected { node_id }) => {
            assert!(node_id == "A" || node_id == "B");
        }
        other => panic!("expected cycle error, got {other}"),
    }
    assert!(events.lock().unwrap().is_empty());
    assert!(engine.workflow_status("cyclic").await == RunStatus::Completed);
}

#[tokio::test]
async fn mid_run_cancel_rejects_and_removes_handle() {
    let bus = EventBus::new();
    let failed_events = record_events(&bus, &["workflow:failed"]).await;

    let engine = Arc::new(WorkflowEngine::new(bus));
    let executor = engine.executor();
    register_arithmetic(executor).await;
    executor
        .register_executor("slow", |_node, inputs, _ctx| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(inputs)
        })
        .await;

    let mut wf = Workflow::new("cancellable", "cancellable");
    wf.add_node(number_node("first", "const").with_config("value", 1.0)).unwrap();
    wf.add_node(number_node("middle", "slow")).unwrap();
    wf.add_node(number_node("last", "sink")).unwrap();
    wf.connect("first", "v", "middle", "v").unwrap();
    wf.connect("middle", "v", "last", "v").unwrap();
    wf.mark_entry("first");
    wf.mark_exit("last");

    let run = {
        let engine = engine.clone();
        let wf = wf.clone();
        tokio::spawn(async move { engine.execute_workflow(&wf, ExecuteOptions::default()).await })
    };

    // Let the first node finish and the slow one start
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.stop_workflow("cancellable").await.unwrap();
    assert_eq!(engine.workflow_status("cancellable").await, RunStatus::Cancelled);

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::Cancelled(id) if id == "cancellable"));

    assert_eq!(failed_events.lock().unwrap().len(), 1);
    // Handle removed: absence reads as completed
    assert_eq!(engine.workflow_status("cancellable").await, RunStatus::Completed);
    assert!(matches!(
        engine.stop_workflow("cancellable").await,
        Err(EngineError::NotRunning(_))
    ));
}

#[tokio::test]
async fn timeout_cancels_further_scheduling() {
    let engine = WorkflowEngine::new(EventBus::new());
    let executor = engine.executor();
    register_arithmetic(executor).await;
    executor
        .register_executor("slow", |_node, inputs, _ctx| async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Ok(inputs)
        })
        .await;

    let mut wf = Workflow::new("deadline", "deadline");
    wf.add_node(number_node("a", "slow")).unwrap();
    wf.add_node(number_node("b", "sink")).unwrap();
    wf.connect("a", "v", "b", "v").unwrap();

    let err = engine
        .execute_workflow(
            &wf,
            ExecuteOptions { timeout: Duration::from_millis(30), ..Default::default() },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Timeout(id, _) if id == "deadline"));
}

#[tokio::test]
async fn zero_timeout_means_no_timeout() {
    let engine = WorkflowEngine::new(EventBus::new());
    register_arithmetic(engine.executor()).await;

    let mut wf = Workflow::new("untimed", "untimed");
    wf.add_node(number_node("only", "const").with_config("value", 3.0)).unwrap();
    wf.mark_entry("only");
    wf.mark_exit("only");

    let result = engine
        .execute_workflow(
            &wf,
            ExecuteOptions { timeout: Duration::ZERO, ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(result.outputs["only"]["v"].as_f64(), Some(3.0));
}

#[tokio::test]
async fn empty_workflow_completes_immediately() {
    let engine = WorkflowEngine::new(EventBus::new());
    let wf = Workflow::new("empty", "empty");

    let result = engine
        .execute_workflow(&wf, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.nodes_executed, 0);
    assert!(result.outputs.is_empty());
}

#[tokio::test]
async fn entry_node_that_is_also_exit_returns_its_outputs() {
    let engine = WorkflowEngine::new(EventBus::new());
    register_arithmetic(engine.executor()).await;

    let mut wf = Workflow::new("solo", "solo");
    wf.add_node(number_node("only", "double")).unwrap();
    wf.mark_entry("only");
    wf.mark_exit("only");

    let result = engine
        .execute_workflow(
            &wf,
            ExecuteOptions {
                inputs: PortValues::from([("v".to_string(), Value::from(21.0))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.outputs["only"]["v"].as_f64(), Some(42.0));
}

#[tokio::test]
async fn port_default_substitutes_for_missing_input() {
    let engine = WorkflowEngine::new(EventBus::new());
    register_arithmetic(engine.executor()).await;

    let mut wf = Workflow::new("defaulted", "defaulted");
    wf.add_node(
        Node::new("d", "double", "d")
            .with_input(Port::input("v", "number").with_default(5.0))
            .with_output(Port::output("v", "number")),
    )
    .unwrap();
    wf.mark_exit("d");

    let result = engine
        .execute_workflow(&wf, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outputs["d"]["v"].as_f64(), Some(10.0));
}

#[tokio::test]
async fn seed_inputs_lose_to_connection_values() {
    let engine = WorkflowEngine::new(EventBus::new());
    register_arithmetic(engine.executor()).await;

    // "mid" is declared an entry point even though it has an inbound
    // connection; the connection-sourced value must win over the seed
    let mut wf = Workflow::new("seeded", "seeded");
    wf.add_node(number_node("head", "const").with_config("value", 10.0)).unwrap();
    wf.add_node(number_node("mid", "double")).unwrap();
    wf.connect("head", "v", "mid", "v").unwrap();
    wf.mark_entry("head");
    wf.mark_entry("mid");
    wf.mark_exit("mid");

    let result = engine
        .execute_workflow(
            &wf,
            ExecuteOptions {
                inputs: PortValues::from([("v".to_string(), Value::from(999.0))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.outputs["mid"]["v"].as_f64(), Some(20.0));
}

#[tokio::test]
async fn node_failure_aborts_the_run() {
    let bus = EventBus::new();
    let events = record_events(&bus, &["node:execution:started", "workflow:failed"]).await;

    let engine = WorkflowEngine::new(bus);
    let executor = engine.executor();
    register_arithmetic(executor).await;
    executor
        .register_executor("broken", |_node, _inputs, _ctx| async move {
            Err::<PortValues, _>(NodeError::ExecutionFailed("deliberate".into()))
        })
        .await;

    let mut wf = Workflow::new("failing", "failing");
    wf.add_node(number_node("a", "const").with_config("value", 1.0)).unwrap();
    wf.add_node(number_node("b", "broken")).unwrap();
    wf.add_node(number_node("c", "sink")).unwrap();
    wf.connect("a", "v", "b", "v").unwrap();
    wf.connect("b", "v", "c", "v").unwrap();
    wf.mark_entry("a");

    let err = engine
        .execute_workflow(&wf, ExecuteOptions::default())
        .await
        .unwrap_err();

    match err {
        EngineError::NodeFailed { node_id, source } => {
            assert_eq!(node_id, "b");
            assert!(matches!(source, NodeError::ExecutionFailed(_)));
        }
        other => panic!("expected node failure, got {other}"),
    }

    let log = events.lock().unwrap().clone();
    let started: Vec<&str> = log
        .iter()
        .filter(|(e, _)| e == "node:execution:started")
        .map(|(_, n)| n.as_str())
        .collect();
    assert_eq!(started, vec!["a", "b"], "downstream node must not start");
    assert_eq!(log.iter().filter(|(e, _)| e == "workflow:failed").count(), 1);
}

#[tokio::test]
async fn parallel_level_failure_joins_siblings_then_rejects() {
    let engine = Arc::new(WorkflowEngine::new(EventBus::new()));
    let executor = engine.executor();
    register_arithmetic(executor).await;

    let sibling_finished = Arc::new(Mutex::new(false));
    {
        let sibling_finished = sibling_finished.clone();
        executor
            .register_executor("steady", move |_node, inputs, _ctx| {
                let sibling_finished = sibling_finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    *sibling_finished.lock().unwrap() = true;
                    Ok(inputs)
                }
            })
            .await;
    }
    executor
        .register_executor("broken", |_node, _inputs, _ctx| async move {
            Err::<PortValues, _>(NodeError::ExecutionFailed("deliberate".into()))
        })
        .await;

    let mut wf = Workflow::new("level-fail", "level fail");
    wf.add_node(number_node("root", "const").with_config("value", 1.0)).unwrap();
    wf.add_node(number_node("bad", "broken")).unwrap();
    wf.add_node(number_node("good", "steady")).unwrap();
    wf.add_node(number_node("after", "sink")).unwrap();
    wf.connect("root", "v", "bad", "v").unwrap();
    wf.connect("root", "v", "good", "v").unwrap();
    wf.connect("good", "v", "after", "v").unwrap();
    wf.mark_entry("root");

    let err = engine
        .execute_workflow(&wf, ExecuteOptions { parallel: true, ..Default::default() })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NodeFailed { node_id, .. } if node_id == "bad"));
    // Already-started siblings ran to completion before the run settled
    assert!(*sibling_finished.lock().unwrap());
}

#[tokio::test]
async fn pause_gates_the_scheduler_until_resume() {
    let bus = EventBus::new();
    let events = record_events(&bus, &["node:execution:started"]).await;

    let engine = Arc::new(WorkflowEngine::new(bus));
    let executor = engine.executor();
    register_arithmetic(executor).await;
    executor
        .register_executor("slowish", |_node, inputs, _ctx| async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(inputs)
        })
        .await;

    let mut wf = Workflow::new("pausable", "pausable");
    wf.add_node(number_node("one", "slowish")).unwrap();
    wf.add_node(number_node("two", "sink")).unwrap();
    wf.connect("one", "v", "two", "v").unwrap();
    wf.mark_entry("one");
    wf.mark_exit("two");

    let run = {
        let engine = engine.clone();
        let wf = wf.clone();
        tokio::spawn(async move {
            engine
                .execute_workflow(
                    &wf,
                    ExecuteOptions {
                        inputs: PortValues::from([("v".to_string(), Value::from(1.0))]),
                        ..Default::default()
                    },
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    engine.pause_workflow("pausable").await.unwrap();
    assert_eq!(engine.workflow_status("pausable").await, RunStatus::Paused);

    // Well past node one's completion; node two must still be held back
    tokio::time::sleep(Duration::from_millis(100)).await;
    {
        let log = events.lock().unwrap();
        assert!(
            !log.iter().any(|(_, node)| node == "two"),
            "paused run must not start further nodes"
        );
    }

    // Double-pause is an invalid transition
    assert!(matches!(
        engine.pause_workflow("pausable").await,
        Err(EngineError::InvalidTransition { .. })
    ));

    engine.resume_workflow("pausable").await.unwrap();
    let result = run.await.unwrap().unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert!(events.lock().unwrap().iter().any(|(_, node)| node == "two"));
}

#[tokio::test]
async fn concurrent_run_of_same_workflow_is_rejected() {
    let engine = Arc::new(WorkflowEngine::new(EventBus::new()));
    engine
        .executor()
        .register_executor("slow", |_node, inputs, _ctx| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(inputs)
        })
        .await;

    let mut wf = Workflow::new("exclusive", "exclusive");
    wf.add_node(number_node("only", "slow")).unwrap();

    let run = {
        let engine = engine.clone();
        let wf = wf.clone();
        tokio::spawn(async move { engine.execute_workflow(&wf, ExecuteOptions::default()).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = engine
        .execute_workflow(&wf, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning(id) if id == "exclusive"));

    run.await.unwrap().unwrap();
}
