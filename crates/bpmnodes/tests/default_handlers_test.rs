use bpmcore::{
    node_types, Bindings, EvaluationFailure, ExecutionEvent, NodeTemplate, ProcessDefinition,
    PropertyDeclaration, Value, ValueKind,
};
use bpmnodes::{default_handlers, SimpleEvaluator};
use bpmruntime::{InstanceStatus, ProcessInstance};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn inputs(pairs: &[(&str, Value)]) -> Bindings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn launch(definition: ProcessDefinition) -> ProcessInstance {
    let instance = ProcessInstance::new(Arc::new(definition)).unwrap();
    instance
        .set_handlers(default_handlers(Arc::new(SimpleEvaluator::new())))
        .unwrap();
    instance
}

async fn settle(instance: &ProcessInstance) {
    let status = tokio::time::timeout(Duration::from_secs(5), instance.wait_until_idle())
        .await
        .expect("instance did not settle");
    assert_eq!(status, InstanceStatus::Idle);
}

fn halted(events: &mut broadcast::Receiver<ExecutionEvent>) -> Vec<String> {
    let mut nodes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::BranchHalted { node_id, .. } = event {
            nodes.push(node_id);
        }
    }
    nodes
}

#[tokio::test]
async fn script_chain_computes_outputs() {
    let mut def = ProcessDefinition::new("chain");
    def.declare(PropertyDeclaration::new("p1", "x", ValueKind::Number));
    def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
    def.add_node(NodeTemplate::new("inc", node_types::SCRIPT_TASK).with_expression("x = x + 1"));
    def.add_node(NodeTemplate::new("scale", node_types::SCRIPT_TASK).with_expression("x = x * 10"));
    def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
    def.connect("f1", "start", "inc");
    def.connect("f2", "inc", "scale");
    def.connect("f3", "scale", "end");

    let instance = launch(def);
    instance
        .start_with(inputs(&[("x", Value::Number(1.0))]))
        .unwrap();
    settle(&instance).await;

    assert_eq!(instance.read_outputs()["x"], Value::Number(20.0));
}

#[tokio::test]
async fn exclusive_gateway_follows_true_guard() {
    let mut def = ProcessDefinition::new("routing");
    def.declare(PropertyDeclaration::new("p1", "amount", ValueKind::Number));
    def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
    def.add_node(NodeTemplate::new("route", node_types::EXCLUSIVE_GATEWAY));
    def.add_node(NodeTemplate::new("high", node_types::SCRIPT_TASK).with_expression("lane = 'high'"));
    def.add_node(NodeTemplate::new("low", node_types::SCRIPT_TASK).with_expression("lane = 'low'"));
    def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
    def.connect("f1", "start", "route");
    def.connect_when("to-high", "route", "high", "amount > 100");
    def.connect_when("to-low", "route", "low", "amount <= 100");
    def.connect("f2", "high", "end");
    def.connect("f3", "low", "end");

    let instance = launch(def);
    let mut events = instance.subscribe_events();
    instance
        .start_with(inputs(&[("amount", Value::Number(150.0))]))
        .unwrap();
    settle(&instance).await;

    assert_eq!(instance.read_outputs()["lane"], Value::String("high".into()));
    assert_eq!(instance.node("low").unwrap().dispatch_count(), 0);
    assert_eq!(halted(&mut events), vec!["to-low".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_split_and_join_merge_branches() {
    let mut def = ProcessDefinition::new("split-join");
    def.declare(PropertyDeclaration::new("p1", "x", ValueKind::Number));
    def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
    def.add_node(NodeTemplate::new("split", node_types::PARALLEL_GATEWAY));
    def.add_node(NodeTemplate::new("a", node_types::SCRIPT_TASK).with_expression("a = x + 1"));
    def.add_node(NodeTemplate::new("b", node_types::SCRIPT_TASK).with_expression("b = x * 2"));
    def.add_node(NodeTemplate::new("join", node_types::PARALLEL_GATEWAY));
    def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
    def.connect("f1", "start", "split");
    def.connect("fa", "split", "a");
    def.connect("fb", "split", "b");
    def.connect("ja", "a", "join");
    def.connect("jb", "b", "join");
    def.connect("f2", "join", "end");

    let instance = launch(def);
    instance
        .start_with(inputs(&[("x", Value::Number(5.0))]))
        .unwrap();
    settle(&instance).await;

    let outputs = instance.read_outputs();
    assert_eq!(outputs["a"], Value::Number(6.0));
    assert_eq!(outputs["b"], Value::Number(10.0));

    let join = instance.node("join").unwrap();
    assert_eq!(join.dispatch_count(), 2);
    assert_eq!(join.completion_count(), 1);
    assert_eq!(instance.node("end").unwrap().completion_count(), 1);
}

#[tokio::test]
async fn loop_through_gateway_terminates() {
    let mut def = ProcessDefinition::new("counter");
    def.declare(PropertyDeclaration::new("p1", "n", ValueKind::Number));
    def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
    def.add_node(NodeTemplate::new("inc", node_types::SCRIPT_TASK).with_expression("n = n + 1"));
    def.add_node(NodeTemplate::new("check", node_types::EXCLUSIVE_GATEWAY));
    def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
    def.connect("f1", "start", "inc");
    def.connect("f2", "inc", "check");
    def.connect_when("again", "check", "inc", "n < 3");
    def.connect_when("done", "check", "end", "n >= 3");

    let instance = launch(def);
    instance
        .start_with(inputs(&[("n", Value::Number(0.0))]))
        .unwrap();
    settle(&instance).await;

    assert_eq!(instance.read_outputs()["n"], Value::Number(3.0));
    assert_eq!(instance.node("inc").unwrap().dispatch_count(), 3);
}

fn failing_script(policy: EvaluationFailure) -> ProcessDefinition {
    let mut def = ProcessDefinition::new("failing");
    def.settings.on_evaluation_error = policy;
    def.declare(PropertyDeclaration::new("p1", "x", ValueKind::Number));
    def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
    def.add_node(NodeTemplate::new("divide", node_types::SCRIPT_TASK).with_expression("y = x / 0"));
    def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
    def.connect("f1", "start", "divide");
    def.connect("f2", "divide", "end");
    def
}

#[tokio::test]
async fn failed_script_halts_branch_by_default() {
    let instance = launch(failing_script(EvaluationFailure::HaltBranch));
    let mut events = instance.subscribe_events();
    instance
        .start_with(inputs(&[("x", Value::Number(1.0))]))
        .unwrap();
    settle(&instance).await;

    assert_eq!(instance.node("divide").unwrap().completion_count(), 0);
    assert_eq!(instance.node("end").unwrap().dispatch_count(), 0);
    assert!(instance.read_outputs().is_empty());
    assert_eq!(halted(&mut events), vec!["divide".to_string()]);
}

#[tokio::test]
async fn failed_script_can_continue_with_empty_output() {
    let instance = launch(failing_script(EvaluationFailure::Continue));
    instance
        .start_with(inputs(&[("x", Value::Number(1.0))]))
        .unwrap();
    settle(&instance).await;

    assert_eq!(instance.node("end").unwrap().completion_count(), 1);
    assert!(instance.read_outputs().is_empty());
}

#[tokio::test]
async fn failed_guard_counts_as_false() {
    let mut def = ProcessDefinition::new("bad-guard");
    def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
    def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
    def.connect_when("f1", "start", "end", "missing > 1");

    let instance = launch(def);
    let mut events = instance.subscribe_events();
    instance.start().unwrap();
    settle(&instance).await;

    assert_eq!(instance.node("end").unwrap().dispatch_count(), 0);
    assert_eq!(halted(&mut events), vec!["f1".to_string()]);
}
