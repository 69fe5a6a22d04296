use crate::dispatcher::{Dispatcher, Signal};
use crate::engine::RuntimeConfig;
use crate::graph::{GraphBuilder, ProcessGraph};
use crate::handler::NodeHandler;
use crate::node::ProcessNode;
use crate::registry::HandlerRegistry;
use bpmcore::{
    node_types, Bindings, DefinitionError, EventBus, ExecutionEvent, InstanceId,
    ParameterTypeError, ProcessDefinition, ProcessError, UnregisteredHandlerError,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Coarse progress of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    NotStarted,
    /// Handler executions are running or signals are queued.
    Running,
    /// Nothing is running; the walk has ended unless a handler completes
    /// later from work it spawned itself.
    Idle,
    Stopped,
}

type MergeFn = dyn Fn(Option<Bindings>, Bindings) -> Bindings + Send + Sync;

/// How end-node outputs are folded into the instance's recorded output
/// when several branches reach an end node
#[derive(Clone, Default)]
pub enum OutputPolicy {
    /// Each end node replaces whatever was recorded before.
    #[default]
    LastWriteWins,
    /// Keys accumulate; a later end node overwrites clashing keys.
    MergeKeys,
    /// Host-supplied fold of (recorded so far, incoming).
    Custom(Arc<MergeFn>),
}

impl OutputPolicy {
    pub fn custom(
        merge: impl Fn(Option<Bindings>, Bindings) -> Bindings + Send + Sync + 'static,
    ) -> Self {
        OutputPolicy::Custom(Arc::new(merge))
    }

    pub fn apply(&self, current: Option<Bindings>, incoming: Bindings) -> Bindings {
        match self {
            OutputPolicy::LastWriteWins => incoming,
            OutputPolicy::MergeKeys => {
                let mut merged = current.unwrap_or_default();
                merged.extend(incoming);
                merged
            }
            OutputPolicy::Custom(merge) => merge(current, incoming),
        }
    }
}

impl fmt::Debug for OutputPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputPolicy::LastWriteWins => f.write_str("LastWriteWins"),
            OutputPolicy::MergeKeys => f.write_str("MergeKeys"),
            OutputPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// State shared between an instance, its nodes and its dispatcher
pub(crate) struct InstanceCore {
    pub(crate) id: InstanceId,
    pub(crate) definition: Arc<ProcessDefinition>,
    pub(crate) graph: ProcessGraph<Arc<ProcessNode>>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) handler_timeout: Option<Duration>,
    inputs: RwLock<Bindings>,
    outputs: Mutex<Option<Bindings>>,
    output_policy: RwLock<OutputPolicy>,
    handlers: RwLock<HandlerRegistry>,
    signals: mpsc::UnboundedSender<Signal>,
    status: watch::Sender<InstanceStatus>,
}

impl InstanceCore {
    pub(crate) fn signal(&self, signal: Signal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!(instance = %self.id, "Dispatcher gone; dropping signal");
        }
    }

    pub(crate) fn current_inputs(&self) -> Bindings {
        self.inputs.read().clone()
    }

    pub(crate) fn handler_for(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.read().get(node_type)
    }

    pub(crate) fn record_output(&self, incoming: Bindings) {
        let policy = self.output_policy.read().clone();
        let mut outputs = self.outputs.lock();
        let current = outputs.take();
        *outputs = Some(policy.apply(current, incoming));
    }

    pub(crate) fn set_status(&self, status: InstanceStatus) {
        let previous = self.status.send_replace(status);
        if previous == status {
            return;
        }
        tracing::debug!(instance = %self.id, ?status, "Instance status changed");
        match status {
            InstanceStatus::Idle => self.events.emit(ExecutionEvent::InstanceIdle {
                instance_id: self.id,
                timestamp: Utc::now(),
            }),
            InstanceStatus::Stopped => self.events.emit(ExecutionEvent::InstanceStopped {
                instance_id: self.id,
                timestamp: Utc::now(),
            }),
            _ => {}
        }
    }
}

/// One execution of a process definition
///
/// Owns a freshly built graph, the parameter bindings and the handler
/// registry. Nothing is persisted; dropping the instance stops it.
pub struct ProcessInstance {
    core: Arc<InstanceCore>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
}

impl ProcessInstance {
    /// Instantiate with default runtime settings and a private event bus.
    pub fn new(definition: Arc<ProcessDefinition>) -> Result<Self, DefinitionError> {
        let config = RuntimeConfig::default();
        let events = Arc::new(EventBus::new(config.event_buffer_size));
        Self::with_config(definition, &config, events)
    }

    pub fn with_config(
        definition: Arc<ProcessDefinition>,
        config: &RuntimeConfig,
        events: Arc<EventBus>,
    ) -> Result<Self, DefinitionError> {
        let templates = GraphBuilder::new(&definition).build()?;
        let (signals, receiver) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(InstanceStatus::NotStarted);
        let handler_timeout = definition
            .settings
            .handler_timeout_ms
            .or(config.handler_timeout_ms)
            .map(Duration::from_millis);

        let core = Arc::new_cyclic(|weak| InstanceCore {
            id: InstanceId::new_v4(),
            graph: templates.map(|t| Arc::new(ProcessNode::new(t, weak.clone()))),
            definition,
            events,
            cancellation: CancellationToken::new(),
            handler_timeout,
            inputs: RwLock::new(Bindings::new()),
            outputs: Mutex::new(None),
            output_policy: RwLock::new(OutputPolicy::default()),
            handlers: RwLock::new(HandlerRegistry::new()),
            signals,
            status,
        });

        tracing::debug!(
            instance = %core.id,
            definition = %core.definition.id,
            nodes = core.graph.len(),
            "Created process instance"
        );

        Ok(Self {
            core,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.core.id
    }

    pub fn definition(&self) -> &Arc<ProcessDefinition> {
        &self.core.definition
    }

    pub fn graph(&self) -> &ProcessGraph<Arc<ProcessNode>> {
        &self.core.graph
    }

    pub fn node(&self, id: &str) -> Option<Arc<ProcessNode>> {
        self.core.graph.get(id).cloned()
    }

    /// Validate and store the input binding, seeding the start node.
    ///
    /// Every name must be a declared property and every value must match
    /// its declared kind. On failure the stored binding is left untouched.
    pub fn bind_inputs(&self, inputs: Bindings) -> Result<(), ParameterTypeError> {
        let mut names: Vec<&String> = inputs.keys().collect();
        names.sort();

        for name in names {
            let property = self.core.definition.find_property(name).ok_or_else(|| {
                ParameterTypeError::Undeclared { name: name.clone() }
            })?;
            let value = &inputs[name];
            if !property.accepts(value) {
                return Err(ParameterTypeError::KindMismatch {
                    name: name.clone(),
                    expected: property.expected(),
                    actual: value.type_name().to_string(),
                });
            }
        }

        *self.core.inputs.write() = inputs.clone();
        self.core.graph.start().set_input(inputs);
        Ok(())
    }

    pub fn inputs(&self) -> Bindings {
        self.core.current_inputs()
    }

    /// Replace the whole handler set; it must cover every type in the graph.
    pub fn set_handlers(&self, registry: HandlerRegistry) -> Result<(), UnregisteredHandlerError> {
        registry.validate(&self.core.graph.node_types())?;
        *self.core.handlers.write() = registry;
        Ok(())
    }

    /// Insert or replace the handler for one node type.
    pub fn set_handler(&self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.core.handlers.write().register(node_type, handler);
    }

    pub fn set_output_policy(&self, policy: OutputPolicy) {
        *self.core.output_policy.write() = policy;
    }

    /// Dispatch the start node and return immediately.
    ///
    /// Fails before anything runs if a node type in the graph has no
    /// handler or the instance was already stopped. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) -> Result<(), ProcessError> {
        if self.core.cancellation.is_cancelled() {
            return Err(ProcessError::Stopped);
        }
        self.core
            .handlers
            .read()
            .validate(&self.core.graph.node_types())?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ProcessError::Execution(e.to_string()))?;
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(ProcessError::AlreadyStarted)?;

        tracing::info!(
            instance = %self.core.id,
            definition = %self.core.definition.name,
            "Starting process instance"
        );
        self.core.set_status(InstanceStatus::Running);
        self.core.events.emit(ExecutionEvent::InstanceStarted {
            instance_id: self.core.id,
            definition_id: self.core.definition.id,
            timestamp: Utc::now(),
        });

        self.core.signal(Signal::Dispatch {
            node: self.core.graph.start_id().to_string(),
            previous: None,
        });
        runtime.spawn(Dispatcher::new(self.core.clone(), receiver).run());
        Ok(())
    }

    /// Bind `inputs`, then start.
    pub fn start_with(&self, inputs: Bindings) -> Result<(), ProcessError> {
        self.bind_inputs(inputs)?;
        self.start()
    }

    /// Output recorded so far by end nodes; may not be final yet.
    pub fn read_outputs(&self) -> Bindings {
        self.core.outputs.lock().clone().unwrap_or_default()
    }

    pub fn status(&self) -> InstanceStatus {
        *self.core.status.borrow()
    }

    /// Wait until nothing is running (or the instance stopped).
    pub async fn wait_until_idle(&self) -> InstanceStatus {
        let mut status = self.core.status.subscribe();
        let settled = status
            .wait_for(|s| {
                matches!(
                    s,
                    InstanceStatus::NotStarted | InstanceStatus::Idle | InstanceStatus::Stopped
                )
            })
            .await
            .map(|s| *s);
        settled.unwrap_or(InstanceStatus::Stopped)
    }

    /// Cancel every running handler execution and stop the walk.
    pub fn stop(&self) {
        tracing::info!(instance = %self.core.id, "Stopping process instance");
        self.core.cancellation.cancel();
        if self.status() == InstanceStatus::NotStarted {
            self.core.set_status(InstanceStatus::Stopped);
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.core.events.subscribe()
    }

    /// Nodes that are end events, in id order.
    pub fn end_nodes(&self) -> Vec<Arc<ProcessNode>> {
        let mut ends: Vec<Arc<ProcessNode>> = self
            .core
            .graph
            .nodes()
            .filter(|n| n.node_type() == node_types::END_EVENT)
            .cloned()
            .collect();
        ends.sort_by(|a, b| a.id().cmp(b.id()));
        ends
    }
}

impl Drop for ProcessInstance {
    fn drop(&mut self) {
        self.core.cancellation.cancel();
    }
}

impl fmt::Debug for ProcessInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessInstance")
            .field("id", &self.core.id)
            .field("definition", &self.core.definition.name)
            .field("status", &self.status())
            .finish()
    }
}
