use crate::dispatcher::Signal;
use crate::instance::InstanceCore;
use bpmcore::{Bindings, EvaluationFailure, ExecutionEvent, NodeTemplate};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a node within one round of execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    Dispatched,
    Completed,
}

/// Runtime vertex of a process instance
///
/// One exists per template id per instance. Handlers receive it, read and
/// write its bindings, and call [`ProcessNode::complete`] to advance the
/// walk to its successors.
pub struct ProcessNode {
    id: String,
    node_type: String,
    name: Option<String>,
    expression: Option<String>,
    instance: Weak<InstanceCore>,
    input: Mutex<Option<Bindings>>,
    output: Mutex<Option<Bindings>>,
    /// Latest payload received from each predecessor
    inbox: Mutex<BTreeMap<String, Bindings>>,
    /// Predecessors still awaited by a fan-in; `None` until armed
    waiting: Mutex<Option<HashSet<String>>>,
    state: Mutex<NodeState>,
    dispatches: AtomicUsize,
    completions: AtomicUsize,
}

impl ProcessNode {
    pub(crate) fn new(template: &NodeTemplate, instance: Weak<InstanceCore>) -> Self {
        Self {
            id: template.id.clone(),
            node_type: template.node_type.clone(),
            name: template.name.clone(),
            expression: template.expression.clone(),
            instance,
            input: Mutex::new(None),
            output: Mutex::new(None),
            inbox: Mutex::new(BTreeMap::new()),
            waiting: Mutex::new(None),
            state: Mutex::new(NodeState::Idle),
            dispatches: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Guard or computed-output body carried by the template.
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn input(&self) -> Option<Bindings> {
        self.input.lock().clone()
    }

    pub fn set_input(&self, input: Bindings) {
        *self.input.lock() = Some(input);
    }

    pub fn output(&self) -> Option<Bindings> {
        self.output.lock().clone()
    }

    pub fn set_output(&self, output: Bindings) {
        *self.output.lock() = Some(output);
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub fn completion_count(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn successors(&self) -> Vec<Arc<ProcessNode>> {
        match self.instance.upgrade() {
            Some(core) => core.graph.successors(&self.id).into_iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn successor_ids(&self) -> Vec<String> {
        match self.instance.upgrade() {
            Some(core) => core.graph.successor_ids(&self.id),
            None => Vec::new(),
        }
    }

    pub fn predecessor_ids(&self) -> Vec<String> {
        match self.instance.upgrade() {
            Some(core) => core.graph.predecessor_ids(&self.id),
            None => Vec::new(),
        }
    }

    /// How script handlers treat a failed evaluation, per the definition.
    pub fn evaluation_policy(&self) -> EvaluationFailure {
        self.instance
            .upgrade()
            .map(|core| core.definition.settings.on_evaluation_error)
            .unwrap_or_default()
    }

    /// Token cancelled when the owning instance stops.
    pub fn cancellation(&self) -> CancellationToken {
        match self.instance.upgrade() {
            Some(core) => core.cancellation.child_token(),
            None => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        if let Some(core) = self.instance.upgrade() {
            core.events.create_emitter(core.id, &self.id).info(message);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        if let Some(core) = self.instance.upgrade() {
            core.events.create_emitter(core.id, &self.id).warn(message);
        }
    }

    /// Signal that this node's handler has produced its output.
    ///
    /// The output is captured here, so a later `set_output` (from another
    /// execution of the same node) cannot change what this completion
    /// propagates. The dispatcher then copies it into every successor and
    /// dispatches them. Must be called at most once per execution; a
    /// handler that never calls it ends its branch.
    pub fn complete(&self) {
        let output = self.output();
        *self.state.lock() = NodeState::Completed;
        self.completions.fetch_add(1, Ordering::SeqCst);

        match self.instance.upgrade() {
            Some(core) => core.signal(Signal::Completed {
                node: self.id.clone(),
                output,
            }),
            None => tracing::warn!(node = %self.id, "Completion after instance was dropped"),
        }
    }

    /// End this branch without completing, recording why.
    pub fn halt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(node = %self.id, %reason, "Branch halted");
        if let Some(core) = self.instance.upgrade() {
            core.events.emit(ExecutionEvent::BranchHalted {
                instance_id: core.id,
                node_id: self.id.clone(),
                reason,
                timestamp: Utc::now(),
            });
        }
    }

    /// Record an arrival at this node's fan-in barrier.
    ///
    /// The wait-set is armed with every predecessor on the first arrival of
    /// a round. Returns `true` exactly once per round: for the arrival that
    /// empties the wait-set, which also disarms it for the next round. An
    /// arrival from a predecessor that already arrived this round is
    /// ignored. Removal and the emptiness check share one critical section
    /// on this node's own lock.
    pub fn arrive(&self, from: Option<&str>) -> bool {
        let mut waiting = self.waiting.lock();
        let set = waiting.get_or_insert_with(|| self.predecessor_ids().into_iter().collect());

        if let Some(from) = from {
            if !set.remove(from) {
                tracing::debug!(node = %self.id, from, "Ignoring repeated arrival");
                return false;
            }
        }

        if set.is_empty() {
            *waiting = None;
            true
        } else {
            tracing::debug!(node = %self.id, remaining = set.len(), "Waiting for predecessors");
            false
        }
    }

    /// Predecessors still awaited in the current round.
    pub fn pending_arrivals(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .waiting
            .lock()
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        pending.sort();
        pending
    }

    /// Drain the payloads received from predecessors, merged in
    /// predecessor-id order (later ids win on key clashes).
    pub fn take_arrivals(&self) -> Bindings {
        let inbox = std::mem::take(&mut *self.inbox.lock());
        inbox.into_values().fold(Bindings::new(), |mut merged, payload| {
            merged.extend(payload);
            merged
        })
    }

    /// Propagation step: `from` completed with `payload`.
    pub(crate) fn receive(&self, from: &str, payload: Bindings) {
        self.inbox.lock().insert(from.to_string(), payload.clone());
        *self.input.lock() = Some(payload);
    }

    pub(crate) fn mark_dispatched(&self, seed: impl FnOnce() -> Bindings) {
        {
            let mut input = self.input.lock();
            if input.is_none() {
                *input = Some(seed());
            }
        }
        *self.state.lock() = NodeState::Dispatched;
        self.dispatches.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for ProcessNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("state", &self.state())
            .field("dispatches", &self.dispatch_count())
            .finish()
    }
}
