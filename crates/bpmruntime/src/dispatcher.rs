use crate::instance::{InstanceCore, InstanceStatus};
use crate::node::ProcessNode;
use bpmcore::{node_types, Bindings, ExecutionEvent};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Work items delivered to an instance's dispatcher
#[derive(Debug)]
pub(crate) enum Signal {
    Dispatch {
        node: String,
        previous: Option<String>,
    },
    /// Output captured when the handler called `complete`
    Completed {
        node: String,
        output: Option<Bindings>,
    },
}

/// Drives one instance: turns signals into handler executions
///
/// Handlers never call into their successors directly. Completion is a
/// message; the dispatcher propagates the output and spawns the successor
/// executions, so stack depth stays flat however long the walk runs.
pub(crate) struct Dispatcher {
    core: Arc<InstanceCore>,
    signals: mpsc::UnboundedReceiver<Signal>,
    running: JoinSet<()>,
}

impl Dispatcher {
    pub(crate) fn new(core: Arc<InstanceCore>, signals: mpsc::UnboundedReceiver<Signal>) -> Self {
        Self {
            core,
            signals,
            running: JoinSet::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        let cancellation = self.core.cancellation.clone();

        loop {
            if self.running.is_empty() {
                match self.signals.try_recv() {
                    Ok(signal) => {
                        self.handle(signal);
                        continue;
                    }
                    Err(TryRecvError::Empty) => self.core.set_status(InstanceStatus::Idle),
                    Err(TryRecvError::Disconnected) => break,
                }
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                signal = self.signals.recv() => match signal {
                    Some(signal) => {
                        self.core.set_status(InstanceStatus::Running);
                        self.handle(signal);
                    }
                    None => break,
                },
                Some(joined) = self.running.join_next(), if !self.running.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(instance = %self.core.id, "Handler panicked: {}", e);
                        }
                    }
                }
            }
        }

        self.running.shutdown().await;
        tracing::info!(instance = %self.core.id, "Process instance stopped");
        self.core.set_status(InstanceStatus::Stopped);
    }

    fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Dispatch { node, previous } => {
                let previous = previous.and_then(|id| self.core.graph.get(&id).cloned());
                match self.core.graph.get(&node).cloned() {
                    Some(node) => self.dispatch(node, previous),
                    None => tracing::warn!(node = %node, "Dispatch for unknown node"),
                }
            }
            Signal::Completed { node, output } => match self.core.graph.get(&node).cloned() {
                Some(node) => self.propagate(node, output),
                None => tracing::warn!(node = %node, "Completion for unknown node"),
            },
        }
    }

    /// Copy a completed node's output into each successor, then dispatch it.
    fn propagate(&mut self, node: Arc<ProcessNode>, output: Option<Bindings>) {
        let core = self.core.clone();
        core.events.emit(ExecutionEvent::NodeCompleted {
            instance_id: core.id,
            node_id: node.id().to_string(),
            timestamp: Utc::now(),
        });

        let payload = output.unwrap_or_else(|| core.current_inputs());
        if node.node_type() == node_types::END_EVENT {
            core.record_output(payload.clone());
        }

        for successor in core.graph.successors(node.id()) {
            tracing::debug!(from = %node.id(), to = %successor.id(), "Propagating output");
            successor.receive(node.id(), payload.clone());
            self.dispatch(successor.clone(), Some(node.clone()));
        }
    }

    fn dispatch(&mut self, node: Arc<ProcessNode>, previous: Option<Arc<ProcessNode>>) {
        let Some(handler) = self.core.handler_for(node.node_type()) else {
            tracing::error!(node = %node.id(), node_type = %node.node_type(), "No handler registered");
            node.halt(format!("no handler registered for '{}'", node.node_type()));
            return;
        };

        let core = self.core.clone();
        node.mark_dispatched(|| core.current_inputs());
        core.events.emit(ExecutionEvent::NodeDispatched {
            instance_id: core.id,
            node_id: node.id().to_string(),
            node_type: node.node_type().to_string(),
            previous: previous.as_ref().map(|p| p.id().to_string()),
            timestamp: Utc::now(),
        });

        let span = tracing::info_span!(
            "node",
            instance = %core.id,
            id = %node.id(),
            node_type = %node.node_type()
        );
        let timeout = core.handler_timeout;

        self.running.spawn(
            async move {
                tracing::debug!("Executing handler");
                let execution = handler.execute(node.clone(), previous);
                match timeout {
                    Some(limit) => {
                        if tokio::time::timeout(limit, execution).await.is_err() {
                            node.halt(format!(
                                "handler timed out after {}ms",
                                limit.as_millis()
                            ));
                        }
                    }
                    None => execution.await,
                }
            }
            .instrument(span),
        );
    }
}
