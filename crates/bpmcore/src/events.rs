use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type InstanceId = Uuid;

/// Events emitted while a process instance runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    InstanceStarted {
        instance_id: InstanceId,
        definition_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    NodeDispatched {
        instance_id: InstanceId,
        node_id: String,
        node_type: String,
        previous: Option<String>,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        instance_id: InstanceId,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A branch stopped advancing without its node completing.
    BranchHalted {
        instance_id: InstanceId,
        node_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    InstanceIdle {
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
    },
    InstanceStopped {
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        instance_id: InstanceId,
        node_id: String,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn instance_id(&self) -> InstanceId {
        match self {
            ExecutionEvent::InstanceStarted { instance_id, .. }
            | ExecutionEvent::NodeDispatched { instance_id, .. }
            | ExecutionEvent::NodeCompleted { instance_id, .. }
            | ExecutionEvent::BranchHalted { instance_id, .. }
            | ExecutionEvent::InstanceIdle { instance_id, .. }
            | ExecutionEvent::InstanceStopped { instance_id, .. }
            | ExecutionEvent::NodeEvent { instance_id, .. } => *instance_id,
        }
    }
}

/// Messages a handler publishes about its own node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter handed to nodes so handlers can send updates
#[derive(Clone)]
pub struct EventEmitter {
    instance_id: InstanceId,
    node_id: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        instance_id: InstanceId,
        node_id: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            instance_id,
            node_id: node_id.into(),
            sender,
        }
    }

    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            instance_id: self.instance_id,
            node_id: self.node_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }
}

/// Broadcast bus shared by every instance of an engine
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is fine.
    pub fn emit(&self, event: ExecutionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn create_emitter(&self, instance_id: InstanceId, node_id: &str) -> EventEmitter {
        EventEmitter::new(instance_id, node_id, self.sender.clone())
    }
}
