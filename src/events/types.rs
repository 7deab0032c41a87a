//! The `Event` union: every tagged variant the Event Store can hold, each
//! carrying a monotonic id, UTC timestamp, and cycle index.

use crate::models::{ActionRecord, Classification, Intent, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleLevel {
    Info,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    ObservationEvent { snapshot: Snapshot },
    AnomalyEvent { signal: &'static str },
    ReasoningEvent { classification: Classification },
    DecisionEvent { intent: Intent },
    ActionEvent { action: ActionRecord },
    RestoreEvent {
        success: bool,
        new_price: Option<i128>,
        tx_hash: Option<String>,
        message: String,
    },
    AgentLifecycleEvent {
        level: LifecycleLevel,
        message: String,
    },
}

impl EventPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ObservationEvent { .. } => "ObservationEvent",
            Self::AnomalyEvent { .. } => "AnomalyEvent",
            Self::ReasoningEvent { .. } => "ReasoningEvent",
            Self::DecisionEvent { .. } => "DecisionEvent",
            Self::ActionEvent { .. } => "ActionEvent",
            Self::RestoreEvent { .. } => "RestoreEvent",
            Self::AgentLifecycleEvent { .. } => "AgentLifecycleEvent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}
