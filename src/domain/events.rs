//! Engine event queue.
//!
//! The orchestrator reports everything observable through here; callers
//! drain the queue after each call. The queue is bounded so an undrained
//! engine cannot grow without limit.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

const QUEUE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Success,
    Warning,
    Error,
    Risk,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub level: EventLevel,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl EngineEvent {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Bounded FIFO of engine events. Oldest entries drop first on overflow.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: VecDeque<EngineEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: EngineEvent) {
        self.events.push_back(event);
        while self.events.len() > QUEUE_LIMIT {
            self.events.pop_front();
        }
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
