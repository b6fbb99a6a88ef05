// src/types.rs
use serde::{Deserialize, Serialize};

// Where samples come from
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum SourceMode {
    Simulation,
    Serial,
}

// Acquisition thread -> operator status updates
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    Searching { attempt: u32, of: u32 },
    Connected(String),
    // Discovery or reconnect gave up
    Unavailable(String),
    Lost(String),
    Stopped,
}

impl LinkEvent {
    pub fn describe(&self) -> String {
        match self {
            LinkEvent::Searching { attempt, of } => {
                format!("Scanning for glove (attempt {attempt}/{of})...")
            }
            LinkEvent::Connected(name) => format!("Connected to {name}"),
            LinkEvent::Unavailable(why) => format!("Glove unavailable: {why}"),
            LinkEvent::Lost(why) => format!("Link lost: {why}"),
            LinkEvent::Stopped => "Acquisition stopped".to_owned(),
        }
    }

    /// No further samples will follow this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkEvent::Unavailable(_) | LinkEvent::Stopped)
    }
}
