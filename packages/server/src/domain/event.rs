//! Server → client events, independent of the wire encoding.

use std::time::Duration;

use super::{stacker::StackEventKind, user::Role, value_object::Pixel};

/// Why the available pixel count is being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackCause {
    Auth,
    Connected,
    StackGain,
    Consume,
}

impl StackCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackCause::Auth => "auth",
            StackCause::Connected => "connected",
            StackCause::StackGain => "stackGain",
            StackCause::Consume => "consume",
        }
    }
}

impl From<StackEventKind> for StackCause {
    fn from(kind: StackEventKind) -> Self {
        match kind {
            StackEventKind::Gained => StackCause::StackGain,
            StackEventKind::Consumed => StackCause::Consume,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    UserInfo {
        method: String,
        role: Role,
        username: String,
    },
    PixelsAvailable {
        count: u32,
        cause: StackCause,
    },
    Cooldown {
        wait: Duration,
    },
    PlacementAck {
        x: u32,
        y: u32,
    },
    PixelsPlaced(Vec<Pixel>),
}
