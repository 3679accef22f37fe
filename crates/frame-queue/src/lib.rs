//! Bounded Frame Queue
//!
//! Hands frames from an acquisition thread to the monitor thread. Capacity is
//! fixed; what happens when it is full is chosen by [`BackpressurePolicy`].

mod queue;

pub use queue::{bounded, FrameConsumer, FrameProducer, PushOutcome};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default capacity (~1 s of frames at 30 fps)
pub const DEFAULT_CAPACITY: usize = 30;

/// Queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Frame queue disconnected")]
    Disconnected,

    #[error("Timed out waiting for a frame")]
    Timeout,
}

/// Behaviour of a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Evict the oldest queued frame (live camera: stay current)
    DropOldest,
    /// Block the producer until there is room (replay: lose nothing)
    #[default]
    BlockProducer,
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackpressurePolicy::DropOldest => f.write_str("drop_oldest"),
            BackpressurePolicy::BlockProducer => f.write_str("block_producer"),
        }
    }
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").to_ascii_lowercase().as_str() {
            "drop_oldest" => Ok(BackpressurePolicy::DropOldest),
            "block_producer" | "block" => Ok(BackpressurePolicy::BlockProducer),
            other => Err(format!(
                "unknown backpressure policy '{other}' (expected drop_oldest or block_producer)"
            )),
        }
    }
}

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub policy: BackpressurePolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            policy: BackpressurePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("drop-oldest".parse::<BackpressurePolicy>(), Ok(BackpressurePolicy::DropOldest));
        assert_eq!("BLOCK_PRODUCER".parse::<BackpressurePolicy>(), Ok(BackpressurePolicy::BlockProducer));
        assert!("newest".parse::<BackpressurePolicy>().is_err());
    }

    #[test]
    fn test_policy_display_round_trips() {
        for policy in [BackpressurePolicy::DropOldest, BackpressurePolicy::BlockProducer] {
            assert_eq!(policy.to_string().parse::<BackpressurePolicy>(), Ok(policy));
        }
    }
}
