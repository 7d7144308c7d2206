// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stream markers.
//!
//! A marker rides the pending work queue with samples and completes only
//! once every sample queued before it has been presented or dropped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerType {
    Default,
    EndOfSegment,
    Tick,
    Event,
}

/// Immutable marker placed by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub marker_type: MarkerType,
    /// Opaque marker payload.
    pub value: serde_json::Value,
    /// Echoed back in the completion event.
    pub context: serde_json::Value,
}

impl Marker {
    pub fn new(marker_type: MarkerType, value: serde_json::Value, context: serde_json::Value) -> Self {
        Self {
            marker_type,
            value,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_marker_serializes() {
        let marker = Marker::new(MarkerType::Tick, json!(42), json!({"segment": 3}));
        let text = serde_json::to_string(&marker).unwrap();
        assert!(text.contains("\"Tick\""));
        let back: Marker = serde_json::from_str(&text).unwrap();
        assert_eq!(back, marker);
    }
}
