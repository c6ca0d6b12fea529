//! The adapter's single live session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::edge::NodeSelection;
use crate::quality::QualityLevel;

/// State of the session currently bound to the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub start_time: DateTime<Utc>,

    /// Node carrying the session
    pub edge_node_id: String,
    pub edge_region: String,

    /// Ranked fallback node ids
    pub alternative_node_ids: Vec<String>,

    /// Active quality level, mirrored from the selector
    pub quality: QualityLevel,

    pub bytes_sent: u64,
    pub packets_sent: u64,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        selection: &NodeSelection,
        quality: QualityLevel,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            start_time,
            edge_node_id: selection.node.id.clone(),
            edge_region: selection.node.region.clone(),
            alternative_node_ids: selection.alternatives.iter().map(|n| n.id.clone()).collect(),
            quality,
            bytes_sent: 0,
            packets_sent: 0,
        }
    }

    /// Count one sent packet
    pub fn add_packet(&mut self, bytes: u64) {
        self.packets_sent += 1;
        self.bytes_sent += bytes;
    }
}
