//! Shared store of the last broadcast location.

use chrono::Local;
use std::sync::Arc;
use tokio::sync::watch;

use super::location::Coordinate;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The last successfully parsed set command
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastState {
    pub coordinate: Coordinate,
    /// Local wall-clock time the command was accepted, e.g. "2026-10-16 14:02:11"
    pub captured_at: String,
}

impl BroadcastState {
    /// Stamp `coordinate` with the current local time.
    pub fn capture(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            captured_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Single-slot, single-writer/multi-reader cell.
///
/// Every replace swaps the whole value, so readers never see a coordinate
/// assembled from two different commands. Cloning yields another handle to
/// the same slot.
#[derive(Clone)]
pub struct BroadcastStore {
    slot: Arc<watch::Sender<Option<BroadcastState>>>,
}

impl BroadcastStore {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot: Arc::new(slot) }
    }

    pub fn read(&self) -> Option<BroadcastState> {
        self.slot.borrow().clone()
    }

    pub fn replace(&self, state: BroadcastState) {
        self.slot.send_replace(Some(state));
    }

    /// Read-only subscription, starting at the current value
    pub fn subscribe(&self) -> watch::Receiver<Option<BroadcastState>> {
        self.slot.subscribe()
    }
}

impl Default for BroadcastStore {
    fn default() -> Self {
        Self::new()
    }
}
