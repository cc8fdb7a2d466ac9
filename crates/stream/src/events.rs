//! Notifications a stream emits for downstream collaborators.

use crossbeam_channel::{Receiver, Sender, unbounded};
use scatterspace_common::TileCoords;

/// Something observable happened to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// Instances were added, removed, or loaded into this tile.
    TileModified(TileCoords),
    /// An asynchronous stream-in finished, successfully or not.
    TileStreamInComplete { coords: TileCoords, loaded: bool },
}

/// Unbounded event pipe owned by a stream. The receiver side is handed to
/// whatever wants tile notifications (typically the rendering backend).
#[derive(Debug)]
pub struct StreamEvents {
    tx: Sender<StreamEvent>,
    rx: Receiver<StreamEvent>,
}

impl StreamEvents {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn emit(&self, event: StreamEvent) {
        // The receiver lives as long as the stream, so this cannot fail in
        // practice; a send error just means nobody is listening any more.
        let _ = self.tx.send(event);
    }

    pub fn receiver(&self) -> &Receiver<StreamEvent> {
        &self.rx
    }
}

impl Default for StreamEvents {
    fn default() -> Self {
        Self::new()
    }
}
