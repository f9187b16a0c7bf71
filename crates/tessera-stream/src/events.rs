//! Outbound streaming events handed to the networking layer.

use tessera_voxel::{ChunkCoord, ColumnCoord, Tier};

/// Identifies a viewer across events.
pub type ViewerId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Replace whatever the viewer holds for `coord` with `payload`.
    ///
    /// `payload` is a block record for [`Tier::Full`] and an LOD record for
    /// every other tier. `revision` is `0` for content synthesized from
    /// column data.
    SendChunk {
        viewer: ViewerId,
        coord: ChunkCoord,
        tier: Tier,
        revision: u64,
        payload: Vec<u8>,
    },
    /// The viewer should drop `coord`.
    ForgetChunk { viewer: ViewerId, coord: ChunkCoord },
    /// New tops grid for `column`, as a tops record.
    UpdateColumnTops {
        viewer: ViewerId,
        column: ColumnCoord,
        revision: u64,
        payload: Vec<u8>,
    },
}

impl StreamEvent {
    pub fn viewer(&self) -> ViewerId {
        match self {
            StreamEvent::SendChunk { viewer, .. }
            | StreamEvent::ForgetChunk { viewer, .. }
            | StreamEvent::UpdateColumnTops { viewer, .. } => *viewer,
        }
    }
}

/// Receives events as the planner produces them.
pub trait EventSink {
    fn emit(&mut self, event: StreamEvent);
}

impl EventSink for Vec<StreamEvent> {
    fn emit(&mut self, event: StreamEvent) {
        self.push(event);
    }
}
