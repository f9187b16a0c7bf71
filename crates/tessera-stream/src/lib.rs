//! Per-viewer chunk streaming: which chunks each viewer must receive or
//! forget every tick, and at which tier.

mod awareness;
mod events;
mod frustum;
mod planner;
mod source;
mod tier;

pub use awareness::{Awareness, Known};
pub use events::{EventSink, StreamEvent, ViewerId};
pub use frustum::ViewCone;
pub use planner::{StreamingConfig, TickReport, ViewerPose, ViewerStream};
pub use source::ChunkSource;
pub use tier::{TierCosts, TierRadii};
