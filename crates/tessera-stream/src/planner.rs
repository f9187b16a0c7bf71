//! Per-viewer visibility planning.
//!
//! Each viewer runs a breadth-first flood fill over chunk coordinates seeded
//! at the chunk it stands in. A pass may span several ticks: every tick it
//! resumes from the saved queue until its visit or dispatch budget runs out.
//! When a pass drains its queue, the set it reached is diffed against what
//! the viewer knows and stale chunks are forgotten. The next tick starts a
//! fresh pass.
//!
//! Chunks are classified into tiers by Chebyshev distance. Near tiers need
//! the chunk loaded; far tiers fall back to content synthesized from the
//! column tops, so distant terrain never forces a load. The flood only
//! crosses a chunk between two faces its reachability table connects.

use std::collections::VecDeque;

use glam::DVec3;
use rustc_hash::{FxHashMap, FxHashSet};
use tessera_voxel::record::{encode_lod, encode_tops};
use tessera_voxel::{ChunkCoord, Face, Reachability, Tier};

use crate::awareness::Awareness;
use crate::events::{EventSink, StreamEvent, ViewerId};
use crate::frustum::ViewCone;
use crate::source::ChunkSource;
use crate::tier::{TierCosts, TierRadii};

#[derive(Clone, Debug)]
pub struct StreamingConfig {
    pub radii: TierRadii,
    /// Tier-weighted payload cost a viewer may dispatch per tick.
    pub dispatch_budget: u32,
    /// Frontier nodes a viewer may visit per tick.
    pub visit_budget: u32,
    pub tier_costs: TierCosts,
    /// A known chunk whose required tier is this many steps coarser is
    /// forgotten so it can be re-sent at the coarser tier.
    pub degrade_forget_steps: usize,
    pub frustum_culling: bool,
    pub fov_degrees: f64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            radii: TierRadii::default(),
            dispatch_budget: 256,
            visit_budget: 20_000,
            tier_costs: TierCosts::default(),
            degrade_forget_steps: 2,
            frustum_culling: false,
            fov_degrees: 110.0,
        }
    }
}

/// Where a viewer is and where it looks, in world block units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewerPose {
    pub position: DVec3,
    pub forward: DVec3,
}

impl ViewerPose {
    pub fn new(position: DVec3, forward: DVec3) -> Self {
        Self { position, forward }
    }

    /// A pose at the center of `coord`, looking along +x.
    pub fn at_chunk(coord: ChunkCoord) -> Self {
        let [x, y, z] = coord.center();
        Self::new(DVec3::new(x, y, z), DVec3::X)
    }

    pub fn chunk(&self) -> ChunkCoord {
        ChunkCoord::from_world_position(self.position.x, self.position.y, self.position.z)
    }
}

/// What one planner tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub visited: u32,
    pub dispatched_cost: u32,
    pub sent: u32,
    pub forgotten: u32,
    pub columns_sent: u32,
    /// The pass reached the end of its frontier this tick.
    pub pass_complete: bool,
}

/// A flood fill in progress.
struct Pass {
    center: ChunkCoord,
    /// Coordinates to visit with the face they were entered through.
    queue: VecDeque<(ChunkCoord, Option<Face>)>,
    /// Admitted at enqueue time, keyed by entry face, so each way into a
    /// chunk is expanded exactly once.
    seen: FxHashSet<(ChunkCoord, Option<Face>)>,
    /// Every chunk reached so far and the tier it needs.
    visible: FxHashMap<ChunkCoord, Tier>,
}

impl Pass {
    fn new(center: ChunkCoord) -> Self {
        let mut pass = Self {
            center,
            queue: VecDeque::new(),
            seen: FxHashSet::default(),
            visible: FxHashMap::default(),
        };
        pass.seen.insert((center, None));
        pass.queue.push_back((center, None));
        pass
    }
}

/// Outcome of trying to serve one visible chunk.
enum Dispatch {
    Done,
    OverBudget,
}

/// Streaming state of one viewer. Owned by the tick thread.
pub struct ViewerStream {
    id: ViewerId,
    config: StreamingConfig,
    awareness: Awareness,
    pass: Option<Pass>,
}

impl ViewerStream {
    pub fn new(id: ViewerId, config: StreamingConfig) -> Self {
        Self {
            id,
            config,
            awareness: Awareness::new(),
            pass: None,
        }
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn awareness(&self) -> &Awareness {
        &self.awareness
    }

    /// `true` while a pass is waiting to be resumed.
    pub fn pass_in_progress(&self) -> bool {
        self.pass.is_some()
    }

    /// Runs one budgeted planning step.
    pub fn tick(
        &mut self,
        pose: &ViewerPose,
        source: &mut dyn ChunkSource,
        sink: &mut dyn EventSink,
    ) -> TickReport {
        let center = pose.chunk();
        let mut pass = match self.pass.take() {
            Some(pass) if pass.center == center => pass,
            Some(_) => {
                tracing::trace!("Viewer {} moved to {center}; restarting pass", self.id);
                Pass::new(center)
            }
            None => Pass::new(center),
        };
        let cone = if self.config.frustum_culling {
            ViewCone::new(pose.position, pose.forward, self.config.fov_degrees)
        } else {
            None
        };

        let mut report = TickReport::default();
        while let Some((coord, entry)) = pass.queue.pop_front() {
            if report.visited >= self.config.visit_budget {
                pass.queue.push_front((coord, entry));
                break;
            }
            report.visited += 1;

            let Some(tier) = self.config.radii.classify(center.chebyshev(coord)) else {
                continue;
            };
            pass.visible.insert(coord, tier);
            if let Dispatch::OverBudget = self.dispatch(coord, tier, source, sink, &mut report) {
                report.visited -= 1;
                pass.queue.push_front((coord, entry));
                break;
            }
            self.expand(&mut pass, coord, entry, cone.as_ref(), source);
        }

        if pass.queue.is_empty() {
            self.finish_pass(&pass, sink, &mut report);
            report.pass_complete = true;
        } else {
            tracing::trace!(
                "Viewer {} out of budget: {} visited, cost {}, {} queued",
                self.id,
                report.visited,
                report.dispatched_cost,
                pass.queue.len()
            );
            self.pass = Some(pass);
        }
        self.update_columns(source, sink, &mut report);
        report
    }

    /// Forgets everything the viewer knows, e.g. on disconnect.
    pub fn forget_all(&mut self, sink: &mut dyn EventSink) {
        let mut known: Vec<ChunkCoord> = self.awareness.iter().map(|(c, _)| c).collect();
        known.sort_unstable();
        for coord in known {
            sink.emit(StreamEvent::ForgetChunk {
                viewer: self.id,
                coord,
            });
        }
        self.awareness.clear();
        self.pass = None;
    }

    fn dispatch(
        &mut self,
        coord: ChunkCoord,
        tier: Tier,
        source: &mut dyn ChunkSource,
        sink: &mut dyn EventSink,
        report: &mut TickReport,
    ) -> Dispatch {
        let revision = match source.revision(coord) {
            Some(revision) => {
                source.keep_alive(coord);
                revision
            }
            None if tier.is_far() => {
                let warm = source.column(coord.column()).is_some_and(|view| view.warm);
                if !warm {
                    return Dispatch::Done;
                }
                0
            }
            None => {
                source.request(coord);
                return Dispatch::Done;
            }
        };
        if !self.awareness.needs_send(coord, tier, revision) {
            return Dispatch::Done;
        }

        let cost = self.config.tier_costs.cost(tier);
        if report.dispatched_cost > 0
            && report.dispatched_cost.saturating_add(cost) > self.config.dispatch_budget
        {
            return Dispatch::OverBudget;
        }

        let payload = if revision == 0 {
            source
                .column(coord.column())
                .map(|view| encode_lod(&view.record.synthesize_lod(coord.z, tier)))
        } else {
            source.payload(coord, tier)
        };
        let Some(payload) = payload else {
            return Dispatch::Done;
        };

        report.dispatched_cost += cost;
        report.sent += 1;
        self.awareness.record_sent(coord, tier, revision);
        sink.emit(StreamEvent::SendChunk {
            viewer: self.id,
            coord,
            tier,
            revision,
            payload,
        });
        Dispatch::Done
    }

    /// Queues the neighbors of `coord` the flood may reach through it.
    fn expand(
        &self,
        pass: &mut Pass,
        coord: ChunkCoord,
        entry: Option<Face>,
        cone: Option<&ViewCone>,
        source: &mut dyn ChunkSource,
    ) {
        let reach = match source.reachability(coord) {
            Some(reach) => reach,
            None => {
                // Unloaded: open unless the column says the layer is solid.
                let buried = source
                    .column(coord.column())
                    .is_some_and(|view| view.warm && view.record.buries_layer(coord.z));
                if buried {
                    Reachability::all_closed()
                } else {
                    Reachability::all_open()
                }
            }
        };

        for exit in Face::ALL {
            if let Some(entry) = entry
                && (entry == exit || !reach.can_cross(entry, exit))
            {
                continue;
            }
            let neighbor = coord.neighbor(exit);
            let distance = pass.center.chebyshev(neighbor);
            if distance > self.config.radii.outer() {
                continue;
            }
            if distance > 1 && cone.is_some_and(|cone| !cone.sees_chunk(neighbor)) {
                continue;
            }
            let key = (neighbor, Some(exit.opposite()));
            if pass.seen.insert(key) {
                pass.queue.push_back(key);
            }
        }
    }

    /// Forgets known chunks the finished pass no longer reached, or whose
    /// required tier degraded too far.
    fn finish_pass(&mut self, pass: &Pass, sink: &mut dyn EventSink, report: &mut TickReport) {
        let mut stale: Vec<ChunkCoord> = self
            .awareness
            .iter()
            .filter(|(coord, known)| match pass.visible.get(coord) {
                None => true,
                Some(tier) => tier.steps_coarser_than(known.tier) >= self.config.degrade_forget_steps,
            })
            .map(|(coord, _)| coord)
            .collect();
        stale.sort_unstable();

        for coord in stale {
            self.awareness.forget(coord);
            report.forgotten += 1;
            sink.emit(StreamEvent::ForgetChunk {
                viewer: self.id,
                coord,
            });
        }
        self.awareness.prune_columns();
        tracing::trace!(
            "Viewer {} pass at {} complete: {} visible, {} known",
            self.id,
            pass.center,
            pass.visible.len(),
            self.awareness.len()
        );
    }

    /// Sends the tops of every column holding a known chunk once per
    /// column revision.
    fn update_columns(
        &mut self,
        source: &mut dyn ChunkSource,
        sink: &mut dyn EventSink,
        report: &mut TickReport,
    ) {
        for column in self.awareness.active_columns() {
            let Some(view) = source.column(column) else {
                continue;
            };
            if !view.warm || self.awareness.column_revision(column) == Some(view.revision) {
                continue;
            }
            let revision = view.revision;
            let payload = encode_tops(view.record);
            self.awareness.record_column(column, revision);
            report.columns_sent += 1;
            sink.emit(StreamEvent::UpdateColumnTops {
                viewer: self.id,
                column,
                revision,
                payload,
            });
        }
    }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
