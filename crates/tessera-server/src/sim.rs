//! Scripted viewers that stand in for connected clients.
//!
//! Each walker circles the spawn point at a fixed altitude, looking along its
//! path, and counts the events its stream produces instead of sending them.

use std::f64::consts::TAU;

use glam::DVec3;
use tessera_region::RegionState;
use tessera_stream::{StreamEvent, StreamingConfig, TickReport, ViewerPose, ViewerStream};
use tessera_voxel::{BlockRecord, MaterialId};

/// Running totals of one viewer's outbound traffic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Traffic {
    pub sent: u64,
    pub forgotten: u64,
    pub column_updates: u64,
    pub bytes: u64,
}

impl Traffic {
    fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::SendChunk { payload, .. } => {
                self.sent += 1;
                self.bytes += payload.len() as u64;
            }
            StreamEvent::ForgetChunk { .. } => self.forgotten += 1,
            StreamEvent::UpdateColumnTops { payload, .. } => {
                self.column_updates += 1;
                self.bytes += payload.len() as u64;
            }
        }
    }
}

pub struct Walker {
    stream: ViewerStream,
    center: DVec3,
    radius: f64,
    /// Radians per tick.
    speed: f64,
    phase: f64,
    outbox: Vec<StreamEvent>,
    traffic: Traffic,
}

impl Walker {
    pub fn new(stream: ViewerStream, center: DVec3, radius: f64, speed: f64, phase: f64) -> Self {
        Self {
            stream,
            center,
            radius,
            speed,
            phase,
            outbox: Vec::new(),
            traffic: Traffic::default(),
        }
    }

    pub fn pose(&self, tick: u64) -> ViewerPose {
        let angle = self.phase + self.speed * tick as f64;
        let (sin, cos) = angle.sin_cos();
        let position = self.center + DVec3::new(cos, sin, 0.0) * self.radius;
        ViewerPose::new(position, DVec3::new(-sin, cos, 0.0))
    }

    pub fn traffic(&self) -> Traffic {
        self.traffic
    }

    pub fn stream(&self) -> &ViewerStream {
        &self.stream
    }

    fn step(&mut self, region: &mut RegionState, tick: u64) -> TickReport {
        let pose = self.pose(tick);
        let report = self.stream.tick(&pose, region, &mut self.outbox);
        for event in self.outbox.drain(..) {
            self.traffic.record(&event);
        }
        report
    }

    fn disconnect(&mut self) {
        self.stream.forget_all(&mut self.outbox);
        for event in self.outbox.drain(..) {
            self.traffic.record(&event);
        }
    }
}

/// All simulated viewers plus the edit script.
pub struct Simulation {
    walkers: Vec<Walker>,
    edit_material: MaterialId,
    /// Ticks between scripted edits (0 = never).
    edit_interval: u64,
    edits_applied: u64,
}

impl Simulation {
    /// Spreads `count` walkers evenly around `center`.
    pub fn new(
        count: u32,
        center: DVec3,
        config: &StreamingConfig,
        edit_material: MaterialId,
        edit_interval: u64,
    ) -> Self {
        let walkers = (0..count)
            .map(|i| {
                let phase = TAU * i as f64 / count.max(1) as f64;
                let radius = 48.0 + 16.0 * i as f64;
                Walker::new(
                    ViewerStream::new(u64::from(i) + 1, config.clone()),
                    center,
                    radius,
                    0.004,
                    phase,
                )
            })
            .collect();
        Self {
            walkers,
            edit_material,
            edit_interval,
            edits_applied: 0,
        }
    }

    pub fn walkers(&self) -> &[Walker] {
        &self.walkers
    }

    pub fn edits_applied(&self) -> u64 {
        self.edits_applied
    }

    pub fn tick(&mut self, region: &mut RegionState, tick: u64) {
        for walker in &mut self.walkers {
            let report = walker.step(region, tick);
            if report.sent > 0 || report.forgotten > 0 {
                tracing::debug!(
                    "Viewer {}: sent {}, forgot {}, cost {}, {} visited",
                    walker.stream.id(),
                    report.sent,
                    report.forgotten,
                    report.dispatched_cost,
                    report.visited
                );
            }
        }
        if self.edit_interval > 0 && tick > 0 && tick % self.edit_interval == 0 {
            self.edit(region, tick);
        }
    }

    /// Drops a marker block under the first walker.
    fn edit(&mut self, region: &mut RegionState, tick: u64) {
        let Some(walker) = self.walkers.first() else {
            return;
        };
        let position = walker.pose(tick).position;
        let [x, y, z] = [position.x, position.y, position.z].map(|v| v.floor() as i64);
        match region.set_block(x, y, z - 2, BlockRecord::new(self.edit_material)) {
            Ok(true) => {
                self.edits_applied += 1;
                tracing::debug!("Placed marker at ({x}, {y}, {})", z - 2);
            }
            Ok(false) => {}
            Err(e) => tracing::debug!("Skipped marker edit: {e}"),
        }
    }

    /// Forgets everything for every viewer, as on disconnect.
    pub fn disconnect_all(&mut self) {
        for walker in &mut self.walkers {
            walker.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tessera_region::{FlatGenerator, RegionConfig, StandardMaterials};
    use tessera_store::MemoryStore;
    use tessera_stream::TierRadii;
    use tessera_voxel::MaterialRegistry;

    use super::*;

    #[test]
    fn test_walker_circles_the_center() {
        let walker = Walker::new(
            ViewerStream::new(1, StreamingConfig::default()),
            DVec3::new(0.0, 0.0, 40.0),
            10.0,
            TAU / 4.0,
            0.0,
        );
        let start = walker.pose(0);
        assert!((start.position - DVec3::new(10.0, 0.0, 40.0)).length() < 1e-9);
        assert!((start.forward - DVec3::Y).length() < 1e-9);
        let quarter = walker.pose(1);
        assert!((quarter.position - DVec3::new(0.0, 10.0, 40.0)).length() < 1e-9);
    }

    #[test]
    fn test_simulation_streams_and_edits() {
        let mut registry = MaterialRegistry::new();
        let materials = StandardMaterials::register(&mut registry).unwrap();
        let mut region = RegionState::new(
            RegionConfig {
                worker_threads: 2,
                ..RegionConfig::default()
            },
            Arc::new(MemoryStore::new()),
            Arc::new(FlatGenerator::new(materials, 10)),
            Arc::new(registry),
        );
        let config = StreamingConfig {
            radii: TierRadii {
                tier1: 1,
                tier2: 1,
                tier5: 2,
                tier6: 2,
                tier15: 2,
            },
            ..StreamingConfig::default()
        };
        let mut sim = Simulation::new(1, DVec3::new(15.0, 15.0, 12.0), &config, materials.glass, 5);
        // Stand still so the marker lands in a loaded chunk.
        sim.walkers[0].speed = 0.0;
        sim.walkers[0].radius = 0.0;

        for tick in 0..500 {
            region.tick();
            sim.tick(&mut region, tick);
            if sim.edits_applied() > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(sim.edits_applied(), 1);
        assert!(sim.walkers()[0].traffic().sent > 0);
        assert!(sim.walkers()[0].traffic().bytes > 0);

        let known = sim.walkers()[0].stream().awareness().len() as u64;
        let before = sim.walkers()[0].traffic().forgotten;
        sim.disconnect_all();
        assert_eq!(sim.walkers()[0].traffic().forgotten - before, known);
        assert!(sim.walkers()[0].stream().awareness().is_empty());
        region.shutdown();
    }
}
