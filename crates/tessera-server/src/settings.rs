//! Turns the persisted config sections into runtime settings.

use std::sync::Arc;

use tessera_config::{Config, GeneratorKind, RegionSection, StoreBackend, StreamingSection};
use tessera_region::{
    FlatGenerator, LayeredGenerator, RegionConfig, StandardMaterials, TerrainGenerator,
};
use tessera_store::{ChunkStore, DirStore, MemoryStore, StoreError};
use tessera_stream::{StreamingConfig, TierCosts, TierRadii};

pub fn region_config(seed: u64, section: &RegionSection) -> RegionConfig {
    RegionConfig {
        seed,
        worker_threads: section.worker_threads,
        lock_buckets: section.lock_buckets,
        unload_after_ticks: section.unload_after_ticks,
        autosave_after_ticks: section.autosave_after_ticks,
        unload_save_timeout_ticks: section.unload_save_timeout_ticks,
        load_wait_timeout_ms: section.load_wait_timeout_ms,
        shutdown_timeout_ms: section.shutdown_timeout_ms,
        late_fixup_capacity: section.late_fixup_capacity,
        late_fixups_per_tick: section.late_fixups_per_tick,
        job_queue_capacity: section.job_queue_capacity,
    }
}

pub fn streaming_config(section: &StreamingSection) -> StreamingConfig {
    let [tier1, tier2, tier5, tier6, tier15] = section.tier_radii;
    StreamingConfig {
        radii: TierRadii {
            tier1,
            tier2,
            tier5,
            tier6,
            tier15,
        },
        dispatch_budget: section.dispatch_budget,
        visit_budget: section.visit_budget,
        tier_costs: TierCosts(section.tier_costs),
        degrade_forget_steps: section.degrade_forget_steps,
        frustum_culling: section.frustum_culling,
        fov_degrees: section.fov_degrees,
    }
}

pub fn open_store(config: &Config) -> Result<Arc<dyn ChunkStore>, StoreError> {
    Ok(match config.world.store {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Directory => Arc::new(DirStore::open(&config.world.store_dir)?),
    })
}

pub fn generator(config: &Config, materials: StandardMaterials) -> Arc<dyn TerrainGenerator> {
    match config.world.generator {
        GeneratorKind::Layered => Arc::new(LayeredGenerator::new(materials)),
        GeneratorKind::Flat => Arc::new(FlatGenerator::new(
            materials,
            config.world.flat_ground_height,
        )),
    }
}
