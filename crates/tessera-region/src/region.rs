//! The region chunk table: every loaded chunk of a region and its lifecycle.
//!
//! `RegionState` is owned by the tick thread. Workers only ever see the
//! [`ChunkPipeline`]; populated chunks come back through tickets and are
//! published here, so admission to physics and entities happens strictly on
//! the tick thread, serialized with block edits and streaming.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tessera_store::ChunkStore;
use tessera_voxel::{
    BlockRecord, CHUNK_SIDE, Chunk, ChunkCoord, ChunkFlags, ColumnCoord, ColumnRecord, LodBuffer,
    MaterialRegistry, Tier,
};

use crate::collab::{
    EntityLedger, EntityWorld, NoPhysics, PhysicsProxy, PhysicsWorld, TerrainGenerator,
};
use crate::column_index::{ColumnHeightIndex, ColumnView};
use crate::config::RegionConfig;
use crate::error::RegionError;
use crate::pipeline::{ChunkPipeline, ChunkSnapshot, PopulateSource};
use crate::table::ChunkTable;
use crate::ticket::PopulateTicket;
use crate::worker::{Job, JobResult, WorkerPool};

/// Continuation of a background load, run on the tick thread.
pub type LoadCallback = Box<dyn FnOnce(&mut RegionState, ChunkCoord, Result<(), RegionError>)>;

/// Lifecycle state of a table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Populating,
    Ready,
    Unloading,
}

/// Outcome of [`RegionState::request_load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// The chunk is ready now.
    Ready,
    /// A population is in flight.
    Pending,
    /// The job queue was full; ask again later.
    Rejected,
}

/// Counters for the periodic stats log line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionStats {
    /// Ready chunks.
    pub loaded: usize,
    /// Chunks with a population in flight.
    pub populating: usize,
    /// Chunks waiting on their final save.
    pub unloading: usize,
    /// Loaded chunks with changes the store does not have.
    pub dirty: usize,
    /// Tracked columns.
    pub columns: usize,
    /// Published chunks whose fix-ups have not run yet.
    pub late_fixups: usize,
    /// Jobs queued or running on the workers.
    pub jobs_in_flight: u64,
    /// Jobs waiting for room in the worker queue.
    pub backlog: usize,
    /// Saves that landed since the region started.
    pub saves_completed: u64,
    /// Saves with at least one failed record write.
    pub saves_failed: u64,
}

/// Outcome of [`RegionState::shutdown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Chunks whose final save landed.
    pub saved: u64,
    /// Chunks still waiting on a save when the drain gave up.
    pub abandoned: usize,
}

enum EntryState {
    Populating { ticket: Arc<PopulateTicket> },
    Ready,
    Unloading { since: u64 },
}

struct ChunkEntry {
    chunk: Chunk,
    state: EntryState,
    proxy: Option<PhysicsProxy>,
    last_touched: u64,
    /// Save id and the chunk revision it captured. At most one save per
    /// chunk is in flight.
    save_in_flight: Option<(u64, u64)>,
    /// Another save was asked for while one was in flight.
    resave_pending: bool,
}

impl ChunkEntry {
    fn is_ready(&self) -> bool {
        matches!(self.state, EntryState::Ready)
    }

    fn is_loaded(&self) -> bool {
        !matches!(self.state, EntryState::Populating { .. })
    }

    fn state(&self) -> ChunkState {
        match self.state {
            EntryState::Populating { .. } => ChunkState::Populating,
            EntryState::Ready => ChunkState::Ready,
            EntryState::Unloading { .. } => ChunkState::Unloading,
        }
    }
}

pub struct RegionState {
    config: RegionConfig,
    pipeline: Arc<ChunkPipeline>,
    pool: WorkerPool,
    table: ChunkTable<ChunkEntry>,
    columns: ColumnHeightIndex,
    physics: Box<dyn PhysicsWorld>,
    entities: Box<dyn EntityWorld>,
    callbacks: FxHashMap<ChunkCoord, Vec<LoadCallback>>,
    deferred: VecDeque<(LoadCallback, ChunkCoord, Result<(), RegionError>)>,
    /// Jobs the worker queue had no room for, in submission order.
    backlog: VecDeque<Job>,
    late_fixups: VecDeque<ChunkCoord>,
    tick: u64,
    /// Last revision stamp handed to a chunk.
    revisions: u64,
    next_ticket: u64,
    next_save: u64,
    saves_completed: u64,
    saves_failed: u64,
}

impl RegionState {
    /// Creates a region with no physics and an entity ledger.
    pub fn new(
        config: RegionConfig,
        store: Arc<dyn ChunkStore>,
        generator: Arc<dyn TerrainGenerator>,
        registry: Arc<MaterialRegistry>,
    ) -> Self {
        let pipeline = Arc::new(ChunkPipeline::new(
            store,
            generator,
            registry,
            config.lock_buckets,
            config.seed,
        ));
        let threads = config.resolved_worker_threads();
        let pool = WorkerPool::new(threads, config.job_queue_capacity, Arc::clone(&pipeline));
        tracing::info!(
            "Region started: {} workers, {} lock buckets, seed {}",
            threads,
            config.lock_buckets,
            config.seed
        );
        Self {
            config,
            pipeline,
            pool,
            table: ChunkTable::new(),
            columns: ColumnHeightIndex::new(),
            physics: Box::new(NoPhysics::default()),
            entities: Box::new(EntityLedger::new()),
            callbacks: FxHashMap::default(),
            deferred: VecDeque::new(),
            backlog: VecDeque::new(),
            late_fixups: VecDeque::new(),
            tick: 0,
            revisions: 0,
            next_ticket: 0,
            next_save: 0,
            saves_completed: 0,
            saves_failed: 0,
        }
    }

    pub fn with_physics(mut self, physics: Box<dyn PhysicsWorld>) -> Self {
        self.physics = physics;
        self
    }

    pub fn with_entities(mut self, entities: Box<dyn EntityWorld>) -> Self {
        self.entities = entities;
        self
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    pub fn registry(&self) -> &MaterialRegistry {
        self.pipeline.registry()
    }

    pub fn columns(&self) -> &ColumnHeightIndex {
        &self.columns
    }

    pub fn entities(&self) -> &dyn EntityWorld {
        self.entities.as_ref()
    }

    pub fn state(&self, coord: ChunkCoord) -> Option<ChunkState> {
        self.table.get(coord).map(ChunkEntry::state)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The chunk at `coord` if it is ready. Never triggers a load.
    pub fn get(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.table
            .get(coord)
            .filter(|e| e.is_ready())
            .map(|e| &e.chunk)
    }

    /// The block at world `(wx, wy, wz)` if its chunk is ready.
    pub fn get_block(&self, wx: i64, wy: i64, wz: i64) -> Option<BlockRecord> {
        let (coord, [x, y, z]) = ChunkCoord::from_world_block(wx, wy, wz);
        self.get(coord).map(|c| c.get(x, y, z))
    }

    /// LOD buffer of a ready chunk, derived and cached on demand.
    pub fn lod(&mut self, coord: ChunkCoord, tier: Tier) -> Option<LodBuffer> {
        let registry = self.pipeline.registry();
        let entry = self.table.get_mut(coord).filter(|e| e.is_ready())?;
        entry.chunk.lod(tier, registry)
    }

    /// Tracks `column` on behalf of a viewer and returns what is known of it.
    pub fn column(&mut self, column: ColumnCoord) -> Option<ColumnView<'_>> {
        if self.columns.touch(column, self.tick) {
            self.load_column(column);
        }
        self.columns.view(column)
    }

    pub fn stats(&self) -> RegionStats {
        let mut stats = RegionStats {
            columns: self.columns.len(),
            late_fixups: self.late_fixups.len(),
            jobs_in_flight: self.pool.in_flight(),
            backlog: self.backlog.len(),
            saves_completed: self.saves_completed,
            saves_failed: self.saves_failed,
            ..RegionStats::default()
        };
        for (_, entry) in self.table.iter() {
            match entry.state {
                EntryState::Populating { .. } => stats.populating += 1,
                EntryState::Ready => stats.loaded += 1,
                EntryState::Unloading { .. } => stats.unloading += 1,
            }
            if entry.chunk.is_dirty() {
                stats.dirty += 1;
            }
        }
        stats
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Edits the block at world `(wx, wy, wz)`.
    ///
    /// The chunk must be loaded; an unloading chunk is revived. Returns
    /// `Ok(false)` if the block was already `block`.
    pub fn set_block(
        &mut self,
        wx: i64,
        wy: i64,
        wz: i64,
        block: BlockRecord,
    ) -> Result<bool, RegionError> {
        let (coord, [x, y, z]) = ChunkCoord::from_world_block(wx, wy, wz);
        let tick = self.tick;
        let entry = self
            .table
            .get_mut(coord)
            .filter(|e| e.is_loaded())
            .ok_or(RegionError::NotLoaded(coord))?;
        revive(entry, tick);
        if !entry.chunk.set(x, y, z, block, tick) {
            return Ok(false);
        }
        self.revisions += 1;
        entry.chunk.set_revision(self.revisions);

        let registry = self.pipeline.registry();
        let table = &self.table;
        self.columns
            .push_edit((wx, wy, wz), block.material(), registry, |c, lx, ly| {
                table
                    .get(c)
                    .filter(|e| e.is_loaded())
                    .and_then(|e| e.chunk.highest_opaque_in_column(lx, ly, CHUNK_SIDE - 1, registry))
            });
        Ok(true)
    }

    /// Marks `coord` as still wanted. Cancels a pending unload.
    pub fn touch(&mut self, coord: ChunkCoord) {
        let tick = self.tick;
        if let Some(entry) = self.table.get_mut(coord).filter(|e| e.is_loaded()) {
            revive(entry, tick);
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Returns the chunk at `coord`, loading or generating it on this thread
    /// if needed.
    ///
    /// If a worker is already populating the chunk this waits for it. A wait
    /// that times out means a population wedged somewhere; the entry is
    /// discarded and the chunk is populated again here.
    pub fn ensure_loaded(&mut self, coord: ChunkCoord) -> Result<&Chunk, RegionError> {
        let tick = self.tick;
        let ticket = match self.table.get_mut(coord) {
            Some(entry) => match &entry.state {
                EntryState::Populating { ticket } => Some(Arc::clone(ticket)),
                _ => {
                    revive(entry, tick);
                    None
                }
            },
            None => None,
        };

        if let Some(ticket) = ticket {
            let timeout = Duration::from_millis(self.config.load_wait_timeout_ms);
            match ticket.wait(timeout) {
                Some(Ok(chunk)) => self.publish(coord, chunk, true),
                Some(Err(e)) => {
                    self.fail_population(coord, e.clone());
                    return Err(e);
                }
                None => {
                    tracing::error!(
                        "Chunk {coord} still populating after {timeout:?}; discarding entry and repopulating"
                    );
                    ticket.abandon();
                    self.table.remove(coord);
                }
            }
        }

        if !self.table.contains(coord) {
            match self.pipeline.populate(coord, PopulateSource::STORE_THEN_GENERATE) {
                Ok(chunk) => self.publish(coord, chunk, true),
                Err(e) => {
                    self.fail_population(coord, e.clone());
                    return Err(e);
                }
            }
        }

        self.table
            .get(coord)
            .map(|e| &e.chunk)
            .ok_or(RegionError::NotLoaded(coord))
    }

    /// Starts loading `coord` in the background.
    ///
    /// `callback`, if any, runs on a later tick once the chunk is ready or
    /// its population failed. Never blocks.
    pub fn request_load(&mut self, coord: ChunkCoord, callback: Option<LoadCallback>) -> LoadStatus {
        let tick = self.tick;
        if let Some(entry) = self.table.get_mut(coord) {
            if let EntryState::Populating { .. } = entry.state {
                if let Some(cb) = callback {
                    self.callbacks.entry(coord).or_default().push(cb);
                }
                return LoadStatus::Pending;
            }
            revive(entry, tick);
            if let Some(cb) = callback {
                self.deferred.push_back((cb, coord, Ok(())));
            }
            return LoadStatus::Ready;
        }

        self.next_ticket += 1;
        let ticket = Arc::new(PopulateTicket::new(self.next_ticket, coord));
        let job = Job::Populate {
            ticket: Arc::clone(&ticket),
            source: PopulateSource::STORE_THEN_GENERATE,
        };
        match self.pool.try_submit(job) {
            Ok(()) => {
                let mut placeholder = Chunk::unpopulated(coord);
                placeholder.flags_mut().insert(ChunkFlags::POPULATING);
                self.table.insert(
                    coord,
                    ChunkEntry {
                        chunk: placeholder,
                        state: EntryState::Populating { ticket },
                        proxy: None,
                        last_touched: tick,
                        save_in_flight: None,
                        resave_pending: false,
                    },
                );
                if let Some(cb) = callback {
                    self.callbacks.entry(coord).or_default().push(cb);
                }
                LoadStatus::Pending
            }
            Err((_, e)) => {
                tracing::trace!("Load of chunk {coord} deferred: {e}");
                if let Some(cb) = callback {
                    self.deferred.push_back((cb, coord, Err(e)));
                }
                LoadStatus::Rejected
            }
        }
    }

    /// Admits a populated chunk to the live world.
    fn publish(&mut self, coord: ChunkCoord, mut chunk: Chunk, apply_fixups_now: bool) {
        let tick = self.tick;
        let fresh = chunk.is_freshly_generated();
        chunk.set_freshly_generated(false);
        if fresh {
            chunk.mark_dirty(tick);
        }
        let needs_fixup = !chunk.pending_entities().is_empty() || chunk.has_fixups();
        chunk.clear_physics_stale();
        self.revisions += 1;
        chunk.set_revision(self.revisions);
        let proxy = self.physics.register(&chunk);

        self.table.insert(
            coord,
            ChunkEntry {
                chunk,
                state: EntryState::Ready,
                proxy: Some(proxy),
                last_touched: tick,
                save_in_flight: None,
                resave_pending: false,
            },
        );

        if self.columns.notice_loaded(coord, tick) {
            self.load_column(coord.column());
        }
        if let Some(entry) = self.table.get(coord) {
            self.columns.push_chunk(&entry.chunk, self.pipeline.registry());
        }

        if needs_fixup {
            if apply_fixups_now || self.late_fixups.len() >= self.config.late_fixup_capacity {
                self.apply_late_fixup(coord);
            } else {
                self.late_fixups.push_back(coord);
            }
        }

        if let Some(callbacks) = self.callbacks.remove(&coord) {
            for cb in callbacks {
                self.deferred.push_back((cb, coord, Ok(())));
            }
        }
        tracing::debug!(
            "Chunk {coord} published ({})",
            if fresh { "generated" } else { "loaded" }
        );
    }

    fn fail_population(&mut self, coord: ChunkCoord, error: RegionError) {
        tracing::warn!("Population of chunk {coord} failed: {error}");
        self.table.remove(coord);
        if let Some(callbacks) = self.callbacks.remove(&coord) {
            for cb in callbacks {
                self.deferred.push_back((cb, coord, Err(error.clone())));
            }
        }
    }

    fn apply_late_fixup(&mut self, coord: ChunkCoord) {
        let tick = self.tick;
        let Some(entry) = self.table.get_mut(coord).filter(|e| e.is_loaded()) else {
            return;
        };
        let spawned = entry.chunk.take_pending_entities();
        let had_fixups = entry.chunk.has_fixups();
        entry.chunk.apply_fixups(tick);
        if had_fixups {
            self.revisions += 1;
            entry.chunk.set_revision(self.revisions);
            self.columns.push_chunk(&entry.chunk, self.pipeline.registry());
        }
        for entity in spawned {
            self.entities.spawn(coord, entity);
        }
    }

    fn load_column(&mut self, column: ColumnCoord) {
        self.enqueue(Job::LoadColumn(column));
    }

    fn save_column(&mut self, column: ColumnCoord, record: ColumnRecord) {
        self.enqueue(Job::SaveColumn(column, record));
    }

    // -----------------------------------------------------------------------
    // Job submission
    // -----------------------------------------------------------------------

    /// Hands `job` to the workers without blocking. A full queue parks it in
    /// the backlog; jobs never overtake ones already parked.
    fn enqueue(&mut self, job: Job) {
        if !self.backlog.is_empty() {
            self.backlog.push_back(job);
            return;
        }
        match self.pool.try_submit(job) {
            Ok(()) => {}
            Err((job, RegionError::QueueFull)) => {
                tracing::trace!("Worker queue full; {} jobs backlogged", self.backlog.len() + 1);
                self.backlog.push_back(job);
            }
            Err((job, e)) => self.run_inline(job, e),
        }
    }

    /// Offers backlogged jobs to the workers until the queue fills up again.
    fn flush_backlog(&mut self) {
        while let Some(job) = self.backlog.pop_front() {
            match self.pool.try_submit(job) {
                Ok(()) => {}
                Err((job, RegionError::QueueFull)) => {
                    self.backlog.push_front(job);
                    break;
                }
                Err((job, e)) => self.run_inline(job, e),
            }
        }
    }

    /// Runs a job on the tick thread once the pool can no longer take it.
    fn run_inline(&mut self, job: Job, reason: RegionError) {
        match job {
            Job::LoadColumn(column) => {
                tracing::debug!("Loading column {column} inline: {reason}");
                let record = self.pipeline.load_column(column);
                self.columns.on_loaded(column, record);
            }
            Job::SaveColumn(column, record) => {
                tracing::debug!("Saving column {column} inline: {reason}");
                self.pipeline.save_column(column, &record);
            }
            Job::Save { snapshot, save_id } => {
                let coord = snapshot.coord;
                tracing::debug!("Saving chunk {coord} inline: {reason}");
                let ok = self.pipeline.save(&snapshot);
                self.on_saved(coord, save_id, ok);
            }
            Job::Populate { ticket, .. } => {
                tracing::debug!("Dropping population of chunk {}: {reason}", ticket.coord());
                ticket.abandon();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Saving and unloading
    // -----------------------------------------------------------------------

    /// Saves a loaded chunk in place. A clean chunk is not written. Returns
    /// `true` if a save was started or queued behind the one in flight.
    pub fn save(&mut self, coord: ChunkCoord) -> bool {
        let dirty = self
            .table
            .get(coord)
            .is_some_and(|e| e.is_loaded() && e.chunk.is_dirty());
        dirty && self.start_save(coord)
    }

    fn start_save(&mut self, coord: ChunkCoord) -> bool {
        let Some(entry) = self.table.get_mut(coord).filter(|e| e.is_loaded()) else {
            return false;
        };
        if entry.save_in_flight.is_some() {
            // An older snapshot must never land after a newer one.
            entry.resave_pending = true;
            return true;
        }
        let mut entities = self.entities.residents(coord);
        entities.extend(entry.chunk.pending_entities().iter().cloned());
        let snapshot = Arc::new(ChunkSnapshot::capture(&entry.chunk, entities));

        self.next_save += 1;
        let save_id = self.next_save;
        entry.save_in_flight = Some((save_id, snapshot.revision));
        self.pipeline.stage_save(&snapshot);
        self.enqueue(Job::Save { snapshot, save_id });
        true
    }

    /// Begins unloading a ready chunk. Dirty chunks, and chunks with
    /// entities, are saved first and leave the table once the save lands.
    /// Returns `false` if the chunk is not ready.
    pub fn unload(&mut self, coord: ChunkCoord) -> bool {
        let has_residents = !self.entities.residents(coord).is_empty();
        let tick = self.tick;
        let Some(entry) = self.table.get_mut(coord).filter(|e| e.is_ready()) else {
            return false;
        };
        let needs_save = entry.chunk.is_dirty()
            || has_residents
            || !entry.chunk.pending_entities().is_empty();
        if needs_save {
            entry.state = EntryState::Unloading { since: tick };
            self.start_save(coord);
        } else {
            self.finalize_unload(coord);
        }
        true
    }

    fn finalize_unload(&mut self, coord: ChunkCoord) {
        let Some(entry) = self.table.remove(coord) else {
            return;
        };
        if let Some(proxy) = entry.proxy {
            self.physics.unregister(proxy);
        }
        self.entities.despawn_residents(coord);
        self.late_fixups.retain(|c| *c != coord);
        if let Some(record) = self.columns.notice_unloaded(coord, self.tick) {
            self.save_column(coord.column(), record);
        }
        tracing::debug!("Chunk {coord} unloaded");
    }

    fn on_saved(&mut self, coord: ChunkCoord, save_id: u64, ok: bool) {
        if ok {
            self.saves_completed += 1;
        } else {
            self.saves_failed += 1;
        }
        let Some(entry) = self.table.get_mut(coord) else {
            return;
        };
        let Some((expected, revision)) = entry.save_in_flight else {
            return;
        };
        if expected != save_id {
            return;
        }
        entry.save_in_flight = None;
        if ok && entry.chunk.revision() == revision {
            entry.chunk.mark_saved();
        }
        if std::mem::take(&mut entry.resave_pending) {
            tracing::trace!("Starting follow-up save of chunk {coord}");
            self.start_save(coord);
            return;
        }
        if let EntryState::Unloading { .. } = entry.state {
            if ok {
                self.finalize_unload(coord);
            } else {
                tracing::warn!("Save of chunk {coord} failed; keeping it loaded");
                entry.state = EntryState::Ready;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advances the region by one tick.
    pub fn tick(&mut self) {
        self.tick += 1;
        self.pump();
        self.run_late_fixups();
        self.refresh_derived();
        self.autosave();
        self.unload_idle();
        self.expire_unloads();
        for (column, record) in self
            .columns
            .evict_idle(self.tick, self.config.unload_after_ticks)
        {
            self.save_column(column, record);
        }
        self.run_deferred();
    }

    /// Handles every worker completion notice available right now.
    pub fn pump(&mut self) {
        self.flush_backlog();
        for result in self.pool.drain_results() {
            self.handle(result);
        }
    }

    fn handle(&mut self, result: JobResult) {
        match result {
            JobResult::Populated { coord, ticket_id } => {
                let ticket = match self.table.get(coord).map(|e| &e.state) {
                    Some(EntryState::Populating { ticket }) if ticket.id() == ticket_id => {
                        Arc::clone(ticket)
                    }
                    _ => return,
                };
                match ticket.take() {
                    Some(Ok(chunk)) => self.publish(coord, chunk, false),
                    Some(Err(e)) => self.fail_population(coord, e),
                    None => {}
                }
            }
            JobResult::Saved { coord, save_id, ok } => self.on_saved(coord, save_id, ok),
            JobResult::ColumnLoaded { column, record } => self.columns.on_loaded(column, record),
            JobResult::ColumnSaved { column, ok } => {
                if !ok {
                    tracing::warn!("Column {column} was not saved");
                }
            }
        }
    }

    fn run_late_fixups(&mut self) {
        for _ in 0..self.config.late_fixups_per_tick {
            let Some(coord) = self.late_fixups.pop_front() else {
                break;
            };
            self.apply_late_fixup(coord);
        }
    }

    /// Recomputes reachability and physics geometry of edited chunks.
    fn refresh_derived(&mut self) {
        let registry = self.pipeline.registry();
        for entry in self.table.values_mut() {
            if !entry.is_loaded() {
                continue;
            }
            entry.chunk.refresh_reachability(registry);
            if entry.chunk.physics_stale() {
                if let Some(proxy) = entry.proxy.take() {
                    self.physics.unregister(proxy);
                }
                entry.proxy = Some(self.physics.register(&entry.chunk));
                entry.chunk.clear_physics_stale();
            }
        }
    }

    fn autosave(&mut self) {
        let tick = self.tick;
        let after = self.config.autosave_after_ticks;
        let due: Vec<ChunkCoord> = self
            .table
            .iter()
            .filter(|(_, e)| e.is_ready() && e.save_in_flight.is_none())
            .filter(|(_, e)| {
                e.chunk
                    .dirty_since()
                    .is_some_and(|since| tick.saturating_sub(since) >= after)
            })
            .map(|(coord, _)| coord)
            .collect();
        for coord in due {
            tracing::trace!("Autosaving chunk {coord}");
            self.start_save(coord);
        }
    }

    fn unload_idle(&mut self) {
        let tick = self.tick;
        let after = self.config.unload_after_ticks;
        let idle: Vec<ChunkCoord> = self
            .table
            .iter()
            .filter(|(_, e)| e.is_ready() && tick.saturating_sub(e.last_touched) >= after)
            .map(|(coord, _)| coord)
            .collect();
        for coord in idle {
            self.unload(coord);
        }
    }

    fn expire_unloads(&mut self) {
        let tick = self.tick;
        let timeout = self.config.unload_save_timeout_ticks;
        let expired: Vec<ChunkCoord> = self
            .table
            .iter()
            .filter(|(_, e)| {
                matches!(e.state, EntryState::Unloading { since } if tick.saturating_sub(since) >= timeout)
            })
            .map(|(coord, _)| coord)
            .collect();
        for coord in expired {
            tracing::warn!(
                "Save of chunk {coord} did not finish within {timeout} ticks; dropping it from the table"
            );
            self.finalize_unload(coord);
        }
    }

    fn run_deferred(&mut self) {
        for _ in 0..self.deferred.len() {
            let Some((callback, coord, result)) = self.deferred.pop_front() else {
                break;
            };
            callback(self, coord, result);
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Saves and unloads everything, waiting at most `shutdown_timeout_ms`
    /// for outstanding saves. Chunks still waiting after that are abandoned.
    pub fn shutdown(mut self) -> ShutdownReport {
        tracing::info!("Region shutting down with {} chunks", self.table.len());
        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_timeout_ms);
        let saved_before = self.saves_completed;

        for (coord, entry) in self.table.iter() {
            if let EntryState::Populating { ticket } = &entry.state {
                tracing::debug!("Abandoning population of chunk {coord}");
                ticket.abandon();
            }
        }
        for (coord, callbacks) in std::mem::take(&mut self.callbacks) {
            for cb in callbacks {
                self.deferred
                    .push_back((cb, coord, Err(RegionError::Abandoned(coord))));
            }
        }
        self.run_deferred();

        for coord in self.table.coords() {
            match self.state(coord) {
                Some(ChunkState::Populating) => {
                    self.table.remove(coord);
                }
                Some(ChunkState::Ready) => {
                    self.unload(coord);
                }
                _ => {}
            }
        }
        self.drain(deadline);

        for (column, record) in self.columns.take_dirty() {
            self.save_column(column, record);
        }
        self.drain(deadline);

        let abandoned = self.table.len();
        if abandoned > 0 {
            tracing::warn!("Shutdown drain timed out; abandoning {abandoned} chunks with saves in flight");
        }
        if !self.backlog.is_empty() {
            tracing::warn!("Dropping {} jobs that never reached a worker", self.backlog.len());
        }
        self.pool.shutdown(deadline);
        ShutdownReport {
            saved: self.saves_completed - saved_before,
            abandoned,
        }
    }

    fn unloading(&self) -> usize {
        self.table
            .iter()
            .filter(|(_, e)| matches!(e.state, EntryState::Unloading { .. }))
            .count()
    }

    fn drain(&mut self, deadline: Instant) {
        while (self.unloading() > 0 || self.pool.in_flight() > 0 || !self.backlog.is_empty())
            && Instant::now() < deadline
        {
            self.flush_backlog();
            if let Some(result) = self.pool.recv_timeout(Duration::from_millis(10)) {
                self.handle(result);
            }
        }
        for result in self.pool.drain_results() {
            self.handle(result);
        }
    }
}

/// Cancels a pending unload and records interest.
fn revive(entry: &mut ChunkEntry, tick: u64) {
    if let EntryState::Unloading { .. } = entry.state {
        tracing::debug!("Unload of chunk {} cancelled", entry.chunk.coord());
        entry.state = EntryState::Ready;
    }
    entry.last_touched = tick;
}

#[cfg(test)]
#[path = "region_tests.rs"]
mod tests;
