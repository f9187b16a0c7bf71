/// Tuning for a [`RegionState`](crate::RegionState).
#[derive(Clone, Debug)]
pub struct RegionConfig {
    /// World seed handed to the terrain generator.
    pub seed: u64,
    /// Background worker threads. `0` picks `num_cpus - 2` (at least 1).
    pub worker_threads: usize,
    /// Number of store lock buckets.
    pub lock_buckets: usize,
    /// Ready chunks untouched for this many ticks are unloaded.
    pub unload_after_ticks: u64,
    /// Chunks dirty for this many ticks are saved in place.
    pub autosave_after_ticks: u64,
    /// Ticks an unloading chunk waits for its save before it is dropped anyway.
    pub unload_save_timeout_ticks: u64,
    /// How long a blocking load waits on another population before giving up.
    pub load_wait_timeout_ms: u64,
    /// Upper bound on the shutdown drain.
    pub shutdown_timeout_ms: u64,
    /// Capacity of the late fix-up queue; overflow is applied at publish time.
    pub late_fixup_capacity: usize,
    /// Late fix-ups applied per tick.
    pub late_fixups_per_tick: usize,
    /// Capacity of the job channel feeding the workers.
    pub job_queue_capacity: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            worker_threads: 0,
            lock_buckets: 16,
            unload_after_ticks: 600,
            autosave_after_ticks: 1200,
            unload_save_timeout_ticks: 200,
            load_wait_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            late_fixup_capacity: 256,
            late_fixups_per_tick: 16,
            job_queue_capacity: 256,
        }
    }
}

impl RegionConfig {
    /// Worker thread count with `0` resolved against the CPU count.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        let cpus = num_cpus::get().max(2);
        (cpus - 2).max(1)
    }
}
