//! Background worker pool for population and store I/O.
//!
//! Jobs arrive over a bounded channel; completion notices return over an
//! unbounded one so a worker never blocks on the tick thread. Populated
//! chunks themselves travel through their [`PopulateTicket`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use tessera_voxel::{ChunkCoord, ColumnCoord, ColumnRecord};

use crate::error::RegionError;
use crate::pipeline::{ChunkPipeline, ChunkSnapshot, PopulateSource};
use crate::ticket::PopulateTicket;

/// Work for the pool.
pub enum Job {
    Populate {
        ticket: Arc<PopulateTicket>,
        source: PopulateSource,
    },
    Save {
        snapshot: Arc<ChunkSnapshot>,
        save_id: u64,
    },
    LoadColumn(ColumnCoord),
    SaveColumn(ColumnCoord, ColumnRecord),
}

/// Completion notices delivered back to the tick thread.
#[derive(Debug)]
pub enum JobResult {
    Populated { coord: ChunkCoord, ticket_id: u64 },
    Saved { coord: ChunkCoord, save_id: u64, ok: bool },
    ColumnLoaded { column: ColumnCoord, record: Option<ColumnRecord> },
    ColumnSaved { column: ColumnCoord, ok: bool },
}

pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    results: Receiver<JobResult>,
    in_flight: Arc<AtomicU64>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers sharing `pipeline`.
    pub fn new(threads: usize, capacity: usize, pipeline: Arc<ChunkPipeline>) -> Self {
        let (job_tx, job_rx) = bounded::<Job>(capacity.max(1));
        let (result_tx, result_rx) = unbounded::<JobResult>();
        let in_flight = Arc::new(AtomicU64::new(0));

        let handles = (0..threads.max(1))
            .map(|i| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let pipeline = Arc::clone(&pipeline);
                let in_flight = Arc::clone(&in_flight);
                std::thread::Builder::new()
                    .name(format!("chunk-worker-{i}"))
                    .spawn(move || {
                        while let Ok(job) = jobs.recv() {
                            let result = run_job(&pipeline, job);
                            in_flight.fetch_sub(1, Ordering::Relaxed);
                            if let Some(result) = result {
                                let _ = results.send(result);
                            }
                        }
                    })
                    .expect("Failed to spawn chunk worker thread")
            })
            .collect();

        tracing::debug!("Chunk worker pool started with {} threads", threads.max(1));
        Self {
            jobs: Some(job_tx),
            results: result_rx,
            in_flight,
            handles,
        }
    }

    /// Queues a job without blocking. Gives the job back if the queue is full.
    pub fn try_submit(&self, job: Job) -> Result<(), (Job, RegionError)> {
        let Some(jobs) = &self.jobs else {
            return Err((job, RegionError::PoolClosed));
        };
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        jobs.try_send(job).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(job) => (job, RegionError::QueueFull),
                TrySendError::Disconnected(job) => (job, RegionError::PoolClosed),
            }
        })
    }

    /// Queues a job, waiting for room if the queue is full. The tick thread
    /// must use [`WorkerPool::try_submit`] instead.
    pub fn submit(&self, job: Job) -> Result<(), RegionError> {
        let Some(jobs) = &self.jobs else {
            return Err(RegionError::PoolClosed);
        };
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        jobs.send(job).map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            RegionError::PoolClosed
        })
    }

    /// Drains every completion notice currently available.
    pub fn drain_results(&self) -> Vec<JobResult> {
        self.results.try_iter().collect()
    }

    /// Waits up to `timeout` for the next completion notice.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.results.recv_timeout(timeout).ok()
    }

    /// Jobs queued or executing.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Closes the job queue and joins the workers if they finish before
    /// `deadline`. Returns `false` if some were left running.
    pub fn shutdown(&mut self, deadline: Instant) -> bool {
        self.jobs = None;
        while self.in_flight() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        if self.in_flight() > 0 {
            tracing::warn!(
                "Detaching {} chunk workers with {} jobs still running",
                self.handles.len(),
                self.in_flight()
            );
            self.handles.clear();
            return false;
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers exit once the sender is gone; they are not joined here.
        self.jobs = None;
    }
}

fn run_job(pipeline: &ChunkPipeline, job: Job) -> Option<JobResult> {
    match job {
        Job::Populate { ticket, source } => {
            if !ticket.is_pending() {
                return None;
            }
            let coord = ticket.coord();
            let result = pipeline.populate(coord, source);
            ticket.complete(result).then_some(JobResult::Populated {
                coord,
                ticket_id: ticket.id(),
            })
        }
        Job::Save { snapshot, save_id } => {
            let ok = pipeline.save(&snapshot);
            Some(JobResult::Saved {
                coord: snapshot.coord,
                save_id,
                ok,
            })
        }
        Job::LoadColumn(column) => Some(JobResult::ColumnLoaded {
            column,
            record: pipeline.load_column(column),
        }),
        Job::SaveColumn(column, record) => Some(JobResult::ColumnSaved {
            column,
            ok: pipeline.save_column(column, &record),
        }),
    }
}
