//! Pooled execution runtime for warmpath.
//!
//! `ImportEngine` is synchronous. This module runs it on two bounded,
//! thread-based worker pools so that path queries never wait behind a
//! backlog of imports.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error};

use crate::cascade::EnrichmentBatch;
use crate::config::RuntimeConfig;
use crate::engine::{ImportEngine, ImportOutcome};
use crate::error::{ExecutionError, WarmpathError, WarmpathResult};
use crate::import::ImportEvent;
use crate::paths::{ConnectionPath, PathQuery};

/// Worker pool selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPath {
    /// Resolution and enrichment planning.
    Import,
    /// Read-only path queries.
    Query,
}

impl ExecutionPath {
    const fn label(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Query => "query",
        }
    }
}

enum Job {
    Import {
        event: ImportEvent,
        batch: Arc<EnrichmentBatch>,
        reply: Sender<WarmpathResult<ImportOutcome>>,
    },
    Query {
        query: PathQuery,
        reply: Sender<WarmpathResult<Vec<ConnectionPath>>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

impl Job {
    fn run(self, engine: &ImportEngine) {
        match self {
            Self::Import { event, batch, reply } => {
                let _ = reply.send(engine.import(&event, &batch));
            }
            Self::Query { query, reply } => {
                let _ = reply.send(engine.query(&query));
            }

            #[cfg(test)]
            Self::Sleep { duration, reply } => {
                thread::sleep(duration);
                let _ = reply.send(());
            }
        }
    }
}

struct WorkerPool {
    path: ExecutionPath,
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(
        path: ExecutionPath,
        workers: usize,
        queue_capacity: usize,
        engine: &Arc<ImportEngine>,
    ) -> WarmpathResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let engine = Arc::clone(engine);
            let handle = thread::Builder::new()
                .name(format!("warmpath-{}-{idx}", path.label()))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job.run(&engine);
                    }
                })
                .map_err(|e| {
                    error!(path = path.label(), worker = idx, error = %e, "failed to spawn worker");
                    WarmpathError::internal(format!("failed to spawn {} worker: {e}", path.label()))
                })?;
            handles.push(handle);
        }
        debug!(path = path.label(), workers, queue_capacity, "worker pool started");

        Ok(Self {
            path,
            tx: Some(tx),
            workers: handles,
            queue_capacity,
        })
    }

    fn disconnected(&self) -> WarmpathError {
        ExecutionError::Disconnected {
            path: self.path.label().to_string(),
        }
        .into()
    }

    fn try_submit(&self, job: Job) -> WarmpathResult<()> {
        let Some(tx) = &self.tx else {
            return Err(self.disconnected());
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                path: self.path.label().to_string(),
                capacity: self.queue_capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(self.disconnected()),
        }
    }

    fn shutdown(&mut self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        self.tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Handle to a submitted job.
pub struct ExecutionHandle<T> {
    path: ExecutionPath,
    rx: Receiver<WarmpathResult<T>>,
}

impl<T> ExecutionHandle<T> {
    /// The pool the job was routed to.
    #[must_use]
    pub const fn path(&self) -> ExecutionPath {
        self.path
    }

    /// Waits for the job to complete.
    ///
    /// # Errors
    ///
    /// Returns the job's own error, or `Disconnected` if the worker went
    /// away without replying.
    pub fn join(self) -> WarmpathResult<T> {
        let path = self.path;
        self.rx.recv().map_err(|_| {
            WarmpathError::from(ExecutionError::Disconnected {
                path: path.label().to_string(),
            })
        })?
    }

    /// Waits for the job to complete, at most `timeout`.
    ///
    /// # Errors
    ///
    /// As [`ExecutionHandle::join`], plus `Timeout` when the wait expires.
    pub fn join_timeout(self, timeout: Duration) -> WarmpathResult<T> {
        let path = self.path;
        self.rx.recv_timeout(timeout).map_err(|err| {
            WarmpathError::from(match err {
                RecvTimeoutError::Timeout => ExecutionError::Timeout {
                    duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                },
                RecvTimeoutError::Disconnected => ExecutionError::Disconnected {
                    path: path.label().to_string(),
                },
            })
        })?
    }
}

/// An [`ImportEngine`] running on isolated import and query pools.
pub struct WarmpathRuntime {
    engine: Arc<ImportEngine>,
    imports: WorkerPool,
    queries: WorkerPool,
}

impl WarmpathRuntime {
    /// Starts both pools.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a bad `config`, or an internal error if a
    /// worker thread cannot be spawned.
    pub fn new(engine: ImportEngine, config: RuntimeConfig) -> WarmpathResult<Self> {
        let config = config.validate()?;
        let engine = Arc::new(engine);
        let imports = WorkerPool::start(
            ExecutionPath::Import,
            config.import_workers,
            config.queue_capacity,
            &engine,
        )?;
        let queries = WorkerPool::start(
            ExecutionPath::Query,
            config.query_workers,
            config.queue_capacity,
            &engine,
        )?;
        Ok(Self {
            engine,
            imports,
            queries,
        })
    }

    /// Queues an import on the import pool.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the import queue is at capacity.
    pub fn import_async(
        &self,
        event: ImportEvent,
        batch: Arc<EnrichmentBatch>,
    ) -> WarmpathResult<ExecutionHandle<ImportOutcome>> {
        let (reply, rx) = bounded(1);
        self.imports.try_submit(Job::Import { event, batch, reply })?;
        Ok(ExecutionHandle {
            path: ExecutionPath::Import,
            rx,
        })
    }

    /// Imports on the pool and waits for the outcome.
    ///
    /// # Errors
    ///
    /// As [`WarmpathRuntime::import_async`] and [`ImportEngine::import`].
    pub fn import(&self, event: ImportEvent, batch: Arc<EnrichmentBatch>) -> WarmpathResult<ImportOutcome> {
        self.import_async(event, batch)?.join()
    }

    /// Queues a path query on the query pool.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the query queue is at capacity.
    pub fn query_async(&self, query: PathQuery) -> WarmpathResult<ExecutionHandle<Vec<ConnectionPath>>> {
        let (reply, rx) = bounded(1);
        self.queries.try_submit(Job::Query { query, reply })?;
        Ok(ExecutionHandle {
            path: ExecutionPath::Query,
            rx,
        })
    }

    /// Runs a path query on the pool and waits for the result.
    ///
    /// # Errors
    ///
    /// As [`WarmpathRuntime::query_async`] and [`ImportEngine::query`].
    pub fn query(&self, query: PathQuery) -> WarmpathResult<Vec<ConnectionPath>> {
        self.query_async(query)?.join()
    }

    /// The engine shared by both pools.
    #[must_use]
    pub fn engine(&self) -> &ImportEngine {
        &self.engine
    }

    #[cfg(test)]
    fn submit_sleep(&self, path: ExecutionPath, duration: Duration) -> WarmpathResult<Receiver<()>> {
        let (reply, rx) = bounded::<()>(1);
        let job = Job::Sleep { duration, reply };
        match path {
            ExecutionPath::Import => self.imports.try_submit(job)?,
            ExecutionPath::Query => self.queries.try_submit(job)?,
        }
        Ok(rx)
    }
}

impl Drop for WarmpathRuntime {
    fn drop(&mut self) {
        self.imports.shutdown();
        self.queries.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use chrono::NaiveDate;

    use crate::config::WarmpathConfig;
    use crate::entity::{flags, EntityType};
    use crate::import::ImportAttributes;
    use crate::relationship::RelationshipKind;

    fn runtime(import_workers: usize, queue_capacity: usize) -> WarmpathRuntime {
        let engine = ImportEngine::in_memory(WarmpathConfig::default()).unwrap();
        WarmpathRuntime::new(
            engine,
            RuntimeConfig {
                import_workers,
                query_workers: 1,
                queue_capacity,
            },
        )
        .unwrap()
    }

    #[test]
    fn import_and_query_round_trip() {
        let runtime = runtime(2, 16);
        let batch = Arc::new(EnrichmentBatch::new());
        let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();

        let home = runtime
            .import(
                ImportEvent::new(EntityType::Company, "Home Co")
                    .identifier("domain", "home.co")
                    .flag(flags::IS_CLIENT, true)
                    .attributes(ImportAttributes {
                        client_start_date: Some(start),
                        ..ImportAttributes::default()
                    }),
                Arc::clone(&batch),
            )
            .unwrap()
            .resolution
            .entity_id()
            .unwrap();
        let target = runtime
            .import(
                ImportEvent::new(EntityType::Company, "Target Co").identifier("domain", "target.co"),
                Arc::clone(&batch),
            )
            .unwrap()
            .resolution
            .entity_id()
            .unwrap();
        runtime
            .engine()
            .store()
            .record_relationship(RelationshipKind::Ownership, home, target, start, None)
            .unwrap();

        let paths = runtime
            .query(PathQuery {
                target,
                max_path_length: 3,
                as_of: None,
            })
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].home, home);
    }

    #[test]
    fn import_backlog_does_not_starve_queries() {
        let runtime = runtime(1, 16);

        // Occupy the only import worker.
        let sleep = runtime
            .submit_sleep(ExecutionPath::Import, Duration::from_millis(200))
            .unwrap();

        let started = Instant::now();
        let handle = runtime
            .query_async(PathQuery {
                target: crate::entity::EntityId::new(),
                max_path_length: 2,
                as_of: None,
            })
            .unwrap();
        assert_eq!(handle.path(), ExecutionPath::Query);
        let err = handle.join_timeout(Duration::from_millis(100)).unwrap_err();
        assert!(err.is_not_found());
        assert!(started.elapsed() < Duration::from_millis(150));

        sleep.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn full_queue_is_reported() {
        let runtime = runtime(1, 1);
        let first = runtime
            .submit_sleep(ExecutionPath::Import, Duration::from_millis(200))
            .unwrap();
        // Give the worker time to take the first job off the queue.
        thread::sleep(Duration::from_millis(50));
        let second = runtime
            .submit_sleep(ExecutionPath::Import, Duration::from_millis(10))
            .unwrap();

        let err = runtime
            .submit_sleep(ExecutionPath::Import, Duration::from_millis(10))
            .unwrap_err();
        let WarmpathError::Execution(ExecutionError::QueueFull { path, capacity }) = err else {
            panic!("expected QueueFull, got {err:?}");
        };
        assert_eq!(path, "import");
        assert_eq!(capacity, 1);

        first.recv_timeout(Duration::from_secs(1)).unwrap();
        second.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn join_reports_disconnected_when_reply_sender_dropped() {
        let (tx, rx) = bounded::<WarmpathResult<ImportOutcome>>(1);
        drop(tx);

        let handle = ExecutionHandle {
            path: ExecutionPath::Import,
            rx,
        };
        let err = handle.join().unwrap_err();
        let WarmpathError::Execution(ExecutionError::Disconnected { path }) = err else {
            panic!("expected Disconnected, got {err:?}");
        };
        assert_eq!(path, "import");
    }

    #[test]
    fn join_timeout_reports_disconnected_not_timeout_when_reply_sender_dropped() {
        let (tx, rx) = bounded::<WarmpathResult<Vec<ConnectionPath>>>(1);
        drop(tx);

        let handle = ExecutionHandle {
            path: ExecutionPath::Query,
            rx,
        };
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        let WarmpathError::Execution(ExecutionError::Disconnected { path }) = err else {
            panic!("expected Disconnected, got {err:?}");
        };
        assert_eq!(path, "query");
    }

    #[test]
    fn join_timeout_expires() {
        let (_tx, rx) = bounded::<WarmpathResult<Vec<ConnectionPath>>>(1);
        let handle = ExecutionHandle {
            path: ExecutionPath::Query,
            rx,
        };
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            WarmpathError::Execution(ExecutionError::Timeout { duration_ms: 10 })
        ));
    }
}
