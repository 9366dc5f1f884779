use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed pool of threads that build tile meshes off the frame thread.
///
/// With zero threads every job runs inline on the caller.
pub struct TileLoader {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Marks a job finished even if it panics.
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

impl TileLoader {
    pub fn new(num_threads: usize) -> Self {
        let pending = Arc::new(Pending::default());
        if num_threads == 0 {
            return Self {
                sender: None,
                workers: Vec::new(),
                pending,
            };
        }

        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("tile-loader-{}", i))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::warn!("Failed to spawn tile loader thread: {}", e),
            }
        }
        if workers.is_empty() {
            log::warn!("No tile loader threads, loading inline");
            return Self {
                sender: None,
                workers,
                pending,
            };
        }

        Self {
            sender: Some(sender),
            workers,
            pending,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Queues `job`, or runs it right away when the pool has no threads.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.pending.begin();
        let guard = PendingGuard(self.pending.clone());
        let job: Job = Box::new(move || {
            let _guard = guard;
            job();
        });

        match &self.sender {
            Some(sender) => {
                if let Err(rejected) = sender.send(job) {
                    // Workers are gone; finish the job here.
                    (rejected.into_inner())();
                }
            }
            None => job(),
        }
    }

    /// Blocks until every queued job has finished.
    pub fn wait_idle(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
    }

    pub fn pending_jobs(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Runs the remaining queue to completion and joins the workers.
    pub fn shutdown(&mut self) {
        self.sender = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("A tile loader thread panicked");
            }
        }
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pool_runs_every_job() {
        let loader = TileLoader::new(3);
        assert_eq!(loader.num_threads(), 3);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let done = done.clone();
            loader.spawn(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        loader.wait_idle();
        assert_eq!(done.load(Ordering::SeqCst), 50);
        assert_eq!(loader.pending_jobs(), 0);
    }

    #[test]
    fn zero_threads_run_inline() {
        let loader = TileLoader::new(0);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        loader.spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_drains_the_queue() {
        let mut loader = TileLoader::new(1);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = done.clone();
            loader.spawn(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        loader.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }
}
