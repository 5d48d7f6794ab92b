use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::annotate::EmojiLookup;
use crate::cache::{EmojiCache, RefreshError};
use crate::emoji::{CustomEmoji, EmojiFetcher};

pub const DEFAULT_WORKERS: usize = 2;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct Outcome {
    pub host: String,
    pub result: Result<usize, RefreshError>,
}

struct Job {
    host: String,
    tx: Sender<Outcome>,
}

struct Inner {
    cache: Arc<EmojiCache>,
    fetcher: Arc<dyn EmojiFetcher>,
    jobs: Sender<Job>,
    stop: Sender<()>,
    in_flight: Mutex<HashSet<String>>,
}

pub struct Manager {
    inner: Arc<Inner>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Manager {
    pub fn new(cache: Arc<EmojiCache>, fetcher: Arc<dyn EmojiFetcher>, workers: usize) -> Self {
        let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            cache,
            fetcher,
            jobs: job_tx,
            stop: stop_tx,
            in_flight: Mutex::new(HashSet::new()),
        });

        let mut handles = Vec::new();
        for _ in 0..workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }

        Self { inner, handles }
    }

    pub fn cache(&self) -> &Arc<EmojiCache> {
        &self.inner.cache
    }

    /// Queues a refresh of `host`. Returns `None` when one is already
    /// running or queued; the receiver may be dropped for fire-and-forget.
    pub fn request(&self, host: &str) -> Option<Receiver<Outcome>> {
        if !self.inner.in_flight.lock().insert(host.to_string()) {
            tracing::trace!(host, "emoji refresh already in flight");
            return None;
        }

        let (tx, rx) = unbounded();
        let job = Job {
            host: host.to_string(),
            tx,
        };
        if self.inner.jobs.send(job).is_err() {
            self.inner.in_flight.lock().remove(host);
            return None;
        }
        Some(rx)
    }

    pub fn is_in_flight(&self, host: &str) -> bool {
        self.inner.in_flight.lock().contains(host)
    }

    pub fn wait_idle(&self, host: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_in_flight(host) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        true
    }

    pub fn abandon(mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        let detached = self.handles.drain(..).count();
        tracing::debug!(workers = detached, "emoji refresh workers detached");
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl EmojiLookup for Manager {
    fn lookup(&self, host: &str, shortcode: &str) -> Option<CustomEmoji> {
        self.inner.cache.lookup(host, shortcode)
    }

    fn has_listing(&self, host: &str) -> bool {
        self.inner.cache.is_fresh(host)
    }

    fn request_refresh(&self, host: &str) -> bool {
        self.request(host).is_some()
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        let result = self
            .cache
            .refresh(&job.host, self.fetcher.as_ref())
            .map(|emojis| emojis.len());
        self.in_flight.lock().remove(&job.host);

        match &result {
            Ok(count) => tracing::debug!(host = %job.host, count, "emoji listing refreshed"),
            Err(err) => tracing::warn!(host = %job.host, error = %err, "emoji listing refresh failed"),
        }

        let _ = job.tx.send(Outcome {
            host: job.host,
            result,
        });
    }
}
