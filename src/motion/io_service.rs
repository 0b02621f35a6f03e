// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the worker pool on which the motion channels do their I/O.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error};

use crate::exception::{create_network_exception, YumiResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Interval in which idle workers check for shutdown.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fixed-size pool of worker threads shared by the motion channels of both arms.
///
/// Jobs can be posted before the pool is started, they are executed as soon as the workers are
/// running. Long-running jobs have to watch the shutdown flag of their [`IoHandle`].
pub struct IoService {
    threads: usize,
    handle: IoHandle,
    receiver: Receiver<Job>,
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable handle for posting jobs to an [`IoService`].
#[derive(Clone)]
pub struct IoHandle {
    sender: Sender<Job>,
    shutdown: Arc<AtomicBool>,
}

impl IoHandle {
    /// Queues a job for execution on one of the workers.
    pub fn post<F: FnOnce() + Send + 'static>(&self, job: F) -> YumiResult<()> {
        if self.is_shutdown() {
            return Err(create_network_exception("I/O service is stopped"));
        }
        self.sender
            .send(Box::new(job))
            .map_err(|_| create_network_exception("I/O service is stopped"))
    }

    /// true once the service has been stopped
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl IoService {
    pub fn new(threads: usize) -> Self {
        let (sender, receiver) = unbounded();
        IoService {
            threads,
            handle: IoHandle {
                sender,
                shutdown: Arc::new(AtomicBool::new(false)),
            },
            receiver,
            workers: Vec::with_capacity(threads),
        }
    }

    pub fn handle(&self) -> IoHandle {
        self.handle.clone()
    }

    /// Spawns the worker threads. Calling it on a running or stopped service has no effect.
    pub fn start(&mut self) -> YumiResult<()> {
        if !self.workers.is_empty() || self.handle.is_shutdown() {
            return Ok(());
        }
        for index in 0..self.threads {
            let receiver = self.receiver.clone();
            let shutdown = self.handle.shutdown.clone();
            let worker = std::thread::Builder::new()
                .name(format!("yumi-io-{}", index))
                .spawn(move || {
                    while !shutdown.load(Ordering::Acquire) {
                        match receiver.recv_timeout(WORKER_POLL_INTERVAL) {
                            Ok(job) => job(),
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .map_err(|e| create_network_exception(format!("can not spawn I/O worker: {}", e)))?;
            self.workers.push(worker);
        }
        debug!("started {} I/O workers", self.threads);
        Ok(())
    }

    /// Queues a job for execution on one of the workers.
    pub fn post<F: FnOnce() + Send + 'static>(&self, job: F) -> YumiResult<()> {
        self.handle.post(job)
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty() && !self.handle.is_shutdown()
    }

    /// Stops the service and joins all workers. Queued jobs which did not start yet are dropped.
    pub fn stop(&mut self) {
        self.handle.shutdown.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("I/O worker panicked");
            }
        }
        while self.receiver.try_recv().is_ok() {}
    }
}

impl Drop for IoService {
    fn drop(&mut self) {
        self.stop();
    }
}
