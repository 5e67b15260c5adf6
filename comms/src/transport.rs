//! Worker transports: a fresh OS process over piped stdio, or a dedicated
//! OS thread over an in-memory duplex stream.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::{
    io::{DuplexStream, ReadHalf, WriteHalf},
    process::{Child, Command},
    time::timeout,
};

use crate::{Channel, FrameReceiver, FrameSender};

/// Buffer size of the in-memory duplex used by thread workers.
const DUPLEX_BUF: usize = 1 << 20;

/// How a worker process is launched.
///
/// The worker is always a freshly spawned process, never a fork, so that
/// no corrupted native library state can be inherited from the
/// coordinator.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Worker executable; the current executable when `None` (the
    /// embedder's binary re-runs itself in worker mode).
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    /// Extra environment entries, e.g. the serialized worker spec.
    pub envs: Vec<(String, String)>,
}

/// The reading/writing halves handed to a thread worker's loop.
pub type ThreadRx = FrameReceiver<ReadHalf<DuplexStream>>;
pub type ThreadTx = FrameSender<WriteHalf<DuplexStream>>;

/// Ownership handle for a spawned worker, used to join or kill it.
pub enum WorkerLink {
    Process(Child),
    Thread(Option<std::thread::JoinHandle<()>>),
}

impl WorkerLink {
    /// OS process id, if this link is backed by a process.
    pub fn id(&self) -> Option<u32> {
        match self {
            WorkerLink::Process(child) => child.id(),
            WorkerLink::Thread(_) => None,
        }
    }

    /// Waits for the worker to finish, up to `grace`.
    ///
    /// # Returns
    /// Whether the worker exited within the grace period.
    pub async fn join(&mut self, grace: Duration) -> bool {
        match self {
            WorkerLink::Process(child) => timeout(grace, child.wait()).await.is_ok(),
            WorkerLink::Thread(handle) => {
                // Thread workers exit on their own after replying Done;
                // a blocking join here would be unbounded, so only reap
                // an already finished thread.
                match handle.take() {
                    Some(h) if h.is_finished() => {
                        let _ = h.join();
                        true
                    }
                    Some(h) => {
                        *handle = Some(h);
                        false
                    }
                    None => true,
                }
            }
        }
    }

    /// Forcibly terminates a process worker. Thread workers cannot be
    /// killed; the call is a no-op for them.
    pub async fn kill(&mut self) {
        if let WorkerLink::Process(child) = self {
            let _ = child.kill().await;
        }
    }

    /// Synchronous best-effort kill, usable outside the runtime.
    pub fn kill_now(&mut self) {
        if let WorkerLink::Process(child) = self {
            let _ = child.start_kill();
        }
    }
}

/// Spawns a worker process and connects a channel to its stdio.
///
/// Must be called from within a tokio runtime.
///
/// # Arguments
/// * `opts` - Executable, arguments and environment for the worker.
///
/// # Returns
/// The coordinator-side channel and the process link.
pub fn spawn_process(opts: &SpawnOptions) -> io::Result<(Channel, WorkerLink)> {
    let program = match &opts.program {
        Some(p) => p.clone(),
        None => std::env::current_exe()?,
    };

    let mut cmd = Command::new(program);
    cmd.args(&opts.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    for (key, value) in &opts.envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("worker stdin not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("worker stdout not piped"))?;

    Ok((Channel::new(stdout, stdin), WorkerLink::Process(child)))
}

/// Runs a worker loop on a dedicated OS thread over an in-memory duplex.
///
/// The worker future runs on its own single-threaded runtime inside the
/// thread, so it owns its state exclusively, like a process worker does.
/// Must be called from within a tokio runtime.
///
/// # Arguments
/// * `name` - Thread name, for diagnostics.
/// * `worker` - Builds the worker loop future from its channel ends.
///
/// # Returns
/// The coordinator-side channel and the thread link.
pub fn spawn_thread<F, Fut>(name: &str, worker: F) -> io::Result<(Channel, WorkerLink)>
where
    F: FnOnce(ThreadRx, ThreadTx) -> Fut + Send + 'static,
    Fut: Future<Output = ()>,
{
    let (coord_stream, worker_stream) = tokio::io::duplex(DUPLEX_BUF);

    let (coord_rx, coord_tx) = tokio::io::split(coord_stream);
    let channel = Channel::new(coord_rx, coord_tx);

    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build();
            let rt = match rt {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("worker thread runtime build failed: {e}");
                    return;
                }
            };
            let (rx, tx) = tokio::io::split(worker_stream);
            let (rx, tx) = crate::channel(rx, tx);
            rt.block_on(worker(rx, tx));
        })?;

    Ok((channel, WorkerLink::Thread(Some(handle))))
}
