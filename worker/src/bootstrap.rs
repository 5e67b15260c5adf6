//! Process-mode bootstrap: the spawned worker binary calls into here
//! before doing anything else.
//!
//! The coordinator re-executes the embedder's binary with the serialized
//! `WorkerSpec` in the environment and the channel on stdio. Embedder
//! mains should check `is_worker_process()` first and hand control to
//! `run_worker` when it holds.

use comms::specs::WorkerSpec;
use kernel::ModelCompiler;
use log::error;

use crate::{Result, WorkerErr};

/// Whether the current process was spawned as a device worker.
pub fn is_worker_process() -> bool {
    WorkerSpec::in_env()
}

/// Serves the worker loop over stdio until `Stop` or failure.
pub async fn serve_stdio(compiler: Box<dyn ModelCompiler>) -> Result<()> {
    let spec = WorkerSpec::from_env().map_err(WorkerErr::Bootstrap)?;
    let (rx, tx) = comms::channel(tokio::io::stdin(), tokio::io::stdout());
    crate::serve(spec, compiler, rx, tx).await
}

/// Complete worker-process entry point: builds a runtime, serves stdio,
/// exits non-zero on failure. Call only after `is_worker_process()`.
pub fn run_worker(compiler: Box<dyn ModelCompiler>) -> std::process::ExitCode {
    env_logger::init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("worker runtime build failed: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve_stdio(compiler)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("worker exited with error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
