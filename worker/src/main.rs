//! Reference worker binary, wired to the mock compiler.
//!
//! Real deployments embed the worker loop in their own binary with their
//! own `ModelCompiler` and point `SpawnOptions::program` at it (or let it
//! default to the coordinator re-executing itself).

use std::process::ExitCode;

use worker::bootstrap;

fn main() -> ExitCode {
    if !bootstrap::is_worker_process() {
        eprintln!("not spawned as a device worker (worker spec missing from environment)");
        return ExitCode::FAILURE;
    }
    bootstrap::run_worker(Box::new(kernel::mock::MockCompiler))
}
