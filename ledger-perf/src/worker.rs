//! Thread-per-worker fan-out
//!
//! Every worker is an OS thread driving its own single-threaded tokio
//! runtime, so no two workers share an event loop.

use anyhow::{bail, Context, Result};
use std::future::Future;
use std::thread;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error};

/// Build a runtime private to the calling thread
pub fn isolated_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build worker runtime")
}

/// Run `job(index, share)` for every share, each on its own thread and
/// runtime, and wait for all of them.
///
/// Errors (runtime construction, spawn failure, panic) are collected and
/// reported once every thread has been joined.
pub fn run_workers<S, F, Fut>(label: &str, shares: Vec<S>, job: F) -> Result<()>
where
    S: Send,
    F: Fn(usize, S) -> Fut + Sync,
    Fut: Future<Output = ()>,
{
    let job = &job;
    let workers = shares.len();

    let failures: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = shares
            .into_iter()
            .enumerate()
            .map(|(index, share)| {
                thread::Builder::new()
                    .name(format!("{}-{}", label, index))
                    .spawn_scoped(scope, move || -> Result<()> {
                        let runtime = isolated_runtime()?;
                        runtime.block_on(job(index, share));
                        Ok(())
                    })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .filter_map(|(index, handle)| match handle {
                Err(e) => Some(format!("{}-{} failed to spawn: {}", label, index, e)),
                Ok(handle) => match handle.join() {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(format!("{}-{}: {:#}", label, index, e)),
                    Err(_) => Some(format!("{}-{} panicked", label, index)),
                },
            })
            .collect()
    });

    debug!(label, workers, failed = failures.len(), "Workers joined");

    if !failures.is_empty() {
        for failure in &failures {
            error!("{}", failure);
        }
        bail!("{} of {} {} workers failed", failures.len(), workers, label);
    }

    Ok(())
}
