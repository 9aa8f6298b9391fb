//! Controllers: consumers of the shared detection state.
//!
//! Each controller runs on its own named thread, blocks until a new target
//! is published, snapshots it, and turns it into commands on its own sink.
//! A controller error is fatal: the thread shuts the shared state down so the
//! detection loop stops, and the error is returned from `join`.

pub mod advance;
pub mod aim;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::action::{ActionSink, SinkResult};
use crate::state::{SharedDetection, Target, Wait};

pub use advance::{AdvanceController, AdvanceDecision, AdvancePolicy};
pub use aim::{AimController, AimDecision, AimPolicy, ReferencePoint};

/// A consumer of published targets.
pub trait Controller: Send {
    fn name(&self) -> &'static str;

    /// Act on one snapshot. Called outside the shared-state lock.
    fn act(&mut self, target: &Target, sink: &mut dyn ActionSink) -> SinkResult<()>;
}

/// Counters reported when a controller thread exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub snapshots: u64,
}

/// Wait / snapshot / act / sleep until the shared state shuts down.
pub fn run_controller<C, S>(
    controller: &mut C,
    state: &SharedDetection,
    sink: &mut S,
    interval: Duration,
) -> Result<ControllerStats>
where
    C: Controller + ?Sized,
    S: ActionSink,
{
    let mut stats = ControllerStats::default();
    let mut seen = 0;
    loop {
        let snapshot = match state.wait_next(seen) {
            Wait::Published(snapshot) => snapshot,
            Wait::Shutdown => return Ok(stats),
        };
        seen = snapshot.generation;
        stats.snapshots += 1;
        controller
            .act(&snapshot.target, sink)
            .with_context(|| format!("{} controller failed", controller.name()))?;
        thread::sleep(interval);
    }
}

/// Handle to a running controller thread.
pub struct ControllerHandle {
    name: &'static str,
    handle: JoinHandle<Result<ControllerStats>>,
}

impl ControllerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the thread. Panics are reported as errors.
    pub fn join(self) -> Result<ControllerStats> {
        self.handle
            .join()
            .map_err(|_| anyhow!("{} controller panicked", self.name))?
    }
}

/// Shuts the shared state down if the controller thread unwinds.
struct ShutdownOnPanic(Arc<SharedDetection>);

impl Drop for ShutdownOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.shutdown();
        }
    }
}

/// Start a controller thread. The sink is created on that thread.
pub fn spawn_controller<C, S, F>(
    mut controller: C,
    state: Arc<SharedDetection>,
    make_sink: F,
    interval: Duration,
) -> Result<ControllerHandle>
where
    C: Controller + 'static,
    S: ActionSink,
    F: FnOnce() -> SinkResult<S> + Send + 'static,
{
    let name = controller.name();
    let handle = thread::Builder::new()
        .name(format!("{}-controller", name))
        .spawn(move || {
            let _guard = ShutdownOnPanic(state.clone());
            let result = make_sink()
                .with_context(|| format!("failed to open {} input sink", name))
                .and_then(|mut sink| {
                    log::info!("{} controller started (sink={})", name, sink.name());
                    run_controller(&mut controller, &state, &mut sink, interval)
                });
            match &result {
                Ok(stats) => {
                    log::info!("{} controller stopped after {} snapshots", name, stats.snapshots)
                }
                Err(e) => {
                    log::error!("{:#}", e);
                    state.shutdown();
                }
            }
            result
        })
        .with_context(|| format!("failed to spawn {} controller thread", name))?;
    Ok(ControllerHandle { name, handle })
}
