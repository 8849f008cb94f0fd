//! The iteration loop.
//!
//! The driver itself is sequential. Each iteration samples, propagates and tallies with parallel
//! kernels on the host device, then checks the stopping criteria. Cancellation and timeouts are
//! only looked at between iterations, so the tallies of a stopped run are always complete.
use crate::bits::{Word, WordWidth};
use crate::checkpoint::Checkpoint;
use crate::context::ExecutionContext;
use crate::device::HostDevice;
use crate::layers::CompiledModel;
use crate::pdag::{NodeIndex, Pdag};
use crate::settings::{Seed, Settings};
use crate::tally::{Estimate, Tally};
use crate::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The root's standard error reached the target.
    Converged,
    MaxTrials,
    MaxIterations,
    Cancelled,
    Timeout,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StopReason::Converged => "converged",
            StopReason::MaxTrials => "trial cap reached",
            StopReason::MaxIterations => "iteration cap reached",
            StopReason::Cancelled => "cancelled",
            StopReason::Timeout => "timed out",
        };
        write!(f, "{}", reason)
    }
}

/// Stops a running simulation after its current iteration. A cancel issued before a run reaches its
/// first iteration stops it there; the flag clears once the run returns.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub estimates: BTreeMap<NodeIndex, Estimate>,
    pub tallies: BTreeMap<NodeIndex, Tally>,
    pub root: NodeIndex,
    root_estimate: Estimate,
    /// Iterations of this run, resumed ones excluded.
    pub iterations: u64,
    /// Trials behind the root estimate, resumed ones included.
    pub num_trials: u64,
    /// The iteration a resumed run samples next.
    pub next_iteration: u64,
    pub stop: StopReason,
    pub seed: u64,
    pub word_width: WordWidth,
}

impl Report {
    pub fn root_estimate(&self) -> &Estimate {
        &self.root_estimate
    }

    pub fn estimate(&self, node: NodeIndex) -> Option<&Estimate> {
        self.estimates.get(&node)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.next_iteration, self.tallies.iter().map(|(&node, &tally)| (node, tally)))
    }
}

pub struct MonteCarlo {
    settings: Settings,
    device: HostDevice,
    cancel: CancelHandle,
}

impl MonteCarlo {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let device = HostDevice::new(settings.num_workers)?;
        Ok(MonteCarlo {
            settings,
            device,
            cancel: CancelHandle::default(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn run(&self, pdag: &Pdag) -> Result<Report> {
        self.start(pdag, None)
    }

    /// Continues accumulating on top of the tallies of `checkpoint`. Trial caps count resumed trials.
    pub fn resume(&self, pdag: &Pdag, checkpoint: &Checkpoint) -> Result<Report> {
        self.start(pdag, Some(checkpoint))
    }

    fn start(&self, pdag: &Pdag, checkpoint: Option<&Checkpoint>) -> Result<Report> {
        let report = self.simulate(pdag, checkpoint);
        self.cancel.reset();
        report
    }

    fn simulate(&self, pdag: &Pdag, checkpoint: Option<&Checkpoint>) -> Result<Report> {
        let model = CompiledModel::compile(pdag)?;
        let seed = match self.settings.seed {
            Seed::Fixed(seed) => seed,
            Seed::Random => rand::random(),
        };
        let width = self
            .settings
            .word_width
            .unwrap_or_else(|| self.device.preferred_word_width());
        info!(
            "simulating {} slots in {} layers with {} words, {} prng, seed {}",
            model.num_slots(),
            model.gate_layers.len(),
            width,
            self.settings.prng,
            seed
        );
        self.device.install(|| match width {
            WordWidth::W8 => self.drive::<u8>(model, checkpoint, seed),
            WordWidth::W16 => self.drive::<u16>(model, checkpoint, seed),
            WordWidth::W32 => self.drive::<u32>(model, checkpoint, seed),
            WordWidth::W64 => self.drive::<u64>(model, checkpoint, seed),
        })
    }

    fn drive<W: Word>(&self, model: CompiledModel, checkpoint: Option<&Checkpoint>, seed: u64) -> Result<Report> {
        let settings = &self.settings;
        let mut context = ExecutionContext::<W>::new(model, settings, self.device.num_workers(), seed)?;
        if let Some(checkpoint) = checkpoint {
            context.restore(checkpoint)?;
        }
        let started = Instant::now();
        let mut iterations = 0u64;
        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if let Some(timeout) = settings.timeout {
                if started.elapsed() >= timeout {
                    break StopReason::Timeout;
                }
            }
            context.step();
            iterations += 1;

            let root = context.root_tally();
            debug!(
                "iteration {}: {} trials, mean {:.6e}, std_err {:.3e}",
                iterations,
                root.num_trials,
                root.mean(),
                root.std_err()
            );
            if settings.target_std_err > 0.0 && root.std_err() <= settings.target_std_err {
                break StopReason::Converged;
            }
            if settings.max_trials.map_or(false, |cap| root.num_trials >= cap) {
                break StopReason::MaxTrials;
            }
            if settings.max_iterations.map_or(false, |cap| iterations >= cap) {
                break StopReason::MaxIterations;
            }
        };

        let root = context.model().root;
        let tallies: BTreeMap<NodeIndex, Tally> = context.tallies().collect();
        let estimates: BTreeMap<NodeIndex, Estimate> = tallies.iter().map(|(&node, tally)| (node, tally.estimate())).collect();
        let root_tally = context.root_tally();
        let root_estimate = root_tally.estimate();
        info!(
            "{} after {} iterations ({} trials): p = {:.6e} +/- {:.3e}",
            stop, iterations, root_tally.num_trials, root_estimate.mean, root_estimate.std_err
        );
        Ok(Report {
            estimates,
            tallies,
            root,
            root_estimate,
            iterations,
            num_trials: root_tally.num_trials,
            next_iteration: context.iteration(),
            stop,
            seed,
            word_width: W::WIDTH,
        })
    }
}
