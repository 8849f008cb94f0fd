//! The execution context owns everything one run needs: the compiled layers, the sample buffers,
//! the sampler and the tallies of observed nodes. Nodes only refer to buffers by slot.
use crate::bits::Word;
use crate::buffer::SampleBuffers;
use crate::checkpoint::Checkpoint;
use crate::kernels;
use crate::layers::{CompiledModel, Operand};
use crate::pdag::NodeIndex;
use crate::sampler::Sampler;
use crate::settings::Settings;
use crate::tally::{count_ones, Tally};
use crate::{Error, Result, ValidityError};
use log::{debug, trace};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
struct Observer {
    node: NodeIndex,
    operand: Operand,
    tally: Tally,
}

#[derive(Debug)]
pub struct ExecutionContext<W: Word> {
    model: CompiledModel,
    buffers: SampleBuffers<W>,
    sampler: Sampler,
    observers: Vec<Observer>,
    iteration: u64,
}

impl<W: Word> ExecutionContext<W> {
    pub fn new(model: CompiledModel, settings: &Settings, num_workers: usize, seed: u64) -> Result<Self> {
        let mut observed: BTreeSet<NodeIndex> = settings.observed_nodes.clone();
        observed.insert(model.root);
        let observers = observed
            .into_iter()
            .map(|node| match model.operand(node) {
                Some(operand) => Ok(Observer {
                    node,
                    operand,
                    tally: Tally::default(),
                }),
                None => Err(ValidityError::UndefinedElement {
                    referrer: None,
                    missing: node,
                }
                .into()),
            })
            .collect::<Result<Vec<_>>>()?;

        let buffers = SampleBuffers::allocate(model.num_slots(), settings.batch_size, settings.bitpacks_per_batch)?;
        debug!(
            "allocated {} buffers of {} words ({} bytes), {} trials per iteration",
            buffers.num_nodes(),
            buffers.words_per_node(),
            buffers.size_in_bytes(),
            buffers.trials_per_iteration()
        );
        let probabilities: Vec<f64> = model
            .basic
            .probability_index
            .iter()
            .map(|&i| model.probabilities[i])
            .collect();
        let sampler = Sampler::new(settings.prng, seed, &probabilities, num_workers)?;
        Ok(ExecutionContext {
            model,
            buffers,
            sampler,
            observers,
            iteration: 0,
        })
    }

    /// Fills every basic event buffer with fresh trials.
    pub fn sample(&mut self) {
        let words_per_node = self.buffers.words_per_node();
        let words = self.buffers.nodes_mut(0..self.model.basic.len());
        self.sampler.fill(self.iteration, words, words_per_node);
    }

    /// Evaluates the gate layers, lowest level first.
    pub fn propagate(&mut self) {
        kernels::propagate(&self.model, &mut self.buffers);
    }

    /// Adds the one-bits of every observed node to its tally.
    pub fn tally(&mut self) {
        let trials = self.buffers.trials_per_iteration();
        for observer in self.observers.iter_mut() {
            let ones = match observer.operand {
                Operand::Slot(slot) => count_ones(self.buffers.node(slot)),
                Operand::Constant(state) => state as u64 * trials,
            };
            observer.tally.add(ones, trials);
        }
    }

    /// One full iteration: sample, propagate, tally.
    pub fn step(&mut self) {
        self.sample();
        self.propagate();
        self.tally();
        self.iteration += 1;
        trace!("iteration {} done", self.iteration);
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn trials_per_iteration(&self) -> u64 {
        self.buffers.trials_per_iteration()
    }

    pub fn tally_of(&self, node: NodeIndex) -> Option<Tally> {
        self.observers.iter().find(|o| o.node == node).map(|o| o.tally)
    }

    pub fn root_tally(&self) -> Tally {
        self.tally_of(self.model.root).unwrap_or_default()
    }

    pub fn tallies(&self) -> impl Iterator<Item = (NodeIndex, Tally)> + '_ {
        self.observers.iter().map(|o| (o.node, o.tally))
    }

    /// The current iteration's samples of a node, or `None` for constants and unknown nodes.
    pub fn buffer(&self, node: NodeIndex) -> Option<&[W]> {
        match self.model.operand(node)? {
            Operand::Slot(slot) => Some(self.buffers.node(slot)),
            Operand::Constant(_) => None,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.iteration, self.tallies())
    }

    /// Continues from the tallies of a checkpoint with exactly the observed nodes of this context.
    /// Sampling picks up at the checkpoint's iteration, so no earlier sample is drawn again even
    /// when the trials per iteration differ from the checkpointed run.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.check()?;
        let expected: BTreeSet<NodeIndex> = self.observers.iter().map(|o| o.node).collect();
        let found: BTreeSet<NodeIndex> = checkpoint.entries.iter().map(|e| e.node).collect();
        if expected != found || checkpoint.entries.len() != found.len() {
            return Err(Error::CheckpointMismatch(format!(
                "checkpoint observes {:?}, the run observes {:?}",
                found, expected
            )));
        }
        for observer in self.observers.iter_mut() {
            if let Some(tally) = checkpoint.tally(observer.node) {
                observer.tally = tally;
            }
        }
        self.iteration = checkpoint.iteration;
        self.sampler.restart(self.iteration);
        debug!(
            "resumed {} observed nodes with {} trials at iteration {}",
            self.observers.len(),
            checkpoint.num_trials(),
            self.iteration
        );
        Ok(())
    }
}
