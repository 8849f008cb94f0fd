//! Driver configuration.
use crate::bits::WordWidth;
use crate::pdag::NodeIndex;
use crate::sampler::Prng;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seed {
    /// Drawn from the thread generator when a run starts, and reported back.
    Random,
    Fixed(u64),
}

impl Default for Seed {
    fn default() -> Self {
        Seed::Random
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub batch_size: usize,
    pub bitpacks_per_batch: usize,
    /// `None` picks the device's preferred width.
    pub word_width: Option<WordWidth>,
    pub max_iterations: Option<u64>,
    pub max_trials: Option<u64>,
    /// Stop once the root's standard error is at most this; 0 disables.
    pub target_std_err: f64,
    pub timeout: Option<Duration>,
    pub seed: Seed,
    pub prng: Prng,
    /// Nodes to tally besides the root.
    pub observed_nodes: BTreeSet<NodeIndex>,
    /// `None` uses one worker per logical CPU.
    pub num_workers: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            batch_size: 32,
            bitpacks_per_batch: 256,
            word_width: None,
            max_iterations: Some(100),
            max_trials: None,
            target_std_err: 0.0,
            timeout: None,
            seed: Seed::Random,
            prng: Prng::Mt19937_64,
            observed_nodes: BTreeSet::new(),
            num_workers: None,
        }
    }
}

impl Settings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
    pub fn with_bitpacks_per_batch(mut self, bitpacks_per_batch: usize) -> Self {
        self.bitpacks_per_batch = bitpacks_per_batch;
        self
    }
    pub fn with_word_width(mut self, word_width: WordWidth) -> Self {
        self.word_width = Some(word_width);
        self
    }
    pub fn with_max_iterations(mut self, max_iterations: Option<u64>) -> Self {
        self.max_iterations = max_iterations;
        self
    }
    pub fn with_max_trials(mut self, max_trials: Option<u64>) -> Self {
        self.max_trials = max_trials;
        self
    }
    pub fn with_target_std_err(mut self, target_std_err: f64) -> Self {
        self.target_std_err = target_std_err;
        self
    }
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }
    pub fn with_prng(mut self, prng: Prng) -> Self {
        self.prng = prng;
        self
    }
    pub fn with_observed<I: IntoIterator<Item = NodeIndex>>(mut self, nodes: I) -> Self {
        self.observed_nodes.extend(nodes);
        self
    }
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::Settings(msg));
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".to_string());
        }
        if self.bitpacks_per_batch == 0 {
            return invalid("bitpacks_per_batch must be positive".to_string());
        }
        if self.batch_size.checked_mul(self.bitpacks_per_batch).is_none() {
            return invalid(format!(
                "batch_size {} x bitpacks_per_batch {} overflows",
                self.batch_size, self.bitpacks_per_batch
            ));
        }
        if self.max_iterations == Some(0) {
            return invalid("max_iterations must be positive or unlimited".to_string());
        }
        if self.max_trials == Some(0) {
            return invalid("max_trials must be positive or unlimited".to_string());
        }
        if self.target_std_err.is_nan() || self.target_std_err < 0.0 {
            return invalid(format!("target_std_err {} must be non-negative", self.target_std_err));
        }
        if self.num_workers == Some(0) {
            return invalid("num_workers must be positive".to_string());
        }
        if self.max_iterations.is_none()
            && self.max_trials.is_none()
            && self.target_std_err == 0.0
            && self.timeout.is_none()
        {
            return invalid("no stopping criterion: set max_iterations, max_trials, target_std_err or timeout".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Seed, Settings};
    use crate::bits::WordWidth;
    use crate::pdag::NodeIndex;
    use crate::sampler::Prng;
    use crate::Error;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.batch_size, 32);
        assert_eq!(settings.bitpacks_per_batch, 256);
        assert_eq!(settings.seed, Seed::Random);
        assert_eq!(settings.prng, Prng::Mt19937_64);
    }

    #[test]
    fn builders() {
        let settings = Settings::default()
            .with_word_width(WordWidth::W16)
            .with_seed(Seed::Fixed(3))
            .with_observed(vec![NodeIndex(4), NodeIndex(2), NodeIndex(4)])
            .with_num_workers(2);
        assert_eq!(settings.word_width, Some(WordWidth::W16));
        assert_eq!(settings.observed_nodes.len(), 2);
        settings.validate().unwrap();
    }

    #[test]
    fn rejects_invalid() {
        let invalid = vec![
            Settings::default().with_batch_size(0),
            Settings::default().with_bitpacks_per_batch(0),
            Settings::default().with_batch_size(usize::MAX).with_bitpacks_per_batch(2),
            Settings::default().with_max_iterations(Some(0)),
            Settings::default().with_max_trials(Some(0)),
            Settings::default().with_target_std_err(-1e-3),
            Settings::default().with_target_std_err(f64::NAN),
            Settings::default().with_num_workers(0),
            Settings::default().with_max_iterations(None),
        ];
        for settings in invalid.iter() {
            assert!(matches!(settings.validate(), Err(Error::Settings(_))), "{:?}", settings);
        }
    }

    #[test]
    fn any_single_criterion_suffices() {
        let unbounded = Settings::default().with_max_iterations(None);
        unbounded.clone().with_max_trials(Some(10)).validate().unwrap();
        unbounded.clone().with_target_std_err(1e-2).validate().unwrap();
        unbounded.with_timeout(Duration::from_millis(10)).validate().unwrap();
    }
}
