//! Bernoulli sampling of basic events into bitpacked words.
use crate::bits::Word;
use crate::philox::PhiloxRng;
use crate::{Result, ValidityError};
use rand::distributions::{Bernoulli, Distribution};
use rand::{Rng, RngCore, SeedableRng};
use rand_hc::Hc128Rng;
use rand_mt::Mt64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prng {
    /// One MT19937-64 stream per worker. Reproducible for a fixed worker count only.
    Mt19937_64,
    /// Keyed by (seed, iteration, word, event). Reproducible for any worker count.
    Philox4x64,
}

impl Default for Prng {
    fn default() -> Self {
        Prng::Mt19937_64
    }
}

impl fmt::Display for Prng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prng::Mt19937_64 => write!(f, "mt19937_64"),
            Prng::Philox4x64 => write!(f, "philox4x64"),
        }
    }
}

impl FromStr for Prng {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mt19937_64" => Ok(Prng::Mt19937_64),
            "philox4x64" => Ok(Prng::Philox4x64),
            _ => Err(format!("unknown prng {:?}, expected mt19937_64 or philox4x64", s)),
        }
    }
}

/// Draws one word of `W` trials; bit `b` is set with the probability of `distribution`.
#[inline]
pub fn sample_word<W: Word, R: Rng + ?Sized>(rng: &mut R, distribution: &Bernoulli) -> W {
    (0..W::BITS).fold(W::zeros(), |word, b| {
        if distribution.sample(rng) {
            word.or(W::bit(b))
        } else {
            word
        }
    })
}

enum Engine {
    Mt { seed: u64, rngs: Vec<Mt64> },
    Philox { seed: u64 },
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Mt { seed, rngs } => write!(f, "Mt19937_64 x {} {{ seed: {} }}", rngs.len(), seed),
            Engine::Philox { seed } => write!(f, "Philox4x64 {{ seed: {} }}", seed),
        }
    }
}

/// One MT19937-64 stream per worker, seeded from an HC-128 sequence keyed by `(seed, iteration)`.
fn worker_streams(seed: u64, iteration: u64, num_workers: usize) -> Vec<Mt64> {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_le_bytes());
    key[8..16].copy_from_slice(&iteration.to_le_bytes());
    let mut seeds = Hc128Rng::from_seed(key);
    (0..num_workers.max(1)).map(|_| Mt64::new(seeds.next_u64())).collect()
}

#[derive(Debug)]
pub struct Sampler {
    engine: Engine,
    distributions: Vec<Bernoulli>,
}

impl Sampler {
    /// `probabilities` are in slot order.
    pub fn new(prng: Prng, seed: u64, probabilities: &[f64], num_workers: usize) -> Result<Self> {
        let distributions = probabilities
            .iter()
            .map(|&p| {
                Bernoulli::new(p)
                    .map_err(|e| ValidityError::Domain(format!("probability {}: {}", p, e)).into())
            })
            .collect::<Result<Vec<_>>>()?;
        let engine = match prng {
            Prng::Mt19937_64 => Engine::Mt {
                seed,
                rngs: worker_streams(seed, 0, num_workers),
            },
            Prng::Philox4x64 => Engine::Philox { seed },
        };
        Ok(Sampler { engine, distributions })
    }

    /// Positions the sampler to continue at `iteration`, as when resuming a run.
    /// MT streams are reseeded from `(seed, iteration)`; Philox is already keyed by the iteration.
    pub fn restart(&mut self, iteration: u64) {
        if let Engine::Mt { seed, rngs } = &mut self.engine {
            *rngs = worker_streams(*seed, iteration, rngs.len());
        }
    }

    pub fn num_events(&self) -> usize {
        self.distributions.len()
    }

    /// Fills the buffers of every basic event, `words_per_node` words each.
    pub fn fill<W: Word>(&mut self, iteration: u64, words: &mut [W], words_per_node: usize) {
        debug_assert_eq!(words.len(), self.distributions.len() * words_per_node);
        if words.is_empty() {
            return;
        }
        let distributions = &self.distributions;
        match &mut self.engine {
            Engine::Mt { rngs, .. } => {
                // Contiguous shares of the whole word range, one per worker.
                let chunk_len = (words.len() + rngs.len() - 1) / rngs.len();
                words
                    .par_chunks_mut(chunk_len)
                    .zip(rngs.par_iter_mut())
                    .enumerate()
                    .for_each(|(c, (chunk, rng))| {
                        let start = c * chunk_len;
                        for (i, word) in chunk.iter_mut().enumerate() {
                            *word = sample_word(rng, &distributions[(start + i) / words_per_node]);
                        }
                    });
            }
            Engine::Philox { seed } => {
                let key = [*seed, iteration];
                words
                    .par_chunks_mut(words_per_node)
                    .zip(distributions.par_iter())
                    .enumerate()
                    .for_each(|(event, (buffer, distribution))| {
                        buffer.par_iter_mut().enumerate().for_each(|(w, word)| {
                            let mut rng = PhiloxRng::new(key, [0, w as u64, event as u64, 0]);
                            *word = sample_word(&mut rng, distribution);
                        })
                    });
            }
        }
    }
}
