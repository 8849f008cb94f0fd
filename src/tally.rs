//! Running tallies of one-bits and the statistics derived from them.
use crate::bits::Word;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Two-sided 95% normal quantile.
pub const Z_95: f64 = 1.959_963_984_540_054;
/// Two-sided 99% normal quantile.
pub const Z_99: f64 = 2.575_829_303_548_901;

const COUNT_CHUNK: usize = 1 << 12;

/// Number of set bits in `words`, as a parallel tree of 64-bit sums.
pub fn count_ones<W: Word>(words: &[W]) -> u64 {
    words
        .par_chunks(COUNT_CHUNK)
        .fold(
            || 0u64,
            |acc, chunk| acc + chunk.iter().map(|w| w.count_bits() as u64).sum::<u64>(),
        )
        .reduce(|| 0u64, |a, b| a + b)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub num_one_bits: u64,
    pub num_trials: u64,
}

impl Tally {
    pub fn add(&mut self, num_one_bits: u64, num_trials: u64) {
        debug_assert!(num_one_bits <= num_trials);
        self.num_one_bits += num_one_bits;
        self.num_trials += num_trials;
    }

    pub fn mean(&self) -> f64 {
        if self.num_trials == 0 {
            return 0.0;
        }
        self.num_one_bits as f64 / self.num_trials as f64
    }

    pub fn std_err(&self) -> f64 {
        if self.num_trials == 0 {
            return 0.0;
        }
        let mean = self.mean();
        // Rounding can push the product a hair below zero.
        ((mean * (1.0 - mean)).max(0.0) / self.num_trials as f64).sqrt()
    }

    /// `mean ± z σ`, clipped to [0, 1]. Without trials nothing is known, so [0, 1].
    pub fn interval(&self, z: f64) -> (f64, f64) {
        if self.num_trials == 0 {
            return (0.0, 1.0);
        }
        let (mean, half_width) = (self.mean(), z * self.std_err());
        ((mean - half_width).max(0.0), (mean + half_width).min(1.0))
    }

    pub fn ci95(&self) -> (f64, f64) {
        self.interval(Z_95)
    }

    pub fn ci99(&self) -> (f64, f64) {
        self.interval(Z_99)
    }

    pub fn estimate(&self) -> Estimate {
        let (ci95_lower, ci95_upper) = self.ci95();
        let (ci99_lower, ci99_upper) = self.ci99();
        Estimate {
            mean: self.mean(),
            std_err: self.std_err(),
            ci95_lower,
            ci95_upper,
            ci99_lower,
            ci99_upper,
            num_trials: self.num_trials,
        }
    }
}

/// The reported statistics of an observed node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub mean: f64,
    pub std_err: f64,
    pub ci95_lower: f64,
    pub ci95_upper: f64,
    pub ci99_lower: f64,
    pub ci99_upper: f64,
    pub num_trials: u64,
}

impl Estimate {
    /// Whether `p` lies in the 95% interval.
    pub fn ci95_contains(&self, p: f64) -> bool {
        self.ci95_lower <= p && p <= self.ci95_upper
    }
}

#[cfg(test)]
mod tests {
    use super::{count_ones, Tally};
    use rand::{Rng, SeedableRng};
    use rand_hc::Hc128Rng;

    macro_rules! test_count {
        ($name:ident, $type:ty) => {
            #[test]
            fn $name() {
                let mut rng = Hc128Rng::seed_from_u64(0);
                let words: Vec<$type> = (0..10_000).map(|_| rng.gen()).collect();
                let serial: u64 = words.iter().map(|w| w.count_ones() as u64).sum();
                assert_eq!(count_ones(&words), serial);
            }
        };
    }

    test_count!(count_u8, u8);
    test_count!(count_u16, u16);
    test_count!(count_u32, u32);
    test_count!(count_u64, u64);

    #[test]
    fn empty_tally() {
        let estimate = Tally::default().estimate();
        assert_eq!(estimate.mean, 0.0);
        assert_eq!(estimate.std_err, 0.0);
        assert_eq!((estimate.ci95_lower, estimate.ci95_upper), (0.0, 1.0));
        assert_eq!((estimate.ci99_lower, estimate.ci99_upper), (0.0, 1.0));
        assert_eq!(count_ones::<u32>(&[]), 0);
    }

    #[test]
    fn intervals_nest_and_clip() {
        let mut rng = Hc128Rng::seed_from_u64(0);
        for _ in 0..1000 {
            let num_trials = rng.gen_range(1..100_000u64);
            let tally = Tally {
                num_one_bits: rng.gen_range(0..=num_trials),
                num_trials,
            };
            let e = tally.estimate();
            assert!((0.0..=1.0).contains(&e.mean));
            assert!(e.std_err >= 0.0 && !e.std_err.is_nan());
            assert!(0.0 <= e.ci99_lower && e.ci99_lower <= e.ci95_lower);
            assert!(e.ci95_lower <= e.mean && e.mean <= e.ci95_upper);
            assert!(e.ci95_upper <= e.ci99_upper && e.ci99_upper <= 1.0);
        }
    }

    #[test]
    fn degenerate_and_known_values() {
        let all = Tally {
            num_one_bits: 64,
            num_trials: 64,
        };
        assert_eq!(all.mean(), 1.0);
        assert_eq!(all.std_err(), 0.0);
        assert_eq!(all.ci99(), (1.0, 1.0));

        let mut half = Tally::default();
        half.add(5_000, 10_000);
        half.add(5_000, 10_000);
        assert_eq!(half.mean(), 0.5);
        assert!((half.std_err() - 0.5 / 20_000f64.sqrt()).abs() < 1e-12);
        let (lower, upper) = half.ci95();
        assert!((upper - lower - 2.0 * super::Z_95 * half.std_err()).abs() < 1e-12);
    }

    #[test]
    fn more_trials_tighten() {
        let small = Tally {
            num_one_bits: 300,
            num_trials: 1_000,
        };
        let large = Tally {
            num_one_bits: 300_000,
            num_trials: 1_000_000,
        };
        assert!(large.std_err() < small.std_err());
    }
}
