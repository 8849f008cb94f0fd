//! Bitpacked Monte Carlo evaluation of probabilistic Boolean DAGs.
//!
//! Every basic event is sampled `W` trials at a time into machine words, gates are evaluated
//! layer by layer with whole-word bitwise kernels, and the one-bits of observed nodes are tallied
//! into running estimates with standard errors and confidence intervals.
//!
//! ```
//! use bitmc::{Connective, Edge, MonteCarlo, NodeIndex, Pdag, Prng, Seed, Settings};
//!
//! let mut pdag = Pdag::new();
//! let a = pdag.add_basic_event(NodeIndex(0), 0.5).unwrap();
//! let b = pdag.add_basic_event(NodeIndex(1), 0.5).unwrap();
//! let top = pdag
//!     .add_gate(NodeIndex(2), Connective::And, vec![Edge::pos(a), Edge::pos(b)])
//!     .unwrap();
//! pdag.set_root(top);
//!
//! let settings = Settings::default()
//!     .with_seed(Seed::Fixed(7))
//!     .with_prng(Prng::Philox4x64)
//!     .with_max_iterations(Some(4));
//! let report = MonteCarlo::new(settings).unwrap().run(&pdag).unwrap();
//! let estimate = report.root_estimate();
//! assert!((estimate.mean - 0.25).abs() < 4.0 * estimate.std_err + 1e-3);
//! ```
pub mod bits;
pub mod bitslice;
pub mod buffer;
pub mod checkpoint;
pub mod context;
pub mod device;
pub mod driver;
pub mod kernels;
pub mod layers;
pub mod pdag;
pub mod philox;
pub mod sampler;
pub mod settings;
pub mod tally;

pub use crate::bits::{Word, WordWidth};
pub use crate::checkpoint::Checkpoint;
pub use crate::driver::{CancelHandle, MonteCarlo, Report, StopReason};
pub use crate::layers::CompiledModel;
pub use crate::pdag::{Connective, Edge, NodeIndex, NodeSupply, Pdag};
pub use crate::sampler::Prng;
pub use crate::settings::{Seed, Settings};
pub use crate::tally::{Estimate, Tally};

/// Structural problems found in a Pdag before any kernel runs.
#[derive(Debug, thiserror::Error)]
pub enum ValidityError {
    #[error("duplicate element {0}")]
    DuplicateElement(NodeIndex),

    #[error("undefined element {missing}{}", referrer_suffix(.referrer))]
    UndefinedElement {
        referrer: Option<NodeIndex>,
        missing: NodeIndex,
    },

    #[error("cycle among gates {0:?}")]
    Cycle(Vec<NodeIndex>),

    #[error("domain error: {0}")]
    Domain(String),
}

fn referrer_suffix(referrer: &Option<NodeIndex>) -> String {
    match referrer {
        Some(r) => format!(" referenced by {}", r),
        None => String::new(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validity error: {0}")]
    Validity(#[from] ValidityError),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint encoding error: {0}")]
    Checkpoint(#[from] bincode::Error),

    #[error("checkpoint does not match the model: {0}")]
    CheckpointMismatch(String),

    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
