//! The host device: a rayon worker pool sized to the hardware.
use crate::bits::WordWidth;
use crate::Result;
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

#[derive(Debug)]
pub struct HostDevice {
    num_workers: usize,
    pool: ThreadPool,
}

impl HostDevice {
    /// `None` uses one worker per logical CPU.
    pub fn new(num_workers: Option<usize>) -> Result<Self> {
        let num_workers = num_workers.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("bitmc-worker-{}", i))
            .build()?;
        debug!("host device with {} workers", num_workers);
        Ok(HostDevice { num_workers, pool })
    }

    /// The widest word the host handles natively.
    pub fn preferred_word_width(&self) -> WordWidth {
        if cfg!(target_pointer_width = "64") {
            WordWidth::W64
        } else {
            WordWidth::W32
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs `op` with every parallel kernel inside it scheduled on this device's workers.
    pub fn install<R: Send, F: FnOnce() -> R + Send>(&self, op: F) -> R {
        self.pool.install(op)
    }
}
