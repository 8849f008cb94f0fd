//! Philox4x64-10, a counter-based generator.
//!
//! Every `(key, counter)` pair maps to four independent 64-bit outputs, so any trial can be
//! regenerated from its coordinates alone, whatever thread computes it.
use rand_core::{impls, Error, RngCore};

const PHILOX_M0: u64 = 0xD2E7_470E_E14C_6C93;
const PHILOX_M1: u64 = 0xCA5A_8263_9512_1157;
const PHILOX_W0: u64 = 0x9E37_79B9_7F4A_7C15;
const PHILOX_W1: u64 = 0xBB67_AE85_84CA_A73B;
const ROUNDS: usize = 10;

#[inline(always)]
fn mulhilo(a: u64, b: u64) -> (u64, u64) {
    let product = (a as u128) * (b as u128);
    ((product >> 64) as u64, product as u64)
}

/// One Philox4x64-10 block.
pub fn philox4x64(counter: [u64; 4], key: [u64; 2]) -> [u64; 4] {
    let mut c = counter;
    let mut k = key;
    for round in 0..ROUNDS {
        if round > 0 {
            k[0] = k[0].wrapping_add(PHILOX_W0);
            k[1] = k[1].wrapping_add(PHILOX_W1);
        }
        let (hi0, lo0) = mulhilo(PHILOX_M0, c[0]);
        let (hi1, lo1) = mulhilo(PHILOX_M1, c[2]);
        c = [hi1 ^ c[1] ^ k[0], lo1, hi0 ^ c[3] ^ k[1], lo0];
    }
    c
}

/// A stream over consecutive blocks; the first counter word is the block number.
#[derive(Debug, Clone)]
pub struct PhiloxRng {
    key: [u64; 2],
    counter: [u64; 4],
    block: [u64; 4],
    index: usize,
}

impl PhiloxRng {
    pub fn new(key: [u64; 2], counter: [u64; 4]) -> Self {
        PhiloxRng {
            key,
            counter,
            block: [0; 4],
            index: 4,
        }
    }
}

impl RngCore for PhiloxRng {
    #[inline]
    fn next_u64(&mut self) -> u64 {
        if self.index == 4 {
            self.block = philox4x64(self.counter, self.key);
            self.counter[0] = self.counter[0].wrapping_add(1);
            self.index = 0;
        }
        let value = self.block[self.index];
        self.index += 1;
        value
    }
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
