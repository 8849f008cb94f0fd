//! Words of bitpacked trials.
//! Bit `b` of a word holds trial `b`; bit zero is the least significant bit.
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// Machine word used to pack trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum WordWidth {
    W8,
    W16,
    W32,
    W64,
}

impl WordWidth {
    pub const ALL: [WordWidth; 4] = [WordWidth::W8, WordWidth::W16, WordWidth::W32, WordWidth::W64];

    pub fn bits(self) -> usize {
        match self {
            WordWidth::W8 => 8,
            WordWidth::W16 => 16,
            WordWidth::W32 => 32,
            WordWidth::W64 => 64,
        }
    }
    pub fn from_bits(bits: usize) -> Option<Self> {
        WordWidth::ALL.iter().copied().find(|w| w.bits() == bits)
    }
}

impl TryFrom<u32> for WordWidth {
    type Error = String;
    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        WordWidth::from_bits(bits as usize)
            .ok_or_else(|| format!("word width must be one of 8, 16, 32, 64, got {}", bits))
    }
}

impl From<WordWidth> for u32 {
    fn from(width: WordWidth) -> u32 {
        width.bits() as u32
    }
}

impl fmt::Display for WordWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.bits())
    }
}

pub trait Word: Copy + Send + Sync + PartialEq + Eq + Default + fmt::Debug + fmt::Binary + 'static {
    const BITS: usize;
    const WIDTH: WordWidth;
    fn zeros() -> Self;
    fn ones() -> Self;
    fn splat(sign: bool) -> Self;
    fn xor(self, rhs: Self) -> Self;
    fn or(self, rhs: Self) -> Self;
    fn and(self, rhs: Self) -> Self;
    fn not(self) -> Self;
    fn count_bits(self) -> u32;
    /// The word with only bit `index` set.
    fn bit(index: usize) -> Self;
    fn get_bit(self, index: usize) -> bool;
}

macro_rules! impl_word {
    ($u_type:ty, $len:expr, $width:ident) => {
        impl Word for $u_type {
            const BITS: usize = $len;
            const WIDTH: WordWidth = WordWidth::$width;
            #[inline(always)]
            fn zeros() -> Self {
                0
            }
            #[inline(always)]
            fn ones() -> Self {
                !0
            }
            #[inline(always)]
            fn splat(sign: bool) -> Self {
                (0 as $u_type).wrapping_sub(sign as $u_type)
            }
            #[inline(always)]
            fn xor(self, rhs: Self) -> Self {
                self ^ rhs
            }
            #[inline(always)]
            fn or(self, rhs: Self) -> Self {
                self | rhs
            }
            #[inline(always)]
            fn and(self, rhs: Self) -> Self {
                self & rhs
            }
            #[inline(always)]
            fn not(self) -> Self {
                !self
            }
            #[inline(always)]
            fn count_bits(self) -> u32 {
                self.count_ones()
            }
            #[inline(always)]
            fn bit(index: usize) -> Self {
                (1 as $u_type) << index
            }
            #[inline(always)]
            fn get_bit(self, index: usize) -> bool {
                (self >> index) & 1 == 1
            }
        }
    };
}

impl_word!(u8, 8, W8);
impl_word!(u16, 16, W16);
impl_word!(u32, 32, W32);
impl_word!(u64, 64, W64);
