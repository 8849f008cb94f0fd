//! Bit-sliced arithmetic over words.
//!
//! A bit-sliced counter is a slice of words where word `i` holds bit `i` of the count of every lane,
//! so one pass of word operations counts all `W` trials of a word at once.
use crate::bits::Word;

fn half_comparator<T: Word>(a: T, b: T) -> (T, T, T) {
    let lt = a.not().and(b);
    let gt = a.and(b.not());
    let eq = lt.or(gt).not();
    (lt, eq, gt)
}

fn full_comparator<T: Word>(a: T, b: T, c: (T, T, T)) -> (T, T, T) {
    let x = half_comparator(a, b);
    let lt = x.0.or(x.2.not().and(c.0));
    let gt = x.2.or(x.0.not().and(c.2));
    (lt, lt.or(gt).not(), gt)
}

pub fn half_adder<T: Word>(a: T, b: T) -> (T, T) {
    (a.xor(b), a.and(b))
}

pub fn full_adder<T: Word>(a: T, b: T, c: T) -> (T, T) {
    let u = a.xor(b);
    (u.xor(c), a.and(b).or(u.and(c)))
}

/// Number of slices needed to hold counts in `0..=n`.
pub fn counter_len(n: usize) -> usize {
    ((usize::BITS - n.leading_zeros()) as usize).max(1)
}

/// Ripples `x` into the counter, one half adder per slice.
/// The counter must be long enough for the final count; overflow is dropped.
#[inline]
pub fn accumulate<T: Word>(counter: &mut [T], x: T) {
    let mut carry = x;
    for slice in counter.iter_mut() {
        let (sum, c) = half_adder(*slice, carry);
        *slice = sum;
        carry = c;
    }
}

/// Adds two inputs at once with a full adder on the lowest slice.
#[inline]
pub fn accumulate_pair<T: Word>(counter: &mut [T], x: T, y: T) {
    let (sum, mut carry) = full_adder(counter[0], x, y);
    counter[0] = sum;
    for slice in counter[1..].iter_mut() {
        let (sum, c) = half_adder(*slice, carry);
        *slice = sum;
        carry = c;
    }
}

/// Lane-wise comparison of the counter with the constant `k`, as `(lt, eq, gt)` masks.
/// `k` must fit in the counter.
pub fn compare_const<T: Word>(counter: &[T], k: usize) -> (T, T, T) {
    debug_assert!(!counter.is_empty());
    debug_assert!(counter.len() >= usize::BITS as usize || k >> counter.len() == 0);
    let splat = |i: usize| T::splat((k >> i) & 1 == 1);
    let mut acc = half_comparator(counter[0], splat(0));
    for i in 1..counter.len() {
        acc = full_comparator(counter[i], splat(i), acc);
    }
    acc
}

/// Reads the count held by one lane of the counter.
pub fn lane_count<T: Word>(counter: &[T], lane: usize) -> usize {
    counter
        .iter()
        .enumerate()
        .map(|(i, slice)| (slice.get_bit(lane) as usize) << i)
        .sum()
}
