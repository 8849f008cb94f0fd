//! Sample buffers.
//!
//! One buffer of `batch_size * bitpacks_per_batch` words per slot, all slots in one contiguous block.
//! Slot `s` occupies words `s * words_per_node .. (s + 1) * words_per_node`.
use crate::bits::Word;
use crate::layers::Slot;
use crate::{Error, Result};
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct SampleBuffers<W: Word> {
    words: Vec<W>,
    num_nodes: usize,
    batch_size: usize,
    bitpacks_per_batch: usize,
}

impl<W: Word> SampleBuffers<W> {
    pub fn allocate(num_nodes: usize, batch_size: usize, bitpacks_per_batch: usize) -> Result<Self> {
        if batch_size == 0 || bitpacks_per_batch == 0 {
            return Err(Error::Settings("batch_size and bitpacks_per_batch must be positive".to_string()));
        }
        let len = batch_size
            .checked_mul(bitpacks_per_batch)
            .and_then(|words| words.checked_mul(num_nodes))
            .filter(|&len| len.checked_mul(std::mem::size_of::<W>()).is_some())
            .ok_or_else(|| {
                Error::Settings(format!(
                    "{} buffers of {} x {} words do not fit in memory",
                    num_nodes, batch_size, bitpacks_per_batch
                ))
            })?;
        Ok(SampleBuffers {
            words: vec![W::zeros(); len],
            num_nodes,
            batch_size,
            bitpacks_per_batch,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
    pub fn bitpacks_per_batch(&self) -> usize {
        self.bitpacks_per_batch
    }
    pub fn words_per_node(&self) -> usize {
        self.batch_size * self.bitpacks_per_batch
    }
    /// Trials represented by one buffer.
    pub fn trials_per_iteration(&self) -> u64 {
        (self.words_per_node() * W::BITS) as u64
    }
    pub fn size_in_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<W>()
    }

    fn words_of(&self, slots: Range<Slot>) -> Range<usize> {
        slots.start * self.words_per_node()..slots.end * self.words_per_node()
    }

    pub fn node(&self, slot: Slot) -> &[W] {
        let range = self.words_of(slot..slot + 1);
        &self.words[range]
    }

    pub fn node_mut(&mut self, slot: Slot) -> &mut [W] {
        let range = self.words_of(slot..slot + 1);
        &mut self.words[range]
    }

    /// The buffers of a contiguous range of slots.
    pub fn nodes_mut(&mut self, slots: Range<Slot>) -> &mut [W] {
        let range = self.words_of(slots);
        &mut self.words[range]
    }

    /// Splits at `slot`: read access below it, write access from it on.
    pub fn split_at_slot_mut(&mut self, slot: Slot) -> (BufferView<'_, W>, &mut [W]) {
        let words_per_node = self.words_per_node();
        let (lower, upper) = self.words.split_at_mut(slot * words_per_node);
        (
            BufferView {
                words: lower,
                words_per_node,
            },
            upper,
        )
    }

    pub fn view(&self) -> BufferView<'_, W> {
        BufferView {
            words: &self.words,
            words_per_node: self.words_per_node(),
        }
    }
}

/// Read-only access to the buffers of a prefix of slots.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a, W: Word> {
    words: &'a [W],
    words_per_node: usize,
}

impl<'a, W: Word> BufferView<'a, W> {
    pub fn node(&self, slot: Slot) -> &'a [W] {
        &self.words[slot * self.words_per_node..(slot + 1) * self.words_per_node]
    }
    pub fn num_nodes(&self) -> usize {
        self.words.len() / self.words_per_node
    }
}
