//! Gate kernels.
//!
//! Every kernel works on whole words. Complemented inputs are flipped inline while they are read,
//! and cardinality gates count their inputs with a bit-sliced adder ladder.
use crate::bits::Word;
use crate::bitslice::{accumulate, accumulate_pair, compare_const, counter_len};
use crate::buffer::SampleBuffers;
use crate::layers::{CompiledModel, GateLayer, Op};
use rayon::prelude::*;

/// Folds the inputs of words `offset..offset + out.len()` into `out`.
#[inline]
fn reduce<W: Word, F: Fn(W, W) -> W>(identity: W, f: F, positive: &[&[W]], negated: &[&[W]], offset: usize, out: &mut [W]) {
    out.iter_mut().for_each(|o| *o = identity);
    for input in positive.iter() {
        for (o, &x) in out.iter_mut().zip(input[offset..].iter()) {
            *o = f(*o, x);
        }
    }
    for input in negated.iter() {
        for (o, &x) in out.iter_mut().zip(input[offset..].iter()) {
            *o = f(*o, x.not());
        }
    }
}

#[inline]
fn invert<W: Word>(out: &mut [W]) {
    out.iter_mut().for_each(|o| *o = o.not());
}

fn threshold<W: Word>(op: Op, positive: &[&[W]], negated: &[&[W]], offset: usize, out: &mut [W]) {
    let n = positive.len() + negated.len();
    let mut counter = vec![W::zeros(); counter_len(n)];
    for (i, o) in out.iter_mut().enumerate() {
        let w = offset + i;
        counter.iter_mut().for_each(|c| *c = W::zeros());
        let mut values = positive
            .iter()
            .map(|input| input[w])
            .chain(negated.iter().map(|input| input[w].not()));
        while let Some(x) = values.next() {
            match values.next() {
                Some(y) => accumulate_pair(&mut counter, x, y),
                None => accumulate(&mut counter, x),
            }
        }
        let (lt, eq, gt) = compare_const(&counter, op_threshold(op));
        *o = match op {
            Op::AtLeast(_) => lt.not(),
            Op::AtMost(_) => gt.not(),
            _ => eq,
        };
    }
}

fn op_threshold(op: Op) -> usize {
    match op {
        Op::AtLeast(k) | Op::AtMost(k) | Op::Exactly(k) => k,
        _ => 0,
    }
}

/// Computes words `offset..offset + out.len()` of one gate.
pub fn apply<W: Word>(op: Op, positive: &[&[W]], negated: &[&[W]], offset: usize, out: &mut [W]) {
    match op {
        Op::And => reduce(W::ones(), W::and, positive, negated, offset, out),
        Op::Or => reduce(W::zeros(), W::or, positive, negated, offset, out),
        Op::Xor => reduce(W::zeros(), W::xor, positive, negated, offset, out),
        Op::Nand => {
            reduce(W::ones(), W::and, positive, negated, offset, out);
            invert(out);
        }
        Op::Nor | Op::Not => {
            // NOT has a single input, so its OR is the input itself.
            reduce(W::zeros(), W::or, positive, negated, offset, out);
            invert(out);
        }
        Op::AtLeast(_) | Op::AtMost(_) | Op::Exactly(_) => threshold(op, positive, negated, offset, out),
    }
}

/// Evaluates one gate over its whole buffer, batches in parallel.
pub fn evaluate_gate<W: Word>(op: Op, positive: &[&[W]], negated: &[&[W]], out: &mut [W], bitpacks_per_batch: usize) {
    out.par_chunks_mut(bitpacks_per_batch)
        .enumerate()
        .for_each(|(batch, chunk)| apply(op, positive, negated, batch * bitpacks_per_batch, chunk));
}

/// Evaluates every gate of a layer in parallel. Inputs are read from lower slots only.
pub fn evaluate_layer<W: Word>(layer: &GateLayer, buffers: &mut SampleBuffers<W>) {
    let words_per_node = buffers.words_per_node();
    let bitpacks_per_batch = buffers.bitpacks_per_batch();
    let (inputs, outputs) = buffers.split_at_slot_mut(layer.first_slot);
    outputs[..layer.gates.len() * words_per_node]
        .par_chunks_mut(words_per_node)
        .zip(layer.gates.par_iter())
        .for_each(|(out, gate)| {
            let (positive, negated) = layer.inputs_of(gate);
            let positive: Vec<&[W]> = positive.iter().map(|&slot| inputs.node(slot)).collect();
            let negated: Vec<&[W]> = negated.iter().map(|&slot| inputs.node(slot)).collect();
            evaluate_gate(gate.op, &positive, &negated, out, bitpacks_per_batch);
        });
}

/// Runs all gate layers in order; each layer completes before the next starts.
pub fn propagate<W: Word>(model: &CompiledModel, buffers: &mut SampleBuffers<W>) {
    for layer in model.gate_layers.iter() {
        evaluate_layer(layer, buffers);
    }
}
