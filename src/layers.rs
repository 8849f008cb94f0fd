//! Layer compiler.
//!
//! Stratifies a [`Pdag`] into levels where every gate reads only from strictly lower levels,
//! and flattens each level into contiguous fragments that refer to sample buffers by slot.
//! Slots are dense: basic events first in Pdag order, then each gate level in turn, gates of a
//! level in Pdag order. House events are folded into their consumers and never get a slot;
//! neither does any gate that folds to a constant.
use crate::pdag::{Connective, Node, NodeIndex, Pdag};
use crate::{Error, Result, ValidityError};
use log::{debug, trace};
use std::collections::{HashMap, VecDeque};
use std::ops::Range;

/// Index of a sample buffer.
pub type Slot = usize;

/// What a node evaluates to after compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Constant(bool),
    Slot(Slot),
}

/// Gate kernels. All inputs are read through the fused complement,
/// cardinality thresholds are the folded ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    And,
    Or,
    Xor,
    Not,
    Nand,
    Nor,
    AtLeast(usize),
    AtMost(usize),
    Exactly(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateFragment {
    pub node: NodeIndex,
    pub op: Op,
    pub inputs_start: usize,
    pub inputs_len: usize,
    /// Inputs before this offset are read as is, the rest complemented.
    pub negated_inputs_offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicEventLayer {
    pub nodes: Vec<NodeIndex>,
    /// Parallel to `nodes`, indexes `CompiledModel::probabilities`.
    pub probability_index: Vec<usize>,
}

impl BasicEventLayer {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateLayer {
    pub level: usize,
    pub first_slot: Slot,
    pub gates: Vec<GateFragment>,
    /// Flat input slots, addressed by `GateFragment::inputs_start` and `inputs_len`.
    pub inputs: Vec<Slot>,
}

impl GateLayer {
    pub fn slots(&self) -> Range<Slot> {
        self.first_slot..self.first_slot + self.gates.len()
    }
    /// The (positive, complemented) input slots of a gate of this layer.
    pub fn inputs_of(&self, gate: &GateFragment) -> (&[Slot], &[Slot]) {
        let inputs = &self.inputs[gate.inputs_start..gate.inputs_start + gate.inputs_len];
        inputs.split_at(gate.negated_inputs_offset)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub basic: BasicEventLayer,
    pub probabilities: Vec<f64>,
    pub gate_layers: Vec<GateLayer>,
    pub root: NodeIndex,
    operands: HashMap<NodeIndex, Operand>,
    num_slots: usize,
    folded: usize,
}

#[derive(Debug, Clone, Copy)]
enum Input {
    Constant(bool),
    Node(NodeIndex, bool),
}

#[derive(Debug, Clone)]
enum Folded {
    Constant(bool),
    Gate {
        op: Op,
        inputs: Vec<(NodeIndex, bool)>,
    },
}

/// Folds constant inputs into the connective and specializes cardinality gates.
fn fold(connective: Connective, inputs: &[Input]) -> Folded {
    let trues = inputs.iter().filter(|i| matches!(i, Input::Constant(true))).count();
    let falses = inputs.iter().filter(|i| matches!(i, Input::Constant(false))).count();
    let mut vars: Vec<(NodeIndex, bool)> = inputs
        .iter()
        .filter_map(|i| match *i {
            Input::Node(node, complement) => Some((node, complement)),
            Input::Constant(_) => None,
        })
        .collect();
    let n = vars.len();
    let gate = |op: Op, inputs: Vec<(NodeIndex, bool)>| Folded::Gate { op, inputs };
    match connective {
        Connective::And | Connective::Nand => {
            let negate = connective == Connective::Nand;
            if falses > 0 {
                Folded::Constant(negate)
            } else if n == 0 {
                Folded::Constant(!negate)
            } else {
                gate(if negate { Op::Nand } else { Op::And }, vars)
            }
        }
        Connective::Or | Connective::Nor => {
            let negate = connective == Connective::Nor;
            if trues > 0 {
                Folded::Constant(!negate)
            } else if n == 0 {
                Folded::Constant(negate)
            } else {
                gate(if negate { Op::Nor } else { Op::Or }, vars)
            }
        }
        Connective::Xor => {
            let parity = trues % 2 == 1;
            if n == 0 {
                Folded::Constant(parity)
            } else {
                if parity {
                    vars[0].1 = !vars[0].1;
                }
                gate(Op::Xor, vars)
            }
        }
        Connective::Not => match inputs.first() {
            Some(Input::Constant(state)) => Folded::Constant(!state),
            _ => gate(Op::Not, vars),
        },
        Connective::AtLeast(k) => {
            if trues >= k {
                return Folded::Constant(true);
            }
            let k = k - trues;
            if k > n {
                Folded::Constant(false)
            } else if k == 1 {
                gate(Op::Or, vars)
            } else if k == n {
                gate(Op::And, vars)
            } else {
                gate(Op::AtLeast(k), vars)
            }
        }
        Connective::AtMost(k) => {
            if trues > k {
                return Folded::Constant(false);
            }
            let k = k - trues;
            if k >= n {
                Folded::Constant(true)
            } else if k == 0 {
                gate(Op::Nor, vars)
            } else if k + 1 == n {
                gate(Op::Nand, vars)
            } else {
                gate(Op::AtMost(k), vars)
            }
        }
        Connective::Exactly(k) => {
            if trues > k {
                return Folded::Constant(false);
            }
            let k = k - trues;
            if k > n {
                Folded::Constant(false)
            } else if n == 0 {
                Folded::Constant(true)
            } else if k == 0 {
                gate(Op::Nor, vars)
            } else if k == n {
                gate(Op::And, vars)
            } else {
                gate(Op::Exactly(k), vars)
            }
        }
    }
}

impl CompiledModel {
    pub fn compile(pdag: &Pdag) -> Result<Self> {
        let root = pdag
            .root()
            .ok_or_else(|| Error::Logic("the model has no root".to_string()))?;
        if !pdag.contains(root) {
            return Err(ValidityError::UndefinedElement {
                referrer: None,
                missing: root,
            }
            .into());
        }

        // Consumers of every gate, and the number of gate inputs each gate still waits on.
        let mut consumers: HashMap<NodeIndex, Vec<usize>> = HashMap::new();
        let mut waiting: Vec<usize> = vec![0; pdag.len()];
        for (position, node) in pdag.nodes().iter().enumerate() {
            if let Node::Gate(gate) = node {
                for edge in gate.inputs.iter() {
                    match pdag.node(edge.target) {
                        None => {
                            return Err(ValidityError::UndefinedElement {
                                referrer: Some(gate.index),
                                missing: edge.target,
                            }
                            .into())
                        }
                        Some(Node::Gate(_)) => {
                            consumers.entry(edge.target).or_default().push(position);
                            waiting[position] += 1;
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        // Per node: None for constants, Some(level) otherwise.
        let mut levels: HashMap<NodeIndex, Option<usize>> = HashMap::new();
        let mut constants: HashMap<NodeIndex, bool> = HashMap::new();
        let mut planned: HashMap<NodeIndex, (Op, Vec<(NodeIndex, bool)>)> = HashMap::new();
        let mut ready: VecDeque<usize> = VecDeque::new();
        for (position, node) in pdag.nodes().iter().enumerate() {
            match node {
                Node::Basic { index, .. } => {
                    levels.insert(*index, Some(0));
                }
                Node::House { index, state } => {
                    levels.insert(*index, None);
                    constants.insert(*index, *state);
                }
                Node::Gate(_) if waiting[position] == 0 => ready.push_back(position),
                Node::Gate(_) => {}
            }
        }

        let mut resolved_gates = 0;
        while let Some(position) = ready.pop_front() {
            let gate = match &pdag.nodes()[position] {
                Node::Gate(gate) => gate,
                _ => continue,
            };
            let inputs: Vec<Input> = gate
                .inputs
                .iter()
                .map(|edge| match constants.get(&edge.target) {
                    Some(&state) => Input::Constant(state ^ edge.complement),
                    None => Input::Node(edge.target, edge.complement),
                })
                .collect();
            match fold(gate.connective, &inputs) {
                Folded::Constant(state) => {
                    trace!("gate {} ({}) folds to {}", gate.index, gate.connective, state);
                    levels.insert(gate.index, None);
                    constants.insert(gate.index, state);
                }
                Folded::Gate { op, inputs } => {
                    let level = 1 + inputs
                        .iter()
                        .filter_map(|(node, _)| levels.get(node).copied().flatten())
                        .max()
                        .unwrap_or(0);
                    levels.insert(gate.index, Some(level));
                    planned.insert(gate.index, (op, inputs));
                }
            }
            resolved_gates += 1;
            if let Some(list) = consumers.get(&gate.index) {
                for &consumer in list.iter() {
                    waiting[consumer] -= 1;
                    if waiting[consumer] == 0 {
                        ready.push_back(consumer);
                    }
                }
            }
        }

        let n_gates = pdag.nodes().iter().filter(|n| matches!(n, Node::Gate(_))).count();
        if resolved_gates < n_gates {
            let mut cycle: Vec<NodeIndex> = pdag
                .nodes()
                .iter()
                .filter(|n| matches!(n, Node::Gate(_)) && !levels.contains_key(&n.index()))
                .map(|n| n.index())
                .collect();
            cycle.sort();
            return Err(ValidityError::Cycle(cycle).into());
        }

        let mut operands: HashMap<NodeIndex, Operand> = constants
            .iter()
            .map(|(&node, &state)| (node, Operand::Constant(state)))
            .collect();

        let mut basic = BasicEventLayer::default();
        let mut probabilities = Vec::new();
        for node in pdag.nodes().iter() {
            if let Node::Basic { index, probability } = node {
                operands.insert(*index, Operand::Slot(basic.nodes.len()));
                basic.probability_index.push(probabilities.len());
                basic.nodes.push(*index);
                probabilities.push(*probability);
            }
        }

        let max_level = levels.values().filter_map(|l| *l).max().unwrap_or(0);
        let mut buckets: Vec<Vec<NodeIndex>> = vec![Vec::new(); max_level + 1];
        for node in pdag.nodes().iter() {
            if !planned.contains_key(&node.index()) {
                continue;
            }
            if let Some(Some(level)) = levels.get(&node.index()) {
                buckets[*level].push(node.index());
            }
        }

        let mut next_slot = basic.nodes.len();
        let mut gate_layers = Vec::with_capacity(max_level);
        for (level, bucket) in buckets.iter().enumerate().skip(1) {
            if bucket.is_empty() {
                continue;
            }
            let mut layer = GateLayer {
                level,
                first_slot: next_slot,
                gates: Vec::with_capacity(bucket.len()),
                inputs: Vec::new(),
            };
            for &index in bucket.iter() {
                operands.insert(index, Operand::Slot(next_slot));
                next_slot += 1;
            }
            for &index in bucket.iter() {
                let (op, inputs) = &planned[&index];
                let inputs_start = layer.inputs.len();
                for complement in [false, true].iter() {
                    for (input, _) in inputs.iter().filter(|(_, c)| c == complement) {
                        match operands.get(input) {
                            Some(Operand::Slot(slot)) if *slot < layer.first_slot => layer.inputs.push(*slot),
                            _ => {
                                return Err(Error::Logic(format!(
                                    "malformed layer {}: gate {} reads {} from the same or a later level",
                                    level, index, input
                                )))
                            }
                        }
                    }
                }
                let negated_inputs_offset = inputs.iter().filter(|(_, c)| !c).count();
                layer.gates.push(GateFragment {
                    node: index,
                    op: *op,
                    inputs_start,
                    inputs_len: inputs.len(),
                    negated_inputs_offset,
                });
            }
            gate_layers.push(layer);
        }

        let folded = constants.len() - pdag.nodes().iter().filter(|n| matches!(n, Node::House { .. })).count();
        debug!(
            "compiled {} nodes: {} basic events, {} gates in {} layers, {} gates folded to constants",
            pdag.len(),
            basic.len(),
            next_slot - basic.len(),
            gate_layers.len(),
            folded
        );

        Ok(CompiledModel {
            basic,
            probabilities,
            gate_layers,
            root,
            operands,
            num_slots: next_slot,
            folded,
        })
    }

    pub fn operand(&self, node: NodeIndex) -> Option<Operand> {
        self.operands.get(&node).copied()
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Gates that folded to a constant.
    pub fn num_folded(&self) -> usize {
        self.folded
    }

    pub fn num_gates(&self) -> usize {
        self.gate_layers.iter().map(|l| l.gates.len()).sum()
    }

    /// The layer and fragment computing `node`.
    pub fn fragment(&self, node: NodeIndex) -> Option<(&GateLayer, &GateFragment)> {
        self.gate_layers
            .iter()
            .find_map(|layer| layer.gates.iter().find(|g| g.node == node).map(|g| (layer, g)))
    }
}

#[cfg(test)]
mod tests {
    use super::{CompiledModel, Op, Operand};
    use crate::pdag::NodeIndex as N;
    use crate::pdag::{Connective, Edge, Pdag};
    use crate::{Error, ValidityError};
    use test_log::test;

    fn layered_tree() -> Pdag {
        let mut pdag = Pdag::new();
        for (i, p) in [0.2, 0.4, 0.6, 0.5].iter().enumerate() {
            pdag.add_basic_event(N(i as u32), *p).unwrap();
        }
        pdag.add_gate(N(4), Connective::And, vec![Edge::pos(N(0)), Edge::pos(N(1))]).unwrap();
        pdag.add_gate(N(5), Connective::Or, vec![Edge::pos(N(4)), Edge::neg(N(2))]).unwrap();
        pdag.add_gate(N(6), Connective::Nand, vec![Edge::pos(N(5)), Edge::pos(N(3))]).unwrap();
        pdag.set_root(N(6));
        pdag
    }

    #[test]
    fn levels_and_slots() {
        let model = CompiledModel::compile(&layered_tree()).unwrap();
        assert_eq!(model.basic.nodes, vec![N(0), N(1), N(2), N(3)]);
        assert_eq!(model.basic.probability_index, vec![0, 1, 2, 3]);
        assert_eq!(model.gate_layers.len(), 3);
        assert_eq!(model.num_slots(), 7);
        for (i, layer) in model.gate_layers.iter().enumerate() {
            assert_eq!(layer.level, i + 1);
            assert_eq!(layer.first_slot, 4 + i);
        }
        assert_eq!(model.operand(N(6)), Some(Operand::Slot(6)));

        let (layer, g2) = model.fragment(N(5)).unwrap();
        assert_eq!(g2.op, Op::Or);
        assert_eq!(g2.negated_inputs_offset, 1);
        let (positive, negated) = layer.inputs_of(g2);
        assert_eq!(positive, &[4]);
        assert_eq!(negated, &[2]);
    }

    #[test]
    fn inputs_always_in_lower_layers() {
        let mut pdag = Pdag::new();
        // Gates reference each other out of insertion order.
        pdag.add_gate(N(10), Connective::Or, vec![Edge::pos(N(11)), Edge::pos(N(12))]).unwrap();
        pdag.add_gate(N(11), Connective::And, vec![Edge::pos(N(12)), Edge::pos(N(0))]).unwrap();
        pdag.add_gate(N(12), Connective::Xor, vec![Edge::pos(N(0)), Edge::neg(N(1))]).unwrap();
        pdag.add_basic_event(N(0), 0.1).unwrap();
        pdag.add_basic_event(N(1), 0.9).unwrap();
        pdag.set_root(N(10));
        let model = CompiledModel::compile(&pdag).unwrap();
        assert_eq!(model.gate_layers.len(), 3);
        for layer in model.gate_layers.iter() {
            for gate in layer.gates.iter() {
                let (positive, negated) = layer.inputs_of(gate);
                assert!(positive.iter().chain(negated.iter()).all(|&s| s < layer.first_slot));
            }
        }
    }

    #[test]
    fn same_level_buckets_follow_pdag_order() {
        let mut pdag = Pdag::new();
        pdag.add_basic_event(N(0), 0.5).unwrap();
        pdag.add_basic_event(N(1), 0.5).unwrap();
        pdag.add_gate(N(9), Connective::Or, vec![Edge::pos(N(0)), Edge::pos(N(1))]).unwrap();
        pdag.add_gate(N(3), Connective::And, vec![Edge::pos(N(0)), Edge::pos(N(1))]).unwrap();
        pdag.add_gate(N(4), Connective::Or, vec![Edge::pos(N(9)), Edge::pos(N(3))]).unwrap();
        pdag.set_root(N(4));
        let model = CompiledModel::compile(&pdag).unwrap();
        let nodes: Vec<_> = model.gate_layers[0].gates.iter().map(|g| g.node).collect();
        assert_eq!(nodes, vec![N(9), N(3)]);
        assert_eq!(model.operand(N(9)), Some(Operand::Slot(2)));
        assert_eq!(model.operand(N(3)), Some(Operand::Slot(3)));
    }

    #[test]
    fn cycle_is_reported() {
        let mut pdag = Pdag::new();
        pdag.add_basic_event(N(0), 0.5).unwrap();
        pdag.add_gate(N(1), Connective::And, vec![Edge::pos(N(0)), Edge::pos(N(2))]).unwrap();
        pdag.add_gate(N(2), Connective::Or, vec![Edge::pos(N(0)), Edge::pos(N(1))]).unwrap();
        pdag.add_gate(N(3), Connective::Not, vec![Edge::pos(N(0))]).unwrap();
        pdag.set_root(N(3));
        match CompiledModel::compile(&pdag) {
            Err(Error::Validity(ValidityError::Cycle(nodes))) => assert_eq!(nodes, vec![N(1), N(2)]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn undefined_elements() {
        let mut pdag = Pdag::new();
        pdag.add_basic_event(N(0), 0.5).unwrap();
        pdag.add_gate(N(1), Connective::And, vec![Edge::pos(N(0)), Edge::pos(N(7))]).unwrap();
        pdag.set_root(N(1));
        match CompiledModel::compile(&pdag) {
            Err(Error::Validity(ValidityError::UndefinedElement { referrer, missing })) => {
                assert_eq!(referrer, Some(N(1)));
                assert_eq!(missing, N(7));
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut pdag = Pdag::new();
        pdag.add_basic_event(N(0), 0.5).unwrap();
        pdag.set_root(N(3));
        assert!(matches!(
            CompiledModel::compile(&pdag),
            Err(Error::Validity(ValidityError::UndefinedElement { referrer: None, .. }))
        ));

        let pdag = Pdag::new();
        assert!(matches!(CompiledModel::compile(&pdag), Err(Error::Logic(_))));
    }

    fn single_gate(connective: Connective, n_basic: u32, houses: &[bool]) -> CompiledModel {
        let mut pdag = Pdag::new();
        let mut inputs = Vec::new();
        for i in 0..n_basic {
            pdag.add_basic_event(N(i), 0.5).unwrap();
            inputs.push(Edge::pos(N(i)));
        }
        for (j, state) in houses.iter().enumerate() {
            let index = N(100 + j as u32);
            pdag.add_house_event(index, *state).unwrap();
            inputs.push(Edge::pos(index));
        }
        pdag.add_gate(N(50), connective, inputs).unwrap();
        pdag.set_root(N(50));
        CompiledModel::compile(&pdag).unwrap()
    }

    fn root_op(model: &CompiledModel) -> Option<Op> {
        model.fragment(model.root).map(|(_, g)| g.op)
    }

    #[test]
    fn cardinality_specialization() {
        assert_eq!(root_op(&single_gate(Connective::AtLeast(1), 4, &[])), Some(Op::Or));
        assert_eq!(root_op(&single_gate(Connective::AtLeast(4), 4, &[])), Some(Op::And));
        assert_eq!(root_op(&single_gate(Connective::AtLeast(2), 4, &[])), Some(Op::AtLeast(2)));
        assert_eq!(root_op(&single_gate(Connective::AtMost(0), 4, &[])), Some(Op::Nor));
        assert_eq!(root_op(&single_gate(Connective::AtMost(3), 4, &[])), Some(Op::Nand));
        assert_eq!(root_op(&single_gate(Connective::AtMost(2), 4, &[])), Some(Op::AtMost(2)));
        assert_eq!(root_op(&single_gate(Connective::Exactly(0), 4, &[])), Some(Op::Nor));
        assert_eq!(root_op(&single_gate(Connective::Exactly(4), 4, &[])), Some(Op::And));
        assert_eq!(root_op(&single_gate(Connective::Exactly(2), 4, &[])), Some(Op::Exactly(2)));

        let model = single_gate(Connective::AtLeast(0), 3, &[]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(true)));
        let model = single_gate(Connective::AtMost(3), 3, &[]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(true)));
    }

    #[test]
    fn house_events_fold() {
        let model = single_gate(Connective::And, 2, &[false]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(false)));
        assert!(model.gate_layers.is_empty());
        assert_eq!(model.num_folded(), 1);

        let model = single_gate(Connective::And, 2, &[true]);
        let (layer, gate) = model.fragment(model.root).unwrap();
        assert_eq!(gate.op, Op::And);
        assert_eq!(layer.inputs_of(gate).0.len(), 2);

        let model = single_gate(Connective::Or, 2, &[true]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(true)));
        let model = single_gate(Connective::Nor, 0, &[false, false]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(true)));

        // Two trues leave ATLEAST 3 of 4 as ATLEAST 1 of the two remaining inputs.
        let model = single_gate(Connective::AtLeast(3), 2, &[true, true]);
        assert_eq!(root_op(&model), Some(Op::Or));
        let model = single_gate(Connective::AtLeast(3), 2, &[false, false]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(false)));
        let model = single_gate(Connective::AtMost(1), 2, &[true, true]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(false)));
        let model = single_gate(Connective::Exactly(2), 2, &[true]);
        assert_eq!(root_op(&model), Some(Op::Exactly(1)));
    }

    #[test]
    fn xor_absorbs_true_as_complement() {
        let model = single_gate(Connective::Xor, 2, &[true]);
        let (layer, gate) = model.fragment(model.root).unwrap();
        assert_eq!(gate.op, Op::Xor);
        let (positive, negated) = layer.inputs_of(gate);
        assert_eq!(positive, &[1]);
        assert_eq!(negated, &[0]);

        let model = single_gate(Connective::Xor, 0, &[true, true, true]);
        assert_eq!(model.operand(model.root), Some(Operand::Constant(true)));
    }

    #[test]
    fn constants_propagate_through_levels() {
        let mut pdag = Pdag::new();
        pdag.add_basic_event(N(0), 0.5).unwrap();
        pdag.add_house_event(N(1), true).unwrap();
        pdag.add_gate(N(2), Connective::Not, vec![Edge::pos(N(1))]).unwrap();
        pdag.add_gate(N(3), Connective::Or, vec![Edge::pos(N(0)), Edge::neg(N(2))]).unwrap();
        pdag.add_gate(N(4), Connective::And, vec![Edge::pos(N(0)), Edge::pos(N(2))]).unwrap();
        pdag.set_root(N(3));
        let model = CompiledModel::compile(&pdag).unwrap();
        assert_eq!(model.operand(N(2)), Some(Operand::Constant(false)));
        assert_eq!(model.operand(N(3)), Some(Operand::Constant(true)));
        assert_eq!(model.operand(N(4)), Some(Operand::Constant(false)));
        assert_eq!(model.num_slots(), 1);
        assert_eq!(model.num_folded(), 3);
    }
}
