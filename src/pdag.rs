//! The probabilistic directed acyclic graph handed to the core by a model reader.
use crate::{Error, Result, ValidityError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable index of a node in the Pdag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

impl From<u32> for NodeIndex {
    fn from(index: u32) -> Self {
        NodeIndex(index)
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A gate input, possibly complemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub target: NodeIndex,
    pub complement: bool,
}

impl Edge {
    pub fn pos(target: NodeIndex) -> Self {
        Edge {
            target,
            complement: false,
        }
    }
    pub fn neg(target: NodeIndex) -> Self {
        Edge {
            target,
            complement: true,
        }
    }
}

impl From<NodeIndex> for Edge {
    fn from(target: NodeIndex) -> Self {
        Edge::pos(target)
    }
}

impl std::ops::Not for Edge {
    type Output = Edge;
    fn not(self) -> Edge {
        Edge {
            target: self.target,
            complement: !self.complement,
        }
    }
}

/// Gate kinds. Cardinality kinds carry their threshold `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,
    AtLeast(usize),
    AtMost(usize),
    Exactly(usize),
}

impl Connective {
    pub fn threshold(&self) -> Option<usize> {
        match *self {
            Connective::AtLeast(k) | Connective::AtMost(k) | Connective::Exactly(k) => Some(k),
            _ => None,
        }
    }
    /// Checks the declared input count against the kind's arity.
    pub fn check_arity(&self, n_inputs: usize) -> Result<()> {
        match *self {
            Connective::Not if n_inputs != 1 => Err(Error::Logic(format!("NOT takes exactly one input, got {}", n_inputs))),
            Connective::And | Connective::Or | Connective::Xor | Connective::Nand | Connective::Nor if n_inputs == 0 => {
                Err(Error::Logic(format!("{} gate with no inputs", self)))
            }
            Connective::AtLeast(_) | Connective::AtMost(_) | Connective::Exactly(_) if n_inputs == 0 => {
                Err(Error::Logic(format!("{} gate with no inputs", self)))
            }
            Connective::AtLeast(k) | Connective::AtMost(k) | Connective::Exactly(k) if k > n_inputs => Err(
                ValidityError::Domain(format!("{} threshold exceeds its {} inputs", self, n_inputs)).into(),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => write!(f, "AND"),
            Connective::Or => write!(f, "OR"),
            Connective::Not => write!(f, "NOT"),
            Connective::Xor => write!(f, "XOR"),
            Connective::Nand => write!(f, "NAND"),
            Connective::Nor => write!(f, "NOR"),
            Connective::AtLeast(k) => write!(f, "ATLEAST {}", k),
            Connective::AtMost(k) => write!(f, "ATMOST {}", k),
            Connective::Exactly(k) => write!(f, "EXACTLY {}", k),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub index: NodeIndex,
    pub connective: Connective,
    pub inputs: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Basic { index: NodeIndex, probability: f64 },
    House { index: NodeIndex, state: bool },
    Gate(Gate),
}

impl Node {
    pub fn index(&self) -> NodeIndex {
        match self {
            Node::Basic { index, .. } | Node::House { index, .. } => *index,
            Node::Gate(gate) => gate.index,
        }
    }
}

/// What the core consumes from a model reader.
pub trait NodeSupply {
    fn basic_events<'a>(&'a self) -> impl Iterator<Item = (NodeIndex, f64)> + 'a;
    fn house_events<'a>(&'a self) -> impl Iterator<Item = (NodeIndex, bool)> + 'a;
    fn gates<'a>(&'a self) -> impl Iterator<Item = (NodeIndex, Connective, &'a [Edge])> + 'a;
    fn root(&self) -> Option<NodeIndex>;
}

/// Nodes in insertion order. Gates may reference nodes that are added later;
/// references are resolved by the layer compiler.
#[derive(Debug, Clone, Default)]
pub struct Pdag {
    nodes: Vec<Node>,
    positions: HashMap<NodeIndex, usize>,
    root: Option<NodeIndex>,
}

impl Pdag {
    pub fn new() -> Self {
        Pdag::default()
    }

    pub fn from_supply<S: NodeSupply>(supply: &S) -> Result<Self> {
        let mut pdag = Pdag::new();
        for (index, probability) in supply.basic_events() {
            pdag.add_basic_event(index, probability)?;
        }
        for (index, state) in supply.house_events() {
            pdag.add_house_event(index, state)?;
        }
        for (index, connective, inputs) in supply.gates() {
            pdag.add_gate(index, connective, inputs.iter().copied())?;
        }
        if let Some(root) = supply.root() {
            pdag.set_root(root);
        }
        Ok(pdag)
    }

    fn insert(&mut self, node: Node) -> Result<NodeIndex> {
        let index = node.index();
        if self.positions.contains_key(&index) {
            return Err(ValidityError::DuplicateElement(index).into());
        }
        self.positions.insert(index, self.nodes.len());
        self.nodes.push(node);
        Ok(index)
    }

    pub fn add_basic_event(&mut self, index: NodeIndex, probability: f64) -> Result<NodeIndex> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(ValidityError::Domain(format!("probability {} of basic event {} is outside [0, 1]", probability, index)).into());
        }
        self.insert(Node::Basic { index, probability })
    }

    pub fn add_house_event(&mut self, index: NodeIndex, state: bool) -> Result<NodeIndex> {
        self.insert(Node::House { index, state })
    }

    pub fn add_gate<I: IntoIterator<Item = Edge>>(
        &mut self,
        index: NodeIndex,
        connective: Connective,
        inputs: I,
    ) -> Result<NodeIndex> {
        let inputs: Vec<Edge> = inputs.into_iter().collect();
        connective.check_arity(inputs.len()).map_err(|e| match e {
            Error::Logic(msg) => Error::Logic(format!("gate {}: {}", index, msg)),
            e => e,
        })?;
        self.insert(Node::Gate(Gate {
            index,
            connective,
            inputs,
        }))
    }

    pub fn set_root(&mut self, index: NodeIndex) {
        self.root = Some(index);
    }

    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.positions.get(&index).map(|&p| &self.nodes[p])
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        self.positions.contains_key(&index)
    }

    /// Position of the node in insertion order.
    pub fn position(&self, index: NodeIndex) -> Option<usize> {
        self.positions.get(&index).copied()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First index above every index in use.
    pub fn next_index(&self) -> NodeIndex {
        NodeIndex(self.positions.keys().map(|i| i.0 + 1).max().unwrap_or(0))
    }
}

impl NodeSupply for Pdag {
    fn basic_events<'a>(&'a self) -> impl Iterator<Item = (NodeIndex, f64)> + 'a {
        self.nodes.iter().filter_map(|node| match node {
            Node::Basic { index, probability } => Some((*index, *probability)),
            _ => None,
        })
    }
    fn house_events<'a>(&'a self) -> impl Iterator<Item = (NodeIndex, bool)> + 'a {
        self.nodes.iter().filter_map(|node| match node {
            Node::House { index, state } => Some((*index, *state)),
            _ => None,
        })
    }
    fn gates<'a>(&'a self) -> impl Iterator<Item = (NodeIndex, Connective, &'a [Edge])> + 'a {
        self.nodes.iter().filter_map(|node| match node {
            Node::Gate(gate) => Some((gate.index, gate.connective, gate.inputs.as_slice())),
            _ => None,
        })
    }
    fn root(&self) -> Option<NodeIndex> {
        self.root
    }
}
