//! Transition encoding of a [`Cfa`].
//!
//! A state lives at a cut point and is described by the program counter and
//! the state variables at one SSA index. One *step* moves along a single block
//! to the next cut point or stutters. Predecessor states of the transition
//! relations are at index 1, successor states at index 2, every other index
//! is allocated by an [`IndexAllocator`].

mod partial;
mod total;
mod unroll;

pub use partial::*;
pub use total::*;
pub use unroll::*;

use crate::{
    cfa::{Cfa, Location},
    logic::{Formula, Model, Value, Variable},
};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

pub const PRED: usize = 1;
pub const SUCC: usize = 2;

/// Hands out fresh SSA indices for one encoding pass.
#[derive(Debug, Clone)]
pub struct IndexAllocator {
    next: usize,
}

impl Default for IndexAllocator {
    fn default() -> Self {
        Self { next: SUCC + 1 }
    }
}

impl IndexAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn fresh(&mut self) -> usize {
        self.next += 1;
        self.next - 1
    }
}

fn encode_block(
    cfa: &Cfa,
    block: usize,
    pre: usize,
    post: usize,
    alloc: &mut IndexAllocator,
) -> Formula {
    let block = cfa.block(block);
    let mut parts = Vec::with_capacity(block.edges.len() + 1);
    let mut at = pre;
    for (n, e) in block.edges.iter().enumerate() {
        let to = if n + 1 == block.edges.len() {
            post
        } else {
            alloc.fresh()
        };
        let from = at;
        parts.push(
            cfa.edge(*e)
                .formula
                .rename(&|i| if i == 0 { from } else { to }),
        );
        at = to;
    }
    parts.push(Formula::eq_const(cfa.pc(), post, block.to.id()));
    Formula::and(parts)
}

/// One step from the state at `pre` to the state at `post`. With `from` the
/// predecessor location is known and only its blocks are encoded, otherwise
/// every block is guarded by its source location.
pub fn encode_step(
    cfa: &Cfa,
    pre: usize,
    post: usize,
    from: Option<Location>,
    alloc: &mut IndexAllocator,
) -> Formula {
    let sel = alloc.fresh();
    let selector = cfa.selector();
    let mut choices = Vec::new();
    for b in 0..cfa.num_blocks() {
        let block_from = cfa.block(b).from;
        if from.is_some_and(|l| l != block_from) {
            continue;
        }
        let mut choice = vec![Formula::eq_const(selector, sel, b as u32)];
        if from.is_none() {
            choice.push(Formula::eq_const(cfa.pc(), pre, block_from.id()));
        }
        choice.push(encode_block(cfa, b, pre, post, alloc));
        choices.push(Formula::and(choice));
    }
    choices.push(Formula::and([
        Formula::eq_const(selector, sel, cfa.stutter_code()),
        cfa.frame_condition(pre, post),
    ]));
    Formula::or(choices)
}

/// A state at a cut point.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcreteState {
    pub location: Location,
    pub values: BTreeMap<Variable, Value>,
}

impl ConcreteState {
    pub fn from_model(cfa: &Cfa, model: &Model, index: usize) -> Self {
        let location = Location::new(model.value(&cfa.pc().at(index)).bits());
        let values = cfa
            .variables()
            .iter()
            .map(|v| (v.clone(), model.value(&v.at(index))))
            .collect();
        Self { location, values }
    }

    /// variable assignments as state literals at index 0
    pub fn cube(&self) -> Vec<Formula> {
        self.values
            .iter()
            .map(|(v, val)| Formula::assign(v, 0, *val))
            .collect()
    }

    /// this exact state at `index`
    pub fn formula(&self, cfa: &Cfa, index: usize) -> Formula {
        Formula::and(
            std::iter::once(Formula::eq_const(cfa.pc(), 0, self.location.id()))
                .chain(self.cube())
                .map(|f| f.at(index)),
        )
    }

    #[inline]
    pub fn value(&self, var: &Variable) -> Option<Value> {
        self.values.get(var).copied()
    }
}

impl Display for ConcreteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.location)?;
        for (n, (v, val)) in self.values.iter().enumerate() {
            if n > 0 {
                write!(f, ",")?;
            }
            write!(f, " {v} = {val}")?;
        }
        write!(f, " }}")
    }
}

/// Sequence of cut-point states from an initial state to a state violating
/// the refuted candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counterexample {
    pub states: Vec<ConcreteState>,
}

impl Counterexample {
    pub fn new(states: Vec<ConcreteState>) -> Self {
        Self { states }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&ConcreteState> {
        self.states.last()
    }

    /// Drops stuttering steps.
    pub fn compress(&mut self) {
        self.states.dedup();
    }

    pub fn truncate(&mut self, len: usize) {
        self.states.truncate(len);
    }
}

impl Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.states.iter().enumerate() {
            writeln!(f, "{i}: {s}")?;
        }
        Ok(())
    }
}
