use super::{IndexAllocator, PRED, SUCC, encode_step};
use crate::{
    candidate::CandidateInvariant,
    cfa::{Cfa, Location},
    error::{PdrError, Result, ensure_arg},
    logic::{Formula, Instance},
};
use log::debug;
use std::collections::BTreeSet;

/// K steps from a state at index [`PRED`] to a state at index [`SUCC`].
#[derive(Clone, Debug)]
pub struct PartialUnrolling {
    pub k: usize,
    pub formula: Formula,
    /// state indices between the predecessor and the successor
    pub intermediates: Vec<usize>,
    /// cut points reachable in at most k steps
    pub end_locations: BTreeSet<Location>,
    /// instances that are neither predecessor nor successor state
    pub inputs: Vec<Instance>,
}

/// Bounded unrolling from one predecessor location, rebuilt lazily whenever
/// the desired depth grows.
#[derive(Clone, Debug)]
pub struct PartialTransitionRelation {
    predecessor: Location,
    desired_k: usize,
    unrolling: Option<PartialUnrolling>,
}

impl PartialTransitionRelation {
    pub fn new(predecessor: Location, k: usize) -> Result<Self> {
        ensure_arg!(k >= 1, "unrolling depth must be positive, got {k}");
        Ok(Self {
            predecessor,
            desired_k: k,
            unrolling: None,
        })
    }

    #[inline]
    pub fn predecessor(&self) -> Location {
        self.predecessor
    }

    #[inline]
    pub fn desired_k(&self) -> usize {
        self.desired_k
    }

    pub fn set_desired_k(&mut self, k: usize) -> Result<()> {
        ensure_arg!(
            k >= self.desired_k,
            "unrolling depth of {} cannot shrink from {} to {k}",
            self.predecessor,
            self.desired_k
        );
        if k != self.desired_k {
            self.desired_k = k;
            self.unrolling = None;
        }
        Ok(())
    }

    /// Unrolls up to the desired depth unless the cached unrolling is current.
    pub fn ensure_k(&mut self, cfa: &Cfa) -> Result<&PartialUnrolling> {
        if self.unrolling.is_none() {
            let unrolling = self.unroll(cfa)?;
            debug!(
                "unrolled {} steps from {}: {} inputs, end locations {:?}",
                unrolling.k,
                self.predecessor,
                unrolling.inputs.len(),
                unrolling.end_locations
            );
            self.unrolling = Some(unrolling);
        }
        self.unrolling()
    }

    pub fn unrolling(&self) -> Result<&PartialUnrolling> {
        self.unrolling.as_ref().ok_or_else(|| {
            PdrError::Internal(format!(
                "transition relation from {} is not unrolled to {}",
                self.predecessor, self.desired_k
            ))
        })
    }

    fn unroll(&self, cfa: &Cfa) -> Result<PartialUnrolling> {
        if !cfa.is_cut_point(self.predecessor) {
            return Err(PdrError::InvalidArgument(format!(
                "{} is not a cut point",
                self.predecessor
            )));
        }
        let k = self.desired_k;
        let mut alloc = IndexAllocator::new();
        let intermediates: Vec<usize> = (1..k).map(|_| alloc.fresh()).collect();
        let states: Vec<usize> = std::iter::once(PRED)
            .chain(intermediates.iter().copied())
            .chain(std::iter::once(SUCC))
            .collect();
        let mut parts = vec![Formula::eq_const(cfa.pc(), PRED, self.predecessor.id())];
        for (n, w) in states.windows(2).enumerate() {
            let from = (n == 0).then_some(self.predecessor);
            parts.push(encode_step(cfa, w[0], w[1], from, &mut alloc));
        }
        let formula = Formula::and(parts);
        let inputs = formula
            .instances()
            .into_iter()
            .filter(|i| i.index != PRED && i.index != SUCC)
            .collect();
        let mut end_locations = BTreeSet::from([self.predecessor]);
        for _ in 0..k {
            let next: BTreeSet<Location> = end_locations
                .iter()
                .flat_map(|l| cfa.blocks_from(*l).iter().map(|b| cfa.block(*b).to))
                .collect();
            end_locations.extend(next);
        }
        Ok(PartialUnrolling {
            k,
            formula,
            intermediates,
            end_locations,
            inputs,
        })
    }

    /// `candidate` at the predecessor and at every intermediate state
    pub fn predecessor_assertion(&self, candidate: &CandidateInvariant) -> Result<Formula> {
        let unrolling = self.unrolling()?;
        Ok(Formula::and(
            std::iter::once(PRED)
                .chain(unrolling.intermediates.iter().copied())
                .map(|i| candidate.formula(i)),
        ))
    }

    /// the successor violates `candidate`
    pub fn successor_violation(&self, candidate: &CandidateInvariant) -> Formula {
        !candidate.formula(SUCC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfa::CfaBuilder,
        logic::{Prover, ProverOptions, SatProver, Variable},
    };

    fn chain() -> Cfa {
        let mut b = CfaBuilder::new();
        let x = b.add_variable(Variable::bool("x"));
        let l0 = b.add_location("entry");
        let l1 = b.add_location("head");
        let l2 = b.add_location("error");
        b.entry(l0).loop_head(l1).target(l2);
        b.assign_edge(l0, l1, &x, Formula::constant(false));
        b.assign_edge(l1, l1, &x, Formula::constant(true));
        b.assume_edge(l1, l2, Formula::var(&x, 0));
        b.build().unwrap()
    }

    #[test]
    fn depth_never_shrinks() {
        let cfa = chain();
        let mut t = PartialTransitionRelation::new(cfa.entry(), 2).unwrap();
        assert!(t.unrolling().is_err());
        assert_eq!(t.ensure_k(&cfa).unwrap().intermediates.len(), 1);
        assert!(matches!(
            t.set_desired_k(1),
            Err(PdrError::InvalidArgument(_))
        ));
        t.set_desired_k(3).unwrap();
        assert!(t.unrolling().is_err());
        assert_eq!(t.ensure_k(&cfa).unwrap().k, 3);
        assert!(PartialTransitionRelation::new(cfa.entry(), 0).is_err());
    }

    #[test]
    fn end_locations_grow_with_depth() {
        let cfa = chain();
        let mut t = PartialTransitionRelation::new(cfa.entry(), 1).unwrap();
        let one = t.ensure_k(&cfa).unwrap().end_locations.clone();
        assert_eq!(one, BTreeSet::from([Location::new(0), Location::new(1)]));
        t.set_desired_k(3).unwrap();
        assert_eq!(t.ensure_k(&cfa).unwrap().end_locations.len(), 3);
    }

    #[test]
    fn error_needs_three_steps() {
        let cfa = chain();
        let safe = CandidateInvariant::target_locations(&cfa);
        for (k, reachable) in [(2, false), (3, true)] {
            let mut t = PartialTransitionRelation::new(cfa.entry(), k).unwrap();
            let mut p = SatProver::new(ProverOptions::default());
            p.push(&t.ensure_k(&cfa).unwrap().formula.clone()).unwrap();
            p.push(&t.successor_violation(&safe)).unwrap();
            assert_eq!(p.is_unsat().unwrap(), !reachable);
        }
    }
}
