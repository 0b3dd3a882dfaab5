use super::{ConcreteState, PRED, PartialTransitionRelation, PartialUnrolling, SUCC};
use crate::{
    candidate::CandidateInvariant,
    cfa::{Cfa, Location},
    error::{PdrError, Result},
    logic::{Formula, Model, Value},
};
use std::collections::BTreeMap;

/// The K-step relations of all cut points, selected by `pc@1`.
#[derive(Clone, Debug)]
pub struct TotalTransitionRelation {
    k: usize,
    relations: BTreeMap<Location, PartialTransitionRelation>,
    formula: Formula,
}

impl TotalTransitionRelation {
    pub fn new(cfa: &Cfa, k: usize) -> Result<Self> {
        let mut relations = BTreeMap::new();
        for l in cfa.cut_points() {
            let mut rel = PartialTransitionRelation::new(l, k)?;
            rel.ensure_k(cfa)?;
            relations.insert(l, rel);
        }
        let formula = Self::compose(cfa, &relations)?;
        Ok(Self {
            k,
            relations,
            formula,
        })
    }

    fn compose(
        cfa: &Cfa,
        relations: &BTreeMap<Location, PartialTransitionRelation>,
    ) -> Result<Formula> {
        let mut parts = vec![cfa.at_locations(PRED, relations.keys())];
        for (l, rel) in relations.iter() {
            parts.push(Formula::implies(
                Formula::eq_const(cfa.pc(), PRED, l.id()),
                rel.unrolling()?.formula.clone(),
            ));
        }
        Ok(Formula::and(parts))
    }

    /// Rebuilds every partial relation with depth `k`.
    pub fn adjust_k(mut self, cfa: &Cfa, k: usize) -> Result<Self> {
        for rel in self.relations.values_mut() {
            rel.set_desired_k(k)?;
            rel.ensure_k(cfa)?;
        }
        self.formula = Self::compose(cfa, &self.relations)?;
        self.k = k;
        Ok(self)
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn relations(&self) -> impl Iterator<Item = &PartialTransitionRelation> {
        self.relations.values()
    }

    pub fn relation(&self, predecessor: Location) -> Result<&PartialTransitionRelation> {
        self.relations.get(&predecessor).ok_or_else(|| {
            PdrError::InvalidArgument(format!("no transition relation from {predecessor}"))
        })
    }

    /// `candidate` along the predecessor side of whichever relation is active
    pub fn predecessor_assertion(
        &self,
        cfa: &Cfa,
        candidate: &CandidateInvariant,
    ) -> Result<Formula> {
        let mut parts = vec![candidate.formula(PRED)];
        for (l, rel) in self.relations.iter() {
            if rel.unrolling()?.intermediates.is_empty() {
                continue;
            }
            parts.push(Formula::implies(
                Formula::eq_const(cfa.pc(), PRED, l.id()),
                rel.predecessor_assertion(candidate)?,
            ));
        }
        Ok(Formula::and(parts))
    }

    #[inline]
    pub fn successor_violation(&self, candidate: &CandidateInvariant) -> Formula {
        !candidate.formula(SUCC)
    }

    /// The partial relation the model took, read from `pc@1`.
    pub fn violated_relation(&self, cfa: &Cfa, model: &Model) -> Result<&PartialUnrolling> {
        let Value::Finite(pc) = model.value(&cfa.pc().at(PRED)) else {
            return Err(PdrError::Internal("program counter is not finite".to_string()));
        };
        self.relation(Location::new(pc))?.unrolling()
    }

    /// predecessor state of a model
    #[inline]
    pub fn predecessor_state(&self, cfa: &Cfa, model: &Model) -> ConcreteState {
        ConcreteState::from_model(cfa, model, PRED)
    }

    /// assignments of the inputs of the active relation
    pub fn input_assignments(&self, cfa: &Cfa, model: &Model) -> Result<Vec<Formula>> {
        let rel = self.violated_relation(cfa, model)?;
        Ok(rel
            .inputs
            .iter()
            .map(|i| Formula::assign(&i.var, i.index, model.value(i)))
            .collect())
    }
}
