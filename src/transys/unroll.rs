use super::{ConcreteState, IndexAllocator, encode_step};
use crate::{
    candidate::CandidateInvariant,
    cfa::Cfa,
    logic::{Formula, Model},
};

/// Paths of at most `steps` steps from the initial states.
#[derive(Clone, Debug)]
pub struct BoundedUnrolling {
    formula: Formula,
    states: Vec<usize>,
}

impl BoundedUnrolling {
    pub fn new(cfa: &Cfa, steps: usize) -> Self {
        let mut alloc = IndexAllocator::new();
        let states: Vec<usize> = (0..=steps).map(|_| alloc.fresh()).collect();
        let mut parts = Vec::with_capacity(steps + 1);
        parts.push(cfa.initial_states(states[0]));
        for w in states.windows(2) {
            parts.push(encode_step(cfa, w[0], w[1], None, &mut alloc));
        }
        Self {
            formula: Formula::and(parts),
            states,
        }
    }

    #[inline]
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    #[inline]
    pub fn steps(&self) -> usize {
        self.states.len() - 1
    }

    /// SSA index of the state after `step` steps
    #[inline]
    pub fn state_index(&self, step: usize) -> usize {
        self.states[step]
    }

    /// some state on the path violates `candidate`
    pub fn violation(&self, candidate: &CandidateInvariant) -> Formula {
        Formula::or(self.states.iter().map(|s| !candidate.formula(*s)))
    }

    pub fn states(&self, cfa: &Cfa, model: &Model) -> Vec<ConcreteState> {
        self.states
            .iter()
            .map(|s| ConcreteState::from_model(cfa, model, *s))
            .collect()
    }

    /// number of states up to and including the first one violating `candidate`
    pub fn violation_prefix(
        &self,
        model: &Model,
        candidate: &CandidateInvariant,
    ) -> Option<usize> {
        self.states
            .iter()
            .position(|s| !candidate.formula(*s).eval(model))
            .map(|p| p + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfa::CfaBuilder,
        logic::{Prover, ProverOptions, SatProver, Value, Variable},
    };

    #[test]
    fn counter_reaches_bound() {
        let mut b = CfaBuilder::new();
        let n = b.add_variable(Variable::finite("n", 4));
        let l0 = b.add_location("head");
        b.entry(l0).loop_head(l0);
        b.init(Formula::eq_const(&n, 0, 0));
        for v in 0..3 {
            b.update_edge(
                l0,
                l0,
                Formula::eq_const(&n, 0, v),
                Formula::eq_const(&n, 1, v + 1),
                std::slice::from_ref(&n),
            );
        }
        let cfa = b.build().unwrap();
        let reach3 = CandidateInvariant::global(&cfa, !Formula::eq_const(&n, 0, 3));

        let short = BoundedUnrolling::new(&cfa, 2);
        let mut p = SatProver::new(ProverOptions::default());
        p.push(short.formula()).unwrap();
        p.push(&short.violation(&reach3)).unwrap();
        assert!(p.is_unsat().unwrap());

        let long = BoundedUnrolling::new(&cfa, 3);
        let mut p = SatProver::new(ProverOptions::default());
        p.push(long.formula()).unwrap();
        p.push(&long.violation(&reach3)).unwrap();
        assert!(!p.is_unsat().unwrap());
        let model = p.model().unwrap();
        assert_eq!(long.violation_prefix(&model, &reach3), Some(4));
        let states = long.states(&cfa, &model);
        assert_eq!(states[3].value(&n), Some(Value::Finite(3)));
    }
}
