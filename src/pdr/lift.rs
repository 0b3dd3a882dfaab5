use super::localabs::LocalAbs;
use crate::{
    candidate::CandidateInvariant,
    config::LiftingStrategy,
    error::Result,
    logic::{Formula, Model, Prover, ProverEnvironment, ProverOptions, ProverScope},
    transys::{PRED, TotalTransitionRelation},
};
use log::trace;
use std::collections::BTreeSet;

/// Generalizes the predecessor of a counterexample to induction.
///
/// Everything but the predecessor state is pinned to the values of the
/// counterexample, so every state of a lifted cube takes the same path to
/// the same successor.
pub struct TsLift {
    strategy: LiftingStrategy,
    prover: Box<dyn Prover>,
}

impl TsLift {
    pub fn new(strategy: LiftingStrategy, env: &dyn ProverEnvironment) -> Self {
        Self {
            strategy,
            prover: env.new_prover(ProverOptions {
                generate_models: false,
                generate_unsat_cores: true,
            }),
        }
    }

    #[inline]
    pub fn strategy(&self) -> LiftingStrategy {
        self.strategy
    }

    #[inline]
    pub fn can_lift(&self) -> bool {
        self.strategy.can_lift()
    }

    /// Stops lifting for the rest of the run.
    pub fn disable(&mut self) {
        self.strategy = LiftingStrategy::None;
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.prover.depth()
    }

    /// Literals of `cube` that keep the successor of `model` out of
    /// `candidate`.
    pub fn lift(
        &mut self,
        ttr: &TotalTransitionRelation,
        model: &Model,
        candidate: &CandidateInvariant,
        cube: &[Formula],
        localabs: &LocalAbs,
    ) -> Result<Vec<Formula>> {
        if !self.can_lift() {
            return Ok(cube.to_vec());
        }
        let step = Formula::and([ttr.formula().clone(), ttr.successor_violation(candidate)]);
        let mut instances = BTreeSet::new();
        step.collect_instances(&mut instances);
        let pinned = Formula::and(
            instances
                .into_iter()
                .filter(|i| i.index != PRED || i.var.is_reserved())
                .map(|i| {
                    let value = model.value(&i);
                    Formula::assign(&i.var, i.index, value)
                }),
        );
        let mut scope = ProverScope::new(self.prover.as_mut());
        scope.push(&!step)?;
        scope.push(&pinned)?;
        let mut lifted = None;
        if self.strategy == LiftingStrategy::Abstraction && localabs.is_active() {
            lifted = try_lift(&mut scope, &localabs.abstract_cube(cube))?;
        }
        if lifted.is_none() {
            lifted = try_lift(&mut scope, cube)?;
        }
        scope.close()?;
        let lifted = lifted.unwrap_or_else(|| cube.to_vec());
        trace!("lifted {} of {} literals", lifted.len(), cube.len());
        Ok(lifted)
    }
}

fn try_lift(scope: &mut ProverScope, cube: &[Formula]) -> Result<Option<Vec<Formula>>> {
    let assumptions: Vec<Formula> = cube.iter().map(|l| l.at(PRED)).collect();
    if !scope.is_unsat_with_assumptions(&assumptions)? {
        return Ok(None);
    }
    let core = scope.unsat_assumptions()?;
    Ok(Some(core.into_iter().map(|i| cube[i].clone()).collect()))
}
