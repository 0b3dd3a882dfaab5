use super::Pdr;
use crate::{
    candidate::CandidateInvariant,
    cfa::Cfa,
    error::Result,
    logic::{Prover, ProverScope},
    transys::{BoundedUnrolling, Counterexample},
};
use log::{debug, info};
use std::time::Instant;

/// Looks for a path of at most `steps` steps from the initial states to a
/// state violating `candidate`. The counterexample ends at the first
/// violating state.
pub fn bounded_model_check(
    prover: &mut dyn Prover,
    cfa: &Cfa,
    steps: usize,
    candidate: &CandidateInvariant,
) -> Result<Option<Counterexample>> {
    let unrolling = BoundedUnrolling::new(cfa, steps);
    let mut scope = ProverScope::new(prover);
    scope.push(unrolling.formula())?;
    scope.push(&unrolling.violation(candidate))?;
    if scope.is_unsat()? {
        scope.close()?;
        return Ok(None);
    }
    let model = scope.model()?;
    scope.close()?;
    let mut cex = Counterexample::new(unrolling.states(cfa, &model));
    if let Some(len) = unrolling.violation_prefix(&model, candidate) {
        cex.truncate(len);
    }
    cex.compress();
    Ok(Some(cex))
}

impl Pdr {
    /// Bounded model check of `candidate` on the prover of frame 0.
    pub(super) fn bmc(
        &mut self,
        steps: usize,
        candidate: &CandidateInvariant,
    ) -> Result<Option<Counterexample>> {
        debug!("bmc: {candidate} with {steps} steps");
        let start = Instant::now();
        let prover = self.round.frames.prover(0)?;
        let res = bounded_model_check(prover, &self.cfa, steps, candidate);
        self.statistic.bmc_time += start.elapsed();
        let res = res?;
        if let Some(cex) = &res {
            info!("bmc: {candidate} violated after {} states", cex.len());
        }
        Ok(res)
    }
}
