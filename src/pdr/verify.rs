use super::Pdr;
use crate::{
    candidate::CandidateInvariant,
    cfa::Cfa,
    error::{PdrError, Result},
    logic::{Formula, ProverEnvironment, ProverOptions, ProverScope},
    transys::{
        BoundedUnrolling, Counterexample, IndexAllocator, PRED, SUCC, TotalTransitionRelation,
        encode_step,
    },
};
use log::{error, info, warn};

/// Checks that `invariants` hold for the first K steps, are preserved by K
/// steps and exclude the states violating `root`. `external` are invariants
/// established earlier.
pub fn verify_invariant(
    env: &dyn ProverEnvironment,
    cfa: &Cfa,
    ttr: &TotalTransitionRelation,
    external: &[CandidateInvariant],
    invariants: &[CandidateInvariant],
    root: &CandidateInvariant,
) -> Result<bool> {
    let inv = CandidateInvariant::combination(invariants.iter().cloned());
    let mut prover = env.new_prover(ProverOptions::default());
    let mut solver = ProverScope::new(prover.as_mut());
    let unrolling = BoundedUnrolling::new(cfa, ttr.k());
    solver.push(unrolling.formula())?;
    solver.push(&unrolling.violation(&inv))?;
    if !solver.is_unsat()? {
        return Ok(false);
    }
    solver.close()?;

    let mut solver = ProverScope::new(prover.as_mut());
    solver.push(ttr.formula())?;
    solver.push(&Formula::and(external.iter().map(|c| c.formula(PRED))))?;
    solver.push(&ttr.predecessor_assertion(cfa, &inv)?)?;
    if solver.is_unsat_with_assumptions(&[!root.formula(PRED)])? {
        solver.push(&ttr.successor_violation(&inv))?;
        return solver.is_unsat();
    }
    Ok(false)
}

/// Replays `cex` one block at a time from an initial state.
pub fn replay(env: &dyn ProverEnvironment, cfa: &Cfa, cex: &Counterexample) -> Result<bool> {
    let Some(first) = cex.states.first() else {
        return Ok(false);
    };
    let mut prover = env.new_prover(ProverOptions {
        generate_models: false,
        generate_unsat_cores: false,
    });
    let mut solver = ProverScope::new(prover.as_mut());
    solver.push(&Formula::and([
        cfa.initial_states(PRED),
        first.formula(cfa, PRED),
    ]))?;
    if solver.is_unsat()? {
        return Ok(false);
    }
    solver.pop()?;
    for w in cex.states.windows(2) {
        let mut alloc = IndexAllocator::new();
        solver.push(&Formula::and([
            w[0].formula(cfa, PRED),
            encode_step(cfa, PRED, SUCC, Some(w[0].location), &mut alloc),
            w[1].formula(cfa, SUCC),
        ]))?;
        if solver.is_unsat()? {
            return Ok(false);
        }
        solver.pop()?;
    }
    Ok(true)
}

impl Pdr {
    pub(super) fn verify(&mut self, root: &CandidateInvariant) -> Result<()> {
        if !self.cfg.pdr.certify {
            return Ok(());
        }
        let Some(invariants) = self.round.frames.inductive_invariant() else {
            return Err(PdrError::Internal(format!(
                "{root} is confirmed without an empty frame"
            )));
        };
        self.certify(&invariants, root)
    }

    /// Checks `invariants` as a proof of `root` when certification is on.
    pub(super) fn certify(
        &mut self,
        invariants: &[CandidateInvariant],
        root: &CandidateInvariant,
    ) -> Result<()> {
        if !self.cfg.pdr.certify {
            return Ok(());
        }
        let external = self.external_invariants();
        if !verify_invariant(
            self.env.as_ref(),
            &self.cfa,
            &self.round.ttr,
            &external,
            invariants,
            root,
        )? {
            error!("invariant verify failed for {root}");
            return Err(PdrError::Internal(format!(
                "inductive invariant of {root} failed certification"
            )));
        }
        info!(
            "inductive invariant verified with {} lemmas!",
            invariants.len()
        );
        Ok(())
    }

    /// A counterexample must follow concrete blocks of the automaton, one
    /// that does not is dropped with a warning.
    pub(super) fn check_abstraction_free(
        &mut self,
        cex: Counterexample,
    ) -> Result<Option<Counterexample>> {
        if replay(self.env.as_ref(), &self.cfa, &cex)? {
            info!("counterexample replayed with {} states", cex.len());
            Ok(Some(cex))
        } else {
            warn!("counterexample does not replay on the automaton, dropping it");
            Ok(None)
        }
    }
}
