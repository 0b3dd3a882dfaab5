use super::{lift::TsLift, localabs::LocalAbs};
use crate::{
    candidate::CandidateInvariant,
    cfa::{Cfa, Location},
    config::InvariantStrengthening,
    error::Result,
    logic::{Formula, Prover, ProverScope},
    transys::{ConcreteState, PRED, SUCC, TotalTransitionRelation},
};
use log::trace;

/// What an induction check needs besides the prover and the candidate.
pub struct InductionContext<'a> {
    pub cfa: &'a Cfa,
    pub ttr: &'a TotalTransitionRelation,
    pub strengthening: InvariantStrengthening,
    pub lift: &'a mut TsLift,
    pub localabs: &'a LocalAbs,
}

#[derive(Debug)]
pub enum InductionResult {
    /// the candidate, or a stronger clause, is inductive relative to the
    /// predecessor invariants
    Success { invariant: CandidateInvariant },
    Failure {
        /// blocking clauses of the generalized predecessor states
        bad_state_blocking_clauses: Vec<CandidateInvariant>,
        /// the lifted states when abstraction dropped literals, the
        /// predecessor state when only lifting did
        concrete_cti: Option<CandidateInvariant>,
        predecessor: ConcreteState,
        k: usize,
    },
}

impl InductionResult {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, InductionResult::Success { .. })
    }
}

/// Checks whether `candidate` holds after K steps from states satisfying the
/// predecessor invariants on which `candidate` held along the way.
///
/// Every scope opened on `prover` is closed again before returning.
pub fn check_induction(
    prover: &mut dyn Prover,
    predecessor_invariants: &[CandidateInvariant],
    ctx: &mut InductionContext,
    candidate: &CandidateInvariant,
) -> Result<InductionResult> {
    let (cfa, ttr) = (ctx.cfa, ctx.ttr);
    let mut scope = ProverScope::new(prover);
    scope.push(ttr.formula())?;
    scope.push(&Formula::and(
        predecessor_invariants.iter().map(|c| c.formula(PRED)),
    ))?;
    scope.push(&ttr.predecessor_assertion(cfa, candidate)?)?;
    scope.push(&ttr.successor_violation(candidate))?;
    if scope.is_unsat()? {
        scope.pop()?;
        let invariant = match ctx.strengthening {
            InvariantStrengthening::None => candidate.clone(),
            InvariantStrengthening::UnsatCore => strengthen(&mut scope, cfa, candidate)?,
        };
        scope.close()?;
        return Ok(InductionResult::Success { invariant });
    }
    let model = scope.model()?;
    scope.close()?;
    let predecessor = ttr.predecessor_state(cfa, &model);
    let k = ttr.violated_relation(cfa, &model)?.k;
    let cube = predecessor.cube();
    let lifted = ctx.lift.lift(ttr, &model, candidate, &cube, ctx.localabs)?;
    let generalized = ctx.localabs.abstract_cube(&lifted);
    trace!(
        "cti at {}: {} literals, lifted {}, abstract {}",
        predecessor.location,
        cube.len(),
        lifted.len(),
        generalized.len()
    );
    // abstraction failures are refined with the lifted states
    let concrete = if generalized.len() != lifted.len() {
        lifted
    } else {
        cube
    };
    let blocking = CandidateInvariant::clause(cfa, predecessor.location, generalized);
    let concrete = CandidateInvariant::clause(cfa, predecessor.location, concrete);
    let concrete_cti = (blocking != concrete).then_some(concrete);
    Ok(InductionResult::Failure {
        bad_state_blocking_clauses: vec![blocking],
        concrete_cti,
        predecessor,
        k,
    })
}

/// Whether `candidate` is preserved by K steps from every state satisfying it
/// and `invariants`, without strengthening.
pub fn is_inductive(
    prover: &mut dyn Prover,
    invariants: &[CandidateInvariant],
    cfa: &Cfa,
    ttr: &TotalTransitionRelation,
    candidate: &CandidateInvariant,
) -> Result<bool> {
    let mut scope = ProverScope::new(prover);
    scope.push(ttr.formula())?;
    scope.push(&Formula::and(invariants.iter().map(|c| c.formula(PRED))))?;
    scope.push(&ttr.predecessor_assertion(cfa, candidate)?)?;
    scope.push(&ttr.successor_violation(candidate))?;
    let res = scope.is_unsat()?;
    scope.close()?;
    Ok(res)
}

/// Drops the literals of a clause candidate that are not needed to keep the
/// successor out of its states. The reduced clause must not exclude an
/// initial state, otherwise the candidate is kept.
fn strengthen(
    scope: &mut ProverScope,
    cfa: &Cfa,
    candidate: &CandidateInvariant,
) -> Result<CandidateInvariant> {
    let Some((location, cube)) = candidate.as_clause() else {
        return Ok(candidate.clone());
    };
    let mut assumptions = vec![Formula::eq_const(cfa.pc(), SUCC, location.id())];
    assumptions.extend(cube.iter().map(|l| l.at(SUCC)));
    if !scope.is_unsat_with_assumptions(&assumptions)? {
        return Ok(candidate.clone());
    }
    let reduced: Vec<Formula> = scope
        .unsat_assumptions()?
        .into_iter()
        .filter(|i| *i > 0)
        .map(|i| cube[i - 1].clone())
        .collect();
    if reduced.len() == cube.len() {
        return Ok(candidate.clone());
    }
    if intersects_initial(scope, cfa, location, &reduced)? {
        trace!("strengthened clause intersects the initial states");
        return Ok(candidate.clone());
    }
    Ok(CandidateInvariant::clause(cfa, location, reduced))
}

fn intersects_initial(
    scope: &mut ProverScope,
    cfa: &Cfa,
    location: Location,
    cube: &[Formula],
) -> Result<bool> {
    let mut assumptions = vec![
        cfa.initial_states(PRED),
        Formula::eq_const(cfa.pc(), PRED, location.id()),
    ];
    assumptions.extend(cube.iter().map(|l| l.at(PRED)));
    Ok(!scope.is_unsat_with_assumptions(&assumptions)?)
}
