//! Property directed reachability over the K-step transition relation of a
//! [`Cfa`].

mod block;
mod bmc;
mod frame;
mod induction;
mod lift;
mod localabs;
mod proofoblig;
mod propagate;
mod statistic;
mod verify;

pub use bmc::bounded_model_check;
pub use frame::{Frame, FrameSet};
pub use induction::{InductionContext, InductionResult, check_induction, is_inductive};
pub use lift::TsLift;
pub use localabs::LocalAbs;
pub use proofoblig::{ObligationKind, ProofObligation, ProofObligationQueue};
pub use verify::{replay, verify_invariant};

use crate::{
    Engine,
    candidate::{CandidateGenerator, CandidateInvariant},
    cfa::Cfa,
    config::{AdjustConditions, Config, InvariantStrengthening},
    error::Result,
    logic::{ProverEnvironment, SatProverEnvironment},
    shutdown::ShutdownNotifier,
    transys::{Counterexample, TotalTransitionRelation},
};
use giputils::logger::IntervalLogger;
use log::{Level, debug, info, warn};
use statistic::Statistic;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmStatus {
    SoundAndPrecise,
    UnsoundAndPrecise,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// every primary target candidate is confirmed
    Safe,
    Unsafe(Counterexample),
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdrResult {
    pub status: AlgorithmStatus,
    pub verdict: Verdict,
}

impl PdrResult {
    #[inline]
    pub fn is_safe(&self) -> bool {
        matches!(self.verdict, Verdict::Safe)
    }

    #[inline]
    pub fn counterexample(&self) -> Option<&Counterexample> {
        match &self.verdict {
            Verdict::Unsafe(cex) => Some(cex),
            _ => None,
        }
    }
}

/// The relation and frames of one unrolling depth.
struct Round {
    ttr: TotalTransitionRelation,
    frames: FrameSet,
}

impl Round {
    fn new(cfa: &Cfa, env: &Rc<dyn ProverEnvironment>, ttr: TotalTransitionRelation) -> Self {
        Self {
            ttr,
            frames: FrameSet::new(env.clone(), CandidateInvariant::initial(cfa)),
        }
    }
}

pub struct Pdr {
    cfg: Config,
    cfa: Cfa,
    generator: Box<dyn CandidateGenerator>,
    env: Rc<dyn ProverEnvironment>,
    shutdown: ShutdownNotifier,
    round: Round,
    obligations: ProofObligationQueue,
    localabs: LocalAbs,
    lift: TsLift,
    /// lifting and abstraction are off after an unrefinable spurious chain
    exact: bool,
    status: AlgorithmStatus,
    counterexample: Option<Counterexample>,
    statistic: Statistic,

    filog: IntervalLogger,
}

impl Pdr {
    pub fn new(cfg: Config, cfa: Cfa, generator: Box<dyn CandidateGenerator>) -> Result<Self> {
        Self::with_environment(cfg, cfa, generator, Rc::new(SatProverEnvironment))
    }

    pub fn with_environment(
        cfg: Config,
        cfa: Cfa,
        generator: Box<dyn CandidateGenerator>,
        env: Rc<dyn ProverEnvironment>,
    ) -> Result<Self> {
        let ttr = TotalTransitionRelation::new(&cfa, cfg.pdr.initial_k as usize)?;
        let round = Round::new(&cfa, &env, ttr);
        let localabs = LocalAbs::new(cfg.pdr.abstraction);
        let lift = TsLift::new(cfg.pdr.lifting, env.as_ref());
        Ok(Self {
            cfg,
            cfa,
            generator,
            env,
            shutdown: ShutdownNotifier::new(),
            round,
            obligations: ProofObligationQueue::new(),
            localabs,
            lift,
            exact: false,
            status: AlgorithmStatus::SoundAndPrecise,
            counterexample: None,
            statistic: Statistic::default(),
            filog: Default::default(),
        })
    }

    /// Shares `shutdown` with the caller for cooperative cancellation.
    pub fn with_shutdown_notifier(mut self, shutdown: ShutdownNotifier) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[inline]
    pub fn shutdown_notifier(&self) -> ShutdownNotifier {
        self.shutdown.clone()
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.round.ttr.k()
    }

    #[inline]
    pub fn frames(&self) -> &FrameSet {
        &self.round.frames
    }

    #[inline]
    pub fn generator(&self) -> &dyn CandidateGenerator {
        self.generator.as_ref()
    }

    /// Status and counterexample as of the last completed step, also
    /// meaningful after an interrupted run.
    pub fn last_result(&self) -> PdrResult {
        let verdict = match &self.counterexample {
            Some(cex) => Verdict::Unsafe(cex.clone()),
            None => Verdict::Unknown,
        };
        PdrResult {
            status: self.status,
            verdict,
        }
    }

    fn external_invariants(&self) -> Vec<CandidateInvariant> {
        self.generator.confirmed().iter().cloned().collect()
    }

    fn check_limits(&mut self) -> Result<()> {
        if let Some(limit) = self.cfg.time_limit
            && self.statistic.time.time().as_secs() >= limit
        {
            self.shutdown.request_shutdown("time limit exceeded");
        }
        self.shutdown.shutdown_if_necessary()
    }

    /// Induction check of `candidate` relative to frame `frame` and the
    /// confirmed invariants, on the prover of that frame.
    fn induction(
        &mut self,
        frame: usize,
        candidate: &CandidateInvariant,
        strengthening: InvariantStrengthening,
    ) -> Result<InductionResult> {
        let mut invariants = self.round.frames.invariants(frame);
        invariants.extend(self.generator.confirmed().iter().cloned());
        let prover = self.round.frames.prover(frame)?;
        let mut ctx = InductionContext {
            cfa: &self.cfa,
            ttr: &self.round.ttr,
            strengthening,
            lift: &mut self.lift,
            localabs: &self.localabs,
        };
        let res = check_induction(prover, &invariants, &mut ctx, candidate)?;
        self.statistic.induction.statistic(res.is_success());
        match &res {
            InductionResult::Success { invariant } => {
                if strengthening != InvariantStrengthening::None && candidate.as_clause().is_some()
                {
                    self.statistic
                        .strengthening
                        .statistic(invariant != candidate);
                }
            }
            InductionResult::Failure {
                bad_state_blocking_clauses,
                predecessor,
                ..
            } => {
                self.statistic.block.avg_cti_cube_len += predecessor.values.len();
                for b in bad_state_blocking_clauses {
                    if let Some((_, cube)) = b.as_clause() {
                        self.statistic.block.avg_lifted_cube_len += cube.len();
                    }
                }
            }
        }
        Ok(res)
    }

    /// Handles a candidate violated on a path from the initial states.
    fn refuted(
        &mut self,
        root: &CandidateInvariant,
        cex: Counterexample,
    ) -> Result<Option<PdrResult>> {
        self.statistic.num_refuted += 1;
        self.obligations.clear();
        let live = self.round.frames.remove_root(root);
        self.generator.remove(root);
        if !root.is_primary_target() {
            info!("candidate {root} refuted, dropping it");
            if live {
                return self.restart();
            }
            return Ok(None);
        }
        info!("target reachable with a path of {} states", cex.len());
        self.status = AlgorithmStatus::UnsoundAndPrecise;
        self.counterexample = self.check_abstraction_free(cex)?;
        Ok(Some(self.last_result()))
    }

    /// Clauses learned while a refuted root was assumed in the frames are not
    /// justified any more, so the round starts over with fresh frames.
    fn restart(&mut self) -> Result<Option<PdrResult>> {
        let initial = CandidateInvariant::initial(&self.cfa);
        self.round.frames = FrameSet::new(self.env.clone(), initial);
        self.obligations.clear();
        self.statistic.num_restart += 1;
        info!("restarting the frames at k = {}", self.k());
        self.initial_bmc()
    }

    /// Checks the live candidates that are not roots yet for K steps. A
    /// survivor that is K-inductive on its own is confirmed at once, the
    /// others become roots at frame 1.
    fn initial_bmc(&mut self) -> Result<Option<PdrResult>> {
        let k = self.k();
        for c in self.generator.candidates() {
            if self.round.frames.is_root(&c) || self.generator.confirmed().contains(&c) {
                continue;
            }
            self.check_limits()?;
            match self.bmc(k, &c)? {
                Some(cex) => {
                    if let Some(res) = self.refuted(&c, cex)? {
                        return Ok(Some(res));
                    }
                }
                None if self.self_inductive(&c)? => {
                    self.certify(std::slice::from_ref(&c), &c)?;
                    self.generator.assume_truth(&c);
                    self.statistic.num_confirmed += 1;
                    info!("{c} is {k}-inductive, confirmed without frames");
                }
                None => {
                    self.localabs.refine(&c);
                    self.round.frames.push_frontier(1, &c)?;
                }
            }
        }
        Ok(None)
    }

    fn self_inductive(&mut self, candidate: &CandidateInvariant) -> Result<bool> {
        let invariants = self.external_invariants();
        let prover = self.round.frames.prover(0)?;
        is_inductive(prover, &invariants, &self.cfa, &self.round.ttr, candidate)
    }

    /// Records the roots whose frames reached a fixed point.
    fn confirm(&mut self) -> Result<()> {
        for root in self.round.frames.roots() {
            if !self.round.frames.is_confirmed(&root) {
                continue;
            }
            let Some(frame) = self.round.frames.frontier_index(&root) else {
                continue;
            };
            self.verify(&root)?;
            self.round.frames.remove_root(&root);
            self.round.frames.add_frame_clause(frame, &root)?;
            self.generator.assume_truth(&root);
            self.statistic.num_confirmed += 1;
            info!("{root} confirmed at frame {frame}");
        }
        Ok(())
    }

    /// The final result once no candidate is left to prove.
    fn converged(&mut self) -> Result<Option<PdrResult>> {
        while !self.generator.has_candidates_available() {
            if !self.generator.produce_more_candidates() {
                let confirmed = self.generator.confirmed().iter().any(|c| c.is_primary_target());
                let verdict = if confirmed {
                    Verdict::Safe
                } else {
                    Verdict::Unknown
                };
                return Ok(Some(PdrResult {
                    status: self.status,
                    verdict,
                }));
            }
            if let Some(res) = self.initial_bmc()? {
                return Ok(Some(res));
            }
        }
        Ok(None)
    }

    /// Increases K after a full round when configured to.
    fn adjust_conditions(&mut self) -> Result<Option<PdrResult>> {
        if self.cfg.pdr.adjust == AdjustConditions::Never {
            return Ok(None);
        }
        let k = self.k();
        if k >= self.cfg.pdr.max_k as usize {
            if self.cfg.pdr.fail_on_exhaustion {
                info!("condition adjustment exhausted at k = {k}");
                self.status = AlgorithmStatus::UnsoundAndPrecise;
                return Ok(Some(self.last_result()));
            }
            return Ok(None);
        }
        let ttr = self.round.ttr.clone().adjust_k(&self.cfa, k + 1)?;
        debug!("adjusting k to {}", k + 1);
        self.round = Round::new(&self.cfa, &self.env, ttr);
        self.obligations.clear();
        self.statistic.num_rounds += 1;
        self.generator.produce_more_candidates();
        self.initial_bmc()
    }

    fn run(&mut self) -> Result<PdrResult> {
        self.localabs
            .init_precision(&self.cfa, &self.generator.candidates());
        if let Some(res) = self.initial_bmc()? {
            return Ok(res);
        }
        loop {
            if let Some(res) = self.converged()? {
                return Ok(res);
            }
            self.check_limits()?;
            self.propagate()?;
            self.confirm()?;
            if let Some(res) = self.converged()? {
                return Ok(res);
            }
            if let Some(res) = self.block_all_k_step_counterexamples()? {
                return Ok(res);
            }
            self.confirm()?;
            self.filog
                .log(Level::Info, self.round.frames.statistic(true));
            if let Some(res) = self.adjust_conditions()? {
                return Ok(res);
            }
        }
    }
}

impl Engine for Pdr {
    fn check(&mut self) -> Result<PdrResult> {
        let res = self.run();
        match &res {
            Ok(r) => info!("pdr finished: {:?} at k = {}", r.status, self.k()),
            Err(e) => warn!("pdr stopped: {e}"),
        }
        res
    }

    fn statistic(&mut self) {
        info!("obligations: {}", self.obligations.statistic());
        info!("{}", self.round.frames.statistic(false));
        info!("{:#?}", self.statistic);
    }
}
