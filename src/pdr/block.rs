use super::{Pdr, PdrResult, induction::InductionResult, proofoblig::ProofObligation};
use crate::{
    candidate::CandidateInvariant,
    config::InvariantStrengthening,
    error::{PdrError, Result},
    logic::{Formula, ProverScope},
    transys::{Counterexample, PRED},
};
use log::{debug, info, trace};
use std::time::Instant;

pub enum FrontierExtensionResult {
    Extended,
    Failed(ProofObligation),
}

pub enum BlockResult {
    /// every obligation is blocked
    Success,
    /// the chain of an obligation is a real path
    Failure(CandidateInvariant, Counterexample),
    /// the chain of an obligation was spurious, the queue is dropped
    Spurious,
}

impl Pdr {
    /// Tries to move `root` one frame up.
    pub(super) fn extend_frontier(
        &mut self,
        root: &CandidateInvariant,
    ) -> Result<FrontierExtensionResult> {
        let frame = self
            .round
            .frames
            .frontier_index(root)
            .ok_or_else(|| PdrError::InvalidArgument(format!("{root} is not a root")))?;
        match self.induction(frame, root, InvariantStrengthening::None)? {
            InductionResult::Success { .. } => {
                self.round.frames.push_frontier(frame + 1, root)?;
                debug!("{root} extended to frame {}", frame + 1);
                Ok(FrontierExtensionResult::Extended)
            }
            InductionResult::Failure {
                mut bad_state_blocking_clauses,
                concrete_cti,
                k,
                ..
            } => {
                if bad_state_blocking_clauses.len() != 1 {
                    return Err(PdrError::Internal(format!(
                        "expected one blocking clause, got {}",
                        bad_state_blocking_clauses.len()
                    )));
                }
                let cti = bad_state_blocking_clauses.swap_remove(0);
                trace!("{root} violated after {k} steps from {cti}");
                Ok(FrontierExtensionResult::Failed(ProofObligation::leaf(
                    frame - 1,
                    cti,
                    concrete_cti,
                    root.clone(),
                )))
            }
        }
    }

    pub(super) fn block_all_k_step_counterexamples(&mut self) -> Result<Option<PdrResult>> {
        let start = Instant::now();
        let res = self.block_all_roots();
        self.statistic.block.overall_time += start.elapsed();
        res
    }

    fn block_all_roots(&mut self) -> Result<Option<PdrResult>> {
        for root in self.round.frames.roots() {
            while self.round.frames.is_root(&root) {
                self.check_limits()?;
                let po = match self.extend_frontier(&root)? {
                    FrontierExtensionResult::Extended => break,
                    FrontierExtensionResult::Failed(po) => po,
                };
                self.obligations.add(po);
                match self.block()? {
                    BlockResult::Success | BlockResult::Spurious => (),
                    BlockResult::Failure(violated, cex) => {
                        if let Some(res) = self.refuted(&violated, cex)? {
                            return Ok(Some(res));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    fn intersects_initial(&mut self, cti: &CandidateInvariant) -> Result<bool> {
        let prover = self.round.frames.prover(0)?;
        let mut scope = ProverScope::new(prover);
        scope.push(&Formula::and([
            self.cfa.initial_states(PRED),
            !cti.formula(PRED),
        ]))?;
        let res = !scope.is_unsat()?;
        scope.close()?;
        Ok(res)
    }

    /// Learns `invariant` above the frame of `po` and requeues `po` there
    /// unless it reached the frontier index of its root.
    fn blocked(
        &mut self,
        po: &ProofObligation,
        invariant: &CandidateInvariant,
        limit: usize,
    ) -> Result<()> {
        let next = po.frame + 1;
        debug!("blocked {invariant} in F{next}");
        self.round.frames.add_frame_clause(next, invariant)?;
        if next < limit {
            self.obligations.add(po.at_frame(next));
        }
        Ok(())
    }

    /// Bounded model check along the chain of `po`. A spurious chain refines
    /// the abstraction, or switches to exact obligations when nothing is left
    /// to refine.
    fn check_obligation_chain(&mut self, po: &ProofObligation) -> Result<BlockResult> {
        let root = po.violated().clone();
        let steps = (po.length + 1) * self.k();
        if let Some(cex) = self.bmc(steps, &root)? {
            self.obligations.clear();
            return Ok(BlockResult::Failure(root, cex));
        }
        self.statistic.num_spurious_bmc += 1;
        let mut refined = false;
        for p in po.chain() {
            refined |= self.localabs.refine(p.concrete());
        }
        if refined {
            self.statistic.num_refine += 1;
        } else if !self.exact {
            info!(
                "spurious obligation chain of length {}, switching to exact obligations",
                po.length
            );
            self.exact = true;
            self.localabs.disable();
            self.lift.disable();
            self.statistic.num_exact_restart += 1;
        } else {
            return Err(PdrError::Internal(format!(
                "spurious obligation chain for {root} without abstraction"
            )));
        }
        self.obligations.clear();
        Ok(BlockResult::Spurious)
    }

    /// Resolves the queued obligations.
    pub(super) fn block(&mut self) -> Result<BlockResult> {
        let strengthening = self.cfg.pdr.strengthening;
        while let Some(mut po) = self.obligations.pop() {
            self.check_limits()?;
            self.statistic.block.num_obligations += 1;
            let Some(limit) = self.round.frames.frontier_index(po.violated()) else {
                continue;
            };
            if po.frame >= limit {
                continue;
            }
            if self.intersects_initial(&po.abstract_cti)? {
                debug!("obligation at F{} intersects the initial states", po.frame);
                return self.check_obligation_chain(&po);
            }
            let (mut blocking, mut concrete_cti) =
                match self.induction(po.frame, &po.abstract_cti, strengthening)? {
                    InductionResult::Success { invariant } => {
                        self.blocked(&po, &invariant, limit)?;
                        continue;
                    }
                    InductionResult::Failure {
                        bad_state_blocking_clauses,
                        concrete_cti,
                        ..
                    } => (bad_state_blocking_clauses, concrete_cti),
                };
            if let Some(concrete) = po.concrete_cti.clone() {
                self.statistic.block.num_laf += 1;
                match self.induction(po.frame, &concrete, strengthening)? {
                    InductionResult::Success { invariant } => {
                        self.statistic.block.num_caf += 1;
                        if po.spurious >= self.cfg.pdr.spurious_threshold || po.frame == 0 {
                            if self.localabs.refine(&concrete) {
                                self.statistic.num_refine += 1;
                            }
                            self.blocked(&po.concretized(po.frame), &invariant, limit)?;
                        } else {
                            for b in blocking {
                                self.obligations.add(po.caused(
                                    po.frame - 1,
                                    b,
                                    concrete_cti.clone(),
                                    po.spurious + 1,
                                ));
                            }
                            self.obligations.add(po);
                        }
                        continue;
                    }
                    InductionResult::Failure {
                        bad_state_blocking_clauses,
                        concrete_cti: cti,
                        ..
                    } => {
                        po = po.concretized(po.frame);
                        blocking = bad_state_blocking_clauses;
                        concrete_cti = cti;
                    }
                }
            }
            if po.frame == 0 {
                return self.check_obligation_chain(&po);
            }
            for b in blocking {
                self.obligations
                    .add(po.caused(po.frame - 1, b, concrete_cti.clone(), po.spurious));
            }
            self.obligations.add(po);
        }
        Ok(BlockResult::Success)
    }
}
