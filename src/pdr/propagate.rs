use super::Pdr;
use crate::{config::InvariantStrengthening, error::Result};
use log::debug;
use std::time::Instant;

impl Pdr {
    /// Moves every clause that is inductive relative to its frame one frame
    /// up. Stops at the first frame that empties.
    pub(super) fn propagate(&mut self) -> Result<()> {
        let start = Instant::now();
        let frontier = self.round.frames.frontier();
        for frame_idx in 1..frontier {
            let mut clauses = self.round.frames.frame_clauses(frame_idx);
            clauses.retain(|c| !self.round.frames.is_root(c));
            for clause in clauses {
                self.check_limits()?;
                let res = self.induction(frame_idx, &clause, InvariantStrengthening::None)?;
                self.statistic.propagation.statistic(res.is_success());
                if res.is_success() {
                    self.round.frames.push_frame_clause(frame_idx, &clause)?;
                }
            }
            if self
                .round
                .frames
                .frame(frame_idx)
                .is_some_and(|f| f.is_empty())
            {
                debug!("F{frame_idx} is empty after propagation");
                break;
            }
        }
        self.statistic.overall_propagate_time += start.elapsed();
        Ok(())
    }
}
