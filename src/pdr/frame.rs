use crate::{
    candidate::CandidateInvariant,
    error::{PdrError, Result, ensure_arg},
    logic::{Prover, ProverEnvironment, ProverOptions},
};
use giputils::hash::GHashMap;
use log::trace;
use std::{
    collections::BTreeSet,
    fmt::Write,
    ops::Deref,
    rc::Rc,
};

/// Clauses of one frame and the frame's own prover.
pub struct Frame {
    clauses: BTreeSet<CandidateInvariant>,
    prover: Option<Box<dyn Prover>>,
}

impl Frame {
    fn new() -> Self {
        Self {
            clauses: BTreeSet::new(),
            prover: None,
        }
    }
}

impl Deref for Frame {
    type Target = BTreeSet<CandidateInvariant>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.clauses
    }
}

/// The frame lattice `F0 ⊆ F1 ⊆ ... ⊆ F_frontier`.
///
/// A clause lives in exactly one frame and holds in every frame up to that
/// one, so the invariants of frame `i` are the clauses of frames `i..`.
/// Root candidates occupy the frame of their frontier index.
pub struct FrameSet {
    env: Rc<dyn ProverEnvironment>,
    frames: Vec<Frame>,
    roots: GHashMap<CandidateInvariant, usize>,
    initial: CandidateInvariant,
}

impl FrameSet {
    pub fn new(env: Rc<dyn ProverEnvironment>, initial: CandidateInvariant) -> Self {
        let mut base = Frame::new();
        base.clauses.insert(initial.clone());
        Self {
            env,
            frames: vec![base],
            roots: GHashMap::new(),
            initial,
        }
    }

    #[inline]
    pub fn frontier(&self) -> usize {
        self.frames.len() - 1
    }

    /// the initial condition, the only clause of frame 0
    #[inline]
    pub fn initial(&self) -> &CandidateInvariant {
        &self.initial
    }

    #[inline]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    fn extend_to(&mut self, index: usize) {
        while self.frontier() < index {
            self.frames.push(Frame::new());
        }
    }

    /// Adds the parts of `clause` to frame `index`. A part already held by a
    /// lower frame moves up, one held by a higher frame stays there.
    pub fn add_frame_clause(&mut self, index: usize, clause: &CandidateInvariant) -> Result<()> {
        ensure_arg!(
            index <= self.frontier(),
            "frame {index} is beyond the frontier {}",
            self.frontier()
        );
        for part in clause.conjuncts() {
            if self.roots.contains_key(&part)
                || self.frames[index..].iter().any(|f| f.contains(&part))
            {
                continue;
            }
            for f in self.frames[..index].iter_mut() {
                f.clauses.remove(&part);
            }
            trace!("add frame clause: frame {index}, {part}");
            self.frames[index].clauses.insert(part);
        }
        Ok(())
    }

    /// Moves `clause` from frame `index` to frame `index + 1`.
    pub fn push_frame_clause(&mut self, index: usize, clause: &CandidateInvariant) -> Result<()> {
        ensure_arg!(
            self.frames
                .get_mut(index)
                .is_some_and(|f| f.clauses.remove(clause)),
            "clause {clause} is not in frame {index}"
        );
        self.extend_to(index + 1);
        self.frames[index + 1].clauses.insert(clause.clone());
        Ok(())
    }

    /// Moves the frontier index of `root` to `index`, which must be one past
    /// its current index, or 1 for a root seen for the first time.
    pub fn push_frontier(&mut self, index: usize, root: &CandidateInvariant) -> Result<()> {
        match self.roots.get(root).copied() {
            None => ensure_arg!(
                index == 1,
                "root {root} must enter at frame 1, not at frame {index}"
            ),
            Some(prev) => {
                ensure_arg!(
                    index == prev + 1,
                    "root {root} cannot move from frame {prev} to frame {index}"
                );
                self.frames[prev].clauses.remove(root);
            }
        }
        self.extend_to(index);
        self.frames[index].clauses.insert(root.clone());
        self.roots.insert(root.clone(), index);
        Ok(())
    }

    #[inline]
    pub fn frontier_index(&self, root: &CandidateInvariant) -> Option<usize> {
        self.roots.get(root).copied()
    }

    #[inline]
    pub fn is_root(&self, clause: &CandidateInvariant) -> bool {
        self.roots.contains_key(clause)
    }

    pub fn roots(&self) -> Vec<CandidateInvariant> {
        let mut res: Vec<_> = self.roots.keys().cloned().collect();
        res.sort();
        res
    }

    pub fn remove_root(&mut self, root: &CandidateInvariant) -> bool {
        match self.roots.remove(root) {
            Some(i) => {
                self.frames[i].clauses.remove(root);
                true
            }
            None => false,
        }
    }

    /// clauses of frames `index..=frontier`
    pub fn invariants(&self, index: usize) -> Vec<CandidateInvariant> {
        self.frames
            .iter()
            .skip(index)
            .flat_map(|f| f.iter().cloned())
            .collect()
    }

    /// clauses held by frame `index` itself
    pub fn frame_clauses(&self, index: usize) -> Vec<CandidateInvariant> {
        self.frames
            .get(index)
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Some frame strictly between 0 and the frontier index of `root` is
    /// empty, so the frames above it are inductive.
    pub fn is_confirmed(&self, root: &CandidateInvariant) -> bool {
        let Some(f) = self.frontier_index(root) else {
            return false;
        };
        (1..f).any(|i| self.frames[i].is_empty())
    }

    /// clauses above the first empty frame
    pub fn inductive_invariant(&self) -> Option<Vec<CandidateInvariant>> {
        let empty = (1..self.frontier()).find(|i| self.frames[*i].is_empty())?;
        Some(self.invariants(empty))
    }

    /// The prover of frame `index`, created on first use.
    pub fn prover(&mut self, index: usize) -> Result<&mut dyn Prover> {
        let frontier = self.frontier();
        let env = self.env.clone();
        let frame = self.frames.get_mut(index).ok_or_else(|| {
            PdrError::InvalidArgument(format!(
                "frame {index} is beyond the frontier {frontier}"
            ))
        })?;
        let prover = frame
            .prover
            .get_or_insert_with(|| env.new_prover(ProverOptions::default()));
        Ok(prover.as_mut())
    }

    #[inline]
    pub fn statistic(&self, compact: bool) -> String {
        let mut s = String::new();
        let total = self.frames.len();
        let _ = write!(s, "frames [{total}]: ");
        let skip = if compact && total > 50 {
            s.push_str("... ");
            total - 50
        } else {
            0
        };
        for f in self.frames.iter().skip(skip) {
            let _ = write!(s, "{} ", f.len());
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfa::{Cfa, CfaBuilder},
        logic::{Formula, SatProverEnvironment, Value, Variable},
    };

    fn setup() -> (Cfa, Variable, FrameSet) {
        let mut b = CfaBuilder::new();
        let x = b.add_variable(Variable::bool("x"));
        let l0 = b.add_location("entry");
        let l1 = b.add_location("error");
        b.entry(l0).target(l1);
        b.assume_edge(l0, l1, Formula::var(&x, 0));
        let cfa = b.build().unwrap();
        let frames = FrameSet::new(
            Rc::new(SatProverEnvironment),
            CandidateInvariant::initial(&cfa),
        );
        (cfa, x, frames)
    }

    fn clause(cfa: &Cfa, x: &Variable, v: bool) -> CandidateInvariant {
        CandidateInvariant::clause(cfa, cfa.entry(), [Formula::assign(x, 0, Value::Bool(v))])
    }

    #[test]
    fn root_frontier_moves_one_frame_at_a_time() {
        let (cfa, _, mut frames) = setup();
        let root = CandidateInvariant::target_locations(&cfa);
        assert!(matches!(
            frames.push_frontier(3, &root),
            Err(PdrError::InvalidArgument(_))
        ));
        for n in 1..=3 {
            frames.push_frontier(n, &root).unwrap();
            assert_eq!(frames.frontier_index(&root), Some(n));
        }
        assert!(frames.push_frontier(5, &root).is_err());
        assert_eq!(frames.frontier(), 3);
        assert_eq!(frames.frame_clauses(3), vec![root.clone()]);
        assert!(frames.frame_clauses(2).is_empty());
    }

    #[test]
    fn clauses_move_but_never_disappear() {
        let (cfa, x, mut frames) = setup();
        let root = CandidateInvariant::target_locations(&cfa);
        let c = clause(&cfa, &x, true);
        assert!(frames.add_frame_clause(1, &c).is_err());
        frames.push_frontier(1, &root).unwrap();
        frames.add_frame_clause(1, &c).unwrap();
        // roots are tracked by their frontier marker only
        frames.add_frame_clause(1, &root).unwrap();
        assert_eq!(frames.frame_clauses(1).len(), 2);
        assert!(frames.invariants(0).contains(&c));

        assert!(frames.push_frame_clause(0, &c).is_err());
        frames.push_frame_clause(1, &c).unwrap();
        assert_eq!(frames.frontier(), 2);
        assert!(!frames.frame_clauses(1).contains(&c));
        assert!(frames.frame_clauses(2).contains(&c));
        assert!(frames.invariants(1).contains(&c));
        assert!(frames.invariants(3).is_empty());

        // re-adding below moves nothing, adding above moves it up
        frames.add_frame_clause(1, &c).unwrap();
        assert_eq!(frames.frame_clauses(2), vec![c.clone()]);
        frames.push_frontier(2, &root).unwrap();
        let d = clause(&cfa, &x, false);
        frames.add_frame_clause(1, &d).unwrap();
        frames.add_frame_clause(2, &d).unwrap();
        assert!(!frames.frame_clauses(1).contains(&d));
        assert!(frames.frame_clauses(2).contains(&d));
    }

    #[test]
    fn confirmation_when_a_frame_empties() {
        let (cfa, x, mut frames) = setup();
        let root = CandidateInvariant::target_locations(&cfa);
        let c = clause(&cfa, &x, true);
        let d = clause(&cfa, &x, false);
        frames.push_frontier(1, &root).unwrap();
        frames.add_frame_clause(1, &c).unwrap();
        frames.push_frontier(2, &root).unwrap();
        frames.add_frame_clause(2, &d).unwrap();
        frames.push_frontier(3, &root).unwrap();
        assert!(!frames.is_confirmed(&root));
        assert!(frames.inductive_invariant().is_none());
        frames.push_frame_clause(1, &c).unwrap();
        assert!(frames.frame(1).is_some_and(|f| f.is_empty()));
        assert!(frames.is_confirmed(&root));
        assert_eq!(frames.inductive_invariant().map(|i| i.len()), Some(3));
    }

    #[test]
    fn provers_are_per_frame() {
        let (cfa, _, mut frames) = setup();
        frames.push_frontier(1, &CandidateInvariant::target_locations(&cfa)).unwrap();
        frames.prover(1).unwrap().push(&Formula::constant(false)).unwrap();
        assert!(frames.prover(1).unwrap().is_unsat().unwrap());
        assert!(!frames.prover(0).unwrap().is_unsat().unwrap());
        assert!(frames.prover(2).is_err());
    }
}
