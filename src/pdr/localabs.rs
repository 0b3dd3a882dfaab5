use crate::{
    candidate::CandidateInvariant,
    cfa::Cfa,
    config::AbstractionStrategy,
    logic::{Formula, Variable},
};
use giputils::hash::GHashSet;
use log::{debug, info};

/// Localization abstraction: obligations only keep the literals over visible
/// state variables, the visible set grows on abstraction failures.
pub struct LocalAbs {
    strategy: AbstractionStrategy,
    refine: GHashSet<Variable>,
}

impl LocalAbs {
    pub fn new(strategy: AbstractionStrategy) -> Self {
        Self {
            strategy,
            refine: GHashSet::new(),
        }
    }

    /// Makes the variables of the initial condition and of the root
    /// candidates visible.
    pub fn init_precision(&mut self, cfa: &Cfa, roots: &[CandidateInvariant]) {
        if !self.is_active() {
            return;
        }
        self.refine.extend(cfa.init().variables());
        for r in roots {
            self.refine.extend(r.variables());
        }
        debug!("localabs: initial precision {:?}", self.visible());
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.strategy, AbstractionStrategy::Localization)
    }

    /// Switches to exact obligations for the rest of the run.
    pub fn disable(&mut self) {
        if self.is_active() {
            info!("localabs: disabled with {} visible variables", self.refine.len());
        }
        self.strategy = AbstractionStrategy::None;
    }

    #[inline]
    pub fn refine_has(&self, v: &Variable) -> bool {
        self.refine.contains(v)
    }

    pub fn visible(&self) -> Vec<Variable> {
        let mut res: Vec<_> = self.refine.iter().cloned().collect();
        res.sort();
        res
    }

    /// keeps the literals over visible variables
    pub fn abstract_cube(&self, cube: &[Formula]) -> Vec<Formula> {
        if !self.is_active() {
            return cube.to_vec();
        }
        cube.iter()
            .filter(|l| l.variables().iter().all(|v| self.refine_has(v)))
            .cloned()
            .collect()
    }

    /// Makes the variables of `cti` visible, returns whether any was hidden.
    pub fn refine(&mut self, cti: &CandidateInvariant) -> bool {
        if !self.is_active() {
            return false;
        }
        let mut changed = false;
        for v in cti.variables() {
            changed |= self.refine.insert(v);
        }
        if changed {
            info!("localabs: refine size: {}", self.refine.len());
        }
        changed
    }
}
