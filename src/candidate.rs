use crate::{
    cfa::{Cfa, Location},
    logic::{Formula, Variable},
};
use std::{
    collections::{BTreeSet, VecDeque},
    fmt::{self, Debug, Display},
    rc::Rc,
};

/// A property over the states at a set of locations.
///
/// Candidates are values: equal candidates describe the same property, so
/// they can be used as keys of frames and frontier maps.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandidateInvariant {
    /// none of the target locations is reached
    TargetLocations {
        pc: Variable,
        targets: Rc<BTreeSet<Location>>,
    },
    /// `body` holds at `locations`, or everywhere with `None`
    Symbolic {
        pc: Variable,
        locations: Option<Rc<BTreeSet<Location>>>,
        body: Formula,
    },
    /// blocks the states at `location` that satisfy every literal of `cube`
    Clause {
        pc: Variable,
        location: Location,
        cube: Rc<[Formula]>,
    },
    Combination(Rc<[CandidateInvariant]>),
}

impl CandidateInvariant {
    pub fn target_locations(cfa: &Cfa) -> Self {
        CandidateInvariant::TargetLocations {
            pc: cfa.pc().clone(),
            targets: Rc::new(cfa.targets().clone()),
        }
    }

    /// `body` at `locations`, or everywhere with `None`. Being `false` at
    /// exactly the target locations is the target candidate itself.
    pub fn symbolic(cfa: &Cfa, locations: Option<BTreeSet<Location>>, body: Formula) -> Self {
        match locations {
            Some(locs) if body.is_false() && !locs.is_empty() && &locs == cfa.targets() => {
                Self::target_locations(cfa)
            }
            locations => CandidateInvariant::Symbolic {
                pc: cfa.pc().clone(),
                locations: locations.map(Rc::new),
                body,
            },
        }
    }

    /// `body` at every location
    pub fn global(cfa: &Cfa, body: Formula) -> Self {
        CandidateInvariant::Symbolic {
            pc: cfa.pc().clone(),
            locations: None,
            body,
        }
    }

    /// The literals are sorted so that equal cubes give equal clauses.
    pub fn clause(cfa: &Cfa, location: Location, cube: impl IntoIterator<Item = Formula>) -> Self {
        let mut cube: Vec<Formula> = cube.into_iter().collect();
        cube.sort();
        cube.dedup();
        CandidateInvariant::Clause {
            pc: cfa.pc().clone(),
            location,
            cube: Rc::from(cube),
        }
    }

    pub fn combination(parts: impl IntoIterator<Item = CandidateInvariant>) -> Self {
        let mut res = Vec::new();
        for p in parts {
            res.extend(p.conjuncts());
        }
        CandidateInvariant::Combination(Rc::from(res))
    }

    /// the initial states of `cfa`
    pub fn initial(cfa: &Cfa) -> Self {
        Self::global(cfa, cfa.initial_states(0))
    }

    /// the property of the state at SSA `index`
    pub fn formula(&self, index: usize) -> Formula {
        match self {
            CandidateInvariant::TargetLocations { pc, targets } => Formula::and(
                targets
                    .iter()
                    .map(|t| !Formula::eq_const(pc, index, t.id())),
            ),
            CandidateInvariant::Symbolic {
                pc,
                locations,
                body,
            } => match locations {
                None => body.at(index),
                Some(locs) => Formula::implies(
                    Formula::or(locs.iter().map(|l| Formula::eq_const(pc, index, l.id()))),
                    body.at(index),
                ),
            },
            CandidateInvariant::Clause { .. } => !self.blocked_states(index),
            CandidateInvariant::Combination(parts) => {
                Formula::and(parts.iter().map(|p| p.formula(index)))
            }
        }
    }

    /// The states a clause excludes, `false` for other candidates.
    pub fn blocked_states(&self, index: usize) -> Formula {
        match self {
            CandidateInvariant::Clause { pc, location, cube } => Formula::and(
                std::iter::once(Formula::eq_const(pc, index, location.id()))
                    .chain(cube.iter().map(|l| l.at(index))),
            ),
            _ => Formula::constant(false),
        }
    }

    pub fn applies_to(&self, location: Location) -> bool {
        match self {
            CandidateInvariant::TargetLocations { targets, .. } => targets.contains(&location),
            CandidateInvariant::Symbolic { locations, .. } => {
                locations.as_ref().is_none_or(|l| l.contains(&location))
            }
            CandidateInvariant::Clause { location: l, .. } => *l == location,
            CandidateInvariant::Combination(parts) => parts.iter().any(|p| p.applies_to(location)),
        }
    }

    /// the subset of `locations` this candidate says something about
    pub fn filter_applicable<'a>(
        &self,
        locations: impl IntoIterator<Item = &'a Location>,
    ) -> BTreeSet<Location> {
        locations
            .into_iter()
            .copied()
            .filter(|l| self.applies_to(*l))
            .collect()
    }

    /// conjunctive parts, the candidate itself unless it is a combination
    pub fn conjuncts(&self) -> Vec<CandidateInvariant> {
        match self {
            CandidateInvariant::Combination(parts) => {
                parts.iter().flat_map(|p| p.conjuncts()).collect()
            }
            c => vec![c.clone()],
        }
    }

    #[inline]
    pub fn is_primary_target(&self) -> bool {
        matches!(self, CandidateInvariant::TargetLocations { .. })
    }

    /// location and cube of a clause
    pub fn as_clause(&self) -> Option<(Location, &[Formula])> {
        match self {
            CandidateInvariant::Clause { location, cube, .. } => Some((*location, cube)),
            _ => None,
        }
    }

    /// variables the candidate constrains, without the program counter
    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut res = self.formula(0).variables();
        res.retain(|v| !v.is_reserved());
        res
    }
}

impl Debug for CandidateInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateInvariant::TargetLocations { targets, .. } => {
                write!(f, "unreachable{:?}", targets.as_ref())
            }
            CandidateInvariant::Symbolic {
                locations, body, ..
            } => match locations {
                Some(l) => write!(f, "{:?} => {body}", l.as_ref()),
                None => write!(f, "{body}"),
            },
            CandidateInvariant::Clause { location, cube, .. } => {
                write!(f, "!({location}")?;
                for l in cube.iter() {
                    write!(f, " & {l}")?;
                }
                write!(f, ")")
            }
            CandidateInvariant::Combination(parts) => f.debug_list().entries(parts.iter()).finish(),
        }
    }
}

impl Display for CandidateInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Source of the root candidates of a run.
pub trait CandidateGenerator {
    /// live candidates, in a stable order
    fn candidates(&self) -> Vec<CandidateInvariant>;

    /// Drops a refuted or confirmed candidate from the live set.
    fn remove(&mut self, candidate: &CandidateInvariant) -> bool;

    /// Returns whether new candidates were added.
    fn produce_more_candidates(&mut self) -> bool;

    fn has_candidates_available(&self) -> bool;

    /// Records a confirmed invariant.
    fn assume_truth(&mut self, candidate: &CandidateInvariant);

    fn confirmed(&self) -> &BTreeSet<CandidateInvariant>;
}

/// Serves a fixed list of candidates, optionally followed by further batches
/// that are released one per [`CandidateGenerator::produce_more_candidates`].
#[derive(Default, Debug)]
pub struct StaticCandidateGenerator {
    live: Vec<CandidateInvariant>,
    pending: VecDeque<Vec<CandidateInvariant>>,
    confirmed: BTreeSet<CandidateInvariant>,
}

impl StaticCandidateGenerator {
    pub fn new(candidates: impl IntoIterator<Item = CandidateInvariant>) -> Self {
        let mut res = Self::default();
        for c in candidates {
            if !res.live.contains(&c) {
                res.live.push(c);
            }
        }
        res
    }

    pub fn with_batch(mut self, batch: impl IntoIterator<Item = CandidateInvariant>) -> Self {
        self.pending.push_back(batch.into_iter().collect());
        self
    }
}

impl CandidateGenerator for StaticCandidateGenerator {
    fn candidates(&self) -> Vec<CandidateInvariant> {
        self.live.clone()
    }

    fn remove(&mut self, candidate: &CandidateInvariant) -> bool {
        let len = self.live.len();
        self.live.retain(|c| c != candidate);
        self.live.len() != len
    }

    fn produce_more_candidates(&mut self) -> bool {
        let Some(batch) = self.pending.pop_front() else {
            return false;
        };
        let mut added = false;
        for c in batch {
            if !self.live.contains(&c) && !self.confirmed.contains(&c) {
                self.live.push(c);
                added = true;
            }
        }
        added
    }

    fn has_candidates_available(&self) -> bool {
        !self.live.is_empty()
    }

    fn assume_truth(&mut self, candidate: &CandidateInvariant) {
        self.remove(candidate);
        self.confirmed.insert(candidate.clone());
    }

    fn confirmed(&self) -> &BTreeSet<CandidateInvariant> {
        &self.confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfa::CfaBuilder,
        logic::{Model, Value},
    };

    fn cfa() -> (Cfa, Variable) {
        let mut b = CfaBuilder::new();
        let x = b.add_variable(Variable::bool("x"));
        let l0 = b.add_location("entry");
        let l1 = b.add_location("error");
        b.entry(l0).target(l1);
        b.assume_edge(l0, l1, Formula::var(&x, 0));
        (b.build().unwrap(), x)
    }

    #[test]
    fn target_candidate() {
        let (cfa, _) = cfa();
        let c = CandidateInvariant::target_locations(&cfa);
        assert!(c.is_primary_target());
        let l1 = Location::new(1);
        assert!(c.applies_to(l1));
        assert!(!c.applies_to(cfa.entry()));
        let mut m = Model::new();
        m.insert(cfa.pc().at(4), Value::Finite(1));
        assert!(!c.formula(4).eval(&m));
        m.insert(cfa.pc().at(4), Value::Finite(0));
        assert!(c.formula(4).eval(&m));
    }

    #[test]
    fn clause_identity_ignores_literal_order() {
        let (cfa, x) = cfa();
        let y = Variable::bool("y");
        let a = CandidateInvariant::clause(
            &cfa,
            cfa.entry(),
            [Formula::var(&x, 0), !Formula::var(&y, 0)],
        );
        let b = CandidateInvariant::clause(
            &cfa,
            cfa.entry(),
            [!Formula::var(&y, 0), Formula::var(&x, 0)],
        );
        assert_eq!(a, b);
        assert_eq!(a.as_clause().map(|(_, c)| c.len()), Some(2));
        assert_eq!(a.variables().len(), 2);
    }

    #[test]
    fn combination_decomposes() {
        let (cfa, x) = cfa();
        let t = CandidateInvariant::target_locations(&cfa);
        let s = CandidateInvariant::symbolic(
            &cfa,
            Some(BTreeSet::from([cfa.entry()])),
            Formula::var(&x, 0),
        );
        let c = CandidateInvariant::combination([t.clone(), CandidateInvariant::combination([s.clone()])]);
        assert_eq!(c.conjuncts(), vec![t, s]);
        let all = BTreeSet::from([Location::new(0), Location::new(1)]);
        assert_eq!(c.filter_applicable(&all), all);
    }

    #[test]
    fn false_at_the_targets_is_the_target() {
        let (cfa, x) = cfa();
        let target = CandidateInvariant::target_locations(&cfa);
        let s = CandidateInvariant::symbolic(
            &cfa,
            Some(cfa.targets().clone()),
            Formula::constant(false),
        );
        assert_eq!(s, target);
        assert!(s.is_primary_target());
        let elsewhere = CandidateInvariant::symbolic(
            &cfa,
            Some(BTreeSet::from([cfa.entry()])),
            Formula::constant(false),
        );
        assert!(!elsewhere.is_primary_target());
        let everywhere = CandidateInvariant::symbolic(&cfa, None, Formula::var(&x, 0));
        assert_eq!(everywhere, CandidateInvariant::global(&cfa, Formula::var(&x, 0)));
    }

    #[test]
    fn generator_batches() {
        let (cfa, x) = cfa();
        let t = CandidateInvariant::target_locations(&cfa);
        let s = CandidateInvariant::global(&cfa, Formula::var(&x, 0));
        let mut g = StaticCandidateGenerator::new([t.clone()]).with_batch([t.clone(), s.clone()]);
        assert!(g.has_candidates_available());
        g.assume_truth(&t);
        assert!(!g.has_candidates_available());
        assert!(g.confirmed().contains(&t));
        assert!(g.produce_more_candidates());
        assert_eq!(g.candidates(), vec![s]);
        assert!(!g.produce_more_candidates());
    }
}
