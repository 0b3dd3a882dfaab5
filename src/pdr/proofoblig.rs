use crate::candidate::CandidateInvariant;
use giputils::grc::Grc;
use log::trace;
use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fmt::{self, Debug},
    ops::Deref,
};

pub enum ObligationKind {
    /// a frontier extension of `violated` failed
    Leaf { violated: CandidateInvariant },
    /// blocking `cause` failed on the states of this obligation
    Caused { cause: ProofObligation },
}

pub struct ProofObligationInner {
    pub abstract_cti: CandidateInvariant,
    /// the unabstracted states when lifting or abstraction generalized them
    pub concrete_cti: Option<CandidateInvariant>,
    pub frame: usize,
    pub spurious: usize,
    pub length: usize,
    pub kind: ObligationKind,
}

/// Blocks the states of a counterexample to induction at a frame.
///
/// Obligations are immutable and form chains through their causes, ending in
/// the leaf that names the violated root candidate.
#[derive(Clone)]
pub struct ProofObligation {
    inner: Grc<ProofObligationInner>,
}

impl ProofObligation {
    pub fn leaf(
        frame: usize,
        abstract_cti: CandidateInvariant,
        concrete_cti: Option<CandidateInvariant>,
        violated: CandidateInvariant,
    ) -> Self {
        Self {
            inner: Grc::new(ProofObligationInner {
                abstract_cti,
                concrete_cti,
                frame,
                spurious: 0,
                length: 1,
                kind: ObligationKind::Leaf { violated },
            }),
        }
    }

    /// obligation on a predecessor of the states of `self`
    pub fn caused(
        &self,
        frame: usize,
        abstract_cti: CandidateInvariant,
        concrete_cti: Option<CandidateInvariant>,
        spurious: usize,
    ) -> Self {
        Self {
            inner: Grc::new(ProofObligationInner {
                abstract_cti,
                concrete_cti,
                frame,
                spurious,
                length: self.length + 1,
                kind: ObligationKind::Caused {
                    cause: self.clone(),
                },
            }),
        }
    }

    fn rebuild(
        &self,
        frame: usize,
        abstract_cti: CandidateInvariant,
        concrete_cti: Option<CandidateInvariant>,
    ) -> Self {
        let kind = match &self.kind {
            ObligationKind::Leaf { violated } => ObligationKind::Leaf {
                violated: violated.clone(),
            },
            ObligationKind::Caused { cause } => ObligationKind::Caused {
                cause: cause.clone(),
            },
        };
        Self {
            inner: Grc::new(ProofObligationInner {
                abstract_cti,
                concrete_cti,
                frame,
                spurious: self.spurious,
                length: self.length,
                kind,
            }),
        }
    }

    /// the same obligation at another frame
    pub fn at_frame(&self, frame: usize) -> Self {
        self.rebuild(frame, self.abstract_cti.clone(), self.concrete_cti.clone())
    }

    /// the same obligation without abstraction
    pub fn concretized(&self, frame: usize) -> Self {
        self.rebuild(frame, self.concrete().clone(), None)
    }

    /// the concrete states, the abstract ones if they were never generalized
    #[inline]
    pub fn concrete(&self) -> &CandidateInvariant {
        self.concrete_cti.as_ref().unwrap_or(&self.abstract_cti)
    }

    #[inline]
    pub fn cause(&self) -> Option<&ProofObligation> {
        match &self.kind {
            ObligationKind::Leaf { .. } => None,
            ObligationKind::Caused { cause } => Some(cause),
        }
    }

    /// the root candidate at the end of the chain
    pub fn violated(&self) -> &CandidateInvariant {
        let mut po = self;
        loop {
            match &po.kind {
                ObligationKind::Leaf { violated } => return violated,
                ObligationKind::Caused { cause } => po = cause,
            }
        }
    }

    /// `self` followed by its causes
    pub fn chain(&self) -> Vec<ProofObligation> {
        let mut res = vec![self.clone()];
        while let Some(c) = res.last().and_then(|p| p.cause()).cloned() {
            res.push(c);
        }
        res
    }

    /// lifting or abstraction failures along the chain
    pub fn laf_count(&self) -> usize {
        self.chain()
            .iter()
            .filter(|p| p.concrete_cti.is_some())
            .count()
    }
}

impl Deref for ProofObligation {
    type Target = ProofObligationInner;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl PartialEq for ProofObligation {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ProofObligation {}

impl PartialOrd for ProofObligation {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProofObligation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frame
            .cmp(&other.frame)
            .then_with(|| match (self.cause(), other.cause()) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
            .then_with(|| self.spurious.cmp(&other.spurious))
            .then_with(|| self.laf_count().cmp(&other.laf_count()))
    }
}

impl Debug for ProofObligation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofObligation")
            .field("frame", &self.frame)
            .field("cti", &self.abstract_cti)
            .field("spurious", &self.spurious)
            .field("length", &self.length)
            .finish()
    }
}

/// Obligations by priority, shallowest and least spurious first. Equal
/// priorities are served in insertion order.
#[derive(Default, Debug)]
pub struct ProofObligationQueue {
    obligations: BTreeSet<(ProofObligation, u64)>,
    seq: u64,
    num: Vec<usize>,
}

impl ProofObligationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, po: ProofObligation) {
        if self.num.len() <= po.frame {
            self.num.resize(po.frame + 1, 0);
        }
        self.num[po.frame] += 1;
        trace!("add obligation: frame {}, {}", po.frame, po.abstract_cti);
        self.seq += 1;
        self.obligations.insert((po, self.seq));
    }

    pub fn pop(&mut self) -> Option<ProofObligation> {
        let (po, _) = self.obligations.pop_first()?;
        self.num[po.frame] -= 1;
        Some(po)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.obligations.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.obligations.len()
    }

    pub fn clear(&mut self) {
        self.obligations.clear();
        for n in self.num.iter_mut() {
            *n = 0;
        }
    }

    pub fn statistic(&self) -> String {
        format!("{:?}", self.num)
    }
}
