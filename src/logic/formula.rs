use super::{Instance, Model, Sort, Value, Variable};
use giputils::{
    bitvec::BitVec,
    hash::{GHashMap, GHashSet},
};
use logicrs::fol::{
    self, Term, TermType,
    op::{self, DynOp},
};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BTreeSet,
    fmt::{self, Debug, Display},
    ops::Deref,
};

/// Word-level terms of the instances seen on this thread, in both directions.
#[derive(Default)]
struct SymbolTable {
    terms: GHashMap<Instance, Term>,
    instances: GHashMap<Term, Instance>,
}

thread_local! {
    static SYMBOLS: RefCell<SymbolTable> = RefCell::new(SymbolTable::default());
}

impl Sort {
    #[inline]
    pub fn fol(&self) -> fol::Sort {
        fol::Sort::Bv(self.width())
    }

    /// Range constraint on `term` when the sort does not fill its bit width.
    pub fn domain_constraint(&self, term: &Term) -> Option<Term> {
        match *self {
            Sort::Finite(n) if (n as u64) < 1u64 << self.width() => {
                Some(term.op1(op::Ult, bv_const(self.width(), n)))
            }
            _ => None,
        }
    }
}

impl Instance {
    /// The variable term standing for this instance.
    pub fn term(&self) -> Term {
        SYMBOLS.with_borrow_mut(|s| {
            if let Some(t) = s.terms.get(self) {
                return t.clone();
            }
            let t = Term::new_var(self.var.sort().fol());
            s.terms.insert(self.clone(), t.clone());
            s.instances.insert(t.clone(), self.clone());
            t
        })
    }

    #[inline]
    pub fn of_term(term: &Term) -> Option<Instance> {
        SYMBOLS.with_borrow(|s| s.instances.get(term).cloned())
    }
}

#[inline]
fn bv_const(width: usize, value: u32) -> Term {
    Term::bv_const(BitVec::from_usize(width, value as usize))
}

fn balanced(o: impl Into<DynOp> + Copy, terms: &[Term]) -> Term {
    if terms.len() == 1 {
        return terms[0].clone();
    }
    let (l, r) = terms.split_at(terms.len() / 2);
    Term::new_op(o, [balanced(o, l), balanced(o, r)])
}

/// Quantifier-free formula over boolean and finite-domain variables.
///
/// A formula is a boolean [`Term`]: terms are hash-consed, so cloning, hashing
/// and equality are pointer operations. Finite sorts become bit-vectors of
/// their width. The constructors fold constants.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Formula(Term);

impl Formula {
    #[inline]
    pub fn constant(b: bool) -> Self {
        Formula(Term::bool_const(b))
    }

    #[inline]
    pub fn term(&self) -> &Term {
        &self.0
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        self.0.try_bv_const().is_some_and(|c| c.is_ones())
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        self.0.try_bv_const().is_some_and(|c| c.is_zero())
    }

    /// boolean variable `var@index`
    pub fn var(var: &Variable, index: usize) -> Self {
        debug_assert!(var.sort() == Sort::Bool);
        Formula(var.at(index).term())
    }

    /// `var@index = value`
    pub fn eq_const(var: &Variable, index: usize, value: u32) -> Self {
        match var.sort() {
            Sort::Bool => match value {
                0 => !Formula::var(var, index),
                1 => Formula::var(var, index),
                _ => Formula::constant(false),
            },
            Sort::Finite(n) if value >= n => Formula::constant(false),
            sort @ Sort::Finite(_) => {
                Formula(var.at(index).term().teq(bv_const(sort.width(), value)))
            }
        }
    }

    /// `a@ai = b@bi`, both variables must have the same sort
    pub fn eq_var(a: &Variable, ai: usize, b: &Variable, bi: usize) -> Self {
        debug_assert!(a.sort() == b.sort());
        if a == b && ai == bi {
            return Formula::constant(true);
        }
        Formula(a.at(ai).term().teq(b.at(bi).term()))
    }

    /// `var@index` takes `value`
    pub fn assign(var: &Variable, index: usize, value: Value) -> Self {
        Formula::eq_const(var, index, value.bits())
    }

    pub fn and(fs: impl IntoIterator<Item = Formula>) -> Self {
        let mut terms = Vec::new();
        for f in fs {
            if f.is_false() {
                return f;
            }
            if !f.is_true() {
                terms.push(f.0);
            }
        }
        if terms.is_empty() {
            return Formula::constant(true);
        }
        Formula(balanced(op::And, &terms))
    }

    pub fn or(fs: impl IntoIterator<Item = Formula>) -> Self {
        let mut terms = Vec::new();
        for f in fs {
            if f.is_true() {
                return f;
            }
            if !f.is_false() {
                terms.push(f.0);
            }
        }
        if terms.is_empty() {
            return Formula::constant(false);
        }
        Formula(balanced(op::Or, &terms))
    }

    #[inline]
    pub fn implies(a: Formula, b: Formula) -> Self {
        Formula::or([!a, b])
    }

    pub fn iff(a: Formula, b: Formula) -> Self {
        match (a.0.try_bv_const(), b.0.try_bv_const()) {
            (Some(c), _) => {
                if c.is_ones() {
                    b
                } else {
                    !b
                }
            }
            (_, Some(c)) => {
                if c.is_ones() {
                    a
                } else {
                    !a
                }
            }
            _ => Formula(a.0.teq(&b.0)),
        }
    }

    /// Remaps every SSA index.
    pub fn rename(&self, map: &impl Fn(usize) -> usize) -> Formula {
        Formula(
            self.0
                .apply(|t| Instance::of_term(t).map(|i| i.renamed(map).term())),
        )
    }

    /// Instantiates a state predicate (written at index 0) at `index`.
    #[inline]
    pub fn at(&self, index: usize) -> Formula {
        self.rename(&|_| index)
    }

    pub fn collect_instances(&self, out: &mut BTreeSet<Instance>) {
        let mut seen = GHashSet::new();
        let mut stack = vec![self.0.clone()];
        while let Some(t) = stack.pop() {
            if !seen.insert(t.clone()) {
                continue;
            }
            match t.deref() {
                TermType::Const(_) => (),
                TermType::Var(_) => out.extend(Instance::of_term(&t)),
                TermType::Op(o) => stack.extend(o.terms.iter().cloned()),
            }
        }
    }

    pub fn instances(&self) -> BTreeSet<Instance> {
        let mut res = BTreeSet::new();
        self.collect_instances(&mut res);
        res
    }

    /// variables mentioned at any index
    pub fn variables(&self) -> BTreeSet<Variable> {
        self.instances().into_iter().map(|i| i.var).collect()
    }

    /// Evaluates under `model`; unassigned instances take their sort's default.
    pub fn eval(&self, model: &Model) -> bool {
        let mut cache = GHashMap::new();
        eval_term(&self.0, model, &mut cache).get(0)
    }
}

fn eval_term(term: &Term, model: &Model, cache: &mut GHashMap<Term, BitVec>) -> BitVec {
    if let Some(v) = cache.get(term) {
        return v.clone();
    }
    let value = match term.deref() {
        TermType::Const(c) => c.clone(),
        TermType::Var(_) => match Instance::of_term(term) {
            Some(i) => BitVec::from_usize(i.var.sort().width(), model.value(&i).bits() as usize),
            None => BitVec::from_usize(term.bv_len(), 0),
        },
        TermType::Op(o) => {
            let args: Vec<BitVec> = o
                .terms
                .iter()
                .map(|t| eval_term(t, model, cache))
                .collect();
            if o.op == op::Not {
                !&args[0]
            } else if o.op == op::And {
                args[0].clone() & args[1].clone()
            } else if o.op == op::Or {
                args[0].clone() | args[1].clone()
            } else if o.op == op::Eq {
                BitVec::from(&[args[0] == args[1]])
            } else if o.op == op::Ult {
                BitVec::from(&[args[0].to_usize() < args[1].to_usize()])
            } else {
                unreachable!("{} is never built by a formula constructor", o.op)
            }
        }
    };
    cache.insert(term.clone(), value.clone());
    value
}

/// Structural order, stable across runs unlike the pointer hash.
fn term_cmp(a: &Term, b: &Term) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (a.deref(), b.deref()) {
        (TermType::Const(x), TermType::Const(y)) => x
            .len()
            .cmp(&y.len())
            .then_with(|| x.iter().rev().cmp(y.iter().rev())),
        (TermType::Const(_), _) => Ordering::Less,
        (_, TermType::Const(_)) => Ordering::Greater,
        (TermType::Var(x), TermType::Var(y)) => Instance::of_term(a)
            .cmp(&Instance::of_term(b))
            .then(x.cmp(y)),
        (TermType::Var(_), _) => Ordering::Less,
        (_, TermType::Var(_)) => Ordering::Greater,
        (TermType::Op(x), TermType::Op(y)) => {
            if x.op != y.op {
                return x.op.to_string().cmp(&y.op.to_string());
            }
            x.terms.len().cmp(&y.terms.len()).then_with(|| {
                x.terms
                    .iter()
                    .zip(y.terms.iter())
                    .map(|(p, q)| term_cmp(p, q))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
        }
    }
}

impl Ord for Formula {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        term_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for Formula {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::ops::Not for Formula {
    type Output = Formula;

    fn not(self) -> Self::Output {
        if let Some(c) = self.0.try_bv_const() {
            return Formula::constant(c.is_zero());
        }
        if let Some(o) = self.0.try_op()
            && o.op == op::Not
        {
            return Formula(o.terms[0].clone());
        }
        Formula(!&self.0)
    }
}

impl std::ops::Not for &Formula {
    type Output = Formula;

    #[inline]
    fn not(self) -> Self::Output {
        !self.clone()
    }
}

fn fmt_term(term: &Term, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match term.deref() {
        TermType::Const(c) => match c.try_bool() {
            Some(b) => write!(f, "{b}"),
            None => write!(f, "{}", c.to_usize()),
        },
        TermType::Var(v) => match Instance::of_term(term) {
            Some(i) => write!(f, "{i:?}"),
            None => write!(f, "v{v}"),
        },
        TermType::Op(o) => {
            write!(f, "({}", o.op.to_string().to_lowercase())?;
            for t in o.terms.iter() {
                write!(f, " ")?;
                fmt_term(t, f)?;
            }
            write!(f, ")")
        }
    }
}

impl Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_term(&self.0, f)
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}
