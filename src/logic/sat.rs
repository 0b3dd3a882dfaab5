use super::{Formula, Instance, Model, Prover, ProverEnvironment, ProverOptions, Sort, Value};
use crate::error::{PdrError, Result};
use giputils::hash::GHashMap;
use log::trace;
use logicrs::{
    DagCnf, Lit, Var,
    fol::{Term, TermVec},
    satif::Satif,
};
use std::collections::BTreeMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Status {
    Unknown,
    Sat,
    Unsat,
}

/// [`Prover`] on top of CaDiCaL.
///
/// Formula terms are bit-blasted and CNF encoded into a [`DagCnf`] whose new
/// clauses are handed to the solver after every encoding. Each scope is
/// guarded by an activation literal that is assumed while the scope is open
/// and permanently disabled when it is popped.
pub struct SatProver {
    solver: cadical::Solver,
    options: ProverOptions,
    dc: DagCnf,
    loaded: usize,
    bitblast: GHashMap<Term, TermVec>,
    encoded: GHashMap<Term, Lit>,
    bits: BTreeMap<Instance, Vec<Lit>>,
    scopes: Vec<Lit>,
    assumptions: Vec<Lit>,
    status: Status,
}

impl SatProver {
    pub fn new(options: ProverOptions) -> Self {
        let mut res = Self {
            solver: cadical::Solver::new(),
            options,
            dc: DagCnf::new(),
            loaded: 0,
            bitblast: GHashMap::new(),
            encoded: GHashMap::new(),
            bits: BTreeMap::new(),
            scopes: Vec::new(),
            assumptions: Vec::new(),
            status: Status::Unknown,
        };
        res.load();
        res
    }

    /// Hands the clauses of every variable not yet seen by the solver over.
    fn load(&mut self) {
        let max: usize = self.dc.max_var().into();
        if self.loaded > max {
            return;
        }
        self.solver.new_var_to(self.dc.max_var());
        for v in self.loaded..=max {
            for cls in self.dc[Var::new(v)].iter() {
                self.solver.add_clause(cls);
            }
        }
        self.loaded = max + 1;
    }

    #[inline]
    fn new_lit(&mut self) -> Lit {
        let l = self.dc.new_var().lit();
        self.load();
        l
    }

    fn declare(&mut self, instance: &Instance) {
        if self.bits.contains_key(instance) {
            return;
        }
        let term = instance.term();
        let bits: Vec<Lit> = term
            .bitblast(&mut self.bitblast)
            .iter()
            .map(|b| b.cnf_encode(&mut self.dc, &mut self.encoded))
            .collect();
        self.bits.insert(instance.clone(), bits);
        if let Some(domain) = instance.var.sort().domain_constraint(&term) {
            let l = self.blast(&domain);
            self.load();
            self.solver.add_clause(&[l]);
        }
    }

    #[inline]
    fn blast(&mut self, term: &Term) -> Lit {
        term.bitblast(&mut self.bitblast)
            .item()
            .cnf_encode(&mut self.dc, &mut self.encoded)
    }

    fn encode(&mut self, formula: &Formula) -> Lit {
        if let Some(l) = self.encoded.get(formula.term()) {
            return *l;
        }
        for i in formula.instances() {
            self.declare(&i);
        }
        let l = self.blast(formula.term());
        self.load();
        l
    }

    fn solve(&mut self, assumptions: Vec<Lit>) -> bool {
        let mut assump = self.scopes.clone();
        assump.extend_from_slice(&assumptions);
        self.assumptions = assumptions;
        let sat = self.solver.solve(&assump);
        self.status = if sat { Status::Sat } else { Status::Unsat };
        trace!("prover check at depth {}: {}", self.scopes.len(), if sat { "sat" } else { "unsat" });
        !sat
    }
}

impl Prover for SatProver {
    fn push(&mut self, formula: &Formula) -> Result<usize> {
        self.status = Status::Unknown;
        let l = self.encode(formula);
        let act = self.new_lit();
        self.solver.add_clause(&[!act, l]);
        self.scopes.push(act);
        Ok(self.scopes.len())
    }

    fn pop(&mut self) -> Result<()> {
        let act = self
            .scopes
            .pop()
            .ok_or_else(|| PdrError::Solver("pop on an empty assertion stack".to_string()))?;
        self.status = Status::Unknown;
        self.solver.add_clause(&[!act]);
        Ok(())
    }

    #[inline]
    fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn is_unsat(&mut self) -> Result<bool> {
        Ok(self.solve(Vec::new()))
    }

    fn is_unsat_with_assumptions(&mut self, assumptions: &[Formula]) -> Result<bool> {
        self.status = Status::Unknown;
        let lits: Vec<Lit> = assumptions.iter().map(|f| self.encode(f)).collect();
        Ok(self.solve(lits))
    }

    fn unsat_assumptions(&mut self) -> Result<Vec<usize>> {
        if !self.options.generate_unsat_cores {
            return Err(PdrError::Solver(
                "unsat cores were not requested for this prover".to_string(),
            ));
        }
        if self.status != Status::Unsat {
            return Err(PdrError::Solver(
                "unsat core requested without an unsatisfiable check".to_string(),
            ));
        }
        Ok(self
            .assumptions
            .iter()
            .enumerate()
            .filter(|(_, l)| self.solver.unsat_has(**l))
            .map(|(i, _)| i)
            .collect())
    }

    fn model(&mut self) -> Result<Model> {
        if !self.options.generate_models {
            return Err(PdrError::Solver(
                "models were not requested for this prover".to_string(),
            ));
        }
        if self.status != Status::Sat {
            return Err(PdrError::Solver(
                "model requested without a satisfiable check".to_string(),
            ));
        }
        let mut model = Model::new();
        for (instance, bits) in self.bits.iter() {
            let mut raw = 0u32;
            for (k, b) in bits.iter().enumerate() {
                if self.solver.sat_value(*b).unwrap_or(false) {
                    raw |= 1 << k;
                }
            }
            let value = match instance.var.sort() {
                Sort::Bool => Value::Bool(raw == 1),
                Sort::Finite(_) => Value::Finite(raw),
            };
            model.insert(instance.clone(), value);
        }
        Ok(model)
    }
}

/// Creates a fresh [`SatProver`] per session.
#[derive(Clone, Copy, Debug, Default)]
pub struct SatProverEnvironment;

impl ProverEnvironment for SatProverEnvironment {
    fn new_prover(&self, options: ProverOptions) -> Box<dyn Prover> {
        Box::new(SatProver::new(options))
    }
}
