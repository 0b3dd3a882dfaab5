use super::{Formula, Model};
use crate::error::{PdrError, Result};

/// Options requested when a prover session is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProverOptions {
    pub generate_models: bool,
    pub generate_unsat_cores: bool,
}

impl Default for ProverOptions {
    fn default() -> Self {
        Self {
            generate_models: true,
            generate_unsat_cores: true,
        }
    }
}

/// Incremental prover session with a stack of assertion scopes.
pub trait Prover {
    /// Asserts `formula` in a new scope and returns the new depth.
    fn push(&mut self, formula: &Formula) -> Result<usize>;

    /// Drops the innermost scope.
    fn pop(&mut self) -> Result<()>;

    fn depth(&self) -> usize;

    fn is_unsat(&mut self) -> Result<bool>;

    /// Checks the current scopes together with `assumptions`.
    fn is_unsat_with_assumptions(&mut self, assumptions: &[Formula]) -> Result<bool>;

    /// Positions of the assumptions of the last unsatisfiable
    /// [`Prover::is_unsat_with_assumptions`] call that took part in the
    /// refutation.
    fn unsat_assumptions(&mut self) -> Result<Vec<usize>>;

    /// Assignment of every variable instance the prover has seen, valid after a
    /// satisfiable check.
    fn model(&mut self) -> Result<Model>;
}

/// Creates prover sessions.
pub trait ProverEnvironment {
    fn new_prover(&self, options: ProverOptions) -> Box<dyn Prover>;
}

/// Scope guard over a prover.
///
/// Every scope pushed through the guard is popped again when the guard is
/// dropped, so the prover returns to its original depth on every exit path.
pub struct ProverScope<'a> {
    prover: &'a mut dyn Prover,
    base: usize,
    pushed: usize,
}

impl<'a> ProverScope<'a> {
    pub fn new(prover: &'a mut dyn Prover) -> Self {
        let base = prover.depth();
        Self {
            prover,
            base,
            pushed: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, formula: &Formula) -> Result<()> {
        self.prover.push(formula)?;
        self.pushed += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<()> {
        if self.pushed == 0 {
            return Err(PdrError::Solver(
                "pop beyond the scopes opened by this guard".to_string(),
            ));
        }
        self.pushed -= 1;
        self.prover.pop()
    }

    /// number of scopes currently opened through this guard
    #[inline]
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    #[inline]
    pub fn is_unsat(&mut self) -> Result<bool> {
        self.prover.is_unsat()
    }

    #[inline]
    pub fn is_unsat_with_assumptions(&mut self, assumptions: &[Formula]) -> Result<bool> {
        self.prover.is_unsat_with_assumptions(assumptions)
    }

    #[inline]
    pub fn unsat_assumptions(&mut self) -> Result<Vec<usize>> {
        self.prover.unsat_assumptions()
    }

    #[inline]
    pub fn model(&mut self) -> Result<Model> {
        self.prover.model()
    }

    /// Pops every remaining scope and checks that the prover is back at the
    /// depth it had when the guard was created.
    pub fn close(mut self) -> Result<()> {
        while self.pushed > 0 {
            self.pop()?;
        }
        if self.prover.depth() != self.base {
            return Err(PdrError::Solver(format!(
                "unbalanced prover scopes: depth {} after closing, expected {}",
                self.prover.depth(),
                self.base
            )));
        }
        Ok(())
    }
}

impl Drop for ProverScope<'_> {
    fn drop(&mut self) {
        while self.pushed > 0 {
            self.pushed -= 1;
            if self.prover.pop().is_err() {
                break;
            }
        }
    }
}
