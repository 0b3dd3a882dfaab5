mod formula;
mod prover;
mod sat;

pub use formula::*;
pub use prover::*;
pub use sat::*;

use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Display},
    rc::Rc,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Sort {
    Bool,
    /// values `0..n`
    Finite(u32),
}

impl Sort {
    /// number of bits needed to store a value of this sort
    #[inline]
    pub fn width(&self) -> usize {
        match *self {
            Sort::Bool => 1,
            Sort::Finite(n) if n <= 2 => 1,
            Sort::Finite(n) => (u32::BITS - (n - 1).leading_zeros()) as usize,
        }
    }

    #[inline]
    pub fn contains(&self, value: Value) -> bool {
        match (*self, value) {
            (Sort::Bool, Value::Bool(_)) => true,
            (Sort::Finite(n), Value::Finite(v)) => v < n,
            _ => false,
        }
    }

    #[inline]
    pub fn default_value(&self) -> Value {
        match self {
            Sort::Bool => Value::Bool(false),
            Sort::Finite(_) => Value::Finite(0),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Bool(bool),
    Finite(u32),
}

impl Value {
    /// value encoded in the low bits, as stored by the bit-blaster
    #[inline]
    pub fn bits(&self) -> u32 {
        match *self {
            Value::Bool(b) => b as u32,
            Value::Finite(v) => v,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Finite(v) => write!(f, "{v}"),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A program variable. Names starting with `$` are reserved for the encoder.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    name: Rc<str>,
    sort: Sort,
}

impl Variable {
    pub const PC: &'static str = "$pc";
    pub const SELECTOR: &'static str = "$sel";

    pub fn new(name: &str, sort: Sort) -> Self {
        Self {
            name: Rc::from(name),
            sort,
        }
    }

    #[inline]
    pub fn bool(name: &str) -> Self {
        Self::new(name, Sort::Bool)
    }

    #[inline]
    pub fn finite(name: &str, n: u32) -> Self {
        Self::new(name, Sort::Finite(n))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn sort(&self) -> Sort {
        self.sort
    }

    #[inline]
    pub fn is_reserved(&self) -> bool {
        self.name.starts_with('$')
    }

    #[inline]
    pub fn at(&self, index: usize) -> Instance {
        Instance {
            var: self.clone(),
            index,
        }
    }
}

impl Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A variable instantiated at an SSA index.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instance {
    pub var: Variable,
    pub index: usize,
}

impl Instance {
    #[inline]
    pub(crate) fn renamed(&self, map: &impl Fn(usize) -> usize) -> Self {
        Self {
            var: self.var.clone(),
            index: map(self.index),
        }
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.var.name, self.index)
    }
}

/// A (partial) satisfying assignment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: BTreeMap<Instance, Value>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn insert(&mut self, instance: Instance, value: Value) {
        self.values.insert(instance, value);
    }

    #[inline]
    pub fn get(&self, instance: &Instance) -> Option<Value> {
        self.values.get(instance).copied()
    }

    #[inline]
    pub fn value(&self, instance: &Instance) -> Value {
        self.get(instance)
            .unwrap_or_else(|| instance.var.sort().default_value())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&Instance, &Value)> {
        self.values.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(i, v)| (i, v)))
            .finish()
    }
}
