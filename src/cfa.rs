use crate::{
    error::{PdrError, Result},
    logic::{Formula, Sort, Variable},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Debug, Display},
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(u32);

impl Location {
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// CFA edge. The formula relates the state before (index 0) and after
/// (index 1) the edge and must constrain every post-state variable.
#[derive(Clone, Debug)]
pub struct Edge {
    pub from: Location,
    pub to: Location,
    pub formula: Formula,
}

/// Loop-free path between two cut points.
#[derive(Clone, Debug)]
pub struct Block {
    pub from: Location,
    pub to: Location,
    pub edges: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Cfa {
    names: Vec<String>,
    variables: Vec<Variable>,
    pc: Variable,
    selector: Variable,
    entry: Location,
    loop_heads: BTreeSet<Location>,
    targets: BTreeSet<Location>,
    init: Formula,
    edges: Vec<Edge>,
    blocks: Vec<Block>,
    blocks_from: BTreeMap<Location, Vec<usize>>,
}

impl Cfa {
    #[inline]
    pub fn num_locations(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn location_name(&self, loc: Location) -> &str {
        &self.names[loc.0 as usize]
    }

    /// state variables, without the program counter
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// symbolic program counter
    #[inline]
    pub fn pc(&self) -> &Variable {
        &self.pc
    }

    /// block selector of one unrolling step
    #[inline]
    pub fn selector(&self) -> &Variable {
        &self.selector
    }

    /// selector value of a stuttering step
    #[inline]
    pub fn stutter_code(&self) -> u32 {
        self.blocks.len() as u32
    }

    #[inline]
    pub fn entry(&self) -> Location {
        self.entry
    }

    #[inline]
    pub fn loop_heads(&self) -> &BTreeSet<Location> {
        &self.loop_heads
    }

    #[inline]
    pub fn targets(&self) -> &BTreeSet<Location> {
        &self.targets
    }

    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[inline]
    pub fn edge(&self, i: usize) -> &Edge {
        &self.edges[i]
    }

    #[inline]
    pub fn block(&self, i: usize) -> &Block {
        &self.blocks[i]
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// blocks leaving the cut point `loc`
    #[inline]
    pub fn blocks_from(&self, loc: Location) -> &[usize] {
        self.blocks_from.get(&loc).map_or(&[], |b| b.as_slice())
    }

    #[inline]
    pub fn is_cut_point(&self, loc: Location) -> bool {
        loc == self.entry || self.loop_heads.contains(&loc) || self.targets.contains(&loc)
    }

    pub fn cut_points(&self) -> BTreeSet<Location> {
        let mut res = self.loop_heads.clone();
        res.insert(self.entry);
        res.extend(self.targets.iter().copied());
        res
    }

    /// initial condition on the variables, at index 0
    #[inline]
    pub fn init(&self) -> &Formula {
        &self.init
    }

    /// initial states at `index`: entry location and initial condition
    pub fn initial_states(&self, index: usize) -> Formula {
        Formula::and([
            Formula::eq_const(&self.pc, index, self.entry.0),
            self.init.at(index),
        ])
    }

    /// `pc@index` is one of `locations`
    pub fn at_locations<'a>(
        &self,
        index: usize,
        locations: impl IntoIterator<Item = &'a Location>,
    ) -> Formula {
        Formula::or(
            locations
                .into_iter()
                .map(|l| Formula::eq_const(&self.pc, index, l.0)),
        )
    }

    /// every state variable and the program counter keep their values
    pub fn frame_condition(&self, pre: usize, post: usize) -> Formula {
        Formula::and(
            std::iter::once(&self.pc)
                .chain(self.variables.iter())
                .map(|v| Formula::eq_var(v, post, v, pre)),
        )
    }

    fn enumerate_blocks(&mut self) -> Result<()> {
        let mut out_edges: BTreeMap<Location, Vec<usize>> = BTreeMap::new();
        for (i, e) in self.edges.iter().enumerate() {
            out_edges.entry(e.from).or_default().push(i);
        }
        let mut blocks = Vec::new();
        for cp in self.cut_points() {
            let mut path = Vec::new();
            let mut on_path = BTreeSet::new();
            self.block_paths(cp, cp, &out_edges, &mut path, &mut on_path, &mut blocks)?;
        }
        for (i, b) in blocks.iter().enumerate() {
            self.blocks_from.entry(b.from).or_default().push(i);
        }
        self.blocks = blocks;
        self.selector = Variable::finite(Variable::SELECTOR, self.blocks.len() as u32 + 1);
        Ok(())
    }

    fn block_paths(
        &self,
        start: Location,
        at: Location,
        out_edges: &BTreeMap<Location, Vec<usize>>,
        path: &mut Vec<usize>,
        on_path: &mut BTreeSet<Location>,
        blocks: &mut Vec<Block>,
    ) -> Result<()> {
        let Some(out) = out_edges.get(&at) else {
            return Ok(());
        };
        for &e in out {
            let to = self.edges[e].to;
            path.push(e);
            if self.is_cut_point(to) {
                blocks.push(Block {
                    from: start,
                    to,
                    edges: path.clone(),
                });
            } else {
                if !on_path.insert(to) {
                    return Err(PdrError::InvalidCfa(format!(
                        "cycle through {} ({}) does not pass a loop head",
                        to,
                        self.location_name(to)
                    )));
                }
                self.block_paths(start, to, out_edges, path, on_path, blocks)?;
                on_path.remove(&to);
            }
            path.pop();
        }
        Ok(())
    }
}

/// Incremental construction of a [`Cfa`].
#[derive(Default)]
pub struct CfaBuilder {
    names: Vec<String>,
    variables: Vec<Variable>,
    entry: Option<Location>,
    loop_heads: BTreeSet<Location>,
    targets: BTreeSet<Location>,
    init: Vec<Formula>,
    edges: Vec<(Location, Location, Formula)>,
}

impl CfaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(&mut self, name: &str) -> Location {
        self.names.push(name.to_string());
        Location(self.names.len() as u32 - 1)
    }

    pub fn add_variable(&mut self, var: Variable) -> Variable {
        self.variables.push(var.clone());
        var
    }

    pub fn entry(&mut self, loc: Location) -> &mut Self {
        self.entry = Some(loc);
        self
    }

    pub fn loop_head(&mut self, loc: Location) -> &mut Self {
        self.loop_heads.insert(loc);
        self
    }

    pub fn target(&mut self, loc: Location) -> &mut Self {
        self.targets.insert(loc);
        self
    }

    /// Adds a conjunct of the initial condition, written at index 0.
    pub fn init(&mut self, cond: Formula) -> &mut Self {
        self.init.push(cond);
        self
    }

    /// Adds an edge with a raw transition formula over indices 0 and 1.
    pub fn edge(&mut self, from: Location, to: Location, formula: Formula) -> &mut Self {
        self.edges.push((from, to, formula));
        self
    }

    /// Edge guarded by `guard` (index 0) that writes `written` as described by
    /// `update` (indices 0 and 1) and keeps every other variable.
    pub fn update_edge(
        &mut self,
        from: Location,
        to: Location,
        guard: Formula,
        update: Formula,
        written: &[Variable],
    ) -> &mut Self {
        let keep = self
            .variables
            .iter()
            .filter(|v| !written.contains(v))
            .map(|v| Formula::eq_var(v, 1, v, 0))
            .collect::<Vec<_>>();
        let formula = Formula::and([guard, update].into_iter().chain(keep));
        self.edge(from, to, formula)
    }

    pub fn assume_edge(&mut self, from: Location, to: Location, guard: Formula) -> &mut Self {
        self.update_edge(from, to, guard, Formula::constant(true), &[])
    }

    /// `var := value` where `value` is a formula over index 0 for booleans
    pub fn assign_edge(
        &mut self,
        from: Location,
        to: Location,
        var: &Variable,
        value: Formula,
    ) -> &mut Self {
        let update = Formula::iff(Formula::var(var, 1), value);
        self.update_edge(from, to, Formula::constant(true), update, std::slice::from_ref(var))
    }

    /// nondeterministically overwrites `vars`
    pub fn havoc_edge(&mut self, from: Location, to: Location, vars: &[Variable]) -> &mut Self {
        self.update_edge(from, to, Formula::constant(true), Formula::constant(true), vars)
    }

    pub fn build(self) -> Result<Cfa> {
        let num = self.names.len() as u32;
        if num == 0 {
            return Err(PdrError::InvalidCfa("no locations".to_string()));
        }
        let entry = self
            .entry
            .ok_or_else(|| PdrError::InvalidCfa("no entry location".to_string()))?;
        let check_loc = |l: &Location| {
            if l.0 < num {
                Ok(())
            } else {
                Err(PdrError::InvalidCfa(format!("unknown location {l}")))
            }
        };
        check_loc(&entry)?;
        self.loop_heads.iter().try_for_each(check_loc)?;
        self.targets.iter().try_for_each(check_loc)?;
        let mut seen = BTreeSet::new();
        for v in self.variables.iter() {
            if v.is_reserved() {
                return Err(PdrError::InvalidCfa(format!("reserved variable name {v}")));
            }
            if !seen.insert(v.name().to_string()) {
                return Err(PdrError::InvalidCfa(format!("duplicate variable {v}")));
            }
            if v.sort() == Sort::Finite(0) {
                return Err(PdrError::InvalidCfa(format!("variable {v} has an empty sort")));
            }
        }
        let declared: BTreeSet<&Variable> = self.variables.iter().collect();
        let mut edges = Vec::with_capacity(self.edges.len());
        for (from, to, formula) in self.edges {
            check_loc(&from)?;
            check_loc(&to)?;
            for i in formula.instances() {
                if i.index > 1 || !declared.contains(&i.var) {
                    return Err(PdrError::InvalidCfa(format!(
                        "edge {from} -> {to} mentions {i:?}"
                    )));
                }
            }
            edges.push(Edge { from, to, formula });
        }
        let init = Formula::and(self.init);
        for i in init.instances() {
            if i.index != 0 || !declared.contains(&i.var) {
                return Err(PdrError::InvalidCfa(format!(
                    "initial condition mentions {i:?}"
                )));
            }
        }
        let mut cfa = Cfa {
            pc: Variable::finite(Variable::PC, num),
            selector: Variable::finite(Variable::SELECTOR, 1),
            names: self.names,
            variables: self.variables,
            entry,
            loop_heads: self.loop_heads,
            targets: self.targets,
            init,
            edges,
            blocks: Vec::new(),
            blocks_from: BTreeMap::new(),
        };
        cfa.enumerate_blocks()?;
        Ok(cfa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_between_cut_points() {
        let mut b = CfaBuilder::new();
        let x = b.add_variable(Variable::bool("x"));
        let l0 = b.add_location("entry");
        let l1 = b.add_location("head");
        let l2 = b.add_location("body");
        let l3 = b.add_location("exit");
        b.entry(l0).loop_head(l1);
        b.assign_edge(l0, l1, &x, Formula::constant(false));
        b.assume_edge(l1, l2, Formula::var(&x, 0));
        b.assign_edge(l2, l1, &x, Formula::constant(true));
        b.assume_edge(l1, l3, !Formula::var(&x, 0));
        let cfa = b.build().unwrap();
        assert_eq!(cfa.cut_points(), BTreeSet::from([l0, l1]));
        assert_eq!(cfa.blocks_from(l0).len(), 1);
        let from_head: Vec<_> = cfa
            .blocks_from(l1)
            .iter()
            .map(|b| cfa.block(*b).edges.len())
            .collect();
        assert_eq!(from_head, vec![2]);
        assert_eq!(cfa.selector().sort(), Sort::Finite(3));
        assert_eq!(cfa.stutter_code(), 2);
    }

    #[test]
    fn cycle_without_loop_head_is_rejected() {
        let mut b = CfaBuilder::new();
        let l0 = b.add_location("entry");
        let l1 = b.add_location("a");
        let l2 = b.add_location("b");
        b.entry(l0);
        b.assume_edge(l0, l1, Formula::constant(true));
        b.assume_edge(l1, l2, Formula::constant(true));
        b.assume_edge(l2, l1, Formula::constant(true));
        assert!(matches!(b.build(), Err(PdrError::InvalidCfa(_))));
    }

    #[test]
    fn reserved_and_foreign_variables_are_rejected() {
        let mut b = CfaBuilder::new();
        let l0 = b.add_location("entry");
        b.entry(l0);
        b.add_variable(Variable::bool("$pc"));
        assert!(b.build().is_err());

        let mut b = CfaBuilder::new();
        let l0 = b.add_location("entry");
        b.entry(l0);
        let y = Variable::bool("y");
        b.assume_edge(l0, l0, Formula::var(&y, 0));
        assert!(b.build().is_err());
    }

    #[test]
    fn missing_entry() {
        let mut b = CfaBuilder::new();
        b.add_location("l");
        assert!(matches!(b.build(), Err(PdrError::InvalidCfa(_))));
    }

    #[test]
    fn empty_sort_is_rejected() {
        let mut b = CfaBuilder::new();
        let l = b.add_location("l");
        b.entry(l);
        b.add_variable(Variable::finite("n", 0));
        assert!(matches!(b.build(), Err(PdrError::InvalidCfa(_))));

        let mut b = CfaBuilder::new();
        let l = b.add_location("l");
        b.entry(l);
        let n = b.add_variable(Variable::finite("n", u32::MAX));
        b.init(Formula::eq_const(&n, 0, u32::MAX - 1));
        assert!(b.build().is_ok());
    }
}
