//! Dependency graph over cell names.
//!
//! Two adjacency tables kept mutually consistent: `dependents[x]` is the
//! set of cells whose formula references `x`; `dependees[x]` is the set of
//! cells `x`'s own formula references. Both directions are tracked
//! symmetrically so neither side ever needs to be rebuilt from scratch on a
//! mutation.

use std::collections::{HashMap, HashSet};

use crate::name::CellName;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependents: HashMap<CellName, HashSet<CellName>>,
    dependees: HashMap<CellName, HashSet<CellName>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent`'s formula references `dependee`.
    pub fn add_dependency(&mut self, dependee: &CellName, dependent: &CellName) {
        self.dependents
            .entry(dependee.clone())
            .or_default()
            .insert(dependent.clone());
        self.dependees
            .entry(dependent.clone())
            .or_default()
            .insert(dependee.clone());
    }

    /// Remove the `dependent` references `dependee` edge, if present.
    pub fn remove_dependency(&mut self, dependee: &CellName, dependent: &CellName) {
        if let Some(set) = self.dependents.get_mut(dependee) {
            set.remove(dependent);
            if set.is_empty() {
                self.dependents.remove(dependee);
            }
        }
        if let Some(set) = self.dependees.get_mut(dependent) {
            set.remove(dependee);
            if set.is_empty() {
                self.dependees.remove(dependent);
            }
        }
    }

    /// Atomically replace `t`'s full set of dependees: drop every current
    /// `t -> old_dependee` edge and add a `t -> new_dependee` edge for each
    /// entry of `new_dependees`.
    pub fn replace_dependees(&mut self, t: &CellName, new_dependees: HashSet<CellName>) {
        let old = self.dependees.get(t).cloned().unwrap_or_default();
        for dependee in &old {
            self.remove_dependency(dependee, t);
        }
        for dependee in &new_dependees {
            self.add_dependency(dependee, t);
        }
    }

    /// Cells whose formula references `s` directly.
    pub fn dependents_of(&self, s: &CellName) -> HashSet<CellName> {
        self.dependents.get(s).cloned().unwrap_or_default()
    }

    /// Cells that `t`'s own formula references directly.
    pub fn dependees_of(&self, t: &CellName) -> HashSet<CellName> {
        self.dependees.get(t).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::DefaultNameRules;

    fn name(s: &str) -> CellName {
        CellName::parse(s, &DefaultNameRules).unwrap()
    }

    #[test]
    fn add_dependency_is_symmetric() {
        let mut g = DependencyGraph::new();
        let a = name("A1");
        let b = name("B1");
        g.add_dependency(&a, &b);

        assert!(g.dependents_of(&a).contains(&b));
        assert!(g.dependees_of(&b).contains(&a));
    }

    #[test]
    fn remove_dependency_clears_both_sides() {
        let mut g = DependencyGraph::new();
        let a = name("A1");
        let b = name("B1");
        g.add_dependency(&a, &b);
        g.remove_dependency(&a, &b);

        assert!(!g.dependents_of(&a).contains(&b));
        assert!(!g.dependees_of(&b).contains(&a));
    }

    #[test]
    fn replace_dependees_is_atomic() {
        let mut g = DependencyGraph::new();
        let a = name("A1");
        let b = name("B1");
        let c = name("C1");
        let t = name("D1");

        g.add_dependency(&a, &t);
        g.add_dependency(&b, &t);

        let mut new_set = HashSet::new();
        new_set.insert(c.clone());
        g.replace_dependees(&t, new_set);

        assert_eq!(g.dependees_of(&t), HashSet::from([c.clone()]));
        assert!(!g.dependents_of(&a).contains(&t));
        assert!(!g.dependents_of(&b).contains(&t));
        assert!(g.dependents_of(&c).contains(&t));
    }

    #[test]
    fn graph_symmetry_holds_after_many_operations() {
        let mut g = DependencyGraph::new();
        let a = name("A1");
        let b = name("B1");
        let c = name("C1");

        g.add_dependency(&a, &b);
        g.add_dependency(&b, &c);
        g.remove_dependency(&a, &b);
        let mut set = HashSet::new();
        set.insert(a.clone());
        g.replace_dependees(&c, set);

        for x in [&a, &b, &c] {
            for y in [&a, &b, &c] {
                assert_eq!(
                    g.dependents_of(x).contains(y),
                    g.dependees_of(y).contains(x),
                    "symmetry broken for ({x}, {y})"
                );
            }
        }
    }
}
