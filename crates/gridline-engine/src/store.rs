//! CellStore: the sparse cell mapping plus topological recomputation.
//!
//! `set_contents` is the sole mutator and the transactional boundary: on
//! any failure the store and its dependency graph are left exactly as they
//! were. The recalculation order is computed on a tentative copy of the
//! graph before anything is committed, so a would-be circular formula never
//! touches live state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cell::{Cell, CellContents, CellValue};
use crate::error::EngineError;
use crate::formula::Formula;
use crate::graph::DependencyGraph;
use crate::name::{CellName, NameRules};

pub struct CellStore {
    cells: HashMap<CellName, Cell>,
    graph: DependencyGraph,
    rules: Arc<dyn NameRules>,
}

impl CellStore {
    pub fn new(rules: Arc<dyn NameRules>) -> Self {
        CellStore { cells: HashMap::new(), graph: DependencyGraph::new(), rules }
    }

    pub fn rules(&self) -> &Arc<dyn NameRules> {
        &self.rules
    }

    pub fn parse_name(&self, raw: &str) -> Result<CellName, EngineError> {
        CellName::parse(raw, self.rules.as_ref())
    }

    /// Contents of `name`, or `Text("")` if the name is invalid or the cell
    /// is empty
    pub fn get_cell_contents(&self, raw_name: &str) -> CellContents {
        match self.parse_name(raw_name) {
            Ok(name) => self
                .cells
                .get(&name)
                .map(|c| c.contents.clone())
                .unwrap_or_else(|| CellContents::Text(String::new())),
            Err(_) => CellContents::Text(String::new()),
        }
    }

    /// Value of `name`, or `Text("")` if the name is invalid or the cell is
    /// empty
    pub fn get_cell_value(&self, raw_name: &str) -> CellValue {
        match self.parse_name(raw_name) {
            Ok(name) => self
                .cells
                .get(&name)
                .map(|c| c.value.clone())
                .unwrap_or_else(|| CellValue::Text(String::new())),
            Err(_) => CellValue::Text(String::new()),
        }
    }

    /// All names with non-empty contents, sorted for deterministic output.
    pub fn names_of_all_nonempty_cells(&self) -> Vec<CellName> {
        let mut names: Vec<CellName> = self.cells.keys().cloned().collect();
        names.sort();
        names
    }

    /// Set the contents of `raw_name` from a raw authored string:
    /// empty deletes the cell, `=...` is a formula, a valid finite number
    /// literal is a `Number`, anything else is `Text`.
    ///
    /// Returns the set of cell names whose value changed (including `name`
    /// itself), in a valid recomputation order. On failure the store and
    /// graph are unchanged.
    pub fn set_contents(
        &mut self,
        raw_name: &str,
        raw_content: &str,
    ) -> Result<HashSet<CellName>, EngineError> {
        let name = self.parse_name(raw_name)?;
        let new_contents = classify(raw_content, self.rules.as_ref())?;

        let new_dependees: HashSet<CellName> = match &new_contents {
            Some(CellContents::Formula(f)) => f.variables(),
            _ => HashSet::new(),
        };

        let mut tentative = self.graph.clone();
        tentative.replace_dependees(&name, new_dependees);
        let order = cells_to_recalculate_on(&tentative, &name)?;

        self.graph = tentative;
        match new_contents {
            Some(contents) => {
                self.cells.insert(name.clone(), build_cell(contents));
            }
            None => {
                self.cells.remove(&name);
            }
        }

        self.recompute(&order);

        Ok(order.into_iter().collect())
    }

    /// Dry-run `set_contents`: parses the name, classifies the content, and
    /// checks the resulting dependency graph for cycles, without touching
    /// `self.graph` or `self.cells`. Lets a caller pre-validate a change
    /// before sending it anywhere, the same checks `set_contents` makes
    /// before it commits.
    pub fn check_contents(&self, raw_name: &str, raw_content: &str) -> Result<(), EngineError> {
        let name = self.parse_name(raw_name)?;
        let new_contents = classify(raw_content, self.rules.as_ref())?;

        let new_dependees: HashSet<CellName> = match &new_contents {
            Some(CellContents::Formula(f)) => f.variables(),
            _ => HashSet::new(),
        };

        let mut tentative = self.graph.clone();
        tentative.replace_dependees(&name, new_dependees);
        cells_to_recalculate_on(&tentative, &name)?;
        Ok(())
    }

    /// Depth-first recalculation order covering `name` and every transitive
    /// dependent, using the *current* (already-committed) graph. Exposed
    /// for callers (e.g. applying an UPDATE/UNDO payload) that need the
    /// order without going through `set_contents`'s own tentative-graph
    /// dance, since the graph in that case is already known-acyclic.
    pub fn cells_to_recalculate(&self, name: &CellName) -> Result<Vec<CellName>, EngineError> {
        cells_to_recalculate_on(&self.graph, name)
    }

    fn recompute(&mut self, order: &[CellName]) {
        for name in order {
            let computed = match self.cells.get(name).map(|c| c.contents.clone()) {
                Some(CellContents::Text(t)) => CellValue::Text(t),
                Some(CellContents::Number(n)) => CellValue::Number(n),
                Some(CellContents::Formula(f)) => {
                    let lookup = |n: &CellName| -> Option<f64> {
                        match self.cells.get(n).map(|c| c.value.clone()) {
                            Some(CellValue::Number(x)) => Some(x),
                            _ => None,
                        }
                    };
                    match f.evaluate(&lookup) {
                        Ok(v) => CellValue::Number(v),
                        Err(reason) => CellValue::FormulaError(reason),
                    }
                }
                None => continue,
            };
            if let Some(cell) = self.cells.get_mut(name) {
                cell.value = computed;
            }
        }
    }
}

/// Build a freshly-inserted cell from its classified contents. A formula
/// cell gets a placeholder value: it is always first in its own
/// recalculation order, so `recompute` overwrites it before anyone observes
/// the placeholder.
fn build_cell(contents: CellContents) -> Cell {
    match contents {
        CellContents::Text(t) => Cell::text(t),
        CellContents::Number(n) => Cell::number(n),
        CellContents::Formula(f) => Cell::formula(f, CellValue::Number(0.0)),
    }
}

fn classify(
    raw_content: &str,
    rules: &dyn NameRules,
) -> Result<Option<CellContents>, EngineError> {
    if raw_content.is_empty() {
        return Ok(None);
    }
    if let Some(formula_src) = raw_content.strip_prefix('=') {
        let formula = Formula::parse(formula_src, rules)?;
        return Ok(Some(CellContents::Formula(formula)));
    }
    if let Ok(n) = raw_content.parse::<f64>() {
        if n.is_finite() {
            return Ok(Some(CellContents::Number(n)));
        }
    }
    Ok(Some(CellContents::Text(raw_content.to_string())))
}

/// DFS over `dependents` edges from `start`, producing a topological order
/// (dependees before dependents). Detects a cycle iff the traversal returns
/// to `start` itself while walking an in-progress ("gray") set.
fn cells_to_recalculate_on(
    graph: &DependencyGraph,
    start: &CellName,
) -> Result<Vec<CellName>, EngineError> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(graph, start, start, &mut visited, &mut order)?;
    order.reverse();
    Ok(order)
}

fn visit(
    graph: &DependencyGraph,
    start: &CellName,
    current: &CellName,
    visited: &mut HashSet<CellName>,
    order: &mut Vec<CellName>,
) -> Result<(), EngineError> {
    visited.insert(current.clone());
    for dependent in graph.dependents_of(current) {
        if &dependent == start {
            return Err(EngineError::CircularDependency);
        }
        if !visited.contains(&dependent) {
            visit(graph, start, &dependent, visited, order)?;
        }
    }
    order.push(current.clone());
    Ok(())
}
