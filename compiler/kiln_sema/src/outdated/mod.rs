//! Outdated-set tracking across an update.
//!
//! Every unit is in at most one of two maps:
//! - `outdated`: must be re-analyzed. The count is how many of its
//!   dependencies are still potentially outdated; at zero the unit is ready.
//! - `potentially_outdated` (PO): depends, transitively, on something
//!   outdated. The count is how many of its dependencies are outdated or PO.
//!   At zero it is known up-to-date and leaves the map.
//!
//! `ready` holds the outdated units with a zero count. Maps are insertion
//! ordered so the selection order is deterministic.

use crate::deps::DependencyGraph;
use crate::unit::{AnalUnit, Dependee};
use indexmap::{IndexMap, IndexSet};
use kiln_ir::DeclIndex;
use rustc_hash::FxBuildHasher;

/// Whether the unit whose fact is being marked was itself counted as PO by
/// its dependers.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MarkedPo {
    /// The fact changed for a reason other than re-analysis (an edit).
    No,
    /// The fact belongs to a unit that was outdated or PO and has just been
    /// re-analyzed; its dependers already count it.
    Yes,
}

#[derive(Debug, Default)]
pub struct OutdatedTracker {
    outdated: IndexMap<AnalUnit, u32, FxBuildHasher>,
    potentially_outdated: IndexMap<AnalUnit, u32, FxBuildHasher>,
    ready: IndexSet<AnalUnit, FxBuildHasher>,
    /// Root decls of files whose main struct must be re-checked.
    file_roots: IndexSet<DeclIndex, FxBuildHasher>,
}

impl OutdatedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_outdated(&self, unit: AnalUnit) -> bool {
        self.outdated.contains_key(&unit)
    }

    pub fn is_potentially_outdated(&self, unit: AnalUnit) -> bool {
        self.potentially_outdated.contains_key(&unit)
    }

    pub fn is_ready(&self, unit: AnalUnit) -> bool {
        self.ready.contains(&unit)
    }

    pub fn outdated_count(&self, unit: AnalUnit) -> Option<u32> {
        self.outdated.get(&unit).copied()
    }

    pub fn po_count(&self, unit: AnalUnit) -> Option<u32> {
        self.potentially_outdated.get(&unit).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.outdated.is_empty() && self.potentially_outdated.is_empty() && self.file_roots.is_empty()
    }

    pub fn outdated_len(&self) -> usize {
        self.outdated.len()
    }

    pub fn po_len(&self) -> usize {
        self.potentially_outdated.len()
    }

    pub fn add_file_root(&mut self, root: DeclIndex) {
        self.file_roots.insert(root);
    }

    pub fn is_file_root(&self, root: DeclIndex) -> bool {
        self.file_roots.contains(&root)
    }

    /// Remove a file root mark, returning whether it was set.
    pub fn take_file_root(&mut self, root: DeclIndex) -> bool {
        self.file_roots.swap_remove(&root)
    }

    /// Remove `unit` from the outdated and PO maps as it starts analysis.
    /// Returns whether it was in either.
    pub fn take(&mut self, unit: AnalUnit) -> bool {
        let was_outdated = self.outdated.swap_remove(&unit).is_some()
            || self.potentially_outdated.swap_remove(&unit).is_some();
        if was_outdated {
            self.ready.swap_remove(&unit);
        }
        was_outdated
    }

    /// Forget a unit entirely (it was deleted).
    pub fn forget(&mut self, unit: AnalUnit) {
        self.take(unit);
        if let AnalUnit::Decl(decl) = unit {
            self.file_roots.swap_remove(&decl);
        }
    }

    /// `dependee` changed: its dependers become outdated, and their own
    /// dependers become PO.
    pub fn mark_dependee_outdated(
        &mut self,
        graph: &DependencyGraph,
        marked_po: MarkedPo,
        dependee: Dependee,
    ) {
        tracing::debug!(?dependee, ?marked_po, "mark dependee outdated");
        for depender in graph.dependers(dependee) {
            if let Some(count) = self.outdated.get_mut(&depender) {
                if marked_po == MarkedPo::Yes {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.ready.insert(depender);
                    }
                }
                continue;
            }
            let previous = self.potentially_outdated.swap_remove(&depender);
            let count = match (marked_po, previous) {
                (MarkedPo::No, previous) => previous.unwrap_or(0),
                (MarkedPo::Yes, Some(count)) => count.saturating_sub(1),
                // Edge added by an analysis that was already running; the
                // depender was never counted as PO.
                (MarkedPo::Yes, None) => continue,
            };
            self.outdated.insert(depender, count);
            if count == 0 {
                self.ready.insert(depender);
            }
            if previous.is_none() {
                self.mark_transitive_dependers_potentially_outdated(graph, depender);
            }
        }
    }

    /// A fact of a re-analyzed unit did not change: dependers lose one PO
    /// dependency, and those left with none are up-to-date.
    pub fn mark_po_dependee_up_to_date(&mut self, graph: &DependencyGraph, dependee: Dependee) {
        let mut stack = vec![dependee];
        while let Some(dependee) = stack.pop() {
            tracing::trace!(?dependee, "mark PO dependee up to date");
            for depender in graph.dependers(dependee) {
                if let Some(count) = self.outdated.get_mut(&depender) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.ready.insert(depender);
                    }
                    continue;
                }
                let Some(count) = self.potentially_outdated.get_mut(&depender) else {
                    continue;
                };
                if *count > 1 {
                    *count -= 1;
                    continue;
                }
                self.potentially_outdated.swap_remove(&depender);
                stack.extend(depender.result_facts());
            }
        }
    }

    /// Mark everything that reads a result of `unit` as PO.
    pub fn mark_transitive_dependers_potentially_outdated(
        &mut self,
        graph: &DependencyGraph,
        unit: AnalUnit,
    ) {
        let mut stack = vec![unit];
        while let Some(unit) = stack.pop() {
            for fact in unit.result_facts() {
                for depender in graph.dependers(fact) {
                    if let Some(count) = self.outdated.get_mut(&depender) {
                        if *count == 0 {
                            self.ready.swap_remove(&depender);
                        }
                        *count += 1;
                        continue;
                    }
                    if let Some(count) = self.potentially_outdated.get_mut(&depender) {
                        *count += 1;
                        continue;
                    }
                    self.potentially_outdated.insert(depender, 1);
                    stack.push(depender);
                }
            }
        }
    }

    /// Make `unit` outdated regardless of its facts, e.g. to retry it.
    pub fn mark_unit_outdated(&mut self, graph: &DependencyGraph, unit: AnalUnit) {
        if self.outdated.contains_key(&unit) {
            return;
        }
        if let Some(count) = self.potentially_outdated.swap_remove(&unit) {
            // Its dependers are already PO.
            self.outdated.insert(unit, count);
            if count == 0 {
                self.ready.insert(unit);
            }
            return;
        }
        self.outdated.insert(unit, 0);
        self.ready.insert(unit);
        self.mark_transitive_dependers_potentially_outdated(graph, unit);
    }

    /// Pick the next unit to re-analyze.
    ///
    /// Prefers a ready unit, then a marked file root that is neither
    /// outdated nor PO. Otherwise the remaining units form a cycle; the
    /// Decl with the most value dependers is assumed outdated to break it.
    pub fn find_outdated_to_analyze(&self, graph: &DependencyGraph) -> Option<AnalUnit> {
        if self.is_empty() {
            return None;
        }
        if let Some(&unit) = self.ready.first() {
            return Some(unit);
        }
        for &root in &self.file_roots {
            let unit = AnalUnit::Decl(root);
            if self.outdated.contains_key(&unit) || self.potentially_outdated.contains_key(&unit) {
                continue;
            }
            return Some(unit);
        }

        let mut chosen: Option<(AnalUnit, usize)> = None;
        for &unit in self.outdated.keys().chain(self.potentially_outdated.keys()) {
            let AnalUnit::Decl(decl) = unit else {
                continue;
            };
            let dependers = graph.count_dependers(Dependee::DeclVal(decl));
            let better = match chosen {
                None => true,
                Some((_, best)) => dependers > best,
            };
            if better {
                chosen = Some((unit, dependers));
            }
        }
        if let Some((unit, dependers)) = chosen {
            tracing::debug!(?unit, dependers, "breaking dependency cycle");
            return Some(unit);
        }
        // Only functions remain, in a cycle through inferred error sets.
        self.outdated
            .keys()
            .chain(self.potentially_outdated.keys())
            .next()
            .copied()
    }

    /// Check the set invariants, for tests and debug assertions.
    pub fn verify(&self) -> Result<(), String> {
        for unit in self.outdated.keys() {
            if self.potentially_outdated.contains_key(unit) {
                return Err(format!("{unit:?} is both outdated and PO"));
            }
        }
        for (unit, &count) in &self.outdated {
            if (count == 0) != self.ready.contains(unit) {
                return Err(format!("{unit:?} has count {count} but ready={}", self.ready.contains(unit)));
            }
        }
        for unit in &self.ready {
            if !self.outdated.contains_key(unit) {
                return Err(format!("{unit:?} is ready but not outdated"));
            }
        }
        for (unit, &count) in &self.potentially_outdated {
            if count == 0 {
                return Err(format!("{unit:?} is PO with count 0"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
