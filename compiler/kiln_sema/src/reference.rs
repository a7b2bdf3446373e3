//! Which unit's analysis referenced which other unit, for reference traces.

use crate::unit::AnalUnit;
use kiln_diagnostic::LazySrcLoc;
use rustc_hash::FxHashMap;

/// How many "referenced here" notes an error gets.
pub const REFERENCE_TRACE_DEPTH: usize = 4;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Reference {
    pub referenced: AnalUnit,
    pub src: LazySrcLoc,
}

#[derive(Debug, Default)]
pub struct ReferenceTable {
    by_referencer: FxHashMap<AnalUnit, Vec<Reference>>,
}

impl ReferenceTable {
    pub fn add(&mut self, referencer: AnalUnit, referenced: AnalUnit, src: LazySrcLoc) {
        if referencer == referenced {
            return;
        }
        let list = self.by_referencer.entry(referencer).or_default();
        if list.iter().any(|r| r.referenced == referenced) {
            return;
        }
        list.push(Reference { referenced, src });
    }

    pub fn remove_for_unit(&mut self, referencer: AnalUnit) {
        self.by_referencer.remove(&referencer);
    }

    /// For every referenced unit, one unit that references it.
    ///
    /// Referencers are visited in unit order so the result is stable.
    pub fn resolve(&self) -> FxHashMap<AnalUnit, (AnalUnit, LazySrcLoc)> {
        let mut referencers: Vec<AnalUnit> = self.by_referencer.keys().copied().collect();
        referencers.sort_unstable();
        let mut reverse = FxHashMap::default();
        for referencer in referencers {
            for reference in &self.by_referencer[&referencer] {
                reverse
                    .entry(reference.referenced)
                    .or_insert((referencer, reference.src));
            }
        }
        reverse
    }

    /// Walk up to `REFERENCE_TRACE_DEPTH` referencers starting at `unit`.
    pub fn trace(
        reverse: &FxHashMap<AnalUnit, (AnalUnit, LazySrcLoc)>,
        unit: AnalUnit,
    ) -> Vec<(AnalUnit, LazySrcLoc)> {
        let mut trace = Vec::new();
        let mut current = unit;
        while trace.len() < REFERENCE_TRACE_DEPTH {
            let Some(&(referencer, src)) = reverse.get(&current) else {
                break;
            };
            if referencer == unit || trace.iter().any(|&(seen, _)| seen == referencer) {
                break;
            }
            trace.push((referencer, src));
            current = referencer;
        }
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::{DeclIndex, FileIndex};
    use pretty_assertions::assert_eq;

    fn decl(n: u32) -> AnalUnit {
        AnalUnit::Decl(DeclIndex::new(n))
    }

    fn src() -> LazySrcLoc {
        LazySrcLoc::file(FileIndex::new(0))
    }

    #[test]
    fn trace_is_capped() {
        let mut refs = ReferenceTable::default();
        for n in 0..8 {
            refs.add(decl(n + 1), decl(n), src());
        }
        let reverse = refs.resolve();
        let trace = ReferenceTable::trace(&reverse, decl(0));
        let units: Vec<AnalUnit> = trace.into_iter().map(|(u, _)| u).collect();
        assert_eq!(units, vec![decl(1), decl(2), decl(3), decl(4)]);
    }

    #[test]
    fn trace_stops_at_cycles() {
        let mut refs = ReferenceTable::default();
        refs.add(decl(1), decl(0), src());
        refs.add(decl(0), decl(1), src());
        let reverse = refs.resolve();
        assert_eq!(ReferenceTable::trace(&reverse, decl(0)).len(), 1);
    }

    #[test]
    fn removed_references_leave_no_trace() {
        let mut refs = ReferenceTable::default();
        refs.add(decl(1), decl(0), src());
        refs.add(decl(1), decl(0), src());
        refs.remove_for_unit(decl(1));
        assert!(refs.resolve().is_empty());
    }
}
