//! Export requests and symbol-collision resolution.

use crate::unit::AnalUnit;
use indexmap::IndexMap;
use kiln_diagnostic::LazySrcLoc;
use kiln_intern::Index;
use kiln_ir::{DeclIndex, ExportIndex, Linkage, Name};
use rustc_hash::{FxBuildHasher, FxHashMap};

/// What an export exposes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Exported {
    Decl(DeclIndex),
    Value(Index),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ExportStatus {
    InProgress,
    Failed,
    /// Failed for a reason that may go away without an edit to the owner,
    /// such as a name collision with another unit's export.
    FailedRetryable,
    Complete,
}

#[derive(Clone, Debug)]
pub struct Export {
    /// The unit whose analysis requested the export.
    pub owner: AnalUnit,
    pub exported: Exported,
    pub name: Name,
    pub linkage: Linkage,
    pub section: Option<Name>,
    pub src: LazySrcLoc,
    pub status: ExportStatus,
}

/// A name claimed by two exports.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Collision {
    pub export: ExportIndex,
    pub other: ExportIndex,
}

/// All live exports, grouped by owning unit.
#[derive(Debug, Default)]
pub struct ExportTable {
    entries: Vec<Option<Export>>,
    free: Vec<ExportIndex>,
    by_unit: IndexMap<AnalUnit, Vec<ExportIndex>, FxBuildHasher>,
}

impl ExportTable {
    pub fn add(&mut self, export: Export) -> ExportIndex {
        let owner = export.owner;
        let index = if let Some(index) = self.free.pop() {
            self.entries[index.index()] = Some(export);
            index
        } else {
            let index = ExportIndex::from_usize(self.entries.len());
            self.entries.push(Some(export));
            index
        };
        self.by_unit.entry(owner).or_default().push(index);
        index
    }

    /// Remove every export `unit` performed.
    pub fn remove_for_unit(&mut self, unit: AnalUnit) -> Vec<(ExportIndex, Export)> {
        let Some(indices) = self.by_unit.shift_remove(&unit) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(indices.len());
        for index in indices {
            if let Some(export) = self.entries[index.index()].take() {
                removed.push((index, export));
                self.free.push(index);
            }
        }
        removed
    }

    pub fn get(&self, index: ExportIndex) -> Option<&Export> {
        self.entries.get(index.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: ExportIndex) -> Option<&mut Export> {
        self.entries.get_mut(index.index()).and_then(Option::as_mut)
    }

    pub fn for_unit(&self, unit: AnalUnit) -> &[ExportIndex] {
        self.by_unit.get(&unit).map_or(&[], Vec::as_slice)
    }

    /// Live exports ordered by owning unit, then by request order.
    pub fn ordered(&self) -> Vec<ExportIndex> {
        let mut units: Vec<AnalUnit> = self.by_unit.keys().copied().collect();
        units.sort_unstable();
        units
            .into_iter()
            .flat_map(|unit| self.for_unit(unit).iter().copied())
            .collect()
    }

    /// Assign each symbol name to its first export in `ordered` order.
    ///
    /// Later exports of a taken name become `FailedRetryable`. A winner that
    /// previously lost a collision goes back to `InProgress` for the backend
    /// to complete; completed and failed exports keep their status.
    pub fn resolve_symbols(&mut self) -> Vec<Collision> {
        let mut owners: FxHashMap<Name, ExportIndex> = FxHashMap::default();
        let mut collisions = Vec::new();
        for index in self.ordered() {
            let Some(export) = self.entries[index.index()].as_mut() else {
                continue;
            };
            match owners.get(&export.name) {
                Some(&other) => {
                    export.status = ExportStatus::FailedRetryable;
                    collisions.push(Collision {
                        export: index,
                        other,
                    });
                }
                None => {
                    if export.status == ExportStatus::FailedRetryable {
                        export.status = ExportStatus::InProgress;
                    }
                    owners.insert(export.name, index);
                }
            }
        }
        collisions
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::{FileIndex, StringInterner};
    use pretty_assertions::assert_eq;

    fn export(owner: AnalUnit, name: Name) -> Export {
        Export {
            owner,
            exported: Exported::Value(Index::VOID_VALUE),
            name,
            linkage: Linkage::Strong,
            section: None,
            src: LazySrcLoc::file(FileIndex::new(0)),
            status: ExportStatus::InProgress,
        }
    }

    #[test]
    fn earlier_unit_wins_a_collision() {
        let names = StringInterner::new();
        let foo = names.intern("foo");
        let mut table = ExportTable::default();
        let late = table.add(export(AnalUnit::Decl(DeclIndex::new(5)), foo));
        let early = table.add(export(AnalUnit::Decl(DeclIndex::new(2)), foo));

        let collisions = table.resolve_symbols();

        assert_eq!(
            collisions,
            vec![Collision {
                export: late,
                other: early
            }]
        );
        assert_eq!(table.get(late).map(|e| e.status), Some(ExportStatus::FailedRetryable));
        assert_eq!(table.get(early).map(|e| e.status), Some(ExportStatus::InProgress));
    }

    #[test]
    fn removing_a_unit_frees_its_exports() {
        let names = StringInterner::new();
        let unit = AnalUnit::Decl(DeclIndex::new(0));
        let mut table = ExportTable::default();
        table.add(export(unit, names.intern("a")));
        table.add(export(unit, names.intern("b")));
        assert_eq!(table.len(), 2);

        let removed = table.remove_for_unit(unit);

        assert_eq!(removed.len(), 2);
        assert!(table.is_empty());
        assert!(table.for_unit(unit).is_empty());
        // Freed slots are reused.
        let again = table.add(export(unit, names.intern("c")));
        assert!(again.index() < 2);
    }
}
