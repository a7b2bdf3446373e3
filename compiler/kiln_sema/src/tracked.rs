//! Stable handles to lowered instructions.
//!
//! Instruction indices change whenever a file is re-lowered. Anything that
//! must survive an edit (decls, container types, dependencies on source
//! hashes, diagnostics) refers to a `TrackedInstIndex` instead, which the
//! correlator re-points after every change.

use kiln_ir::{FileIndex, InstIndex, TrackedInstIndex};
use rustc_hash::FxHashMap;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TrackedInst {
    pub file: FileIndex,
    /// `None` once the instruction could not be found after an edit.
    pub inst: Option<InstIndex>,
}

#[derive(Debug, Default)]
pub struct TrackedInsts {
    entries: Vec<TrackedInst>,
    map: FxHashMap<(FileIndex, InstIndex), TrackedInstIndex>,
    by_file: FxHashMap<FileIndex, Vec<TrackedInstIndex>>,
}

impl TrackedInsts {
    /// Handle for `(file, inst)`, creating it on first use.
    pub fn track(&mut self, file: FileIndex, inst: InstIndex) -> TrackedInstIndex {
        if let Some(&tracked) = self.map.get(&(file, inst)) {
            return tracked;
        }
        let tracked = TrackedInstIndex::from_usize(self.entries.len());
        self.entries.push(TrackedInst {
            file,
            inst: Some(inst),
        });
        self.map.insert((file, inst), tracked);
        self.by_file.entry(file).or_default().push(tracked);
        tracked
    }

    pub fn get(&self, tracked: TrackedInstIndex) -> TrackedInst {
        self.entries[tracked.index()]
    }

    /// `(file, inst)` if the instruction is still known.
    pub fn resolve(&self, tracked: TrackedInstIndex) -> Option<(FileIndex, InstIndex)> {
        let entry = self.get(tracked);
        entry.inst.map(|inst| (entry.file, inst))
    }

    pub fn find(&self, file: FileIndex, inst: InstIndex) -> Option<TrackedInstIndex> {
        self.map.get(&(file, inst)).copied()
    }

    /// Live tracked instructions of `file` with their current index.
    pub fn for_file(&self, file: FileIndex) -> Vec<(TrackedInstIndex, InstIndex)> {
        self.by_file
            .get(&file)
            .map(|list| {
                list.iter()
                    .filter_map(|&tracked| self.entries[tracked.index()].inst.map(|inst| (tracked, inst)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Re-point tracked instructions of `file` after correlation.
    ///
    /// Every entry listed moves to its new instruction or becomes lost.
    pub fn repoint(&mut self, file: FileIndex, updates: &[(TrackedInstIndex, Option<InstIndex>)]) {
        for &(tracked, _) in updates {
            let entry = self.entries[tracked.index()];
            if let Some(old) = entry.inst {
                if self.map.get(&(file, old)) == Some(&tracked) {
                    self.map.remove(&(file, old));
                }
            }
        }
        for &(tracked, new) in updates {
            self.entries[tracked.index()].inst = new;
            match new {
                Some(inst) => {
                    self.map.insert((file, inst), tracked);
                }
                None => tracing::debug!(?tracked, ?file, "tracking failed"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
