//! Dependency graph between analysis units and the facts they read.
//!
//! Edges live in an arena. Each edge is on two lists: a doubly-linked list
//! per dependee (so it can be unlinked in O(1)) and a singly-linked list per
//! depender (so all of a unit's edges can be dropped before it is
//! re-analyzed). Duplicate edges are allowed; callers that care dedupe.

use crate::unit::{AnalUnit, Dependee};
use rustc_hash::FxHashMap;

const NONE: u32 = u32::MAX;

#[derive(Clone, Debug)]
struct Edge {
    depender: AnalUnit,
    dependee: Dependee,
    prev: u32,
    next: u32,
    next_of_depender: u32,
}

/// Reverse dependency map: fact -> units that read it.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: Vec<Option<Edge>>,
    free: Vec<u32>,
    by_dependee: FxHashMap<Dependee, u32>,
    by_depender: FxHashMap<AnalUnit, u32>,
    len: usize,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn edge(&self, id: u32) -> &Edge {
        match self.edges.get(id as usize) {
            Some(Some(edge)) => edge,
            _ => panic!("dependency edge {id} is not live"),
        }
    }

    fn edge_mut(&mut self, id: u32) -> &mut Edge {
        match self.edges.get_mut(id as usize) {
            Some(Some(edge)) => edge,
            _ => panic!("dependency edge {id} is not live"),
        }
    }

    /// Record that `depender` read `dependee`.
    pub fn add_dependency(&mut self, depender: AnalUnit, dependee: Dependee) {
        let head = self.by_dependee.get(&dependee).copied().unwrap_or(NONE);
        let depender_head = self.by_depender.get(&depender).copied().unwrap_or(NONE);
        let edge = Edge {
            depender,
            dependee,
            prev: NONE,
            next: head,
            next_of_depender: depender_head,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.edges[id as usize] = Some(edge);
                id
            }
            None => {
                let id = u32::try_from(self.edges.len())
                    .ok()
                    .filter(|id| *id != NONE)
                    .unwrap_or_else(|| panic!("dependency graph exceeded {NONE} edges"));
                self.edges.push(Some(edge));
                id
            }
        };
        if head != NONE {
            self.edge_mut(head).prev = id;
        }
        self.by_dependee.insert(dependee, id);
        self.by_depender.insert(depender, id);
        self.len += 1;
        tracing::trace!(?depender, ?dependee, "add dependency");
    }

    /// Drop every edge whose depender is `depender`.
    pub fn remove_dependencies_for_depender(&mut self, depender: AnalUnit) {
        let Some(mut id) = self.by_depender.remove(&depender) else {
            return;
        };
        while id != NONE {
            let Some(edge) = self.edges[id as usize].take() else {
                panic!("dependency edge {id} of {depender:?} is not live");
            };
            if edge.prev == NONE {
                if edge.next == NONE {
                    self.by_dependee.remove(&edge.dependee);
                } else {
                    self.by_dependee.insert(edge.dependee, edge.next);
                }
            } else {
                self.edge_mut(edge.prev).next = edge.next;
            }
            if edge.next != NONE {
                self.edge_mut(edge.next).prev = edge.prev;
            }
            self.free.push(id);
            self.len -= 1;
            id = edge.next_of_depender;
        }
    }

    /// Units that read `dependee`, most recent first.
    pub fn dependers(&self, dependee: Dependee) -> Dependers<'_> {
        Dependers {
            graph: self,
            next: self.by_dependee.get(&dependee).copied().unwrap_or(NONE),
        }
    }

    /// Facts `depender` read, most recent first.
    pub fn dependees(&self, depender: AnalUnit) -> Dependees<'_> {
        Dependees {
            graph: self,
            next: self.by_depender.get(&depender).copied().unwrap_or(NONE),
        }
    }

    pub fn has_dependers(&self, dependee: Dependee) -> bool {
        self.by_dependee.contains_key(&dependee)
    }

    pub fn count_dependers(&self, dependee: Dependee) -> usize {
        self.dependers(dependee).count()
    }

    /// Number of live edges.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Iterator over the dependers of one fact.
pub struct Dependers<'a> {
    graph: &'a DependencyGraph,
    next: u32,
}

impl Iterator for Dependers<'_> {
    type Item = AnalUnit;

    fn next(&mut self) -> Option<AnalUnit> {
        if self.next == NONE {
            return None;
        }
        let edge = self.graph.edge(self.next);
        self.next = edge.next;
        Some(edge.depender)
    }
}

/// Iterator over the facts one unit depends on.
pub struct Dependees<'a> {
    graph: &'a DependencyGraph,
    next: u32,
}

impl Iterator for Dependees<'_> {
    type Item = Dependee;

    fn next(&mut self) -> Option<Dependee> {
        if self.next == NONE {
            return None;
        }
        let edge = self.graph.edge(self.next);
        self.next = edge.next_of_depender;
        Some(edge.dependee)
    }
}
