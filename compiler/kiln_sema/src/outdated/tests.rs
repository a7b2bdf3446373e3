#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use super::*;
use kiln_ir::TrackedInstIndex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn decl(n: u32) -> AnalUnit {
    AnalUnit::Decl(DeclIndex::new(n))
}

fn val(n: u32) -> Dependee {
    Dependee::DeclVal(DeclIndex::new(n))
}

fn src(n: u32) -> Dependee {
    Dependee::SrcHash(TrackedInstIndex::new(n))
}

/// Every decl `i` reads its own source hash, plus the given value edges
/// `(depender, dependee)`.
fn graph_with(n: u32, edges: &[(u32, u32)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..n {
        graph.add_dependency(decl(i), src(i));
    }
    for &(depender, dependee) in edges {
        graph.add_dependency(decl(depender), val(dependee));
    }
    graph
}

/// Re-analyze one unit: take it, then resolve its facts.
fn analyze(tracker: &mut OutdatedTracker, graph: &DependencyGraph, unit: AnalUnit, changed: bool) {
    assert!(tracker.take(unit));
    for fact in unit.result_facts() {
        if changed {
            tracker.mark_dependee_outdated(graph, MarkedPo::Yes, fact);
        } else {
            tracker.mark_po_dependee_up_to_date(graph, fact);
        }
    }
}

#[test]
fn edit_marks_direct_dependers_outdated_and_transitive_po() {
    // 2 -> 1 -> 0
    let graph = graph_with(3, &[(1, 0), (2, 1)]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(0));

    assert_eq!(tracker.outdated_count(decl(0)), Some(0));
    assert!(tracker.is_ready(decl(0)));
    assert_eq!(tracker.po_count(decl(1)), Some(1));
    assert_eq!(tracker.po_count(decl(2)), Some(1));
    tracker.verify().unwrap();
}

#[test]
fn unchanged_result_clears_po_chain() {
    let graph = graph_with(3, &[(1, 0), (2, 1)]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(0));

    let next = tracker.find_outdated_to_analyze(&graph).unwrap();
    assert_eq!(next, decl(0));
    analyze(&mut tracker, &graph, next, false);

    assert!(tracker.is_empty());
    assert_eq!(tracker.find_outdated_to_analyze(&graph), None);
}

#[test]
fn changed_result_makes_dependers_outdated() {
    let graph = graph_with(3, &[(1, 0), (2, 1)]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(0));
    analyze(&mut tracker, &graph, decl(0), true);

    assert_eq!(tracker.outdated_count(decl(1)), Some(0));
    assert_eq!(tracker.po_count(decl(2)), Some(1));
    assert_eq!(tracker.find_outdated_to_analyze(&graph), Some(decl(1)));

    analyze(&mut tracker, &graph, decl(1), false);
    assert!(tracker.is_empty());
    tracker.verify().unwrap();
}

#[test]
fn outdated_unit_waits_for_po_dependencies() {
    // 1 reads 0; both edited. 1 must wait until 0 is resolved.
    let graph = graph_with(2, &[(1, 0)]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(0));
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(1));

    assert_eq!(tracker.outdated_count(decl(1)), Some(1));
    assert!(!tracker.is_ready(decl(1)));
    assert_eq!(tracker.find_outdated_to_analyze(&graph), Some(decl(0)));

    analyze(&mut tracker, &graph, decl(0), false);
    assert!(tracker.is_ready(decl(1)));
    tracker.verify().unwrap();
}

#[test]
fn cycle_picks_the_most_depended_on_decl() {
    // 0 <-> 1, and 2 also reads 1.
    let graph = graph_with(3, &[(0, 1), (1, 0), (2, 1)]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(2));
    tracker.mark_unit_outdated(&graph, decl(0));
    analyze(&mut tracker, &graph, decl(2), false);

    // 0 is outdated waiting on 1, which is PO waiting on 0: no ready unit.
    assert!(tracker.find_outdated_to_analyze(&graph).is_some());
    tracker.verify().unwrap();
    let picked = tracker.find_outdated_to_analyze(&graph).unwrap();
    assert_eq!(picked, decl(1));
}

#[test]
fn retry_promotes_po_unit_keeping_its_count() {
    let graph = graph_with(2, &[(1, 0)]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(0));
    assert_eq!(tracker.po_count(decl(1)), Some(1));

    tracker.mark_unit_outdated(&graph, decl(1));
    assert_eq!(tracker.outdated_count(decl(1)), Some(1));
    assert!(!tracker.is_potentially_outdated(decl(1)));
    tracker.verify().unwrap();
}

#[test]
fn file_roots_are_picked_when_not_pending() {
    let graph = graph_with(1, &[]);
    let mut tracker = OutdatedTracker::new();
    tracker.add_file_root(DeclIndex::new(0));
    assert_eq!(tracker.find_outdated_to_analyze(&graph), Some(decl(0)));
    assert!(tracker.take_file_root(DeclIndex::new(0)));
    assert!(tracker.is_empty());
}

#[test]
fn edge_added_during_analysis_is_ignored_by_marked_po() {
    let mut graph = graph_with(2, &[]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(0));
    assert!(tracker.take(decl(0)));
    // decl(1) starts reading decl(0) while decl(0) is being analyzed.
    graph.add_dependency(decl(1), val(0));
    tracker.mark_dependee_outdated(&graph, MarkedPo::Yes, val(0));
    assert!(!tracker.is_outdated(decl(1)));
    assert!(tracker.is_empty());
}

#[test]
fn forget_removes_every_trace() {
    let graph = graph_with(2, &[(1, 0)]);
    let mut tracker = OutdatedTracker::new();
    tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(1));
    tracker.add_file_root(DeclIndex::new(1));
    tracker.forget(decl(1));
    assert!(tracker.is_empty());
}

fn edges_strategy(n: u32, acyclic: bool) -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0..n, 0..n), 0..(n as usize * 3)).prop_map(move |pairs| {
        pairs
            .into_iter()
            .filter(|&(a, b)| a != b && (!acyclic || b < a))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Any graph, any edits, any outcomes: the loop terminates, the sets stay
    /// consistent, and every edited unit is re-analyzed.
    #[test]
    fn driver_loop_terminates(
        edges in edges_strategy(10, false),
        edited in prop::collection::vec(0u32..10, 1..4),
        changes in prop::collection::vec(any::<bool>(), 10),
    ) {
        let graph = graph_with(10, &edges);
        let mut tracker = OutdatedTracker::new();
        for &i in &edited {
            tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(i));
        }
        tracker.verify().map_err(TestCaseError::fail)?;

        let mut analyzed = Vec::new();
        while let Some(unit) = tracker.find_outdated_to_analyze(&graph) {
            prop_assert!(analyzed.len() <= 10, "driver loop did not terminate");
            let AnalUnit::Decl(d) = unit else { unreachable!() };
            analyze(&mut tracker, &graph, unit, changes[d.index()]);
            tracker.verify().map_err(TestCaseError::fail)?;
            analyzed.push(unit);
        }
        prop_assert!(tracker.is_empty());
        for &i in &edited {
            prop_assert!(analyzed.contains(&decl(i)));
        }
    }

    /// On an acyclic graph every pick is ready, and every reader of a
    /// changed value is re-analyzed after the value changed.
    #[test]
    fn acyclic_updates_are_sound(
        edges in edges_strategy(10, true),
        edited in prop::collection::vec(0u32..10, 1..4),
        changes in prop::collection::vec(any::<bool>(), 10),
    ) {
        let graph = graph_with(10, &edges);
        let mut tracker = OutdatedTracker::new();
        for &i in &edited {
            tracker.mark_dependee_outdated(&graph, MarkedPo::No, src(i));
        }

        let mut order = Vec::new();
        while let Some(unit) = tracker.find_outdated_to_analyze(&graph) {
            prop_assert!(tracker.is_ready(unit));
            let AnalUnit::Decl(d) = unit else { unreachable!() };
            analyze(&mut tracker, &graph, unit, changes[d.index()]);
            order.push(d.raw());
        }

        for (pos, &d) in order.iter().enumerate() {
            if !changes[d as usize] {
                continue;
            }
            for &(depender, dependee) in &edges {
                if dependee == d {
                    let later = order[pos + 1..].contains(&depender);
                    prop_assert!(later, "decl {} read changed decl {} but was not re-analyzed after it", depender, d);
                }
            }
        }
    }
}
