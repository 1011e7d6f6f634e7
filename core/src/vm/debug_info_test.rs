use std::sync::Arc;

use crate::vm::debug_info::{StackEvent, live_locals_before};

fn names(live: &[(Arc<str>, i32)]) -> Vec<(&str, i32)> {
    live.iter().map(|(id, slot)| (id.as_ref(), *slot)).collect()
}

#[test]
fn replays_adds_and_removes_in_order() {
    let events = vec![
        StackEvent::added(1, "a", 0),
        StackEvent::added(5, "b", 1),
        StackEvent::added(7, "a", 2),
        StackEvent::removed(9, "a", 2),
    ];
    let live = live_locals_before(10, &events);
    assert_eq!(names(&live), vec![("a", 0), ("b", 1)]);
}

#[test]
fn empty_log_yields_no_locals() {
    assert!(live_locals_before(100, &[]).is_empty());
}

#[test]
fn events_at_or_past_the_target_line_are_out_of_scope() {
    let events = vec![
        StackEvent::added(1, "a", 0),
        StackEvent::added(5, "b", 1),
        StackEvent::added(9, "c", 2),
    ];
    // line 5 itself is not yet entered
    let live = live_locals_before(5, &events);
    assert_eq!(names(&live), vec![("a", 0)]);
}

#[test]
fn shadowing_reports_most_recent_surviving_slot() {
    let events = vec![
        StackEvent::added(1, "x", 0),
        StackEvent::added(3, "x", 4),
    ];
    let live = live_locals_before(10, &events);
    assert_eq!(names(&live), vec![("x", 4)]);

    // Inner shadow closed again: the outer declaration shows through.
    let mut events = events;
    events.push(StackEvent::removed(6, "x", 4));
    let live = live_locals_before(10, &events);
    assert_eq!(names(&live), vec![("x", 0)]);
}

#[test]
fn fully_removed_local_disappears() {
    let events = vec![
        StackEvent::added(1, "tmp", 0),
        StackEvent::added(2, "kept", 1),
        StackEvent::removed(4, "tmp", 0),
    ];
    let live = live_locals_before(10, &events);
    assert_eq!(names(&live), vec![("kept", 1)]);
}

#[test]
fn declaration_order_survives_interleaved_scopes() {
    let events = vec![
        StackEvent::added(1, "a", 0),
        StackEvent::added(2, "b", 1),
        StackEvent::added(3, "b", 3),
        StackEvent::added(4, "c", 2),
        StackEvent::removed(5, "b", 3),
    ];
    // "b" keeps its original declaration position: popping the inner shadow
    // leaves the outer declaration in place.
    let live = live_locals_before(10, &events);
    assert_eq!(names(&live), vec![("a", 0), ("b", 1), ("c", 2)]);
}

#[test]
fn redeclared_after_full_removal_moves_to_the_back() {
    let events = vec![
        StackEvent::added(1, "a", 0),
        StackEvent::added(2, "b", 1),
        StackEvent::removed(3, "a", 0),
        StackEvent::added(4, "a", 2),
    ];
    let live = live_locals_before(10, &events);
    assert_eq!(names(&live), vec![("b", 1), ("a", 2)]);
}
