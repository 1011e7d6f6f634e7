//! Stack-member liveness for the debugger.
//!
//! The compiler emits an ordered add/remove event per local as scopes open
//! and close. Replaying the log up to a line reconstructs which locals are
//! visible there and which stack slot currently backs each one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

/// One scope event in program order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    pub line: i32,
    pub identifier: Arc<str>,
    pub slot: i32,
    pub added: bool,
}

impl StackEvent {
    pub fn added(line: i32, identifier: &str, slot: i32) -> StackEvent {
        StackEvent {
            line,
            identifier: Arc::from(identifier),
            slot,
            added: true,
        }
    }

    pub fn removed(line: i32, identifier: &str, slot: i32) -> StackEvent {
        StackEvent {
            line,
            identifier: Arc::from(identifier),
            slot,
            added: false,
        }
    }
}

struct LiveEntry {
    order: usize,
    slots: Vec<i32>,
}

/// Locals visible just before `line`: `(identifier, backing slot)` in
/// declaration order. Shadowed declarations report their most recent
/// surviving slot.
pub fn live_locals_before(line: i32, events: &[StackEvent]) -> Vec<(Arc<str>, i32)> {
    let mut live: FastHashMap<Arc<str>, LiveEntry> = fast_hash_map_new();
    let mut order = 0usize;

    for event in events {
        // The log is line-ordered; everything past the target is scope we
        // have not entered yet.
        if event.line >= line {
            break;
        }

        if event.added {
            live.entry(event.identifier.clone())
                .or_insert_with(|| {
                    let entry = LiveEntry {
                        order,
                        slots: Vec::new(),
                    };
                    order += 1;
                    entry
                })
                .slots
                .push(event.slot);
        } else {
            let Some(entry) = live.get_mut(&event.identifier) else {
                // A remove with no matching add means the compiler emitted a
                // malformed log. Recoverable here, but loud in debug builds.
                debug_assert!(false, "stack event removes unknown local '{}'", event.identifier);
                tracing::warn!("stack event removes unknown local '{}'", event.identifier);
                continue;
            };
            entry.slots.pop();
            if entry.slots.is_empty() {
                live.remove(&event.identifier);
            }
        }
    }

    let mut out: Vec<(usize, Arc<str>, i32)> = live
        .into_iter()
        .filter_map(|(id, entry)| entry.slots.last().map(|slot| (entry.order, id, *slot)))
        .collect();
    out.sort_by_key(|(order, _, _)| *order);
    out.into_iter().map(|(_, id, slot)| (id, slot)).collect()
}
