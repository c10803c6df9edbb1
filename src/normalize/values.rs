//! Stage 2: resolve the new value of every add and update event.
//!
//! Primitives only report old values. The value an add or update produced is
//! the `old_value` of the next update or removal of the same slot in the
//! batch, or the container's current value when nothing later touches it.

use serde_json::Value;

use crate::container::{Key, Structure};
use crate::event::{ChangeEvent, ChangeKind};

/// Fills `value` on add and update events that have none yet.
pub fn find_values(events: &mut [ChangeEvent], structure: Structure) {
    for i in 0..events.len() {
        let event = &events[i];
        if !event.kind.carries_value() || event.value.is_some() {
            continue;
        }

        let resolved = match (structure, event.index()) {
            (Structure::List, Some(start)) => resolve_list(events, i, start),
            _ => resolve_record(events, i),
        };
        events[i].value = resolved;
    }
}

fn resolve_record(events: &[ChangeEvent], at: usize) -> Option<Value> {
    let event = &events[at];
    let later = events[at + 1..]
        .iter()
        .find(|e| e.key == event.key && matches!(e.kind, ChangeKind::Update | ChangeKind::Remove))
        .and_then(|e| e.old_value.clone());

    later.or_else(|| event.subject.get(&event.key))
}

/// Walks forward tracking where the value at `start` moves to as later
/// additions and removals at or before it shift the list.
fn resolve_list(events: &[ChangeEvent], at: usize, start: usize) -> Option<Value> {
    let mut moving = start;
    let mut found = None;

    for e in &events[at + 1..] {
        let Some(index) = e.index() else {
            continue;
        };

        if moving > index {
            match e.kind {
                ChangeKind::Add => moving += 1,
                ChangeKind::Remove => moving -= 1,
                _ => {}
            }
        } else if moving == index {
            match e.kind {
                ChangeKind::Add => moving += 1,
                ChangeKind::Update | ChangeKind::Remove => {
                    found = e.old_value.clone();
                    break;
                }
                _ => {}
            }
        }
    }

    found.or_else(|| events[at].subject.get(&Key::Index(moving)))
}
