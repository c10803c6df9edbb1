//! Stage 3: collapse the events about one value into their net effect.
//!
//! Record containers group events by key. List containers cannot: indices
//! move as values are inserted and removed, so each value is tracked through
//! the batch by the sequence of positions it occupies.

use std::collections::HashMap;

use crate::container::{Key, Structure};
use crate::event::{ChangeEvent, ChangeKind};

const REMOVED: isize = -1;

/// Events about one logical value, in batch order.
#[derive(Debug, Default)]
struct Target {
    /// Positions occupied during the batch; the last one is current, or
    /// `REMOVED` once the value left the list.
    positions: Vec<isize>,
    members: Vec<usize>,
}

impl Target {
    fn current(&self) -> Option<isize> {
        self.positions.last().copied()
    }
}

const fn is_tracked(kind: ChangeKind) -> bool {
    matches!(kind, ChangeKind::Add | ChangeKind::Update | ChangeKind::Remove)
}

/// Reduces `events` to the minimum needed to represent their net effect.
///
/// - Added then removed within the batch: all its events are dropped.
/// - Removed by the end of the batch: only the final removal is kept.
/// - Otherwise: only the first event is kept, carrying the final position
///   and, when resolved, the final value. A record key removed and then
///   re-added is reported as an update.
///
/// Surviving list events are stably sorted by index.
#[must_use]
pub fn minimal_events(events: Vec<ChangeEvent>, structure: Structure) -> Vec<ChangeEvent> {
    let targets = match structure {
        Structure::Record => group_by_key(&events),
        Structure::List => track_positions(&events),
    };

    let mut events: Vec<Option<ChangeEvent>> = events.into_iter().map(Some).collect();

    for target in &targets {
        let (Some(&first), Some(&last)) = (target.members.first(), target.members.last()) else {
            continue;
        };
        let last_kind = events[last].as_ref().map(|e| e.kind);
        let first_kind = events[first].as_ref().map(|e| e.kind);

        if last_kind == Some(ChangeKind::Remove) {
            if target.members.len() > 1 {
                let drop_last = first_kind == Some(ChangeKind::Add);
                for &i in &target.members[..target.members.len() - 1] {
                    events[i] = None;
                }
                if drop_last {
                    events[last] = None;
                }
            }
            continue;
        }

        let final_value = events[last].as_ref().and_then(|e| e.value.clone());
        for &i in &target.members[1..] {
            events[i] = None;
        }

        let Some(survivor) = events[first].as_mut() else {
            continue;
        };
        if survivor.kind == ChangeKind::Remove && !structure.is_list() {
            survivor.kind = ChangeKind::Update;
        }
        if let Some(value) = final_value {
            survivor.value = Some(value);
        }
        if structure.is_list() {
            if let Some(position) = target.current().and_then(|p| usize::try_from(p).ok()) {
                survivor.key = Key::Index(position);
            }
        }
    }

    let mut survivors: Vec<ChangeEvent> = events.into_iter().flatten().collect();
    if structure.is_list() {
        survivors.sort_by_key(|e| e.index());
    }
    survivors
}

fn group_by_key(events: &[ChangeEvent]) -> Vec<Target> {
    let mut by_key: HashMap<&Key, usize> = HashMap::new();
    let mut targets: Vec<Target> = Vec::new();

    for (i, event) in events.iter().enumerate() {
        if !is_tracked(event.kind) {
            continue;
        }
        let slot = *by_key.entry(&event.key).or_insert_with(|| {
            targets.push(Target::default());
            targets.len() - 1
        });
        targets[slot].members.push(i);
    }

    targets
}

fn track_positions(events: &[ChangeEvent]) -> Vec<Target> {
    let mut targets: Vec<Target> = Vec::new();

    for (i, event) in events.iter().enumerate() {
        if !is_tracked(event.kind) {
            continue;
        }
        let Some(at) = event.index().and_then(|i| isize::try_from(i).ok()) else {
            continue;
        };

        // An added value is always new; anything else may already be tracked.
        let tracked = if event.kind == ChangeKind::Add {
            None
        } else {
            targets.iter().position(|t| t.current() == Some(at))
        };
        let slot = tracked.unwrap_or_else(|| {
            targets.push(Target::default());
            targets.len() - 1
        });

        if matches!(event.kind, ChangeKind::Add | ChangeKind::Remove) {
            for target in &mut targets {
                let Some(current) = target.current() else {
                    continue;
                };
                if at < current {
                    let shifted = if event.kind == ChangeKind::Add { current + 1 } else { current - 1 };
                    target.positions.push(shifted);
                } else if at == current && event.kind == ChangeKind::Add {
                    target.positions.push(current + 1);
                }
            }
        }

        let target = &mut targets[slot];
        if event.kind == ChangeKind::Add || target.positions.is_empty() {
            target.positions.push(at);
        }
        if event.kind == ChangeKind::Remove {
            target.positions.push(REMOVED);
        }
        target.members.push(i);
    }

    targets
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::normalize::compute::compute_events;
    use crate::normalize::fixtures::{list, record};
    use crate::normalize::values::find_values;
    use crate::record::RawRecord;

    fn resolved(raw: &[RawRecord], structure: Structure) -> Vec<ChangeEvent> {
        let mut events = compute_events(raw, structure);
        find_values(&mut events, structure);
        events
    }

    fn summary(events: &[ChangeEvent]) -> Vec<(ChangeKind, Key)> {
        events.iter().map(|e| (e.kind, e.key.clone())).collect()
    }

    #[test]
    fn repeated_updates_collapse_to_first_with_final_value() {
        let subject = record(json!({"fruit": "cherry"}));
        let raw = vec![
            RawRecord::update(subject.clone(), "fruit", json!("apple")),
            RawRecord::update(subject.clone(), "fruit", json!("banana")),
            RawRecord::update(subject, "fruit", json!("mango")),
        ];

        let events = minimal_events(resolved(&raw, Structure::Record), Structure::Record);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Update);
        assert_eq!(events[0].old_value, Some(json!("apple")));
        assert_eq!(events[0].value, Some(json!("cherry")));
    }

    #[test]
    fn added_then_removed_key_disappears() {
        let subject = record(json!({}));
        let raw = vec![
            RawRecord::add(subject.clone(), "meat"),
            RawRecord::update(subject.clone(), "meat", json!("pork")),
            RawRecord::delete(subject, "meat", json!("chicken")),
        ];

        let events = minimal_events(resolved(&raw, Structure::Record), Structure::Record);
        assert!(events.is_empty());
    }

    #[test]
    fn updated_then_removed_keeps_only_removal() {
        let subject = record(json!({}));
        let raw = vec![
            RawRecord::update(subject.clone(), "tool", json!("saw")),
            RawRecord::delete(subject, "tool", json!("hammer")),
        ];

        let events = minimal_events(resolved(&raw, Structure::Record), Structure::Record);
        assert_eq!(summary(&events), vec![(ChangeKind::Remove, Key::from("tool"))]);
        assert_eq!(events[0].old_value, Some(json!("hammer")));
    }

    #[test]
    fn removed_then_added_key_becomes_update() {
        let subject = record(json!({"k": 0}));
        let raw = vec![
            RawRecord::delete(subject.clone(), "k", json!(5)),
            RawRecord::add(subject, "k"),
        ];

        let events = minimal_events(resolved(&raw, Structure::Record), Structure::Record);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Update);
        assert_eq!(events[0].old_value, Some(json!(5)));
        // A falsy final value still propagates.
        assert_eq!(events[0].value, Some(json!(0)));
    }

    #[test]
    fn single_change_batch_is_unchanged() {
        let subject = record(json!({"a": 1, "b": 2}));
        let raw = vec![
            RawRecord::add(subject.clone(), "a"),
            RawRecord::update(subject.clone(), "b", json!(1)),
            RawRecord::delete(subject, "c", json!(3)),
        ];

        let before = resolved(&raw, Structure::Record);
        let after = minimal_events(before.clone(), Structure::Record);
        assert_eq!(before, after);
    }

    #[test]
    fn list_added_then_removed_value_disappears_despite_shifts() {
        // ['x'] ; push('tmp') ; unshift('a') ; splice(2, 1)
        let subject = list(json!(["a", "x"]));
        let raw = vec![
            RawRecord::splice(subject.clone(), 1, vec![], 1),
            RawRecord::splice(subject.clone(), 0, vec![], 1),
            RawRecord::splice(subject, 2, vec![json!("tmp")], 0),
        ];

        let events = minimal_events(resolved(&raw, Structure::List), Structure::List);
        assert_eq!(summary(&events), vec![(ChangeKind::Add, Key::Index(0))]);
        assert_eq!(events[0].value, Some(json!("a")));
    }

    #[test]
    fn list_survivor_key_is_final_position() {
        // ['apple'] ; push('pear') ; unshift('banana')
        let subject = list(json!(["banana", "apple", "pear"]));
        let raw = vec![
            RawRecord::splice(subject.clone(), 1, vec![], 1),
            RawRecord::splice(subject, 0, vec![], 1),
        ];

        let events = minimal_events(resolved(&raw, Structure::List), Structure::List);
        assert_eq!(
            summary(&events),
            vec![(ChangeKind::Add, Key::Index(0)), (ChangeKind::Add, Key::Index(2))]
        );
        assert_eq!(events[0].value, Some(json!("banana")));
        assert_eq!(events[1].value, Some(json!("pear")));
    }

    #[test]
    fn consecutive_removals_at_same_index_stay_distinct() {
        // ['a', 'b', 'c'] ; splice(0, 2)
        let subject = list(json!(["c"]));
        let raw = vec![RawRecord::splice(subject, 0, vec![json!("a"), json!("b")], 0)];

        let events = minimal_events(resolved(&raw, Structure::List), Structure::List);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ChangeKind::Remove));
        assert_eq!(events[0].old_value, Some(json!("a")));
        assert_eq!(events[1].old_value, Some(json!("b")));
    }

    #[test]
    fn list_update_then_remove_keeps_removal() {
        // ['a', 'b'] ; [1] = 'z' ; unshift('n') ; splice(2, 1)
        let subject = list(json!(["n", "a"]));
        let raw = vec![
            RawRecord::update(subject.clone(), 1, json!("b")),
            RawRecord::splice(subject.clone(), 0, vec![], 1),
            RawRecord::splice(subject, 2, vec![json!("z")], 0),
        ];

        let events = minimal_events(resolved(&raw, Structure::List), Structure::List);
        assert_eq!(
            summary(&events),
            vec![(ChangeKind::Add, Key::Index(0)), (ChangeKind::Remove, Key::Index(2))]
        );
        assert_eq!(events[1].old_value, Some(json!("z")));
    }

    #[test]
    fn pass_through_kinds_are_kept() {
        let subject = record(json!({"a": 1}));
        let raw = vec![
            RawRecord::reconfigure(subject.clone(), "a", None),
            RawRecord::reconfigure(subject, "a", None),
        ];

        let events = minimal_events(resolved(&raw, Structure::Record), Structure::Record);
        assert_eq!(events.len(), 2);
    }
}
