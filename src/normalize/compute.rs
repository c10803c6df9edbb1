//! Stage 1: one semantic event per logical change.

use crate::container::{Key, Structure};
use crate::event::{ChangeEvent, ChangeKind};
use crate::record::{RawKind, RawRecord};

/// Converts raw records into semantic events, preserving record order.
///
/// A splice expands in place into its removals, all reported at the splice
/// index (every removal shifts the next value onto that index), followed by
/// its additions at consecutive indices.
#[must_use]
pub fn compute_events(raw: &[RawRecord], structure: Structure) -> Vec<ChangeEvent> {
    let mut events = Vec::with_capacity(raw.len());

    for record in raw {
        if record.kind == RawKind::Splice {
            let Some(splice) = &record.splice else {
                continue;
            };

            for removed in &splice.removed {
                events.push(
                    ChangeEvent::new(ChangeKind::Remove, Key::Index(splice.index), record.subject.clone())
                        .with_old_value(Some(removed.clone())),
                );
            }
            for offset in 0..splice.added_count {
                events.push(ChangeEvent::new(
                    ChangeKind::Add,
                    Key::Index(splice.index + offset),
                    record.subject.clone(),
                ));
            }
            continue;
        }

        let key = record.key.clone().coerce(structure);
        let event = match record.kind {
            RawKind::Add => ChangeEvent::new(ChangeKind::Add, key, record.subject.clone()),
            RawKind::Update => ChangeEvent::new(ChangeKind::Update, key, record.subject.clone()),
            // Deleting a list slot empties it; the slot itself stays.
            RawKind::Delete if structure.is_list() => {
                ChangeEvent::new(ChangeKind::Update, key, record.subject.clone())
                    .with_value(Some(serde_json::Value::Null))
            }
            RawKind::Delete => ChangeEvent::new(ChangeKind::Remove, key, record.subject.clone()),
            RawKind::Reconfigure => ChangeEvent::new(ChangeKind::Reconfigure, key, record.subject.clone()),
            RawKind::SetPrototype => {
                ChangeEvent::new(ChangeKind::SetPrototype, key, record.subject.clone())
            }
            RawKind::Splice => continue,
        };
        events.push(event.with_old_value(record.old_value.clone()));
    }

    events
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::normalize::fixtures::{list, record};

    #[test]
    fn record_events_follow_record_order() {
        let subject = record(json!({}));
        let raw = vec![
            RawRecord::add(subject.clone(), "fruit"),
            RawRecord::update(subject.clone(), "fruit", json!("apple")),
            RawRecord::delete(subject.clone(), "fruit", json!("pear")),
        ];

        let events = compute_events(&raw, Structure::Record);
        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Update, ChangeKind::Remove]);
        assert_eq!(events[1].old_value, Some(json!("apple")));
        assert_eq!(events[2].old_value, Some(json!("pear")));
        assert!(events.iter().all(|e| e.value.is_none()));
    }

    #[test]
    fn splice_expands_removals_at_same_index_then_additions() {
        let subject = list(json!(["a", "x", "y", "d"]));
        let raw = vec![RawRecord::splice(
            subject,
            1,
            vec![json!("b"), json!("c")],
            2,
        )];

        let events = compute_events(&raw, Structure::List);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].kind, ChangeKind::Remove);
        assert_eq!(events[0].key, Key::Index(1));
        assert_eq!(events[0].old_value, Some(json!("b")));
        assert_eq!(events[1].kind, ChangeKind::Remove);
        assert_eq!(events[1].key, Key::Index(1));
        assert_eq!(events[2].kind, ChangeKind::Add);
        assert_eq!(events[2].key, Key::Index(1));
        assert_eq!(events[3].key, Key::Index(2));
    }

    #[test]
    fn list_delete_becomes_null_update_with_integer_key() {
        let subject = list(json!([Value::Null]));
        let raw = vec![RawRecord::delete(subject, "0", json!("banana"))];

        let events = compute_events(&raw, Structure::List);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Update);
        assert_eq!(events[0].key, Key::Index(0));
        assert_eq!(events[0].value, Some(Value::Null));
        assert_eq!(events[0].old_value, Some(json!("banana")));
    }

    #[test]
    fn reconfigure_and_set_prototype_pass_through() {
        let subject = record(json!({"a": 1}));
        let raw = vec![
            RawRecord::reconfigure(subject.clone(), "a", Some(json!(1))),
            RawRecord::set_prototype(subject, None),
        ];

        let events = compute_events(&raw, Structure::Record);
        assert_eq!(events[0].kind, ChangeKind::Reconfigure);
        assert_eq!(events[1].kind, ChangeKind::SetPrototype);
    }
}
