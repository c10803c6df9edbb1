//! Stage 4: model every update as a teardown followed by a recreation.

use crate::event::{ChangeEvent, ChangeKind};

/// Replaces each update with a remove carrying `old_value` and an add
/// carrying `value`, at the same key.
#[must_use]
pub fn no_update_events(events: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut out = Vec::with_capacity(events.len());

    for event in events {
        if event.kind != ChangeKind::Update {
            out.push(event);
            continue;
        }

        let ChangeEvent {
            key,
            subject,
            old_value,
            value,
            ..
        } = event;
        out.push(ChangeEvent::new(ChangeKind::Remove, key.clone(), subject.clone()).with_old_value(old_value));
        out.push(ChangeEvent::new(ChangeKind::Add, key, subject).with_value(value));
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::container::Key;
    use crate::normalize::fixtures::record;

    #[test]
    fn update_becomes_remove_then_add() {
        let subject = record(json!({"fruit": "pear", "veg": "pea"}));
        let events = vec![
            ChangeEvent::new(ChangeKind::Update, Key::from("fruit"), subject.clone())
                .with_old_value(Some(json!("apple")))
                .with_value(Some(json!("pear"))),
            ChangeEvent::new(ChangeKind::Add, Key::from("veg"), subject).with_value(Some(json!("pea"))),
        ];

        let out = no_update_events(events);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind, ChangeKind::Remove);
        assert_eq!(out[0].old_value, Some(json!("apple")));
        assert_eq!(out[0].value, None);
        assert_eq!(out[1].kind, ChangeKind::Add);
        assert_eq!(out[1].key, Key::from("fruit"));
        assert_eq!(out[1].value, Some(json!("pear")));
        assert_eq!(out[1].old_value, None);
        assert_eq!(out[2].key, Key::from("veg"));
    }
}
