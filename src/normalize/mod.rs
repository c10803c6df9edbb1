//! Event normalization pipeline.
//!
//! Turns one raw record batch into the list of semantic events handed to
//! subscribers. Stages run in a fixed order, each one optional:
//!
//! 1. [`compute_events`]: one event per logical change (skipped for manual triggers)
//! 2. [`find_values`]: resolve new values (skipped with `drop_values`)
//! 3. [`minimal_events`]: net effect per value (`minimal_events`)
//! 4. [`no_update_events`]: updates as remove + add (`no_update_events`)
//!
//! The structural kind is fixed by the caller and passed to every stage.

/// Stage 1.
pub mod compute;
/// Stage 4.
pub mod expand;
/// Stage 3.
pub mod minimal;
/// Stage 2.
pub mod values;

use std::sync::Arc;

use chrono::Utc;

use crate::container::{Structure, Subject};
use crate::event::{BatchEvent, ChangeEvent, Event};
use crate::options::OutputOptions;
use crate::record::RawRecord;

pub use compute::compute_events;
pub use expand::no_update_events;
pub use minimal::minimal_events;
pub use values::find_values;

/// Result of normalizing one delivery.
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// The container the batch is about.
    pub subject: Subject,
    /// Raw records as delivered.
    pub raw: Arc<[RawRecord]>,
    /// Events after every enabled stage.
    pub computed: Vec<ChangeEvent>,
}

impl EventBatch {
    /// The events to dispatch: the batch event first, then the computed
    /// events unless `batch_only` is set.
    #[must_use]
    pub fn into_events(self, output: &OutputOptions) -> Vec<Event> {
        let computed: Arc<[ChangeEvent]> = self.computed.into();
        let mut events = Vec::with_capacity(if output.batch_only { 1 } else { computed.len() + 1 });

        events.push(Event::Batch(BatchEvent {
            subject: self.subject,
            raw: self.raw,
            computed: Arc::clone(&computed),
            delivered_at: Utc::now(),
        }));
        if !output.batch_only {
            events.extend(computed.iter().cloned().map(Event::Change));
        }

        events
    }
}

/// Runs the full pipeline over a raw batch delivered for `subject`.
///
/// `raw` must be about `subject` only; mixed batches are not detected.
#[must_use]
pub fn normalize(
    subject: &Subject,
    raw: Vec<RawRecord>,
    structure: Structure,
    output: &OutputOptions,
) -> EventBatch {
    let computed = compute_events(&raw, structure);
    EventBatch {
        subject: subject.clone(),
        computed: refine(computed, structure, output),
        raw: raw.into(),
    }
}

/// Runs the pipeline over events that were computed elsewhere.
///
/// Events that already carry a value keep it.
#[must_use]
pub fn normalize_computed(
    subject: &Subject,
    computed: Vec<ChangeEvent>,
    structure: Structure,
    output: &OutputOptions,
) -> EventBatch {
    EventBatch {
        subject: subject.clone(),
        computed: refine(computed, structure, output),
        raw: Vec::<RawRecord>::new().into(),
    }
}

fn refine(mut events: Vec<ChangeEvent>, structure: Structure, output: &OutputOptions) -> Vec<ChangeEvent> {
    if !output.drop_values {
        find_values(&mut events, structure);
    }
    if output.minimal_events {
        events = minimal_events(events, structure);
    }
    if output.no_update_events {
        events = no_update_events(events);
    }
    events
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::fixtures::{list, record};
    use super::*;
    use crate::container::Key;
    use crate::event::{ChangeKind, EventType};

    #[test]
    fn batch_event_comes_first_with_raw_and_computed() {
        let subject = record(json!({"fruit": "pea"}));
        let raw = vec![
            RawRecord::update(subject.clone(), "fruit", json!("apple")),
            RawRecord::update(subject.clone(), "fruit", json!("strawberry")),
        ];

        let output = OutputOptions::default();
        let events = normalize(&subject, raw, Structure::Record, &output).into_events(&output);

        assert_eq!(events.len(), 3);
        let batch = events[0].as_batch().unwrap();
        assert_eq!(batch.raw.len(), 2);
        assert_eq!(batch.computed.len(), 2);
        assert_eq!(events[1].event_type(), EventType::Update);
        assert_eq!(events[2].as_change().unwrap().value, Some(json!("pea")));
    }

    #[test]
    fn record_scenario_collapses_to_one_update() {
        let subject = record(json!({"fruit": "pea"}));
        let raw = vec![
            RawRecord::update(subject.clone(), "fruit", json!("apple")),
            RawRecord::update(subject.clone(), "fruit", json!("strawberry")),
        ];
        let output = OutputOptions {
            minimal_events: true,
            ..OutputOptions::default()
        };

        let batch = normalize(&subject, raw, Structure::Record, &output);
        assert_eq!(batch.raw.len(), 2);
        assert_eq!(batch.computed.len(), 1);
        assert_eq!(batch.computed[0].kind, ChangeKind::Update);
        assert_eq!(batch.computed[0].old_value, Some(json!("apple")));
        assert_eq!(batch.computed[0].value, Some(json!("pea")));
    }

    #[test]
    fn list_scenario_keeps_emitted_keys() {
        // ['apple'] ; push('pear') ; unshift('banana')
        let subject = list(json!(["banana", "apple", "pear"]));
        let raw = vec![
            RawRecord::splice(subject.clone(), 1, vec![], 1),
            RawRecord::splice(subject.clone(), 0, vec![], 1),
        ];

        let batch = normalize(&subject, raw, Structure::List, &OutputOptions::default());
        assert_eq!(batch.computed.len(), 2);
        assert_eq!(batch.computed[0].key, Key::Index(1));
        assert_eq!(batch.computed[0].value, Some(json!("pear")));
        assert_eq!(batch.computed[1].key, Key::Index(0));
        assert_eq!(batch.computed[1].value, Some(json!("banana")));
    }

    #[test]
    fn drop_values_leaves_values_unset() {
        let subject = record(json!({"a": 1}));
        let raw = vec![RawRecord::add(subject.clone(), "a")];
        let output = OutputOptions {
            drop_values: true,
            ..OutputOptions::default()
        };

        let batch = normalize(&subject, raw, Structure::Record, &output);
        assert_eq!(batch.computed[0].value, None);
    }

    #[test]
    fn batch_only_dispatches_single_event() {
        let subject = record(json!({"a": 1, "b": 2}));
        let raw = vec![
            RawRecord::add(subject.clone(), "a"),
            RawRecord::add(subject.clone(), "b"),
        ];
        let output = OutputOptions {
            batch_only: true,
            ..OutputOptions::default()
        };

        let events = normalize(&subject, raw, Structure::Record, &output).into_events(&output);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_batch().unwrap().computed.len(), 2);
    }

    #[test]
    fn minimal_then_no_update_on_record() {
        let subject = record(json!({"fruit": "cherry", "vegetable": "carrot"}));
        let raw = vec![
            RawRecord::update(subject.clone(), "fruit", json!("apple")),
            RawRecord::update(subject.clone(), "fruit", json!("banana")),
            RawRecord::update(subject.clone(), "fruit", json!("mango")),
            RawRecord::add(subject.clone(), "vegetable"),
        ];
        let output = OutputOptions {
            minimal_events: true,
            no_update_events: true,
            ..OutputOptions::default()
        };

        let batch = normalize(&subject, raw, Structure::Record, &output);
        let kinds: Vec<ChangeKind> = batch.computed.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Remove, ChangeKind::Add, ChangeKind::Add]);
        assert_eq!(batch.computed[0].old_value, Some(json!("apple")));
        assert_eq!(batch.computed[1].value, Some(json!("cherry")));
    }

    #[test]
    fn precomputed_events_skip_computation() {
        let subject = record(json!({"a": 1}));
        let computed = vec![ChangeEvent::new(ChangeKind::Update, Key::from("a"), subject.clone())];

        let batch = normalize_computed(&subject, computed, Structure::Record, &OutputOptions::default());
        assert!(batch.raw.is_empty());
        assert_eq!(batch.computed[0].value, Some(json!(1)));
    }
}
