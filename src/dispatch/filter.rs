//! Handler registrations and their filters.
//!
//! Event-type filters are written as space-separated tokens, each `type` or
//! `type.namespace`. Namespaces never gate delivery; they only group entries
//! so `off(".ns")` can remove them together.

use std::sync::Arc;

use crate::container::Key;
use crate::error::{ObserveError, ObserveResult};
use crate::event::{Event, EventType};

use super::Handler;

/// One entry of a type filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEntry {
    /// `None` only in removal patterns such as `.ns`.
    pub event_type: Option<EventType>,
    /// Namespace used to group entries for removal.
    pub namespace: Option<String>,
}

impl TypeEntry {
    /// Parses one `type`, `type.namespace` or `.namespace` token.
    ///
    /// # Errors
    /// `InvalidEventType` when the type part names no known event type.
    pub fn parse(token: &str) -> ObserveResult<Self> {
        let (name, namespace) = match token.split_once('.') {
            Some((name, ns)) => (name, Some(ns)),
            None => (token, None),
        };

        let event_type = if name.is_empty() { None } else { Some(name.parse()?) };
        let namespace = namespace.filter(|ns| !ns.is_empty()).map(str::to_string);

        if event_type.is_none() && namespace.is_none() {
            return Err(ObserveError::InvalidEventType {
                token: token.to_string(),
            });
        }

        Ok(Self { event_type, namespace })
    }

    /// Whether this entry, used as a removal pattern, matches `entry`.
    #[must_use]
    pub fn covers(&self, entry: &Self) -> bool {
        let type_matches = self.event_type.is_none() || self.event_type == entry.event_type;
        let ns_matches = self.namespace.is_none() || self.namespace == entry.namespace;
        type_matches && ns_matches
    }
}

/// Parses a whitespace-separated token list. Blank input means "no filter".
pub(crate) fn parse_tokens(tokens: Option<&str>) -> ObserveResult<Option<Vec<TypeEntry>>> {
    let Some(tokens) = tokens else {
        return Ok(None);
    };
    let entries = tokens
        .split_whitespace()
        .map(TypeEntry::parse)
        .collect::<ObserveResult<Vec<_>>>()?;

    Ok(if entries.is_empty() { None } else { Some(entries) })
}

/// Same as [`parse_tokens`] but every token must name a type.
pub(crate) fn parse_binding_tokens(tokens: Option<&str>) -> ObserveResult<Option<Vec<TypeEntry>>> {
    let entries = parse_tokens(tokens)?;
    if let Some(entries) = &entries {
        if let Some(bad) = entries.iter().find(|e| e.event_type.is_none()) {
            return Err(ObserveError::InvalidEventType {
                token: format!(".{}", bad.namespace.as_deref().unwrap_or_default()),
            });
        }
    }
    Ok(entries)
}

/// One handler bound with its filters.
#[derive(Clone)]
pub struct Registration {
    /// The bound handler.
    pub handler: Handler,
    /// Keys the handler is restricted to; `None` = all keys.
    pub names: Option<Vec<Key>>,
    /// Types the handler is restricted to; `None` = all types.
    pub types: Option<Vec<TypeEntry>>,
}

impl Registration {
    /// Binds `handler` with the given filters.
    #[must_use]
    pub fn new(handler: Handler, names: Option<Vec<Key>>, types: Option<Vec<TypeEntry>>) -> Self {
        Self { handler, names, types }
    }

    /// Whether `handler` is this registration's handler.
    #[must_use]
    pub fn is_handler(&self, handler: &Handler) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.handler).cast::<()>(),
            Arc::as_ptr(handler).cast::<()>(),
        )
    }

    /// Whether `event` passes both the name and the type filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        let name_ok = match &self.names {
            None => true,
            Some(names) => event.key().is_some_and(|key| names.contains(key)),
        };
        if !name_ok {
            return false;
        }

        match &self.types {
            None => true,
            Some(entries) => {
                let event_type = event.event_type();
                entries.iter().any(|e| e.event_type == Some(event_type))
            }
        }
    }

    /// Extends the type filter with `types`. An unfiltered side stays unfiltered.
    pub fn merge_types(&mut self, types: Option<Vec<TypeEntry>>) {
        match (&mut self.types, types) {
            (Some(current), Some(extra)) => {
                for entry in extra {
                    if !current.contains(&entry) {
                        current.push(entry);
                    }
                }
            }
            (current, _) => *current = None,
        }
    }

    /// Drops every type entry covered by one of `patterns`.
    ///
    /// Returns `true` when the registration should be removed entirely.
    /// Unfiltered registrations are left alone.
    pub fn remove_types(&mut self, patterns: &[TypeEntry]) -> bool {
        let Some(current) = &mut self.types else {
            return false;
        };
        current.retain(|entry| !patterns.iter().any(|p| p.covers(entry)));
        current.is_empty()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("handler", &Arc::as_ptr(&self.handler).cast::<()>())
            .field("names", &self.names)
            .field("types", &self.types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dispatch::handler;
    use crate::event::{ChangeEvent, ChangeKind};
    use crate::normalize::fixtures::record;

    fn change(kind: ChangeKind, key: &str) -> Event {
        Event::Change(ChangeEvent::new(kind, Key::from(key), record(json!({}))))
    }

    #[test]
    fn parses_type_and_namespace() {
        let entry = TypeEntry::parse("update.ns").unwrap();
        assert_eq!(entry.event_type, Some(EventType::Update));
        assert_eq!(entry.namespace.as_deref(), Some("ns"));

        let entry = TypeEntry::parse(".ns").unwrap();
        assert_eq!(entry.event_type, None);

        assert!(TypeEntry::parse("bogus").is_err());
        assert!(TypeEntry::parse(".").is_err());
    }

    #[test]
    fn blank_tokens_mean_no_filter() {
        assert_eq!(parse_tokens(Some("  ")).unwrap(), None);
        assert_eq!(parse_tokens(None).unwrap(), None);
        assert_eq!(parse_tokens(Some("add remove")).unwrap().unwrap().len(), 2);
        assert!(parse_binding_tokens(Some(".ns")).is_err());
    }

    #[test]
    fn namespace_does_not_gate_delivery() {
        let reg = Registration::new(handler(|_| {}), None, parse_tokens(Some("update.ns")).unwrap());
        assert!(reg.matches(&change(ChangeKind::Update, "a")));
        assert!(!reg.matches(&change(ChangeKind::Add, "a")));
    }

    #[test]
    fn name_filter_restricts_keys_and_skips_batch() {
        let reg = Registration::new(handler(|_| {}), Some(vec![Key::from("fruit")]), None);
        assert!(reg.matches(&change(ChangeKind::Update, "fruit")));
        assert!(!reg.matches(&change(ChangeKind::Update, "veg")));
    }

    #[test]
    fn namespace_only_pattern_removes_across_types() {
        let mut reg = Registration::new(
            handler(|_| {}),
            None,
            parse_tokens(Some("add.ns update.ns remove")).unwrap(),
        );
        let patterns = parse_tokens(Some(".ns")).unwrap().unwrap();
        assert!(!reg.remove_types(&patterns));
        assert_eq!(reg.types.as_ref().unwrap().len(), 1);

        let patterns = parse_tokens(Some("remove")).unwrap().unwrap();
        assert!(reg.remove_types(&patterns));
    }

    #[test]
    fn merge_extends_and_unfiltered_absorbs() {
        let mut reg = Registration::new(handler(|_| {}), None, parse_tokens(Some("add")).unwrap());
        reg.merge_types(parse_tokens(Some("add update")).unwrap());
        assert_eq!(reg.types.as_ref().unwrap().len(), 2);

        reg.merge_types(None);
        assert!(reg.types.is_none());
        assert!(!reg.remove_types(&parse_tokens(Some("add")).unwrap().unwrap()));
    }

    #[test]
    fn handler_identity_is_the_allocation() {
        let h = handler(|_| {});
        let reg = Registration::new(Arc::clone(&h), None, None);
        assert!(reg.is_handler(&h));
        assert!(!reg.is_handler(&handler(|_| {})));
    }
}
