//! Typed property map with visibility scopes.
//!
//! Properties are the metadata half of a message: protocol headers, the
//! resolved operation name, correlation identifiers. Each value is stored
//! under a string name but read and written through a [`PropertyKey<T>`],
//! which fixes the value type and the visibility [`Scope`] at the definition
//! site instead of at every lookup.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Visibility of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Visible to application code and carried from the inbound message
    /// onto the response and fault messages.
    Application,
    /// Visible to interceptors only; stays on the message it was set on.
    Handler,
}

/// A typed key into [`Properties`].
///
/// ```
/// use phasebus_core::{Properties, PropertyKey};
///
/// const RETRIES: PropertyKey<u32> = PropertyKey::new("retries");
///
/// let mut props = Properties::new();
/// props.insert(&RETRIES, 3);
/// assert_eq!(props.get(&RETRIES), Some(&3));
/// ```
pub struct PropertyKey<T> {
    name: &'static str,
    scope: Scope,
    marker: PhantomData<fn() -> T>,
}

impl<T> PropertyKey<T> {
    /// Defines a handler-scoped key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            scope: Scope::Handler,
            marker: PhantomData,
        }
    }

    /// Defines an application-scoped key.
    #[must_use]
    pub const fn application(name: &'static str) -> Self {
        Self {
            name,
            scope: Scope::Application,
            marker: PhantomData,
        }
    }

    /// Returns the property name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the scope values are stored with.
    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.scope
    }
}

impl<T> Clone for PropertyKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PropertyKey<T> {}

impl<T> fmt::Debug for PropertyKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyKey")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    scope: Scope,
    value: Arc<dyn Any + Send + Sync>,
}

/// A map of named, typed, scoped property values.
///
/// Cloning is cheap: values are reference counted and shared between the
/// clones.
#[derive(Clone, Default)]
pub struct Properties {
    entries: HashMap<&'static str, Entry>,
}

impl Properties {
    /// Creates an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value under the same name.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: &PropertyKey<T>, value: T) {
        self.entries.insert(
            key.name,
            Entry {
                scope: key.scope,
                value: Arc::new(value),
            },
        );
    }

    /// Returns the value stored under `key`.
    ///
    /// Returns `None` when the name is absent or holds a value of another
    /// type.
    #[must_use]
    pub fn get<T: 'static>(&self, key: &PropertyKey<T>) -> Option<&T> {
        self.entries
            .get(key.name)
            .and_then(|entry| entry.value.downcast_ref())
    }

    /// Returns a clone of the value stored under `key`.
    #[must_use]
    pub fn get_cloned<T: Clone + 'static>(&self, key: &PropertyKey<T>) -> Option<T> {
        self.get(key).cloned()
    }

    /// Removes the value stored under `key`, returning whether one existed.
    pub fn remove<T>(&mut self, key: &PropertyKey<T>) -> bool {
        self.entries.remove(key.name).is_some()
    }

    /// Checks whether any value is stored under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the scope of the value stored under `name`.
    #[must_use]
    pub fn scope_of(&self, name: &str) -> Option<Scope> {
        self.entries.get(name).map(|entry| entry.scope)
    }

    /// Returns the number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no properties are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the stored property names in unspecified order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Copies every property of `scope` into `target`, keeping values that
    /// `target` already holds.
    pub fn copy_scope_into(&self, scope: Scope, target: &mut Self) {
        for (name, entry) in &self.entries {
            if entry.scope == scope {
                target.entries.entry(name).or_insert_with(|| entry.clone());
            }
        }
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self
            .entries
            .iter()
            .map(|(name, entry)| (*name, entry.scope))
            .collect();
        names.sort_unstable_by_key(|(name, _)| *name);
        f.debug_map().entries(names).finish()
    }
}

/// Well-known property keys.
pub mod keys {
    use super::{PropertyKey, Uuid};

    /// Operation the exchange targets, resolved while unmarshalling.
    pub const OPERATION: PropertyKey<String> = PropertyKey::application("phasebus.operation");

    /// Message identifier header supplied by the sender.
    pub const MESSAGE_ID: PropertyKey<String> = PropertyKey::new("message-id");

    /// Identifier of the request a response relates to.
    pub const RELATES_TO: PropertyKey<String> = PropertyKey::new("relates-to");

    /// Correlation identifier shared by every message of an exchange.
    pub const CORRELATION_ID: PropertyKey<Uuid> =
        PropertyKey::application("phasebus.correlation-id");

    /// Media type of the payload.
    pub const CONTENT_TYPE: PropertyKey<String> = PropertyKey::new("content-type");

    /// Set by a transport when the message it delivers is a fault response.
    pub const FAULT_RESPONSE: PropertyKey<bool> = PropertyKey::new("phasebus.fault-response");
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNT: PropertyKey<u32> = PropertyKey::new("count");
    const COUNT_AS_TEXT: PropertyKey<String> = PropertyKey::new("count");
    const TENANT: PropertyKey<String> = PropertyKey::application("tenant");

    #[test]
    fn test_insert_and_get() {
        let mut props = Properties::new();
        assert!(props.is_empty());

        props.insert(&COUNT, 7);
        assert_eq!(props.get(&COUNT), Some(&7));
        assert_eq!(props.get_cloned(&COUNT), Some(7));
        assert_eq!(props.len(), 1);
        assert!(props.contains("count"));
    }

    #[test]
    fn test_type_mismatch_reads_none() {
        let mut props = Properties::new();
        props.insert(&COUNT, 7);
        assert_eq!(props.get(&COUNT_AS_TEXT), None);
    }

    #[test]
    fn test_remove() {
        let mut props = Properties::new();
        props.insert(&COUNT, 1);
        assert!(props.remove(&COUNT));
        assert!(!props.remove(&COUNT));
        assert!(props.get(&COUNT).is_none());
    }

    #[test]
    fn test_scope_recorded_from_key() {
        let mut props = Properties::new();
        props.insert(&COUNT, 1);
        props.insert(&TENANT, "acme".to_string());

        assert_eq!(props.scope_of("count"), Some(Scope::Handler));
        assert_eq!(props.scope_of("tenant"), Some(Scope::Application));
        assert_eq!(props.scope_of("missing"), None);
    }

    #[test]
    fn test_copy_scope_into_keeps_existing() {
        const REGION: PropertyKey<String> = PropertyKey::application("region");

        let mut source = Properties::new();
        source.insert(&COUNT, 1);
        source.insert(&TENANT, "acme".to_string());
        source.insert(&REGION, "eu".to_string());

        let mut target = Properties::new();
        target.insert(&REGION, "us".to_string());
        source.copy_scope_into(Scope::Application, &mut target);

        assert_eq!(target.get(&TENANT).map(String::as_str), Some("acme"));
        assert_eq!(target.get(&REGION).map(String::as_str), Some("us"));
        assert!(target.get(&COUNT).is_none());
    }

    #[test]
    fn test_clone_shares_values() {
        let mut props = Properties::new();
        props.insert(&TENANT, "acme".to_string());
        let cloned = props.clone();
        props.insert(&TENANT, "other".to_string());

        assert_eq!(cloned.get(&TENANT).map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_debug_lists_names_sorted() {
        let mut props = Properties::new();
        props.insert(&TENANT, "acme".to_string());
        props.insert(&COUNT, 1);
        assert_eq!(
            format!("{props:?}"),
            r#"{"count": Handler, "tenant": Application}"#
        );
    }
}
