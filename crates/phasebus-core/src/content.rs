//! Typed content slots.
//!
//! A message body moves through several representations while it passes
//! through a chain: raw bytes, then typed parameters, then bytes again on the
//! way out. Each representation lives in its own slot keyed by its Rust type,
//! so at most one value per representation exists at a time and interceptors
//! replace a slot as they transform it.

use bytes::Bytes;
use serde_json::Value;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;

struct Slot {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

/// Content slots of a message, one per content type.
///
/// ```
/// use phasebus_core::{Contents, Payload};
///
/// let mut contents = Contents::new();
/// contents.set(Payload::from("{}"));
/// assert_eq!(contents.get::<Payload>().map(Payload::len), Some(2));
/// ```
#[derive(Default)]
pub struct Contents {
    slots: HashMap<TypeId, Slot>,
}

impl Contents {
    /// Creates an empty set of slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` in the slot for `T`, returning the previous content.
    pub fn set<T: Send + 'static>(&mut self, value: T) -> Option<T> {
        self.slots
            .insert(
                TypeId::of::<T>(),
                Slot {
                    type_name: type_name::<T>(),
                    value: Box::new(value),
                },
            )
            .and_then(|slot| slot.value.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Returns the content of the slot for `T`.
    #[must_use]
    pub fn get<T: Send + 'static>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.value.downcast_ref())
    }

    /// Returns mutable access to the slot for `T`.
    pub fn get_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.value.downcast_mut())
    }

    /// Empties the slot for `T`, returning its content.
    pub fn take<T: Send + 'static>(&mut self) -> Option<T> {
        self.slots
            .remove(&TypeId::of::<T>())
            .and_then(|slot| slot.value.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Checks whether the slot for `T` holds content.
    #[must_use]
    pub fn contains<T: Send + 'static>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Returns the type names of all filled slots, sorted.
    #[must_use]
    pub fn formats(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.values().map(|slot| slot.type_name).collect();
        names.sort_unstable();
        names
    }

    /// Returns `true` if every slot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Contents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.formats()).finish()
    }
}

/// Raw wire bytes of a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload(Bytes);

impl Payload {
    /// Wraps bytes as a payload.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the payload as UTF-8 text, lossily.
    #[must_use]
    pub fn to_text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

/// Ordered operation parameters (or results) as JSON values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters(Vec<Value>);

impl Parameters {
    /// Creates a parameter list.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Creates a single-value parameter list.
    #[must_use]
    pub fn single(value: Value) -> Self {
        Self(vec![value])
    }

    /// Creates an empty parameter list.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Returns the parameter at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Returns the parameters as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the list, returning its values.
    #[must_use]
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Parameters {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Parameters {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slots_are_independent() {
        let mut contents = Contents::new();
        contents.set(Payload::from("raw"));
        contents.set(Parameters::single(json!(1)));

        assert_eq!(contents.get::<Payload>().map(Payload::len), Some(3));
        assert_eq!(contents.get::<Parameters>().map(Parameters::len), Some(1));
        assert!(!contents.contains::<String>());
    }

    #[test]
    fn test_set_replaces_and_returns_previous() {
        let mut contents = Contents::new();
        assert!(contents.set(Payload::from("first")).is_none());

        let previous = contents.set(Payload::from("second"));
        assert_eq!(previous, Some(Payload::from("first")));
        assert_eq!(
            contents.get::<Payload>().map(Payload::to_text_lossy),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_take_empties_slot() {
        let mut contents = Contents::new();
        contents.set(Parameters::empty());

        assert_eq!(contents.take::<Parameters>(), Some(Parameters::empty()));
        assert!(contents.take::<Parameters>().is_none());
        assert!(contents.is_empty());
    }

    #[test]
    fn test_get_mut() {
        let mut contents = Contents::new();
        contents.set(vec![1_u8]);
        if let Some(bytes) = contents.get_mut::<Vec<u8>>() {
            bytes.push(2);
        }
        assert_eq!(contents.get::<Vec<u8>>(), Some(&vec![1, 2]));
    }

    #[test]
    fn test_formats_sorted() {
        let mut contents = Contents::new();
        contents.set(Payload::default());
        contents.set(Parameters::empty());

        let formats = contents.formats();
        assert_eq!(formats.len(), 2);
        assert!(formats.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(formats.iter().any(|name| name.ends_with("Payload")));
    }

    #[test]
    fn test_parameters_collect() {
        let params: Parameters = (1..=3).map(|n| json!(n)).collect();
        assert_eq!(params.len(), 3);
        assert_eq!(params.get(2), Some(&json!(3)));
        assert_eq!(params.into_inner(), vec![json!(1), json!(2), json!(3)]);
    }
}
