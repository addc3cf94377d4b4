use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::value::{Custom, CustomValue, Value};

type EncodeFn<T> = Box<dyn Fn(&T) -> EncodeResult<Value> + Send + Sync>;
type DecodeFn<T> = Box<dyn Fn(Value) -> DecodeResult<T> + Send + Sync>;

/// Encode/decode pair for one application type.
///
/// `encode` produces the fields container written under the type tag;
/// `decode` rebuilds an instance from that container.
pub struct Codec<T> {
    name: String,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

impl<T: CustomValue> Codec<T> {
    /// Codec with explicit encode and decode functions.
    pub fn new<E, D>(name: impl Into<String>, encode: E, decode: D) -> Self
    where
        E: Fn(&T) -> EncodeResult<Value> + Send + Sync + 'static,
        D: Fn(Value) -> DecodeResult<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }

    /// Type tag written on the wire.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Codec<T>
where
    T: CustomValue + Serialize + DeserializeOwned,
{
    /// Field-copy codec derived from the type's serde implementation.
    pub fn serde(name: impl Into<String>) -> Self {
        Self::new(
            name,
            |value: &T| Value::from_serialize(value),
            |fields: Value| fields.deserialize_into::<T>(),
        )
    }
}

impl<T> fmt::Debug for Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("name", &self.name)
            .field("type", &type_name::<T>())
            .finish()
    }
}

struct Entry {
    name: String,
    type_id: TypeId,
    encode: Box<dyn Fn(&dyn Any) -> EncodeResult<Value> + Send + Sync>,
    decode: Box<dyn Fn(Value) -> DecodeResult<Value> + Send + Sync>,
}

/// Codec table keyed by type tag, with a reverse index by Rust type.
///
/// Registering a tag again replaces the previous entry for that tag.
#[derive(Default)]
pub struct CodecRegistry {
    by_name: HashMap<String, Arc<Entry>>,
    by_type: HashMap<TypeId, Arc<Entry>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an explicit codec.
    pub fn register<T: CustomValue>(&mut self, codec: Codec<T>) {
        let Codec {
            name,
            encode,
            decode,
        } = codec;

        let entry = Arc::new(Entry {
            name: name.clone(),
            type_id: TypeId::of::<T>(),
            encode: Box::new(move |value: &dyn Any| match value.downcast_ref::<T>() {
                Some(value) => encode(value),
                None => Err(EncodeError::UnregisteredType(type_name::<T>())),
            }),
            decode: Box::new(move |fields| decode(fields).map(Value::custom)),
        });

        if let Some(replaced) = self.by_name.insert(name.clone(), Arc::clone(&entry)) {
            let stale = self
                .by_type
                .get(&replaced.type_id)
                .is_some_and(|current| current.name == name);
            if stale {
                self.by_type.remove(&replaced.type_id);
            }
        }
        self.by_type.insert(entry.type_id, entry);
        debug!(name = %name, ty = type_name::<T>(), "registered codec");
    }

    /// Register the serde-derived codec for `T` under `name`.
    pub fn register_serde<T>(&mut self, name: impl Into<String>)
    where
        T: CustomValue + Serialize + DeserializeOwned,
    {
        self.register(Codec::<T>::serde(name));
    }

    /// Whether a codec is registered for the tag.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered tags, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Encode a custom instance into `(tag, fields)`.
    pub fn encode_custom(&self, custom: &Custom) -> EncodeResult<(String, Value)> {
        let entry = self
            .by_type
            .get(&custom.type_id())
            .ok_or(EncodeError::UnregisteredType(custom.type_name()))?;
        let fields = (entry.encode)(custom.as_any()).map_err(|err| EncodeError::Codec {
            name: entry.name.clone(),
            message: err.to_string(),
        })?;
        Ok((entry.name.clone(), fields))
    }

    /// Rebuild an instance from its fields container.
    ///
    /// Returns `None` when no codec is registered for the tag.
    pub fn decode_tagged(&self, name: &str, fields: Value) -> Option<DecodeResult<Value>> {
        let entry = self.by_name.get(name)?;
        Some((entry.decode)(fields).map_err(|err| DecodeError::Codec {
            name: name.to_string(),
            message: err.to_string(),
        }))
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Pair(i64, i64);

    #[test]
    fn serde_codec_copies_fields() {
        let mut registry = CodecRegistry::new();
        registry.register_serde::<Counter>("Counter");

        let (name, fields) = registry
            .encode_custom(&Custom::new(Counter { count: 3 }))
            .unwrap();
        assert_eq!(name, "Counter");
        assert_eq!(fields.get("count").and_then(Value::as_i64), Some(3));

        let decoded = registry.decode_tagged("Counter", fields).unwrap().unwrap();
        assert_eq!(decoded.as_custom::<Counter>(), Some(&Counter { count: 3 }));
    }

    #[test]
    fn explicit_codec() {
        let mut registry = CodecRegistry::new();
        registry.register(Codec::new(
            "Pair",
            |p: &Pair| Ok(Value::from(vec![p.0, p.1])),
            |fields: Value| {
                let (a, b): (i64, i64) = fields.deserialize_into()?;
                Ok(Pair(a, b))
            },
        ));

        let (_, fields) = registry.encode_custom(&Custom::new(Pair(1, 2))).unwrap();
        assert_eq!(fields, Value::from(vec![1, 2]));
        let back = registry.decode_tagged("Pair", fields).unwrap().unwrap();
        assert_eq!(back.as_custom::<Pair>(), Some(&Pair(1, 2)));
    }

    #[test]
    fn unregistered_type_is_rejected() {
        let registry = CodecRegistry::new();
        let err = registry.encode_custom(&Custom::new(Pair(0, 0))).unwrap_err();
        assert!(matches!(err, EncodeError::UnregisteredType(_)));
        assert!(registry.decode_tagged("Pair", Value::Null).is_none());
    }

    #[test]
    fn last_registration_for_name_wins() {
        let mut registry = CodecRegistry::new();
        registry.register_serde::<Counter>("Thing");
        registry.register(Codec::new(
            "Thing",
            |p: &Pair| Ok(Value::from(vec![p.0, p.1])),
            |fields: Value| {
                let (a, b): (i64, i64) = fields.deserialize_into()?;
                Ok(Pair(a, b))
            },
        ));

        assert_eq!(registry.len(), 1);
        let back = registry
            .decode_tagged("Thing", Value::from(vec![4, 5]))
            .unwrap()
            .unwrap();
        assert!(back.as_custom::<Pair>().is_some());
        assert!(matches!(
            registry.encode_custom(&Custom::new(Counter { count: 0 })),
            Err(EncodeError::UnregisteredType(_))
        ));
    }

    #[test]
    fn decode_failure_names_the_codec() {
        let mut registry = CodecRegistry::new();
        registry.register_serde::<Counter>("Counter");
        let err = registry
            .decode_tagged("Counter", Value::from("not an object"))
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, DecodeError::Codec { ref name, .. } if name == "Counter"));
    }
}
