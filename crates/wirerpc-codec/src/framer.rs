use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DecodeError, DecodeResult, EncodeResult};
use crate::registry::{Codec, CodecRegistry};
use crate::value::{CustomValue, Value};

/// Wire field holding a custom value's type tag.
pub const CLASS_TAG: &str = "$class";

/// Wire field holding a custom value's fields container.
pub const PROPS_TAG: &str = "$props";

/// Converts values to and from opaque payloads.
pub trait Framer: Send + Sync {
    fn encode(&self, value: &Value) -> EncodeResult<Bytes>;
    fn decode(&self, payload: &[u8]) -> DecodeResult<Value>;
}

/// JSON payload encoding with tagged custom values.
///
/// A registered custom value is written as
/// `{"$class": <tag>, "$props": <fields>}`. Objects carrying an unknown tag
/// decode as plain objects.
#[derive(Debug, Default)]
pub struct JsonFramer {
    registry: RwLock<CodecRegistry>,
}

impl JsonFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: CodecRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
        }
    }

    /// Register an explicit codec.
    pub fn register<T: CustomValue>(&self, codec: Codec<T>) -> &Self {
        self.registry.write().register(codec);
        self
    }

    /// Register the serde field-copy codec for `T`.
    pub fn register_type<T>(&self, name: impl Into<String>) -> &Self
    where
        T: CustomValue + Serialize + DeserializeOwned,
    {
        self.registry.write().register_serde::<T>(name);
        self
    }

    /// Registered type tags, sorted.
    pub fn registered(&self) -> Vec<String> {
        self.registry
            .read()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn to_wire(registry: &CodecRegistry, value: &Value) -> EncodeResult<serde_json::Value> {
        Ok(match value {
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| Self::to_wire(registry, item))
                    .collect::<EncodeResult<_>>()?,
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::to_wire(registry, v)?)))
                    .collect::<EncodeResult<_>>()?,
            ),
            Value::Custom(custom) => {
                let (name, fields) = registry.encode_custom(custom)?;
                let mut wrapper = serde_json::Map::new();
                wrapper.insert(CLASS_TAG.to_string(), serde_json::Value::String(name));
                wrapper.insert(PROPS_TAG.to_string(), Self::to_wire(registry, &fields)?);
                serde_json::Value::Object(wrapper)
            }
            scalar => scalar.to_json()?,
        })
    }

    fn from_wire(registry: &CodecRegistry, json: serde_json::Value) -> DecodeResult<Value> {
        match json {
            serde_json::Value::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(|item| Self::from_wire(registry, item))
                    .collect::<DecodeResult<_>>()?,
            )),
            serde_json::Value::Object(mut map) => {
                let tag = match map.get(CLASS_TAG) {
                    Some(serde_json::Value::String(tag)) if registry.contains(tag) => {
                        Some(tag.clone())
                    }
                    _ => None,
                };
                if let Some(tag) = tag {
                    let props = map.remove(PROPS_TAG).ok_or_else(|| DecodeError::Codec {
                        name: tag.clone(),
                        message: format!("missing {PROPS_TAG}"),
                    })?;
                    let fields = Self::from_wire(registry, props)?;
                    if let Some(decoded) = registry.decode_tagged(&tag, fields) {
                        return decoded;
                    }
                }
                Ok(Value::Object(
                    map.into_iter()
                        .map(|(k, v)| Ok((k, Self::from_wire(registry, v)?)))
                        .collect::<DecodeResult<_>>()?,
                ))
            }
            scalar => Ok(Value::from_json(scalar)),
        }
    }
}

impl Framer for JsonFramer {
    fn encode(&self, value: &Value) -> EncodeResult<Bytes> {
        let wire = Self::to_wire(&self.registry.read(), value)?;
        Ok(Bytes::from(serde_json::to_vec(&wire)?))
    }

    fn decode(&self, payload: &[u8]) -> DecodeResult<Value> {
        let wire: serde_json::Value = serde_json::from_slice(payload)?;
        Self::from_wire(&self.registry.read(), wire)
    }
}
