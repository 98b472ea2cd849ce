//! One-time, read-only traversal of a concrete message into wrapped values.
//!
//! Decomposition is lazy: wrapping a message records it unchanged, and the
//! field table is only materialized on the first keyed access into the object.
//! Map fields are normalized here from either native representation — a native
//! map value, or a list of typed map-entry messages — into the single internal
//! string-keyed model.

use std::collections::HashMap;
use std::sync::Arc;

use prost_reflect::{DynamicMessage, FieldDescriptor, MapKey, MessageDescriptor, ReflectMessage};
use prost_reflect::Value as ProtoValue;

use crate::objects::{
    AnyValue, FieldTable, ListValue, MapSlot, MapValue, ObjectValue, Primitive, PrimitiveValue,
    Value, ANY_TYPE,
};
use crate::{BridgeError, SchemaRegistry};

/// Wraps a concrete message, dispatching on whether it is an `Any` envelope.
pub(crate) fn wrap_message(
    message: DynamicMessage,
    field: Option<FieldDescriptor>,
    registry: SchemaRegistry,
) -> Result<Value, BridgeError> {
    let message = Arc::new(message);
    if message.descriptor().full_name() == ANY_TYPE {
        Ok(Value::Any(AnyValue::from_envelope(message, field, registry)?))
    } else {
        Ok(Value::Object(ObjectValue::new(message, field, registry)))
    }
}

/// Wraps one field's native value according to its declared kind.
pub(crate) fn wrap_field(
    native: ProtoValue,
    field: &FieldDescriptor,
    registry: &SchemaRegistry,
) -> Result<Value, BridgeError> {
    if field.is_map() {
        return wrap_map(native, field, registry);
    }
    if field.is_list() {
        let items = match native {
            ProtoValue::List(items) => items,
            other => vec![other],
        };
        let mut elements = Vec::with_capacity(items.len());
        for item in items {
            elements.push(wrap_single(item, Some(field.clone()), registry)?);
        }
        return Ok(Value::List(ListValue::new(
            elements,
            field.clone(),
            registry.clone(),
        )));
    }
    wrap_single(native, Some(field.clone()), registry)
}

/// Wraps a non-repeated native value: messages become objects (or `Any`
/// envelopes), scalars become primitives.
fn wrap_single(
    native: ProtoValue,
    field: Option<FieldDescriptor>,
    registry: &SchemaRegistry,
) -> Result<Value, BridgeError> {
    let primitive = match native {
        ProtoValue::Message(message) => {
            return wrap_message(message, field, registry.clone());
        }
        ProtoValue::Bool(v) => Primitive::Bool(v),
        ProtoValue::I32(v) => Primitive::I32(v),
        ProtoValue::I64(v) => Primitive::I64(v),
        ProtoValue::U32(v) => Primitive::U32(v),
        ProtoValue::U64(v) => Primitive::U64(v),
        ProtoValue::F32(v) => Primitive::F32(v),
        ProtoValue::F64(v) => Primitive::F64(v),
        ProtoValue::String(v) => Primitive::String(v),
        ProtoValue::Bytes(v) => Primitive::Bytes(v),
        ProtoValue::EnumNumber(v) => Primitive::Enum(v),
        ProtoValue::List(_) => {
            return Err(BridgeError::internal("unexpected nested list value"));
        }
        ProtoValue::Map(_) => {
            return Err(BridgeError::internal("unexpected nested map value"));
        }
    };
    Ok(Value::Primitive(PrimitiveValue::new(primitive)))
}

fn map_entry_descriptor(field: &FieldDescriptor) -> Result<MessageDescriptor, BridgeError> {
    match field.kind() {
        prost_reflect::Kind::Message(entry) if entry.is_map_entry() => Ok(entry),
        _ => Err(BridgeError::internal("map field without a map-entry descriptor")),
    }
}

fn wrap_map(
    native: ProtoValue,
    field: &FieldDescriptor,
    registry: &SchemaRegistry,
) -> Result<Value, BridgeError> {
    let entry = map_entry_descriptor(field)?;
    let value_field = entry.map_entry_value_field();
    let entries = normalize_entries(native, field, &value_field, registry)?;
    Ok(Value::Map(MapValue::new(
        entries,
        field.clone(),
        value_field,
        registry.clone(),
    )))
}

/// Normalizes either native map representation into the internal model.
///
/// Accepted shapes: a native map value keyed by `MapKey`, or a list of typed
/// map-entry messages carrying `key`/`value` fields. Only string keys are
/// supported.
fn normalize_entries(
    native: ProtoValue,
    field: &FieldDescriptor,
    value_field: &FieldDescriptor,
    registry: &SchemaRegistry,
) -> Result<HashMap<String, MapSlot>, BridgeError> {
    match native {
        ProtoValue::Map(map) => {
            let mut entries = HashMap::with_capacity(map.len());
            for (key, value) in map {
                let key = string_key(&key)?;
                let wrapped = wrap_single(value.clone(), Some(value_field.clone()), registry)?;
                entries.insert(
                    key,
                    MapSlot {
                        value: wrapped,
                        original: Some(value),
                    },
                );
            }
            Ok(entries)
        }
        ProtoValue::List(items) => {
            let entry = map_entry_descriptor(field)?;
            let key_field = entry.map_entry_key_field();
            let mut entries = HashMap::with_capacity(items.len());
            for item in items {
                let message = match item {
                    ProtoValue::Message(message) => message,
                    other => {
                        return Err(BridgeError::TypeMismatch {
                            expected: "map entry message".to_owned(),
                            actual: proto_value_label(&other).to_owned(),
                        })
                    }
                };
                let key = match message.get_field(&key_field).into_owned() {
                    ProtoValue::String(key) => key,
                    other => {
                        return Err(BridgeError::TypeMismatch {
                            expected: "string".to_owned(),
                            actual: proto_value_label(&other).to_owned(),
                        })
                    }
                };
                let value = message.get_field(value_field).into_owned();
                let wrapped = wrap_single(value.clone(), Some(value_field.clone()), registry)?;
                entries.insert(
                    key,
                    MapSlot {
                        value: wrapped,
                        original: Some(value),
                    },
                );
            }
            Ok(entries)
        }
        other => Err(BridgeError::TypeMismatch {
            expected: "map".to_owned(),
            actual: proto_value_label(&other).to_owned(),
        }),
    }
}

fn string_key(key: &MapKey) -> Result<String, BridgeError> {
    match key {
        MapKey::String(key) => Ok(key.clone()),
        other => Err(BridgeError::TypeMismatch {
            expected: "string".to_owned(),
            actual: format!("{other:?}"),
        }),
    }
}

fn proto_value_label(value: &ProtoValue) -> &'static str {
    match value {
        ProtoValue::Bool(_) => "bool",
        ProtoValue::I32(_) => "int32",
        ProtoValue::I64(_) => "int64",
        ProtoValue::U32(_) => "uint32",
        ProtoValue::U64(_) => "uint64",
        ProtoValue::F32(_) => "float",
        ProtoValue::F64(_) => "double",
        ProtoValue::String(_) => "string",
        ProtoValue::Bytes(_) => "bytes",
        ProtoValue::EnumNumber(_) => "enum",
        ProtoValue::Message(_) => "message",
        ProtoValue::List(_) => "list",
        ProtoValue::Map(_) => "map",
    }
}

impl ObjectValue {
    /// Materializes the field table on first access. Every schema field is
    /// visited once, in schema order, and wrapped according to its declared
    /// kind; the source message is never mutated.
    pub(crate) fn table_mut(&mut self) -> Result<&mut HashMap<String, Value>, BridgeError> {
        if matches!(self.table, FieldTable::NotDecomposed) {
            let descriptor = self.message.descriptor();
            let mut table = HashMap::with_capacity(descriptor.fields().count());
            for field in descriptor.fields() {
                let native = self.message.get_field(&field).into_owned();
                table.insert(
                    field.name().to_owned(),
                    wrap_field(native, &field, &self.registry)?,
                );
            }
            self.table = FieldTable::Decomposed(table);
        }
        match &mut self.table {
            FieldTable::Decomposed(table) => Ok(table),
            FieldTable::NotDecomposed => {
                Err(BridgeError::internal("field table missing after decompose"))
            }
        }
    }
}

impl AnyValue {
    /// Wraps an `Any` envelope, eagerly extracting the type URL. The payload
    /// bytes stay untouched until first access into the value.
    pub(crate) fn from_envelope(
        message: Arc<DynamicMessage>,
        field: Option<FieldDescriptor>,
        registry: SchemaRegistry,
    ) -> Result<Self, BridgeError> {
        let type_url = match message.get_field(&any_field(&message, "type_url")?).into_owned() {
            ProtoValue::String(url) => url,
            other => {
                return Err(BridgeError::TypeMismatch {
                    expected: "string".to_owned(),
                    actual: proto_value_label(&other).to_owned(),
                })
            }
        };
        Ok(AnyValue {
            message,
            type_url,
            field,
            registry,
            resolved: None,
            type_slot: None,
            modified: false,
        })
    }

    /// Unpacks the payload against the schema registry, once.
    pub(crate) fn ensure_resolved(&mut self) -> Result<&mut Value, BridgeError> {
        if self.resolved.is_none() {
            let descriptor = self.registry.resolve(&self.type_url)?;
            let bytes = match self.message.get_field(&any_field(&self.message, "value")?).into_owned()
            {
                ProtoValue::Bytes(bytes) => bytes,
                other => {
                    return Err(BridgeError::TypeMismatch {
                        expected: "bytes".to_owned(),
                        actual: proto_value_label(&other).to_owned(),
                    })
                }
            };
            let payload = DynamicMessage::decode(descriptor, bytes)
                .map_err(|e| BridgeError::Serialization(e.to_string()))?;
            let wrapped = wrap_message(payload, self.field.clone(), self.registry.clone())?;
            self.resolved = Some(Box::new(wrapped));
        }
        match &mut self.resolved {
            Some(resolved) => Ok(resolved),
            None => Err(BridgeError::UnresolvedAnyType(self.type_url.clone())),
        }
    }
}

fn any_field(message: &DynamicMessage, name: &str) -> Result<FieldDescriptor, BridgeError> {
    message
        .descriptor()
        .get_field_by_name(name)
        .ok_or_else(|| BridgeError::internal(format!("Any envelope without a {name} field")))
}
