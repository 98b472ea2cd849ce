//! Runtime-to-schema type coercion and validation for `set`/`append`.
//!
//! Every store goes through here before anything is written: scalars are
//! width-normalized to the declared kind (checked, never truncating), generic
//! container literals are admitted only when empty, and already-wrapped values
//! must carry a schema compatible with the target field. Failures leave the
//! target untouched.

use std::collections::HashMap;

use prost_reflect::{FieldDescriptor, Kind};

use crate::objects::{
    ListValue, MapValue, NullValue, Primitive, PrimitiveValue, ScriptValue, Value, ANY_TYPE,
};
use crate::{BridgeError, SchemaRegistry};

/// Validates and wraps a script value destined for an object field or a map
/// entry value. The returned value is flagged modified.
pub(crate) fn value_for_field(
    input: ScriptValue,
    field: &FieldDescriptor,
    registry: &SchemaRegistry,
) -> Result<Value, BridgeError> {
    let mut stored = match input {
        ScriptValue::Null | ScriptValue::Value(Value::Null(_)) => {
            if field.is_list() || field.is_map() {
                return Err(BridgeError::CannotSetNullToContainer);
            }
            Value::Null(NullValue { modified: false })
        }
        ScriptValue::Scalar(primitive) => {
            if field.is_list() || field.is_map() {
                return Err(BridgeError::TypeMismatch {
                    expected: if field.is_map() { "map" } else { "list" }.to_owned(),
                    actual: primitive.kind_name().to_owned(),
                });
            }
            Value::Primitive(PrimitiveValue::new(coerce_scalar(primitive, &field.kind())?))
        }
        ScriptValue::List(items) => {
            if !field.is_list() {
                return Err(BridgeError::SchemaMismatch {
                    field_type: kind_label(&field.kind()),
                    value_type: "list literal".to_owned(),
                });
            }
            if !items.is_empty() {
                return Err(BridgeError::TypeMismatch {
                    expected: "empty list literal".to_owned(),
                    actual: format!("list literal with {} elements", items.len()),
                });
            }
            Value::List(ListValue::new(Vec::new(), field.clone(), registry.clone()))
        }
        ScriptValue::Map(entries) => {
            if !field.is_map() {
                return Err(BridgeError::SchemaMismatch {
                    field_type: kind_label(&field.kind()),
                    value_type: "map literal".to_owned(),
                });
            }
            if !entries.is_empty() {
                return Err(BridgeError::TypeMismatch {
                    expected: "empty map literal".to_owned(),
                    actual: format!("map literal with {} entries", entries.len()),
                });
            }
            empty_map(field, registry)?
        }
        ScriptValue::Value(value) => {
            check_wrapped(&value, field)?;
            value
        }
    };
    stored.mark_modified();
    Ok(stored)
}

/// Validates and wraps a script value destined for one list element. The list
/// field descriptor describes the element type here, so container checks apply
/// to the element, not the field's repeatedness.
pub(crate) fn value_for_element(
    input: ScriptValue,
    field: &FieldDescriptor,
    registry: &SchemaRegistry,
) -> Result<Value, BridgeError> {
    let mut stored = match input {
        ScriptValue::Null | ScriptValue::Value(Value::Null(_)) => {
            return Err(BridgeError::CannotSetNullToContainer);
        }
        ScriptValue::Scalar(primitive) => {
            Value::Primitive(PrimitiveValue::new(coerce_scalar(primitive, &field.kind())?))
        }
        ScriptValue::List(_) | ScriptValue::Map(_) => {
            return Err(BridgeError::TypeMismatch {
                expected: kind_label(&field.kind()),
                actual: "container literal".to_owned(),
            });
        }
        ScriptValue::Value(value) => {
            check_wrapped_element(&value, field)?;
            value
        }
    };
    stored.mark_modified();
    Ok(stored)
}

/// Normalizes a scalar to the declared kind. Widening between the two widths
/// of the same numeric family always succeeds; narrowing is range-checked.
/// The result's runtime kind always equals the declared kind.
pub(crate) fn coerce_scalar(value: Primitive, kind: &Kind) -> Result<Primitive, BridgeError> {
    let mismatch = |value: &Primitive| BridgeError::TypeMismatch {
        expected: kind_label(kind),
        actual: value.kind_name().to_owned(),
    };
    match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => match value {
            Primitive::I32(v) => Ok(Primitive::I32(v)),
            Primitive::I64(v) => i32::try_from(v)
                .map(Primitive::I32)
                .map_err(|_| mismatch(&Primitive::I64(v))),
            other => Err(mismatch(&other)),
        },
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => match value {
            Primitive::I64(v) => Ok(Primitive::I64(v)),
            Primitive::I32(v) => Ok(Primitive::I64(i64::from(v))),
            other => Err(mismatch(&other)),
        },
        Kind::Uint32 | Kind::Fixed32 => match value {
            Primitive::U32(v) => Ok(Primitive::U32(v)),
            Primitive::U64(v) => u32::try_from(v)
                .map(Primitive::U32)
                .map_err(|_| mismatch(&Primitive::U64(v))),
            other => Err(mismatch(&other)),
        },
        Kind::Uint64 | Kind::Fixed64 => match value {
            Primitive::U64(v) => Ok(Primitive::U64(v)),
            Primitive::U32(v) => Ok(Primitive::U64(u64::from(v))),
            other => Err(mismatch(&other)),
        },
        Kind::Float => match value {
            Primitive::F32(v) => Ok(Primitive::F32(v)),
            Primitive::F64(v) => Ok(Primitive::F32(v as f32)),
            other => Err(mismatch(&other)),
        },
        Kind::Double => match value {
            Primitive::F64(v) => Ok(Primitive::F64(v)),
            Primitive::F32(v) => Ok(Primitive::F64(f64::from(v))),
            other => Err(mismatch(&other)),
        },
        Kind::Bool => match value {
            Primitive::Bool(v) => Ok(Primitive::Bool(v)),
            other => Err(mismatch(&other)),
        },
        Kind::String => match value {
            Primitive::String(v) => Ok(Primitive::String(v)),
            other => Err(mismatch(&other)),
        },
        Kind::Bytes => match value {
            Primitive::Bytes(v) => Ok(Primitive::Bytes(v)),
            other => Err(mismatch(&other)),
        },
        Kind::Enum(_) | Kind::Message(_) => Err(mismatch(&value)),
    }
}

/// Compatibility check for storing an already-wrapped value into an object
/// field or map entry value: the source and target must share the same
/// underlying schema type.
fn check_wrapped(value: &Value, field: &FieldDescriptor) -> Result<(), BridgeError> {
    match value {
        Value::Object(object) => match field.kind() {
            Kind::Message(target)
                if !field.is_list()
                    && !field.is_map()
                    && target.full_name() == object.descriptor().full_name() =>
            {
                Ok(())
            }
            _ => Err(schema_mismatch(field, &object.descriptor().full_name().to_owned())),
        },
        Value::Any(_) => match field.kind() {
            Kind::Message(target) if !field.is_list() && target.full_name() == ANY_TYPE => Ok(()),
            _ => Err(schema_mismatch(field, ANY_TYPE)),
        },
        Value::List(list) => {
            if field.is_list() && !field.is_map() && kinds_match(&list.field.kind(), &field.kind())
            {
                Ok(())
            } else {
                Err(schema_mismatch(field, &format!("list of {}", kind_label(&list.field.kind()))))
            }
        }
        Value::Map(map) => {
            if field.is_map() && map_fields_match(map, field) {
                Ok(())
            } else {
                Err(schema_mismatch(
                    field,
                    &format!("map of {}", kind_label(&map.value_field.kind())),
                ))
            }
        }
        Value::Primitive(primitive) => Err(schema_mismatch(field, primitive.value.kind_name())),
        Value::Null(_) => Err(schema_mismatch(field, "null")),
    }
}

/// Element-position variant of [`check_wrapped`]: the field descriptor is the
/// repeated field and the wrapped value must match its element type.
fn check_wrapped_element(value: &Value, field: &FieldDescriptor) -> Result<(), BridgeError> {
    match value {
        Value::Object(object) => match field.kind() {
            Kind::Message(target) if target.full_name() == object.descriptor().full_name() => {
                Ok(())
            }
            _ => Err(schema_mismatch(field, &object.descriptor().full_name().to_owned())),
        },
        Value::Any(_) => match field.kind() {
            Kind::Message(target) if target.full_name() == ANY_TYPE => Ok(()),
            _ => Err(schema_mismatch(field, ANY_TYPE)),
        },
        Value::Primitive(primitive) => Err(schema_mismatch(field, primitive.value.kind_name())),
        Value::List(_) => Err(schema_mismatch(field, "list")),
        Value::Map(_) => Err(schema_mismatch(field, "map")),
        Value::Null(_) => Err(schema_mismatch(field, "null")),
    }
}

fn map_fields_match(map: &MapValue, field: &FieldDescriptor) -> bool {
    match field.kind() {
        Kind::Message(entry) if entry.is_map_entry() => {
            kinds_match(&map.value_field.kind(), &entry.map_entry_value_field().kind())
        }
        _ => false,
    }
}

fn schema_mismatch(field: &FieldDescriptor, value_type: &str) -> BridgeError {
    let field_type = if field.is_map() {
        format!("map field {}", field.name())
    } else if field.is_list() {
        format!("list of {}", kind_label(&field.kind()))
    } else {
        kind_label(&field.kind())
    };
    BridgeError::SchemaMismatch {
        field_type,
        value_type: value_type.to_owned(),
    }
}

fn empty_map(field: &FieldDescriptor, registry: &SchemaRegistry) -> Result<Value, BridgeError> {
    match field.kind() {
        Kind::Message(entry) if entry.is_map_entry() => Ok(Value::Map(MapValue::new(
            HashMap::new(),
            field.clone(),
            entry.map_entry_value_field(),
            registry.clone(),
        ))),
        _ => Err(BridgeError::internal("map field without a map-entry descriptor")),
    }
}

/// Structural equality over declared kinds; message and enum kinds compare by
/// fully-qualified name.
fn kinds_match(a: &Kind, b: &Kind) -> bool {
    match (a, b) {
        (Kind::Message(x), Kind::Message(y)) => x.full_name() == y.full_name(),
        (Kind::Enum(x), Kind::Enum(y)) => x.full_name() == y.full_name(),
        (Kind::Double, Kind::Double)
        | (Kind::Float, Kind::Float)
        | (Kind::Int32, Kind::Int32)
        | (Kind::Int64, Kind::Int64)
        | (Kind::Uint32, Kind::Uint32)
        | (Kind::Uint64, Kind::Uint64)
        | (Kind::Sint32, Kind::Sint32)
        | (Kind::Sint64, Kind::Sint64)
        | (Kind::Fixed32, Kind::Fixed32)
        | (Kind::Fixed64, Kind::Fixed64)
        | (Kind::Sfixed32, Kind::Sfixed32)
        | (Kind::Sfixed64, Kind::Sfixed64)
        | (Kind::Bool, Kind::Bool)
        | (Kind::String, Kind::String)
        | (Kind::Bytes, Kind::Bytes) => true,
        _ => false,
    }
}

/// Schema-vocabulary label for a declared kind, used in error text.
pub(crate) fn kind_label(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_owned(),
        Kind::Float => "float".to_owned(),
        Kind::Int32 => "int32".to_owned(),
        Kind::Int64 => "int64".to_owned(),
        Kind::Uint32 => "uint32".to_owned(),
        Kind::Uint64 => "uint64".to_owned(),
        Kind::Sint32 => "sint32".to_owned(),
        Kind::Sint64 => "sint64".to_owned(),
        Kind::Fixed32 => "fixed32".to_owned(),
        Kind::Fixed64 => "fixed64".to_owned(),
        Kind::Sfixed32 => "sfixed32".to_owned(),
        Kind::Sfixed64 => "sfixed64".to_owned(),
        Kind::Bool => "bool".to_owned(),
        Kind::String => "string".to_owned(),
        Kind::Bytes => "bytes".to_owned(),
        Kind::Message(descriptor) => descriptor.full_name().to_owned(),
        Kind::Enum(descriptor) => descriptor.full_name().to_owned(),
    }
}
