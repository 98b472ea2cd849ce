use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use prost_reflect::{
    DynamicMessage, FieldDescriptor, MessageDescriptor, ReflectMessage, SerializeOptions,
};
use prost_reflect::Value as ProtoValue;

use crate::{coerce, BridgeError, SchemaRegistry};

/// Fully-qualified name of the well-known `Any` message.
pub(crate) const ANY_TYPE: &str = "google.protobuf.Any";

/// Pseudo-field exposing an `Any` value's type URL without resolving it.
pub(crate) const TYPE_URL_KEY: &str = "@type";

/// The variant tag of a [`Value`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    List,
    Map,
    Any,
    Primitive,
    Null,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Object => write!(f, "object"),
            ValueKind::List => write!(f, "list"),
            ValueKind::Map => write!(f, "map"),
            ValueKind::Any => write!(f, "any"),
            ValueKind::Primitive => write!(f, "primitive"),
            ValueKind::Null => write!(f, "null"),
        }
    }
}

/// A scalar payload, width-faithful to the schema-declared kind.
///
/// `Enum` carries the numeric value of an enum field; enums are readable but
/// not settable through the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Bytes(bytes::Bytes),
    Enum(i32),
}

impl Primitive {
    /// Schema-vocabulary name of this scalar's kind, used in error text.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Primitive::I32(_) => "int32",
            Primitive::I64(_) => "int64",
            Primitive::U32(_) => "uint32",
            Primitive::U64(_) => "uint64",
            Primitive::F32(_) => "float",
            Primitive::F64(_) => "double",
            Primitive::Bool(_) => "bool",
            Primitive::String(_) => "string",
            Primitive::Bytes(_) => "bytes",
            Primitive::Enum(_) => "enum",
        }
    }

    /// Converts to the native representation stored in a concrete message.
    pub(crate) fn to_native(&self) -> ProtoValue {
        match self {
            Primitive::I32(v) => ProtoValue::I32(*v),
            Primitive::I64(v) => ProtoValue::I64(*v),
            Primitive::U32(v) => ProtoValue::U32(*v),
            Primitive::U64(v) => ProtoValue::U64(*v),
            Primitive::F32(v) => ProtoValue::F32(*v),
            Primitive::F64(v) => ProtoValue::F64(*v),
            Primitive::Bool(v) => ProtoValue::Bool(*v),
            Primitive::String(v) => ProtoValue::String(v.clone()),
            Primitive::Bytes(v) => ProtoValue::Bytes(v.clone()),
            Primitive::Enum(v) => ProtoValue::EnumNumber(*v),
        }
    }
}

/// A wrapped scalar leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveValue {
    pub value: Primitive,
    pub(crate) modified: bool,
}

impl PrimitiveValue {
    pub(crate) fn new(value: Primitive) -> Self {
        PrimitiveValue {
            value,
            modified: false,
        }
    }
}

/// A `null` written by the script; builds to a field clear.
#[derive(Debug, Clone, PartialEq)]
pub struct NullValue {
    pub(crate) modified: bool,
}

/// Lazy decomposition state of an object's field table.
#[derive(Debug, Clone)]
pub(crate) enum FieldTable {
    NotDecomposed,
    Decomposed(HashMap<String, Value>),
}

/// A wrapped concrete message.
#[derive(Debug, Clone)]
pub struct ObjectValue {
    pub(crate) message: Arc<DynamicMessage>,
    pub(crate) field: Option<FieldDescriptor>,
    pub(crate) registry: SchemaRegistry,
    pub(crate) table: FieldTable,
    pub(crate) modified: bool,
}

impl ObjectValue {
    pub(crate) fn new(
        message: Arc<DynamicMessage>,
        field: Option<FieldDescriptor>,
        registry: SchemaRegistry,
    ) -> Self {
        ObjectValue {
            message,
            field,
            registry,
            table: FieldTable::NotDecomposed,
            modified: false,
        }
    }

    /// Descriptor of the wrapped message.
    pub fn descriptor(&self) -> MessageDescriptor {
        self.message.descriptor()
    }

    /// Looks a field up by schema name, falling back to the JSON name.
    pub(crate) fn field_descriptor(&self, key: &str) -> Result<FieldDescriptor, BridgeError> {
        let descriptor = self.message.descriptor();
        descriptor
            .get_field_by_name(key)
            .or_else(|| descriptor.get_field_by_json_name(key))
            .ok_or_else(|| BridgeError::FieldNotFound(key.to_owned()))
    }

    pub fn get(&mut self, key: &str) -> Result<&mut Value, BridgeError> {
        let field = self.field_descriptor(key)?;
        let table = self.table_mut()?;
        table
            .get_mut(field.name())
            .ok_or_else(|| BridgeError::internal("decomposed table is missing a schema field"))
    }

    pub fn set(&mut self, key: &str, value: ScriptValue) -> Result<(), BridgeError> {
        let field = self.field_descriptor(key)?;
        let stored = coerce::value_for_field(value, &field, &self.registry)?;
        let table = self.table_mut()?;
        table.insert(field.name().to_owned(), stored);
        Ok(())
    }

    /// Schema-declared field names, in schema order.
    pub fn keys(&self) -> Vec<String> {
        self.message
            .descriptor()
            .fields()
            .map(|field| field.name().to_owned())
            .collect()
    }

    /// True when the field was set during this session or is present on the
    /// underlying message.
    pub fn contains(&self, key: &str) -> bool {
        let Ok(field) = self.field_descriptor(key) else {
            return false;
        };
        if let FieldTable::Decomposed(table) = &self.table {
            if let Some(value) = table.get(field.name()) {
                if value.is_modified() {
                    return true;
                }
            }
        }
        self.message.has_field(&field)
    }

    /// Declared field count.
    pub fn size(&self) -> usize {
        self.message.descriptor().fields().count()
    }
}

/// A wrapped repeated field.
#[derive(Debug, Clone)]
pub struct ListValue {
    pub(crate) elements: Vec<Value>,
    pub(crate) field: FieldDescriptor,
    pub(crate) registry: SchemaRegistry,
    pub(crate) modified: bool,
}

impl ListValue {
    pub(crate) fn new(
        elements: Vec<Value>,
        field: FieldDescriptor,
        registry: SchemaRegistry,
    ) -> Self {
        ListValue {
            elements,
            field,
            registry,
            modified: false,
        }
    }

    fn check_index(&self, index: i64) -> Result<usize, BridgeError> {
        let length = self.elements.len();
        if index < 0 {
            return Err(BridgeError::IndexOutOfBounds { index, length });
        }
        let position = index as usize;
        if position >= length {
            return Err(BridgeError::IndexOutOfBounds { index, length });
        }
        Ok(position)
    }

    pub fn get(&mut self, index: i64) -> Result<&mut Value, BridgeError> {
        let position = self.check_index(index)?;
        self.elements
            .get_mut(position)
            .ok_or_else(|| BridgeError::internal("index vanished after bounds check"))
    }

    pub fn set(&mut self, index: i64, value: ScriptValue) -> Result<(), BridgeError> {
        let position = self.check_index(index)?;
        let stored = coerce::value_for_element(value, &self.field, &self.registry)?;
        match self.elements.get_mut(position) {
            Some(slot) => {
                *slot = stored;
                Ok(())
            }
            None => Err(BridgeError::internal("index vanished after bounds check")),
        }
    }

    pub fn append(&mut self, value: ScriptValue) -> Result<(), BridgeError> {
        let stored = coerce::value_for_element(value, &self.field, &self.registry)?;
        self.elements.push(stored);
        self.modified = true;
        Ok(())
    }

    pub fn pop(&mut self, index: i64) -> Result<Value, BridgeError> {
        let position = self.check_index(index)?;
        let removed = self.elements.remove(position);
        self.modified = true;
        Ok(removed)
    }

    /// A new list holding this list's elements permuted by `order`. The
    /// original list is left untouched and unmodified.
    pub fn arrange(&self, order: &[usize]) -> Result<ListValue, BridgeError> {
        let length = self.elements.len();
        let mut elements = Vec::with_capacity(order.len());
        for &position in order {
            let element = self.elements.get(position).ok_or(BridgeError::IndexOutOfBounds {
                index: position as i64,
                length,
            })?;
            elements.push(element.clone());
        }
        Ok(ListValue::new(
            elements,
            self.field.clone(),
            self.registry.clone(),
        ))
    }

    pub fn size(&self) -> usize {
        self.elements.len()
    }
}

/// One map entry: the wrapped value plus, for entries that came from the
/// underlying message, the original native value for pass-through on rebuild.
#[derive(Debug, Clone)]
pub(crate) struct MapSlot {
    pub(crate) value: Value,
    pub(crate) original: Option<ProtoValue>,
}

/// A wrapped string-keyed map field.
#[derive(Debug, Clone)]
pub struct MapValue {
    pub(crate) entries: HashMap<String, MapSlot>,
    pub(crate) field: FieldDescriptor,
    pub(crate) value_field: FieldDescriptor,
    pub(crate) registry: SchemaRegistry,
    pub(crate) modified: bool,
}

impl MapValue {
    pub(crate) fn new(
        entries: HashMap<String, MapSlot>,
        field: FieldDescriptor,
        value_field: FieldDescriptor,
        registry: SchemaRegistry,
    ) -> Self {
        MapValue {
            entries,
            field,
            value_field,
            registry,
            modified: false,
        }
    }

    pub fn get(&mut self, key: &str) -> Result<&mut Value, BridgeError> {
        self.entries
            .get_mut(key)
            .map(|slot| &mut slot.value)
            .ok_or_else(|| BridgeError::KeyNotFound(key.to_owned()))
    }

    pub fn set(&mut self, key: &str, value: ScriptValue) -> Result<(), BridgeError> {
        let stored = coerce::value_for_field(value, &self.value_field, &self.registry)?;
        self.entries.insert(
            key.to_owned(),
            MapSlot {
                value: stored,
                original: None,
            },
        );
        Ok(())
    }

    pub fn pop(&mut self, key: &str) -> Result<Value, BridgeError> {
        match self.entries.remove(key) {
            Some(slot) => {
                self.modified = true;
                Ok(slot.value)
            }
            None => Err(BridgeError::KeyNotFound(key.to_owned())),
        }
    }

    /// Current key set, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

/// A wrapped `google.protobuf.Any` field.
///
/// The type URL is extracted eagerly; the payload is decoded lazily against the
/// schema registry on first access into it. The `@type` pseudo-field never
/// requires resolution.
#[derive(Debug, Clone)]
pub struct AnyValue {
    pub(crate) message: Arc<DynamicMessage>,
    pub(crate) type_url: String,
    pub(crate) field: Option<FieldDescriptor>,
    pub(crate) registry: SchemaRegistry,
    pub(crate) resolved: Option<Box<Value>>,
    pub(crate) type_slot: Option<Box<Value>>,
    pub(crate) modified: bool,
}

impl AnyValue {
    /// The embedded type URL, readable without resolution.
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    pub fn get(&mut self, key: &str) -> Result<&mut Value, BridgeError> {
        if key == TYPE_URL_KEY {
            let url = self.type_url.clone();
            return Ok(self.type_slot.get_or_insert_with(|| {
                Box::new(Value::Primitive(PrimitiveValue::new(Primitive::String(
                    url,
                ))))
            }));
        }
        self.ensure_resolved()?.get(key)
    }

    pub fn set(&mut self, key: &str, value: ScriptValue) -> Result<(), BridgeError> {
        self.ensure_resolved()?.set(key, value)
    }

    pub fn keys(&mut self) -> Result<Vec<String>, BridgeError> {
        self.ensure_resolved()?.keys()
    }

    pub fn contains(&mut self, key: &str) -> Result<bool, BridgeError> {
        if key == TYPE_URL_KEY {
            return Ok(true);
        }
        self.ensure_resolved()?.contains(key)
    }

    pub fn size(&mut self) -> Result<usize, BridgeError> {
        self.ensure_resolved()?.size()
    }
}

/// A value written by the embedding runtime into a field, element or map entry.
///
/// `List` and `Map` are *generic* literals with no element schema of their own;
/// only empty literals are accepted, since the bridge cannot infer a typed
/// literal's element schema. An already-wrapped [`Value`] is accepted when its
/// schema matches the target field.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Null,
    Scalar(Primitive),
    List(Vec<ScriptValue>),
    Map(HashMap<String, ScriptValue>),
    Value(Value),
}

impl From<i32> for ScriptValue {
    fn from(v: i32) -> Self {
        ScriptValue::Scalar(Primitive::I32(v))
    }
}

impl From<i64> for ScriptValue {
    fn from(v: i64) -> Self {
        ScriptValue::Scalar(Primitive::I64(v))
    }
}

impl From<u32> for ScriptValue {
    fn from(v: u32) -> Self {
        ScriptValue::Scalar(Primitive::U32(v))
    }
}

impl From<u64> for ScriptValue {
    fn from(v: u64) -> Self {
        ScriptValue::Scalar(Primitive::U64(v))
    }
}

impl From<f32> for ScriptValue {
    fn from(v: f32) -> Self {
        ScriptValue::Scalar(Primitive::F32(v))
    }
}

impl From<f64> for ScriptValue {
    fn from(v: f64) -> Self {
        ScriptValue::Scalar(Primitive::F64(v))
    }
}

impl From<bool> for ScriptValue {
    fn from(v: bool) -> Self {
        ScriptValue::Scalar(Primitive::Bool(v))
    }
}

impl From<&str> for ScriptValue {
    fn from(v: &str) -> Self {
        ScriptValue::Scalar(Primitive::String(v.to_owned()))
    }
}

impl From<String> for ScriptValue {
    fn from(v: String) -> Self {
        ScriptValue::Scalar(Primitive::String(v))
    }
}

impl From<Primitive> for ScriptValue {
    fn from(v: Primitive) -> Self {
        ScriptValue::Scalar(v)
    }
}

impl From<Value> for ScriptValue {
    fn from(v: Value) -> Self {
        ScriptValue::Value(v)
    }
}

/// The central tagged union: one wrapped node of a message tree.
///
/// Exactly one variant is active per node. Capability operations that are not
/// meaningful for a variant fail with
/// [`BridgeError::UnsupportedOperation`] rather than silently no-op-ing.
#[derive(Debug, Clone)]
pub enum Value {
    Object(ObjectValue),
    List(ListValue),
    Map(MapValue),
    Any(AnyValue),
    Primitive(PrimitiveValue),
    Null(NullValue),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Object(_) => ValueKind::Object,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Any(_) => ValueKind::Any,
            Value::Primitive(_) => ValueKind::Primitive,
            Value::Null(_) => ValueKind::Null,
        }
    }

    /// This node's own modification flag. Monotonic within a session: ancestors
    /// pick up descendant modifications during [`Value::build`], not before.
    pub fn is_modified(&self) -> bool {
        match self {
            Value::Object(v) => v.modified,
            Value::List(v) => v.modified,
            Value::Map(v) => v.modified,
            Value::Any(v) => v.modified,
            Value::Primitive(v) => v.modified,
            Value::Null(v) => v.modified,
        }
    }

    pub(crate) fn mark_modified(&mut self) {
        match self {
            Value::Object(v) => v.modified = true,
            Value::List(v) => v.modified = true,
            Value::Map(v) => v.modified = true,
            Value::Any(v) => v.modified = true,
            Value::Primitive(v) => v.modified = true,
            Value::Null(v) => v.modified = true,
        }
    }

    /// Key-based lookup on objects, maps and `Any` values.
    pub fn get(&mut self, key: &str) -> Result<&mut Value, BridgeError> {
        match self {
            Value::Object(object) => object.get(key),
            Value::Map(map) => map.get(key),
            Value::Any(any) => any.get(key),
            other => Err(BridgeError::unsupported(other.kind(), "get by key")),
        }
    }

    /// Positional lookup on lists.
    pub fn get_index(&mut self, index: i64) -> Result<&mut Value, BridgeError> {
        match self {
            Value::List(list) => list.get(index),
            other => Err(BridgeError::unsupported(other.kind(), "get by index")),
        }
    }

    /// Key-based store on objects, maps and `Any` values. The stored value is
    /// validated against the target schema before anything is written.
    pub fn set(&mut self, key: &str, value: ScriptValue) -> Result<(), BridgeError> {
        match self {
            Value::Object(object) => object.set(key, value),
            Value::Map(map) => map.set(key, value),
            Value::Any(any) => any.set(key, value),
            other => Err(BridgeError::unsupported(other.kind(), "set by key")),
        }
    }

    /// Positional store on lists.
    pub fn set_index(&mut self, index: i64, value: ScriptValue) -> Result<(), BridgeError> {
        match self {
            Value::List(list) => list.set(index, value),
            other => Err(BridgeError::unsupported(other.kind(), "set by index")),
        }
    }

    /// Object: schema-declared field names. Map: current key set.
    pub fn keys(&mut self) -> Result<Vec<String>, BridgeError> {
        match self {
            Value::Object(object) => Ok(object.keys()),
            Value::Map(map) => Ok(map.keys()),
            Value::Any(any) => any.keys(),
            other => Err(BridgeError::unsupported(other.kind(), "keys")),
        }
    }

    pub fn contains(&mut self, key: &str) -> Result<bool, BridgeError> {
        match self {
            Value::Object(object) => Ok(object.contains(key)),
            Value::Map(map) => Ok(map.contains(key)),
            Value::Any(any) => any.contains(key),
            other => Err(BridgeError::unsupported(other.kind(), "contains")),
        }
    }

    /// Object: declared field count. List/Map: element/entry count.
    pub fn size(&mut self) -> Result<usize, BridgeError> {
        match self {
            Value::Object(object) => Ok(object.size()),
            Value::List(list) => Ok(list.size()),
            Value::Map(map) => Ok(map.size()),
            Value::Any(any) => any.size(),
            other => Err(BridgeError::unsupported(other.kind(), "size")),
        }
    }

    /// List only: validates against the element schema and appends.
    pub fn append(&mut self, value: ScriptValue) -> Result<(), BridgeError> {
        match self {
            Value::List(list) => list.append(value),
            other => Err(BridgeError::unsupported(other.kind(), "append")),
        }
    }

    /// List only: removes and returns the element at `index`.
    pub fn pop_index(&mut self, index: i64) -> Result<Value, BridgeError> {
        match self {
            Value::List(list) => list.pop(index),
            other => Err(BridgeError::unsupported(other.kind(), "pop by index")),
        }
    }

    /// Map only: removes and returns the entry under `key`.
    pub fn pop_key(&mut self, key: &str) -> Result<Value, BridgeError> {
        match self {
            Value::Map(map) => map.pop(key),
            other => Err(BridgeError::unsupported(other.kind(), "pop by key")),
        }
    }

    /// List only: a new, derived list permuted by `order`; the original list is
    /// not marked modified.
    pub fn arrange(&self, order: &[usize]) -> Result<Value, BridgeError> {
        match self {
            Value::List(list) => Ok(Value::List(list.arrange(order)?)),
            other => Err(BridgeError::unsupported(other.kind(), "arrange")),
        }
    }

    /// The scalar payload, if this node is a primitive leaf.
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(primitive) => Some(&primitive.value),
            _ => None,
        }
    }

    /// Renders the current (recomposed) state of this node as a JSON string,
    /// preserving proto field names.
    pub fn print(&mut self) -> Result<String, BridgeError> {
        let json = self.to_json()?;
        serde_json::to_string(&json).map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    fn to_json(&mut self) -> Result<serde_json::Value, BridgeError> {
        match self {
            Value::Object(object) => match object.recompose_message()? {
                Some(message) => message_json(&message),
                None => message_json(&object.message),
            },
            Value::Any(any) => match any.recompose_any()? {
                Some(message) => message_json(&message),
                None => message_json(&any.message),
            },
            Value::List(list) => {
                let mut items = Vec::with_capacity(list.elements.len());
                for element in &mut list.elements {
                    items.push(element.to_json()?);
                }
                Ok(serde_json::Value::Array(items))
            }
            Value::Map(map) => {
                let mut object = serde_json::Map::with_capacity(map.entries.len());
                for (key, slot) in &mut map.entries {
                    object.insert(key.clone(), slot.value.to_json()?);
                }
                Ok(serde_json::Value::Object(object))
            }
            Value::Primitive(primitive) => scalar_json(&primitive.value),
            Value::Null(_) => Ok(serde_json::Value::Null),
        }
    }
}

fn scalar_json(value: &Primitive) -> Result<serde_json::Value, BridgeError> {
    let float = |v: f64| {
        serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .ok_or_else(|| BridgeError::Serialization("non-finite float".to_owned()))
    };
    match value {
        Primitive::I32(v) => Ok(serde_json::Value::from(*v)),
        Primitive::I64(v) => Ok(serde_json::Value::from(*v)),
        Primitive::U32(v) => Ok(serde_json::Value::from(*v)),
        Primitive::U64(v) => Ok(serde_json::Value::from(*v)),
        Primitive::F32(v) => float(f64::from(*v)),
        Primitive::F64(v) => float(*v),
        Primitive::Bool(v) => Ok(serde_json::Value::from(*v)),
        Primitive::String(v) => Ok(serde_json::Value::from(v.as_str())),
        Primitive::Bytes(v) => Ok(serde_json::Value::Array(
            v.iter().map(|b| serde_json::Value::from(*b)).collect(),
        )),
        Primitive::Enum(v) => Ok(serde_json::Value::from(*v)),
    }
}

fn message_json(message: &DynamicMessage) -> Result<serde_json::Value, BridgeError> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::new(&mut buf);
    message
        .serialize_with_options(
            &mut serializer,
            &SerializeOptions::new().use_proto_field_name(true),
        )
        .map_err(|e| BridgeError::Serialization(e.to_string()))?;
    serde_json::from_slice(&buf).map_err(|e| BridgeError::Serialization(e.to_string()))
}
