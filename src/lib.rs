//! Reflective access and mutation for schema-typed protobuf messages.
//!
//! `protobridge` lets an embedded scripting runtime read and modify protobuf
//! messages without compile-time knowledge of their schema. A concrete
//! [`DynamicMessage`] is wrapped into a [`Value`] tree, the script navigates and
//! mutates it through a uniform capability surface (`get`/`set`/`append`/`pop`/
//! `arrange`), and [`Value::build`] reconstructs a concrete message, rebuilding
//! only the branches that were actually modified.
//!
//! The bridge owns no global state: the [`SchemaRegistry`] used to resolve
//! `google.protobuf.Any` payloads is supplied explicitly when the root message
//! is wrapped.
//!
//! ```
//! use prost_reflect::{DescriptorPool, DynamicMessage, Value as ProtoValue};
//! use prost_types::{
//!     field_descriptor_proto::{Label, Type},
//!     DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
//! };
//! use protobridge::{wrap, SchemaRegistry, ScriptValue};
//!
//! let file = FileDescriptorProto {
//!     name: Some("greeting.proto".to_owned()),
//!     package: Some("demo".to_owned()),
//!     syntax: Some("proto3".to_owned()),
//!     message_type: vec![DescriptorProto {
//!         name: Some("Greeting".to_owned()),
//!         field: vec![FieldDescriptorProto {
//!             name: Some("text".to_owned()),
//!             number: Some(1),
//!             label: Some(Label::Optional as i32),
//!             r#type: Some(Type::String as i32),
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//! let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
//!     .unwrap();
//! let descriptor = pool.get_message_by_name("demo.Greeting").unwrap();
//!
//! let mut root = wrap(
//!     DynamicMessage::new(descriptor.clone()),
//!     SchemaRegistry::new(pool),
//! )
//! .unwrap();
//! root.set("text", ScriptValue::from("hello")).unwrap();
//! let built = root.build().unwrap();
//! assert_eq!(
//!     built.get_field_by_name("text").unwrap().as_ref(),
//!     &ProtoValue::String("hello".to_owned()),
//! );
//! ```

mod coerce;
mod decompose;
pub mod objects;
mod recompose;
pub mod registry;

#[cfg(test)]
pub(crate) mod testdata;

pub use objects::{
    AnyValue, ListValue, MapValue, ObjectValue, Primitive, PrimitiveValue, ScriptValue, Value,
    ValueKind,
};
pub use registry::SchemaRegistry;

use prost_reflect::DynamicMessage;

/// Failures surfaced by the bridge to the embedding runtime.
///
/// All failures are local and synchronous; nothing is retried and no partial
/// mutation is applied for a failed `set`/`append`/`pop`. The runtime renders
/// [`std::fmt::Display`] text to script authors and may branch on
/// [`BridgeError::code`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The object's schema declares no field with this name.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// Map lookup or removal on a key that is not present.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// List access outside `0..length`.
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    /// Scalar coercion failed: the supplied value cannot become the declared kind.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A wrapped value was stored into a field with an incompatible schema.
    #[error("cannot set {value_type} to {field_type}")]
    SchemaMismatch {
        field_type: String,
        value_type: String,
    },

    /// `null` targeted at a repeated or map field.
    #[error("cannot set null to a list or map field")]
    CannotSetNullToContainer,

    /// A capability was invoked on a variant that does not support it.
    #[error("{operation} is not supported on {kind}")]
    UnsupportedOperation {
        kind: ValueKind,
        operation: &'static str,
    },

    /// The schema registry has no descriptor for an `Any` type URL.
    #[error("unknown type: {0}")]
    UnresolvedAnyType(String),

    /// JSON rendering failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Invariant breach inside the bridge. Never expected to surface.
    #[error("internal bridge error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Stable machine-readable code for each failure class.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::FieldNotFound(_) => "FIELD_NOT_FOUND",
            BridgeError::KeyNotFound(_) => "KEY_NOT_FOUND",
            BridgeError::IndexOutOfBounds { .. } => "INDEX_OUT_OF_BOUNDS",
            BridgeError::TypeMismatch { .. } => "TYPE_MISMATCH",
            BridgeError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            BridgeError::CannotSetNullToContainer => "CANNOT_SET_NULL_TO_CONTAINER",
            BridgeError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            BridgeError::UnresolvedAnyType(_) => "UNRESOLVED_ANY_TYPE",
            BridgeError::Serialization(_) => "SERIALIZATION",
            BridgeError::Internal(_) => "INTERNAL",
        }
    }

    pub(crate) fn unsupported(kind: ValueKind, operation: &'static str) -> Self {
        BridgeError::UnsupportedOperation { kind, operation }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        BridgeError::Internal(message.into())
    }
}

/// Wraps a concrete message into the root [`Value`] of a mutation session.
///
/// The message is not traversed yet; decomposition happens lazily on first
/// field access. A root that is itself `google.protobuf.Any` wraps to
/// [`Value::Any`], everything else to [`Value::Object`].
pub fn wrap(message: DynamicMessage, registry: SchemaRegistry) -> Result<Value, BridgeError> {
    decompose::wrap_message(message, None, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(BridgeError::FieldNotFound("x".into()).code(), "FIELD_NOT_FOUND");
        assert_eq!(
            BridgeError::IndexOutOfBounds { index: -1, length: 0 }.code(),
            "INDEX_OUT_OF_BOUNDS"
        );
        assert_eq!(BridgeError::CannotSetNullToContainer.code(), "CANNOT_SET_NULL_TO_CONTAINER");
        assert_eq!(
            BridgeError::UnresolvedAnyType("type.example.com/Foo".into()).code(),
            "UNRESOLVED_ANY_TYPE"
        );
    }

    #[test]
    fn test_error_display_matches_vocabulary() {
        assert_eq!(
            BridgeError::FieldNotFound("nickname".into()).to_string(),
            "field not found: nickname"
        );
        assert_eq!(
            BridgeError::IndexOutOfBounds { index: 3, length: 3 }.to_string(),
            "index 3 out of bounds for length 3"
        );
        assert_eq!(
            BridgeError::TypeMismatch { expected: "string".into(), actual: "int64".into() }
                .to_string(),
            "type mismatch: expected string, got int64"
        );
    }

    #[test]
    fn test_wrap_produces_object_root() {
        let root = wrap(testdata::contact(), testdata::registry()).unwrap();
        assert_eq!(root.kind(), ValueKind::Object);
        assert!(!root.is_modified());
    }

    #[test]
    fn test_wrap_any_root() {
        let payload = testdata::payload("hi");
        let any = testdata::pack_any(&payload);
        let root = wrap(any, testdata::registry()).unwrap();
        assert_eq!(root.kind(), ValueKind::Any);
    }
}
