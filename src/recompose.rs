//! Rebuilding concrete messages from wrapped value trees.
//!
//! The rebuild is minimal: a branch contributes a new message only when it, or
//! something beneath it, was modified during the session. Untouched branches
//! pass the original message through untouched, so building an unmodified root
//! returns the very message that was wrapped.

use std::collections::HashMap;
use std::sync::Arc;

use prost::Message;
use prost_reflect::Value as ProtoValue;
use prost_reflect::{DynamicMessage, FieldDescriptor, MapKey, MessageDescriptor, ReflectMessage};

use crate::objects::{AnyValue, FieldTable, ListValue, MapValue, ObjectValue, Value};
use crate::BridgeError;

/// Outcome of recomposing one node.
pub(crate) enum Rebuilt {
    /// Nothing beneath this node changed; the original native value stands.
    Unchanged,
    /// The node changed; this is its new native value.
    Changed(ProtoValue),
    /// The node was overwritten with `null`; the containing field is cleared.
    Cleared,
}

impl Value {
    /// Reconstructs a concrete message from this node.
    ///
    /// Supported on objects and `Any` values. When nothing was modified the
    /// returned [`Arc`] is the one captured at wrap time, so callers can detect
    /// a no-op session by pointer identity. Building does not consume the tree;
    /// further mutation and rebuilding is allowed.
    pub fn build(&mut self) -> Result<Arc<DynamicMessage>, BridgeError> {
        match self {
            Value::Object(object) => Ok(match object.recompose_message()? {
                Some(message) => Arc::new(message),
                None => Arc::clone(&object.message),
            }),
            Value::Any(any) => Ok(match any.recompose_any()? {
                Some(message) => Arc::new(message),
                None => Arc::clone(&any.message),
            }),
            other => Err(BridgeError::unsupported(other.kind(), "build")),
        }
    }

    pub(crate) fn recompose(&mut self) -> Result<Rebuilt, BridgeError> {
        match self {
            Value::Primitive(primitive) => Ok(if primitive.modified {
                Rebuilt::Changed(primitive.value.to_native())
            } else {
                Rebuilt::Unchanged
            }),
            Value::Null(null) => Ok(if null.modified {
                Rebuilt::Cleared
            } else {
                Rebuilt::Unchanged
            }),
            Value::Object(object) => Ok(match object.recompose_message()? {
                Some(message) => Rebuilt::Changed(ProtoValue::Message(message)),
                None => Rebuilt::Unchanged,
            }),
            Value::Any(any) => Ok(match any.recompose_any()? {
                Some(message) => Rebuilt::Changed(ProtoValue::Message(message)),
                None => Rebuilt::Unchanged,
            }),
            Value::List(list) => list.recompose(),
            Value::Map(map) => map.recompose(),
        }
    }

    /// Native pass-through for a node whose recompose reported `Unchanged`.
    fn native_unchanged(&self) -> Result<ProtoValue, BridgeError> {
        match self {
            Value::Primitive(primitive) => Ok(primitive.value.to_native()),
            Value::Object(object) => Ok(ProtoValue::Message((*object.message).clone())),
            Value::Any(any) => Ok(ProtoValue::Message((*any.message).clone())),
            other => Err(BridgeError::internal(format!(
                "{} cannot pass through as a native value",
                other.kind()
            ))),
        }
    }
}

impl ObjectValue {
    /// Rebuilds this object if anything beneath it changed.
    ///
    /// Returns `None` for a fully untouched object. The builder message is a
    /// clone of the original, created lazily on the first changed field, with
    /// changed fields overwritten and nulled fields cleared.
    pub(crate) fn recompose_message(&mut self) -> Result<Option<DynamicMessage>, BridgeError> {
        let mut builder: Option<DynamicMessage> = None;
        if let FieldTable::Decomposed(table) = &mut self.table {
            let descriptor = self.message.descriptor();
            for (name, value) in table.iter_mut() {
                let field = descriptor.get_field_by_name(name).ok_or_else(|| {
                    BridgeError::internal("decomposed table holds an unknown field")
                })?;
                match value.recompose()? {
                    Rebuilt::Unchanged => {}
                    Rebuilt::Changed(native) => builder
                        .get_or_insert_with(|| (*self.message).clone())
                        .set_field(&field, native),
                    Rebuilt::Cleared => builder
                        .get_or_insert_with(|| (*self.message).clone())
                        .clear_field(&field),
                }
            }
        }
        match builder {
            Some(message) => Ok(Some(message)),
            // stored whole via `set`, no per-field edits afterwards
            None if self.modified => Ok(Some((*self.message).clone())),
            None => Ok(None),
        }
    }
}

impl ListValue {
    pub(crate) fn recompose(&mut self) -> Result<Rebuilt, BridgeError> {
        let mut rebuilt = Vec::with_capacity(self.elements.len());
        let mut changed = self.modified;
        for element in &mut self.elements {
            let outcome = element.recompose()?;
            changed |= !matches!(outcome, Rebuilt::Unchanged);
            rebuilt.push(outcome);
        }
        if !changed {
            return Ok(Rebuilt::Unchanged);
        }
        let mut natives = Vec::with_capacity(rebuilt.len());
        for (element, outcome) in self.elements.iter().zip(rebuilt) {
            natives.push(match outcome {
                Rebuilt::Changed(native) => native,
                Rebuilt::Unchanged => element.native_unchanged()?,
                Rebuilt::Cleared => {
                    return Err(BridgeError::internal("cleared element inside a list"))
                }
            });
        }
        Ok(Rebuilt::Changed(ProtoValue::List(natives)))
    }
}

impl MapValue {
    pub(crate) fn recompose(&mut self) -> Result<Rebuilt, BridgeError> {
        let mut rebuilt = Vec::with_capacity(self.entries.len());
        let mut changed = self.modified;
        for (key, slot) in self.entries.iter_mut() {
            let outcome = slot.value.recompose()?;
            changed |= !matches!(outcome, Rebuilt::Unchanged);
            rebuilt.push((key.clone(), outcome));
        }
        if !changed {
            return Ok(Rebuilt::Unchanged);
        }
        let mut natives = HashMap::with_capacity(rebuilt.len());
        for (key, outcome) in rebuilt {
            match outcome {
                Rebuilt::Changed(native) => {
                    natives.insert(MapKey::String(key), native);
                }
                // a nulled entry simply disappears from the rebuilt map
                Rebuilt::Cleared => {}
                Rebuilt::Unchanged => {
                    let slot = self
                        .entries
                        .get(&key)
                        .ok_or_else(|| BridgeError::internal("map entry vanished during rebuild"))?;
                    let native = match &slot.original {
                        Some(native) => native.clone(),
                        None => slot.value.native_unchanged()?,
                    };
                    natives.insert(MapKey::String(key), native);
                }
            }
        }
        Ok(Rebuilt::Changed(ProtoValue::Map(natives)))
    }
}

impl AnyValue {
    /// Rebuilds this `Any` envelope if its payload changed.
    ///
    /// A never-resolved or resolved-but-unmodified payload passes the original
    /// envelope through; a modified payload is re-encoded and packed into a
    /// fresh envelope under the original type URL.
    pub(crate) fn recompose_any(&mut self) -> Result<Option<DynamicMessage>, BridgeError> {
        let payload = match &mut self.resolved {
            None => None,
            Some(inner) => match inner.recompose()? {
                Rebuilt::Unchanged => None,
                Rebuilt::Changed(ProtoValue::Message(payload)) => Some(payload),
                Rebuilt::Changed(_) => {
                    return Err(BridgeError::internal("Any payload rebuilt to a non-message"))
                }
                Rebuilt::Cleared => {
                    return Err(BridgeError::internal("Any payload cannot be cleared"))
                }
            },
        };
        match payload {
            Some(payload) => {
                let descriptor = self.message.descriptor();
                let mut envelope = DynamicMessage::new(descriptor.clone());
                envelope.set_field(
                    &envelope_field(&descriptor, "type_url")?,
                    ProtoValue::String(self.type_url.clone()),
                );
                envelope.set_field(
                    &envelope_field(&descriptor, "value")?,
                    ProtoValue::Bytes(payload.encode_to_vec().into()),
                );
                Ok(Some(envelope))
            }
            None if self.modified => Ok(Some((*self.message).clone())),
            None => Ok(None),
        }
    }
}

fn envelope_field(
    descriptor: &MessageDescriptor,
    name: &str,
) -> Result<FieldDescriptor, BridgeError> {
    descriptor
        .get_field_by_name(name)
        .ok_or_else(|| BridgeError::internal(format!("Any envelope without a {name} field")))
}
