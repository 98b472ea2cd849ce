//! Schema registry used to resolve `google.protobuf.Any` payload types.

use prost_reflect::{DescriptorPool, MessageDescriptor};

use crate::BridgeError;

/// Read-only index of message descriptors, consulted when an `Any` payload is
/// first accessed.
///
/// The registry is supplied by the embedding runtime when the root message is
/// wrapped and is never mutated by the bridge. Cloning is cheap (the underlying
/// [`DescriptorPool`] is reference-counted), and a single registry may be shared
/// by any number of independent value trees, including across threads.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    pool: DescriptorPool,
}

impl SchemaRegistry {
    /// Builds a registry over an existing descriptor pool.
    pub fn new(pool: DescriptorPool) -> Self {
        SchemaRegistry { pool }
    }

    /// A registry that resolves nothing. Useful when the wrapped messages are
    /// known to contain no `Any` fields.
    pub fn empty() -> Self {
        SchemaRegistry {
            pool: DescriptorPool::new(),
        }
    }

    /// The underlying descriptor pool.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Resolves an `Any` type URL to a message descriptor.
    ///
    /// Only the fully-qualified name after the final `/` is significant, so
    /// `type.googleapis.com/pkg.Msg` and `example.com/pkg.Msg` resolve
    /// identically.
    pub fn resolve(&self, type_url: &str) -> Result<MessageDescriptor, BridgeError> {
        let name = type_name(type_url);
        self.pool
            .get_message_by_name(name)
            .ok_or_else(|| BridgeError::UnresolvedAnyType(type_url.to_owned()))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry::empty()
    }
}

/// Extracts the fully-qualified type name from a type URL.
fn type_name(type_url: &str) -> &str {
    match type_url.rsplit_once('/') {
        Some((_, name)) => name,
        None => type_url,
    }
}
