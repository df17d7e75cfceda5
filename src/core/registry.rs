//! # Message Type Registry
//!
//! Bidirectional map between on-wire `(frequency, id)` pairs and logical
//! type tags, plus the decoder hook for each generated body codec.
//!
//! The registry is built once at startup from a static table and never
//! mutated afterwards, so lookups need no synchronization. An unrecognized
//! wire id is not an error: the pipeline routes such packets to a
//! catch-all path so unknown message types never crash the client.

use crate::core::header::Frequency;
use crate::error::{constants, Result, WireError};
use std::collections::HashMap;
use std::fmt;

/// Logical tag of a message type, unique across all frequency classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub &'static str);

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Implemented by every generated message-body codec.
///
/// The wire core never interprets body bytes itself; this trait is the seam
/// through which the generated codecs plug in.
pub trait MessageBody: fmt::Debug + Send + Sync {
    /// The logical type this body belongs to.
    fn type_tag(&self) -> TypeTag;

    /// Encode the body into its wire bytes.
    ///
    /// # Errors
    /// Implementations return `WireError::FieldTooLong` for variable-length
    /// fields exceeding their wire maximum.
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// Decode raw body bytes into a typed message body.
pub type BodyDecoder = fn(&[u8]) -> Result<Box<dyn MessageBody>>;

/// One row of the startup registration table.
#[derive(Clone, Copy)]
pub struct TypeRegistration {
    pub frequency: Frequency,
    pub id: u32,
    pub tag: TypeTag,
    pub decoder: BodyDecoder,
}

/// Registration hook used at startup; consumed by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    by_wire: HashMap<(Frequency, u32), TypeTag>,
    by_tag: HashMap<TypeTag, (Frequency, u32, BodyDecoder)>,
}

impl RegistryBuilder {
    /// Register one message type.
    ///
    /// # Errors
    /// Rejects ids not representable in their frequency class and any wire
    /// id or tag registered twice.
    pub fn register(
        &mut self,
        frequency: Frequency,
        id: u32,
        tag: TypeTag,
        decoder: BodyDecoder,
    ) -> Result<()> {
        if !frequency.id_in_range(id) {
            return Err(WireError::IdOutOfRange {
                id,
                max: frequency.max_id(),
            });
        }
        if self.by_wire.contains_key(&(frequency, id)) {
            return Err(WireError::DuplicateRegistration(format!(
                "{}: {} id {id}",
                constants::ERR_DUPLICATE_WIRE_ID,
                frequency.name()
            )));
        }
        if self.by_tag.contains_key(&tag) {
            return Err(WireError::DuplicateRegistration(format!(
                "{}: {tag}",
                constants::ERR_DUPLICATE_TAG
            )));
        }

        self.by_wire.insert((frequency, id), tag);
        self.by_tag.insert(tag, (frequency, id, decoder));
        Ok(())
    }

    /// Freeze the registrations into an immutable registry.
    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            by_wire: self.by_wire,
            by_tag: self.by_tag,
        }
    }
}

/// Immutable lookup structure; safe for unsynchronized concurrent reads.
pub struct TypeRegistry {
    by_wire: HashMap<(Frequency, u32), TypeTag>,
    by_tag: HashMap<TypeTag, (Frequency, u32, BodyDecoder)>,
}

impl TypeRegistry {
    /// Start a registration hook.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build a registry from a static registration table.
    pub fn from_table(table: &[TypeRegistration]) -> Result<Self> {
        let mut builder = Self::builder();
        for row in table {
            builder.register(row.frequency, row.id, row.tag, row.decoder)?;
        }
        Ok(builder.build())
    }

    /// Resolve a wire id to its logical tag, if registered.
    pub fn tag_for(&self, frequency: Frequency, id: u32) -> Option<TypeTag> {
        self.by_wire.get(&(frequency, id)).copied()
    }

    /// The wire id a tag encodes as.
    pub fn wire_id(&self, tag: TypeTag) -> Option<(Frequency, u32)> {
        self.by_tag.get(&tag).map(|&(frequency, id, _)| (frequency, id))
    }

    /// The body decoder registered for a tag.
    pub fn decoder_for(&self, tag: TypeTag) -> Option<BodyDecoder> {
        self.by_tag.get(&tag).map(|&(_, _, decoder)| decoder)
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}
