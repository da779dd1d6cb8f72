use thiserror::Error;

/// An error that may occur while encoding, decoding, diffing or persisting object graphs.
///
/// Recoverable data problems (unknown type or field ids, dangling references) never show
/// up here: they are logged and skipped where they are detected. Everything below means
/// the operation was aborted.
#[derive(Error, Debug)]
pub enum Error {
    /// A live object was encoded but its type was never registered.
    #[error("type `{type_name}` (id {type_id}) is not registered in the type registry")]
    UnregisteredType {
        /// The id reported by the object.
        type_id: u32,
        /// The name reported by the object.
        type_name: &'static str,
    },

    /// A serialized entry does not have the shape its field descriptor declares.
    #[error("field {field_id} of `{type_name}` is declared as {expected} but was encoded as {found}")]
    StructureMismatch {
        /// The owning type.
        type_name: &'static str,
        /// The offending field id.
        field_id: u32,
        /// The declared shape.
        expected: &'static str,
        /// The encoded shape.
        found: &'static str,
    },

    /// An accessor received an object of the wrong concrete type.
    #[error("expected an object of type `{expected}`, found `{found}`")]
    TypeMismatch {
        /// The type the accessor works with.
        expected: &'static str,
        /// The type it was handed.
        found: &'static str,
    },

    /// A plain field value could not be encoded.
    #[error("failed to encode plain field `{field}`: {source}")]
    PlainEncode {
        /// The field name.
        field: &'static str,
        /// The underlying encoder error.
        source: rmp_serde::encode::Error,
    },

    /// A prefab diff handle fix-up was completed without the matching start phase.
    #[error("handle fix-up for decode target {0:#x} was completed before it was started")]
    FixupNotStarted(usize),

    /// A persisted graph references an object index that does not exist.
    #[error("persisted graph references missing object #{0}")]
    InvalidReference(u32),

    /// A persisted graph embeds an object inline more than once, or inside itself.
    #[error("persisted object #{0} must be owned by exactly one inline entry outside its own subtree")]
    InlineOwnership(u32),

    /// A persisted graph was written by an incompatible format version.
    #[error("unsupported persisted format version `{0}`")]
    UnsupportedVersion(String),

    /// Saving or serialization error.
    #[error("error occurred while saving: {0}")]
    Saving(Box<dyn std::error::Error + Send + Sync>),

    /// Loading or deserialization error.
    #[error("error occurred while loading: {0}")]
    Loading(Box<dyn std::error::Error + Send + Sync>),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Saving or serialization error.
    pub fn saving(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Saving(Box::new(error))
    }

    /// Loading or deserialization error.
    pub fn loading(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Loading(Box::new(error))
    }

    pub(crate) fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }
}
