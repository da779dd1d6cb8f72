//! [`Format`] handles the byte-level encoding of persisted object graphs.

use std::io::{
    Read,
    Write,
};

use serde::{
    Serialize,
    de::DeserializeOwned,
};

use crate::error::Error;

/// Handles serialization and deserialization of persisted graphs.
pub trait Format {
    /// The file extension used by the format.
    ///
    /// Defaults to `.asset`.
    fn extension() -> &'static str {
        ".asset"
    }

    /// Serializes a value with the format.
    ///
    /// # Errors
    /// If serialization fails.
    fn serialize<W: Write, T: Serialize>(writer: W, value: &T) -> Result<(), Error>;

    /// Deserializes a value with the format.
    ///
    /// # Errors
    /// If deserialization fails.
    fn deserialize<R: Read, T: DeserializeOwned>(reader: R) -> Result<T, Error>;
}

/// An implementation of [`Format`] that uses [`rmp_serde`].
pub struct MessagePackFormat;

impl Format for MessagePackFormat {
    fn extension() -> &'static str {
        ".mp"
    }

    fn serialize<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<(), Error> {
        let mut ser = rmp_serde::Serializer::new(&mut writer);
        value.serialize(&mut ser).map_err(Error::saving)?;
        writer.flush()?;
        Ok(())
    }

    fn deserialize<R: Read, T: DeserializeOwned>(reader: R) -> Result<T, Error> {
        let mut de = rmp_serde::Deserializer::new(reader);
        T::deserialize(&mut de).map_err(Error::loading)
    }
}

/// An implementation of [`Format`] that uses [`serde_json`].
pub struct JsonFormat;

impl Format for JsonFormat {
    fn extension() -> &'static str {
        ".json"
    }

    fn serialize<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<(), Error> {
        let mut ser = serde_json::Serializer::pretty(&mut writer);
        value.serialize(&mut ser).map_err(Error::saving)?;
        writer.flush()?;
        Ok(())
    }

    fn deserialize<R: Read, T: DeserializeOwned>(reader: R) -> Result<T, Error> {
        let mut de = serde_json::Deserializer::from_reader(reader);
        T::deserialize(&mut de).map_err(Error::loading)
    }
}

/// A reasonable default [`Format`].
pub type DefaultFormat = MessagePackFormat;

/// A reasonable default debug [`Format`], human-readable.
pub type DefaultDebugFormat = JsonFormat;
