use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

/// Opaque encoded key or value, as stored inside every cache file.
pub type Blob = Vec<u8>;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Abstracts away the selection of the Serialize/Deserialize format.
///
/// The same format encodes the individual keys and values into [`Blob`]s and
/// the container of records around them. Keys are compared by their encoded
/// bytes, so the format must be deterministic for a given key.
pub trait SerializerDeserializer {
    fn serialize<W, T>(writer: W, value: &T) -> Result<(), FormatError>
    where
        W: Write,
        T: Serialize + ?Sized;

    fn deserialize<R, T>(reader: R) -> Result<T, FormatError>
    where
        R: Read,
        T: DeserializeOwned;

    fn to_blob<T>(value: &T) -> Result<Blob, FormatError>
    where
        T: Serialize + ?Sized,
    {
        let mut buffer = Vec::new();
        Self::serialize(&mut buffer, value)?;
        Ok(buffer)
    }

    fn from_blob<T>(blob: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        Self::deserialize(blob)
    }
}

pub struct JsonSerializerDeserializer;

impl SerializerDeserializer for JsonSerializerDeserializer {
    fn serialize<W, T>(writer: W, value: &T) -> Result<(), FormatError>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        Ok(serde_json::to_writer(writer, value)?)
    }

    fn deserialize<R, T>(reader: R) -> Result<T, FormatError>
    where
        R: Read,
        T: DeserializeOwned,
    {
        Ok(serde_json::from_reader(reader)?)
    }
}

pub struct BincodeSerializerDeserializer;

impl SerializerDeserializer for BincodeSerializerDeserializer {
    fn serialize<W, T>(writer: W, value: &T) -> Result<(), FormatError>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        Ok(bincode::serialize_into(writer, value)?)
    }

    fn deserialize<R, T>(reader: R) -> Result<T, FormatError>
    where
        R: Read,
        T: DeserializeOwned,
    {
        Ok(bincode::deserialize_from(reader)?)
    }
}

/// One key/value pair as laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Record<Key, Value> {
    pub key: Key,
    pub value: Value,
}
