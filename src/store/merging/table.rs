use crate::error::Result;
use crate::store::files::{self, ReadFailure};
use crate::store::format::{Blob, Record, SerializerDeserializer};
use std::collections::HashMap;
use std::path::Path;

/// Encoded key to encoded value, the content of one writer or merged file.
pub(crate) type Table = HashMap<Blob, Blob>;

pub(crate) fn read_table<Serde>(path: &Path) -> std::result::Result<Table, ReadFailure>
where
    Serde: SerializerDeserializer,
{
    let records: Vec<Record<Blob, Blob>> = files::get::<Serde, _>(path)?;
    Ok(records
        .into_iter()
        .map(|record| (record.key, record.value))
        .collect())
}

/// Records are written sorted by key so equal tables produce equal files.
pub(crate) fn write_table<Serde>(path: &Path, table: &Table, sync: bool) -> Result<()>
where
    Serde: SerializerDeserializer,
{
    let mut records: Vec<Record<&Blob, &Blob>> = table
        .iter()
        .map(|(key, value)| Record { key, value })
        .collect();
    records.sort_by(|a, b| a.key.cmp(b.key));

    files::put::<Serde, _>(path, &records, sync)
}
