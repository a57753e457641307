use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Value of a single listing field.
///
/// Variants are tried in order when deserializing, so a JSON string is always
/// `Text`, an array of strings is `TextList`, and an array of objects
/// (`Media`, `CustomFields`) is `Records`. Everything else is carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum FieldValue {
    Text(String),
    TextList(Vec<String>),
    Records(Vec<ListingRecord>),
    Other(Value),
}

/// Sparse field-name to value mapping; a missing key is an absent field.
///
/// Fields keep the order the server sent them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ListingRecord {
    fields: Vec<(String, FieldValue)>,
}

impl ListingRecord {
    pub(crate) fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, value)| value)
    }

    pub(crate) fn get_mut(&mut self, field: &str) -> Option<&mut FieldValue> {
        self.fields.iter_mut().find(|(name, _)| name == field).map(|(_, value)| value)
    }

    pub(crate) fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Replaces an existing field in place, otherwise appends.
    pub(crate) fn insert(&mut self, field: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        let field = field.into();
        match self.get_mut(&field) {
            Some(existing) => Some(std::mem::replace(existing, value)),
            None => {
                self.fields.push((field, value));
                None
            }
        }
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn fields_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldValue)> {
        self.fields.iter_mut().map(|(name, value)| (name.as_str(), value))
    }

    pub(crate) fn into_fields(self) -> impl Iterator<Item = (String, FieldValue)> {
        self.fields.into_iter()
    }
}

impl Serialize for ListingRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ListingRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = ListingRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a listing record object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut record = ListingRecord::default();
                while let Some((name, value)) = access.next_entry::<String, FieldValue>()? {
                    record.insert(name, value);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// One `/Property` response page.
#[derive(Debug, Deserialize)]
pub(crate) struct PageResponse {
    #[serde(rename = "@odata.count")]
    pub(crate) count: Option<u64>,
    pub(crate) value: Vec<ListingRecord>,
    #[serde(rename = "@odata.nextLink")]
    pub(crate) next_link: Option<String>,
}

/// Accumulates substituted pages until the run writes them out.
#[derive(Debug, Default)]
pub(crate) struct ListingsContainer {
    pub(crate) records: Vec<ListingRecord>,
}

impl ListingsContainer {
    pub(crate) fn enqueue(&mut self, mut page: Vec<ListingRecord>) {
        info!("Adding {} listings to results", page.len());
        self.records.append(&mut page);
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Writes all records as a single JSON array followed by a newline.
    pub(crate) fn to_json(&self, path: &Path, pretty: bool) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, &self.records)?;
        } else {
            serde_json::to_writer(&mut writer, &self.records)?;
        }
        writer.write_all(b"\n")?;
        writer.flush()?;

        info!("Created file '{}'", path.display());
        Ok(())
    }

    pub(crate) fn into_records(self) -> Vec<ListingRecord> {
        self.records
    }
}
