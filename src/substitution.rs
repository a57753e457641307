use std::collections::HashSet;
use tracing::warn;

use crate::listing_structs::{FieldValue, ListingRecord};
use crate::metadata::MetadataIndex;

const MEDIA_FIELD: &str = "Media";
const MEDIA_CATEGORY_FIELD: &str = "MediaCategory";
const CUSTOM_FIELDS_FIELD: &str = "CustomFields";

/// Swaps coded enumeration values and custom-field keys for the readable
/// labels published in the metadata.
///
/// Values without a label pass through untouched, so running it over
/// already readable records changes nothing.
pub(crate) struct LabelSubstitution<'a> {
    index: &'a MetadataIndex,
    coded_prefix: &'a str,
}

impl<'a> LabelSubstitution<'a> {
    pub(crate) fn new(index: &'a MetadataIndex, coded_prefix: &'a str) -> Self {
        Self { index, coded_prefix }
    }

    pub(crate) fn apply(&self, records: Vec<ListingRecord>) -> Vec<ListingRecord> {
        records.into_iter().map(|record| self.apply_record(record)).collect()
    }

    pub(crate) fn apply_record(&self, mut record: ListingRecord) -> ListingRecord {
        for (field, value) in record.fields_mut() {
            if self.index.is_enum_field(field) {
                self.swap_enum_value(field, value);
            }
        }

        if let Some(FieldValue::Records(media)) = record.get_mut(MEDIA_FIELD) {
            for item in media.iter_mut() {
                self.swap_media_category(item);
            }
        }

        if let Some(FieldValue::Records(custom)) = record.get_mut(CUSTOM_FIELDS_FIELD) {
            let relabeled: Vec<ListingRecord> = std::mem::take(custom)
                .into_iter()
                .map(|fields| self.relabel_custom_fields(fields))
                .collect();
            *custom = relabeled;
        }

        record
    }

    fn swap_enum_value(&self, field: &str, value: &mut FieldValue) {
        match value {
            FieldValue::Text(code) => {
                if let Some(label) = self.index.enum_label(field, code) {
                    *code = label.to_string();
                }
            }
            FieldValue::TextList(codes) => {
                for code in codes.iter_mut() {
                    if let Some(label) = self.index.enum_label(field, code) {
                        *code = label.to_string();
                    }
                }
            }
            FieldValue::Records(_) | FieldValue::Other(_) => {}
        }
    }

    // free-text categories never carry the prefix, only provider codes do
    fn swap_media_category(&self, media: &mut ListingRecord) {
        if let Some(FieldValue::Text(category)) = media.get_mut(MEDIA_CATEGORY_FIELD) {
            if !category.starts_with(self.coded_prefix) {
                return;
            }
            if let Some(label) = self.index.enum_label(MEDIA_CATEGORY_FIELD, category) {
                *category = label.to_string();
            }
        }
    }

    fn relabel_custom_fields(&self, fields: ListingRecord) -> ListingRecord {
        // every original key stays claimed by its own value, labels only take free names
        let original: HashSet<String> = fields.keys().map(str::to_string).collect();
        let mut relabeled = ListingRecord::default();

        for (key, value) in fields.into_fields() {
            let target = match self.index.custom_field_label(&key) {
                Some(label) if key.starts_with(self.coded_prefix) => {
                    if original.contains(label) || relabeled.contains(label) {
                        warn!(key = %key, label, "Custom field label already taken, keeping coded key");
                        key
                    } else {
                        label.to_string()
                    }
                }
                _ => key,
            };
            relabeled.insert(target, value);
        }

        relabeled
    }
}
