use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::Result;

const CUSTOM_FIELDS_ENTITY: &str = "CustomFields";

/// Readable labels extracted from a `$metadata` document.
///
/// Built once per run and only read afterwards. A missing label is a normal
/// outcome: lookups return `None` and callers keep the coded value.
#[derive(Debug, Default)]
pub(crate) struct MetadataIndex {
    enum_fields: Vec<String>,
    enum_field_set: HashSet<String>,
    enum_labels: HashMap<String, HashMap<String, String>>,
    property_labels: HashMap<String, HashMap<String, String>>,
    custom_field_labels: HashMap<String, String>,
}

/// Element currently receiving an annotation.
#[derive(Debug, Clone)]
enum Owner {
    Member { enum_type: String, member: String },
    Property { entity_type: String, property: String },
}

#[derive(Default)]
struct ParseState {
    enum_type: Option<String>,
    entity_type: Option<String>,
    owner: Option<Owner>,
    in_annotation: bool,
    in_annotation_string: bool,
}

impl MetadataIndex {
    pub(crate) fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut index = MetadataIndex::default();
        let mut state = ParseState::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => index.open(&e, false, &mut state)?,
                Event::Empty(e) => index.open(&e, true, &mut state)?,
                Event::Text(t) => {
                    if state.in_annotation_string {
                        let label = t.unescape()?;
                        if let Some(owner) = state.owner.as_ref() {
                            index.record_label(owner, &label);
                        }
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"EnumType" => state.enum_type = None,
                    b"EntityType" => state.entity_type = None,
                    b"Member" | b"Property" => state.owner = None,
                    b"Annotation" => state.in_annotation = false,
                    b"String" => state.in_annotation_string = false,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        info!(
            enum_types = index.enum_fields().len(),
            enum_labels = index.enum_labels.values().map(HashMap::len).sum::<usize>(),
            property_labels = index.custom_field_labels.len(),
            "Indexed metadata"
        );
        Ok(index)
    }

    fn open(
        &mut self,
        e: &BytesStart<'_>,
        empty: bool,
        state: &mut ParseState,
    ) -> Result<()> {
        match e.local_name().as_ref() {
            b"EnumType" => {
                if let Some(name) = attribute(e, b"Name")? {
                    if self.enum_field_set.insert(name.clone()) {
                        self.enum_fields.push(name.clone());
                    }
                    if !empty {
                        state.enum_type = Some(name);
                    }
                }
            }
            b"EntityType" => {
                if !empty {
                    state.entity_type = attribute(e, b"Name")?;
                }
            }
            b"Member" => {
                if let (Some(enum_type), Some(member)) = (state.enum_type.clone(), attribute(e, b"Name")?) {
                    if !empty {
                        state.owner = Some(Owner::Member { enum_type, member });
                    }
                }
            }
            b"Property" => {
                if let (Some(entity_type), Some(property)) =
                    (state.entity_type.clone(), attribute(e, b"Name")?)
                {
                    if !empty {
                        state.owner = Some(Owner::Property { entity_type, property });
                    }
                }
            }
            b"Annotation" => {
                if let Some(owner) = state.owner.clone() {
                    if let Some(label) = attribute(e, b"String")? {
                        self.record_label(&owner, &label);
                    }
                    state.in_annotation = !empty;
                }
            }
            b"String" => {
                state.in_annotation_string = state.in_annotation && !empty;
            }
            _ => {}
        }
        Ok(())
    }

    /// First label wins, matching the first `Annotation` in document order.
    fn record_label(&mut self, owner: &Owner, label: &str) {
        match owner {
            Owner::Member { enum_type, member } => {
                self.enum_labels
                    .entry(enum_type.clone())
                    .or_default()
                    .entry(member.clone())
                    .or_insert_with(|| label.to_string());
            }
            Owner::Property { entity_type, property } => {
                self.property_labels
                    .entry(entity_type.clone())
                    .or_default()
                    .entry(property.clone())
                    .or_insert_with(|| label.to_string());
                self.custom_field_labels
                    .entry(property.clone())
                    .or_insert_with(|| label.to_string());
            }
        }
        debug!(?owner, label, "Annotation");
    }

    /// Every enumeration type name, in document order.
    pub(crate) fn enum_fields(&self) -> &[String] {
        &self.enum_fields
    }

    pub(crate) fn is_enum_field(&self, field: &str) -> bool {
        self.enum_field_set.contains(field)
    }

    pub(crate) fn enum_label(&self, field: &str, code: &str) -> Option<&str> {
        self.enum_labels.get(field)?.get(code).map(String::as_str)
    }

    /// Prefers the `CustomFields` entity, then any entity declaring the property.
    pub(crate) fn custom_field_label(&self, property: &str) -> Option<&str> {
        self.property_label(CUSTOM_FIELDS_ENTITY, property)
            .or_else(|| self.custom_field_labels.get(property).map(String::as_str))
    }

    pub(crate) fn property_label(&self, entity_type: &str, property: &str) -> Option<&str> {
        self.property_labels.get(entity_type)?.get(property).map(String::as_str)
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
