//! Presentation schema: the field list a data source reports for a model.
//!
//! A schema is a value. Views such as "everything except timestamp fields"
//! are derived copies; nothing mutates a schema in place around a save.

use crate::domain::model::Record;
use serde::Serialize;

const TIMESTAMP_FIELDS: [&str; 3] = ["created", "modified", "updated"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Datetime,
    Binary,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Primary,
    Hash,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub length: Option<usize>,
    pub key: Option<KeyRole>,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            length: None,
            key: None,
        }
    }

    pub fn key(mut self, role: KeyRole) -> Self {
        self.key = Some(role);
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PresentationSchema {
    fields: Vec<FieldSpec>,
}

impl PresentationSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec::new(name, kind));
        self
    }

    pub fn key_field(mut self, name: &str, kind: FieldKind, role: KeyRole) -> Self {
        self.fields.push(FieldSpec::new(name, kind).key(role));
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn key_for(&self, role: KeyRole) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == Some(role))
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.get(name).map(|f| f.kind)
    }

    /// Copy of this schema without the auto-maintained timestamp fields.
    pub fn without_timestamps(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|f| !TIMESTAMP_FIELDS.contains(&f.name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Merges `other` into a copy of this schema; fields already present win.
    pub fn merged(&self, other: &PresentationSchema) -> Self {
        let mut fields = self.fields.clone();
        for spec in &other.fields {
            if !fields.iter().any(|f| f.name == spec.name) {
                fields.push(spec.clone());
            }
        }
        Self { fields }
    }

    /// Restricts a save payload to the persistable fields of this schema.
    /// An empty schema accepts every field except the timestamp ones.
    pub fn project(&self, record: &Record) -> Record {
        let persistable = self.without_timestamps();
        let data = record
            .data
            .iter()
            .filter(|(name, _)| {
                if persistable.is_empty() {
                    !TIMESTAMP_FIELDS.contains(&name.as_str())
                } else {
                    persistable.contains(name)
                }
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Record { data }
    }
}
