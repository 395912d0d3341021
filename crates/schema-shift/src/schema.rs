// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema data model and definition parsing.
//!
//! Registries hand out schema text; compatibility reasoning works on the
//! parsed field list.  Avro record schemas are parsed fully, JSON Schema
//! objects are mapped onto the same model, Protobuf is rejected.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// SchemaFormat
// ---------------------------------------------------------------------------

/// Format of a registered schema definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaFormat {
    Avro,
    Protobuf,
    JsonSchema,
}

impl fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaFormat::Avro => "AVRO",
            SchemaFormat::Protobuf => "PROTOBUF",
            SchemaFormat::JsonSchema => "JSON_SCHEMA",
        })
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Avro primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
}

impl Primitive {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Primitive::Null,
            "boolean" => Primitive::Boolean,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "bytes" => Primitive::Bytes,
            "string" => Primitive::String,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Boolean => "boolean",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Bytes => "bytes",
            Primitive::String => "string",
        }
    }
}

/// A nested record definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub fields: Vec<FieldSpec>,
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    Primitive { primitive: Primitive },
    Record(RecordType),
    Enum {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        aliases: Vec<String>,
        symbols: Vec<String>,
    },
    Fixed {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        aliases: Vec<String>,
        size: usize,
    },
    Array { items: Box<FieldType> },
    Map { values: Box<FieldType> },
    Union { branches: Vec<FieldType> },
    /// Reference to a named type still being defined (recursive schemas).
    Ref {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        aliases: Vec<String>,
    },
}

impl FieldType {
    pub fn primitive(p: Primitive) -> Self {
        FieldType::Primitive { primitive: p }
    }

    /// Short human-readable form used in violation messages.
    pub fn describe(&self) -> String {
        match self {
            FieldType::Primitive { primitive } => primitive.name().to_string(),
            FieldType::Record(r) => format!("record {}", r.name),
            FieldType::Enum { name, .. } => format!("enum {}", name),
            FieldType::Fixed { name, size, .. } => format!("fixed {}[{}]", name, size),
            FieldType::Array { items } => format!("array<{}>", items.describe()),
            FieldType::Map { values } => format!("map<{}>", values.describe()),
            FieldType::Union { branches } => {
                let inner: Vec<String> = branches.iter().map(|b| b.describe()).collect();
                format!("[{}]", inner.join(", "))
            }
            FieldType::Ref { name, .. } => name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldSpec / SchemaVersion
// ---------------------------------------------------------------------------

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// `Some(Value::Null)` is an explicit null default, `None` means required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    /// Required field (no default).
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// `true` if this field answers to `name` directly or through an alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// A record definition at one point of a subject's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub record_name: String,
    pub version: u32,
    pub format: SchemaFormat,
    pub fields: Vec<FieldSpec>,
}

impl SchemaVersion {
    pub fn new(record_name: impl Into<String>, version: u32, fields: Vec<FieldSpec>) -> Self {
        Self {
            record_name: record_name.into(),
            version,
            format: SchemaFormat::Avro,
            fields,
        }
    }

    /// Parse a registry definition into a schema version.
    pub fn parse(
        format: SchemaFormat,
        version: u32,
        definition: &str,
    ) -> Result<Self, SchemaParseError> {
        let record = match format {
            SchemaFormat::Avro => parse_avro(definition)?,
            SchemaFormat::JsonSchema => parse_json_schema(definition)?,
            SchemaFormat::Protobuf => {
                return Err(SchemaParseError::Unsupported(SchemaFormat::Protobuf))
            }
        };
        Ok(Self {
            record_name: record.name,
            version,
            format,
            fields: record.fields,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// View the top-level definition as a record type.
    pub fn as_record(&self) -> RecordType {
        RecordType {
            name: self.record_name.clone(),
            aliases: Vec::new(),
            fields: self.fields.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaParseError
// ---------------------------------------------------------------------------

/// A schema definition could not be turned into a field list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaParseError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("top-level schema must be a record, found {0}")]
    NotARecord(String),

    #[error("missing attribute {attribute:?} in {context}")]
    MissingAttribute {
        attribute: &'static str,
        context: String,
    },

    #[error("unknown type {0:?}")]
    UnknownType(String),

    #[error("duplicate field {0:?}")]
    DuplicateField(String),

    #[error("invalid schema: {0}")]
    Invalid(String),

    #[error("{0} definitions cannot be parsed into fields")]
    Unsupported(SchemaFormat),
}

impl From<serde_json::Error> for SchemaParseError {
    fn from(e: serde_json::Error) -> Self {
        SchemaParseError::Json(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Avro parsing
// ---------------------------------------------------------------------------

/// Named types seen so far while walking one definition.
#[derive(Default)]
struct NameTable {
    defined: HashMap<String, FieldType>,
    /// Records whose fields are being parsed, with their aliases.
    in_progress: Vec<(String, Vec<String>)>,
}

impl NameTable {
    fn lookup(&self, name: &str) -> Option<FieldType> {
        let simple = simple_name(name);
        if let Some(t) = self.defined.get(simple) {
            return Some(t.clone());
        }
        if let Some((name, aliases)) = self.in_progress.iter().find(|(n, _)| n == simple) {
            return Some(FieldType::Ref {
                name: name.clone(),
                aliases: aliases.clone(),
            });
        }
        None
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn parse_avro(definition: &str) -> Result<RecordType, SchemaParseError> {
    let value: Value = serde_json::from_str(definition)?;
    let mut names = NameTable::default();
    match parse_avro_type(&value, &mut names)? {
        FieldType::Record(record) => Ok(record),
        other => Err(SchemaParseError::NotARecord(other.describe())),
    }
}

fn parse_avro_type(value: &Value, names: &mut NameTable) -> Result<FieldType, SchemaParseError> {
    match value {
        Value::String(name) => named_or_primitive(name, names),
        Value::Array(branches) => {
            let branches = branches
                .iter()
                .map(|b| parse_avro_type(b, names))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FieldType::Union { branches })
        }
        Value::Object(obj) => parse_avro_object(obj, names),
        other => Err(SchemaParseError::Invalid(format!(
            "unexpected type declaration {}",
            other
        ))),
    }
}

fn named_or_primitive(name: &str, names: &NameTable) -> Result<FieldType, SchemaParseError> {
    if let Some(p) = Primitive::from_name(name) {
        return Ok(FieldType::primitive(p));
    }
    names
        .lookup(name)
        .ok_or_else(|| SchemaParseError::UnknownType(name.to_string()))
}

fn parse_avro_object(
    obj: &Map<String, Value>,
    names: &mut NameTable,
) -> Result<FieldType, SchemaParseError> {
    let kind = match obj.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        // {"type": {...}} or {"type": [...]} wraps another declaration.
        Some(inner) => return parse_avro_type(inner, names),
        None => {
            return Err(SchemaParseError::MissingAttribute {
                attribute: "type",
                context: "type declaration".into(),
            })
        }
    };

    match kind {
        "record" | "error" => parse_avro_record(obj, names).map(FieldType::Record),
        "enum" => {
            let name = required_name(obj, "enum")?;
            let symbols = string_list(obj, "symbols").ok_or_else(|| {
                SchemaParseError::MissingAttribute {
                    attribute: "symbols",
                    context: format!("enum {}", name),
                }
            })?;
            let t = FieldType::Enum {
                name: name.clone(),
                aliases: string_list(obj, "aliases").unwrap_or_default(),
                symbols,
            };
            names.defined.insert(name, t.clone());
            Ok(t)
        }
        "fixed" => {
            let name = required_name(obj, "fixed")?;
            let size = obj.get("size").and_then(Value::as_u64).ok_or_else(|| {
                SchemaParseError::MissingAttribute {
                    attribute: "size",
                    context: format!("fixed {}", name),
                }
            })?;
            let t = FieldType::Fixed {
                name: name.clone(),
                aliases: string_list(obj, "aliases").unwrap_or_default(),
                size: size as usize,
            };
            names.defined.insert(name, t.clone());
            Ok(t)
        }
        "array" => {
            let items = obj.get("items").ok_or_else(|| SchemaParseError::MissingAttribute {
                attribute: "items",
                context: "array".into(),
            })?;
            Ok(FieldType::Array {
                items: Box::new(parse_avro_type(items, names)?),
            })
        }
        "map" => {
            let values = obj.get("values").ok_or_else(|| SchemaParseError::MissingAttribute {
                attribute: "values",
                context: "map".into(),
            })?;
            Ok(FieldType::Map {
                values: Box::new(parse_avro_type(values, names)?),
            })
        }
        // Primitives with attributes, logical types included.
        other => named_or_primitive(other, names),
    }
}

fn parse_avro_record(
    obj: &Map<String, Value>,
    names: &mut NameTable,
) -> Result<RecordType, SchemaParseError> {
    let name = required_name(obj, "record")?;
    let raw_fields = obj.get("fields").and_then(Value::as_array).ok_or_else(|| {
        SchemaParseError::MissingAttribute {
            attribute: "fields",
            context: format!("record {}", name),
        }
    })?;

    let aliases = string_list(obj, "aliases").unwrap_or_default();
    names.in_progress.push((name.clone(), aliases.clone()));
    let mut fields: Vec<FieldSpec> = Vec::with_capacity(raw_fields.len());
    for raw in raw_fields {
        let field_obj = raw.as_object().ok_or_else(|| {
            SchemaParseError::Invalid(format!("field of record {} is not an object", name))
        })?;
        let field_name = required_name(field_obj, "field")?;
        if fields.iter().any(|f| f.name == field_name) {
            return Err(SchemaParseError::DuplicateField(field_name));
        }
        let decl = field_obj.get("type").ok_or_else(|| SchemaParseError::MissingAttribute {
            attribute: "type",
            context: format!("field {}.{}", name, field_name),
        })?;
        fields.push(FieldSpec {
            field_type: parse_avro_type(decl, names)?,
            default: field_obj.get("default").cloned(),
            aliases: string_list(field_obj, "aliases").unwrap_or_default(),
            name: field_name,
        });
    }
    names.in_progress.pop();

    let record = RecordType {
        name: name.clone(),
        aliases,
        fields,
    };
    names
        .defined
        .insert(name, FieldType::Record(record.clone()));
    Ok(record)
}

fn required_name(obj: &Map<String, Value>, context: &str) -> Result<String, SchemaParseError> {
    obj.get("name")
        .and_then(Value::as_str)
        .map(|n| simple_name(n).to_string())
        .ok_or_else(|| SchemaParseError::MissingAttribute {
            attribute: "name",
            context: context.to_string(),
        })
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    obj.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| simple_name(s).to_string())
            .collect()
    })
}

// ---------------------------------------------------------------------------
// JSON Schema mapping
// ---------------------------------------------------------------------------

fn parse_json_schema(definition: &str) -> Result<RecordType, SchemaParseError> {
    let value: Value = serde_json::from_str(definition)?;
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaParseError::NotARecord(value.to_string()))?;
    let name = obj
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Root")
        .to_string();
    json_object_record(&name, obj)
}

fn json_object_record(
    name: &str,
    obj: &Map<String, Value>,
) -> Result<RecordType, SchemaParseError> {
    match obj.get("type").and_then(Value::as_str) {
        Some("object") | None => {}
        Some(other) => return Err(SchemaParseError::NotARecord(other.to_string())),
    }

    let required: Vec<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut fields = Vec::new();
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        // serde_json keeps keys sorted; field order is irrelevant to matching.
        for (prop, decl) in props {
            let field_type = json_property_type(prop, decl)?;
            let mut field = FieldSpec::new(prop.clone(), field_type);
            if !required.contains(&prop.as_str()) {
                field.default = Some(decl.get("default").cloned().unwrap_or(Value::Null));
            }
            fields.push(field);
        }
    }

    Ok(RecordType {
        name: name.to_string(),
        aliases: Vec::new(),
        fields,
    })
}

fn json_property_type(prop: &str, decl: &Value) -> Result<FieldType, SchemaParseError> {
    let obj = decl
        .as_object()
        .ok_or_else(|| SchemaParseError::Invalid(format!("property {} is not an object", prop)))?;

    if let Some(Value::Array(choices)) = obj.get("type") {
        let mut branches = Vec::with_capacity(choices.len());
        for choice in choices {
            let name = choice
                .as_str()
                .ok_or_else(|| SchemaParseError::Invalid(format!("property {} type list", prop)))?;
            branches.push(json_simple_type(prop, name, obj)?);
        }
        return Ok(FieldType::Union { branches });
    }

    let name = obj.get("type").and_then(Value::as_str).unwrap_or("object");
    json_simple_type(prop, name, obj)
}

fn json_simple_type(
    prop: &str,
    name: &str,
    obj: &Map<String, Value>,
) -> Result<FieldType, SchemaParseError> {
    Ok(match name {
        "null" => FieldType::primitive(Primitive::Null),
        "boolean" => FieldType::primitive(Primitive::Boolean),
        "integer" => FieldType::primitive(Primitive::Long),
        "number" => FieldType::primitive(Primitive::Double),
        "string" => FieldType::primitive(Primitive::String),
        "object" => FieldType::Record(json_object_record(prop, obj)?),
        "array" => {
            let items = match obj.get("items") {
                Some(items) => json_property_type(prop, items)?,
                None => FieldType::primitive(Primitive::String),
            };
            FieldType::Array {
                items: Box::new(items),
            }
        }
        other => return Err(SchemaParseError::UnknownType(other.to_string())),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
