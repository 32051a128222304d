//! FHIR resource JSON ↔ XML conversion.
//!
//! Schema-agnostic, following the official FHIR mapping rules:
//! - The root element name is the `resourceType`.
//! - Primitives are encoded via the `value` attribute; primitive metadata
//!   (`id`, `extension`) travels in the aligned `_field` entries.
//! - Repeated XML elements map to JSON arrays. Fields that the FHIR schema
//!   declares as lists become arrays even when a single element is present,
//!   so downstream models can rely on the JSON shape.
//! - Element text values stay strings except for booleans and a small set
//!   of fields that are integers in every FHIR version; codes such as
//!   `"007"` or `"840"` must never collapse into numbers.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use roxmltree::Document;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

const FHIR_NS: &str = "http://hl7.org/fhir";
const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Fields that are arrays in the FHIR schema. A single XML element with one
/// of these names still becomes a one-element JSON array.
const LIST_FIELDS: &[&str] = &[
    "concept",
    "designation",
    "property",
    "filter",
    "extension",
    "modifierExtension",
    "identifier",
    "contact",
    "telecom",
    "useContext",
    "jurisdiction",
    "parameter",
    "part",
    "coding",
    "include",
    "exclude",
    "contains",
    "given",
];

/// Fields whose values are integral in every FHIR version this crate
/// consumes.
const INTEGER_FIELDS: &[&str] = &["count", "total", "offset"];

pub type Result<T> = std::result::Result<T, FormatError>;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("expected a JSON object for the resource")]
    ExpectedObject,
    #[error("missing resourceType property")]
    MissingResourceType,
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),
}

/// Convert a FHIR XML payload into its JSON `Value` representation.
pub fn xml_to_json(input: &str) -> Result<Value> {
    let doc = Document::parse(input)?;
    let root = doc.root_element();

    let mut map = Map::new();
    map.insert(
        "resourceType".to_string(),
        Value::String(root.tag_name().name().to_string()),
    );

    let mut body = Map::new();
    for child in root.children().filter(|n| n.is_element()) {
        read_element(input, &mut body, &child)?;
    }
    promote_list_fields(&mut body);

    map.extend(body);
    Ok(Value::Object(map))
}

/// Convert a FHIR JSON payload into its XML representation.
pub fn json_to_xml(resource: &Value) -> Result<String> {
    let obj = resource.as_object().ok_or(FormatError::ExpectedObject)?;
    let resource_type = obj
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or(FormatError::MissingResourceType)?;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let mut root = BytesStart::new(resource_type);
    root.push_attribute(("xmlns", FHIR_NS));
    writer.write_event(Event::Start(root))?;

    let meta = collect_field_meta(obj);
    for (key, value) in obj {
        if key == "resourceType" || key.starts_with('_') {
            continue;
        }
        write_value(&mut writer, key, value, meta.get(key.as_str()).copied())?;
    }
    // Metadata entries with no sibling value field still emit an element.
    for (key, value) in &meta {
        if !obj.contains_key(*key) {
            write_value(&mut writer, key, &Value::Null, Some(*value))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new(resource_type)))?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

fn collect_field_meta<'a>(obj: &'a Map<String, Value>) -> HashMap<&'a str, &'a Value> {
    obj.iter()
        .filter_map(|(k, v)| k.strip_prefix('_').map(|name| (name, v)))
        .collect()
}

fn write_value(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    value: &Value,
    meta: Option<&Value>,
) -> Result<()> {
    match value {
        Value::Array(items) => {
            let meta_array = meta.and_then(|m| m.as_array());
            for (idx, item) in items.iter().enumerate() {
                let item_meta = meta_array.and_then(|m| m.get(idx));
                write_value(writer, name, item, item_meta)?;
            }
        }
        Value::Object(obj) => write_complex(writer, name, obj)?,
        Value::Null => {
            if let Some(m) = meta {
                write_primitive(writer, name, &Value::Null, Some(m))?;
            }
        }
        primitive => write_primitive(writer, name, primitive, meta)?,
    }
    Ok(())
}

fn write_complex(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    obj: &Map<String, Value>,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    if let Some(Value::String(id)) = obj.get("id") {
        // Narrative-bearing elements keep id as an attribute in XML.
        start.push_attribute(("id", id.as_str()));
    }
    writer.write_event(Event::Start(start))?;

    let meta = collect_field_meta(obj);
    for (key, value) in obj {
        if key.starts_with('_') || key == "id" {
            continue;
        }
        write_value(writer, key, value, meta.get(key.as_str()).copied())?;
    }

    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_primitive(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    value: &Value,
    meta: Option<&Value>,
) -> Result<()> {
    let mut elem = BytesStart::new(name);

    let has_value = !matches!(value, Value::Null);
    if has_value {
        elem.push_attribute(("value", primitive_text(value).as_str()));
    }

    let mut extensions = None;
    if let Some(Value::Object(m)) = meta {
        if let Some(Value::String(id)) = m.get("id") {
            elem.push_attribute(("id", id.as_str()));
        }
        extensions = m.get("extension");
    }

    if !has_value && extensions.is_none() {
        return Ok(());
    }

    match extensions {
        Some(ext) => {
            writer.write_event(Event::Start(elem))?;
            write_value(writer, "extension", ext, None)?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        None => writer.write_event(Event::Empty(elem))?,
    }
    Ok(())
}

fn primitive_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn read_element(
    source: &str,
    target: &mut Map<String, Value>,
    node: &roxmltree::Node,
) -> Result<()> {
    let name = node.tag_name().name().to_string();
    let (value, meta) = element_value(source, node)?;
    insert_property(target, &name, value, meta);
    Ok(())
}

fn element_value(source: &str, node: &roxmltree::Node) -> Result<(Value, Option<Value>)> {
    if node.tag_name().namespace().is_some_and(|ns| ns == XHTML_NS) {
        let snippet = &source[node.range()];
        return Ok((Value::String(snippet.to_string()), None));
    }

    if let Some(text) = node.attribute("value") {
        let mut meta_map = Map::new();
        if let Some(id) = node.attribute("id") {
            meta_map.insert("id".to_string(), Value::String(id.to_string()));
        }
        let extensions: Vec<Value> = node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "extension")
            .map(|c| element_value(source, &c).map(|(v, _)| v))
            .collect::<Result<_>>()?;
        if !extensions.is_empty() {
            meta_map.insert("extension".to_string(), Value::Array(extensions));
        }
        let name = node.tag_name().name();
        let meta = (!meta_map.is_empty()).then(|| Value::Object(meta_map));
        return Ok((primitive_value(name, text), meta));
    }

    let mut obj = Map::new();
    if let Some(id) = node.attribute("id") {
        obj.insert("id".to_string(), Value::String(id.to_string()));
    }
    for child in node.children().filter(|c| c.is_element()) {
        read_element(source, &mut obj, &child)?;
    }
    promote_list_fields(&mut obj);
    Ok((Value::Object(obj), None))
}

/// Decide the JSON type for an XML `value` attribute.
fn primitive_value(field: &str, text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if INTEGER_FIELDS.contains(&field) {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    Value::String(text.to_string())
}

/// Wrap single values of schema-declared list fields into arrays.
fn promote_list_fields(obj: &mut Map<String, Value>) {
    for field in LIST_FIELDS {
        if let Some(value) = obj.get_mut(*field) {
            if !value.is_array() {
                let single = value.take();
                *value = Value::Array(vec![single]);
            }
        }
    }
}

fn insert_property(map: &mut Map<String, Value>, name: &str, value: Value, meta: Option<Value>) {
    match map.entry(name.to_string()) {
        serde_json::map::Entry::Vacant(v) => {
            v.insert(value);
        }
        serde_json::map::Entry::Occupied(mut o) => match o.get_mut() {
            Value::Array(arr) => arr.push(value),
            existing => {
                let old = existing.take();
                *existing = Value::Array(vec![old, value]);
            }
        },
    }

    let value_count = match map.get(name) {
        Some(Value::Array(arr)) => arr.len(),
        Some(_) => 1,
        None => 0,
    };
    let value_is_array = matches!(map.get(name), Some(Value::Array(_)));
    let meta_key = format!("_{name}");

    if meta.is_none() && !map.contains_key(&meta_key) {
        return;
    }

    match map.entry(meta_key) {
        serde_json::map::Entry::Vacant(v) => {
            if let Some(m) = meta {
                if value_is_array {
                    let mut arr = vec![Value::Null; value_count.saturating_sub(1)];
                    arr.push(m);
                    v.insert(Value::Array(arr));
                } else {
                    v.insert(m);
                }
            }
        }
        serde_json::map::Entry::Occupied(mut o) => match o.get_mut() {
            Value::Array(arr) => {
                while arr.len() + 1 < value_count {
                    arr.push(Value::Null);
                }
                arr.push(meta.unwrap_or(Value::Null));
            }
            existing => {
                let first = existing.take();
                let mut arr = vec![first];
                while arr.len() + 1 < value_count {
                    arr.push(Value::Null);
                }
                arr.push(meta.unwrap_or(Value::Null));
                *existing = Value::Array(arr);
            }
        },
    }
}
