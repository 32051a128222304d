//! FHIR CodeSystem model
//!
//! Version-agnostic model for CodeSystems (terminology). R3 resources are
//! normalized on load; R4 and R5 deserialize directly.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR CodeSystem resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystem {
    /// Resource type - always "CodeSystem"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Canonical identifier
    pub url: String,

    /// Business version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Name (computer friendly)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Name (human friendly)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Publication status
    #[serde(default)]
    pub status: PublicationStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Default language for every `display` in this resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,

    /// If code comparison is case sensitive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,

    /// Hierarchy meaning (grouped-by | is-a | part-of | classified-with)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy_meaning: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compositional: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_needed: Option<bool>,

    /// Content type (not-present | example | fragment | complete | supplement)
    pub content: CodeSystemContentMode,

    /// Canonical URL of the code system this supplements (may carry
    /// `|version`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplements: Option<String>,

    /// Total concepts in the code system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Filter definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<CodeSystemFilter>>,

    /// Property definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<Vec<CodeSystemProperty>>,

    /// Concepts in the code system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<Vec<CodeSystemConcept>>,

    /// Additional content
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "CodeSystem".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PublicationStatus {
    Draft,
    #[default]
    Active,
    Retired,
    Unknown,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Draft => "draft",
            PublicationStatus::Active => "active",
            PublicationStatus::Retired => "retired",
            PublicationStatus::Unknown => "unknown",
        }
    }
}

/// Content mode for a code system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodeSystemContentMode {
    NotPresent,
    Example,
    Fragment,
    Complete,
    Supplement,
}

impl CodeSystemContentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeSystemContentMode::NotPresent => "not-present",
            CodeSystemContentMode::Example => "example",
            CodeSystemContentMode::Fragment => "fragment",
            CodeSystemContentMode::Complete => "complete",
            CodeSystemContentMode::Supplement => "supplement",
        }
    }
}

/// Filter for a code system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSystemFilter {
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub operator: Vec<String>,

    pub value: String,
}

/// Property definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSystemProperty {
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Type of property (code | Coding | string | integer | boolean | dateTime | decimal)
    #[serde(rename = "type")]
    pub property_type: String,
}

/// A `system/code/display` triple as it appears in designation uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Additional representation for a concept
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConceptDesignation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<Coding>,

    pub value: String,
}

impl ConceptDesignation {
    /// True when this designation's `use` marks it as display text.
    pub fn is_display_use(&self) -> bool {
        match &self.use_ {
            None => false,
            Some(coding) => matches!(
                coding.code.as_deref(),
                Some("display") | Some("preferredForLanguage") | Some("900000000000003001")
            ),
        }
    }
}

/// Concept in the code system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSystemConcept {
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<Vec<ConceptDesignation>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<Vec<CodeSystemConceptProperty>>,

    /// Child concepts (nested hierarchy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<Vec<CodeSystemConcept>>,
}

/// Property value for a concept. The `value[x]` choice is kept as the raw
/// flattened form; accessors below pick it apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSystemConceptProperty {
    pub code: String,

    #[serde(flatten)]
    pub value: HashMap<String, Value>,
}

impl CodeSystemConceptProperty {
    pub fn value_code(&self) -> Option<&str> {
        self.value.get("valueCode").and_then(Value::as_str)
    }

    pub fn value_string(&self) -> Option<&str> {
        self.value.get("valueString").and_then(Value::as_str)
    }

    pub fn value_boolean(&self) -> Option<bool> {
        self.value.get("valueBoolean").and_then(Value::as_bool)
    }

    pub fn value_coding(&self) -> Option<Coding> {
        self.value
            .get("valueCoding")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The property value as comparable text, whatever its type.
    pub fn value_text(&self) -> Option<String> {
        for key in [
            "valueCode",
            "valueString",
            "valueDateTime",
            "valueDecimal",
            "valueInteger",
            "valueBoolean",
        ] {
            if let Some(v) = self.value.get(key) {
                return Some(match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
        }
        self.value_coding().and_then(|c| c.code)
    }
}

impl CodeSystemConcept {
    pub fn designations(&self) -> &[ConceptDesignation] {
        self.designation.as_deref().unwrap_or(&[])
    }

    pub fn properties(&self) -> &[CodeSystemConceptProperty] {
        self.property.as_deref().unwrap_or(&[])
    }

    pub fn property(&self, code: &str) -> Option<&CodeSystemConceptProperty> {
        self.properties().iter().find(|p| p.code == code)
    }

    pub fn children(&self) -> &[CodeSystemConcept] {
        self.concept.as_deref().unwrap_or(&[])
    }
}

impl CodeSystem {
    /// Create a new CodeSystem with minimal required fields
    pub fn new(
        url: impl Into<String>,
        status: PublicationStatus,
        content: CodeSystemContentMode,
    ) -> Self {
        Self {
            resource_type: "CodeSystem".to_string(),
            id: None,
            url: url.into(),
            version: None,
            name: None,
            title: None,
            status,
            experimental: None,
            date: None,
            publisher: None,
            description: None,
            language: None,
            copyright: None,
            case_sensitive: None,
            value_set: None,
            hierarchy_meaning: None,
            compositional: None,
            version_needed: None,
            content,
            supplements: None,
            count: None,
            filter: None,
            property: None,
            concept: None,
            extensions: HashMap::new(),
        }
    }

    /// Parse a CodeSystem from a JSON resource, accepting R3, R4, and R5
    /// shapes. R3's single `identifier` object is wrapped into an array.
    pub fn from_json(mut resource: Value) -> Result<Self> {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if resource_type != "CodeSystem" {
            return Err(Error::WrongResourceType(resource_type));
        }

        if let Some(obj) = resource.as_object_mut() {
            if let Some(identifier) = obj.get_mut("identifier") {
                if identifier.is_object() {
                    let single = identifier.take();
                    *identifier = Value::Array(vec![single]);
                }
            }
        }

        serde_json::from_value(resource).map_err(Error::Json)
    }

    /// Parse a CodeSystem from its XML representation.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let json = terminus_format::xml_to_json(xml)?;
        Self::from_json(json)
    }

    pub fn is_supplement(&self) -> bool {
        self.content == CodeSystemContentMode::Supplement
    }

    /// The URL this supplement targets, with any `|version` suffix split
    /// off.
    pub fn supplements_target(&self) -> Option<(&str, Option<&str>)> {
        self.supplements.as_deref().map(|s| match s.split_once('|') {
            Some((url, version)) => (url, Some(version)),
            None => (s, None),
        })
    }

    pub fn concepts(&self) -> &[CodeSystemConcept] {
        self.concept.as_deref().unwrap_or(&[])
    }

    pub fn property_definitions(&self) -> &[CodeSystemProperty] {
        self.property.as_deref().unwrap_or(&[])
    }

    /// Find a declared property by code or by its canonical URI.
    pub fn property_definition(&self, key: &str) -> Option<&CodeSystemProperty> {
        self.property_definitions()
            .iter()
            .find(|p| p.code == key || p.uri.as_deref() == Some(key))
    }
}
