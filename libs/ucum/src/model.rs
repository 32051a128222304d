//! UCUM essence model: prefixes, base units, and defined units as loaded
//! from the `ucum-essence.xml` distribution file.

use crate::decimal::Decimal;
use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Prefix {
    pub code: String,
    pub code_uc: String,
    pub name: String,
    pub print_symbol: Option<String>,
    /// Power of ten, e.g. `1e3` for `k`.
    pub value: Decimal,
}

#[derive(Debug, Clone)]
pub struct BaseUnit {
    pub code: String,
    pub code_uc: String,
    pub name: String,
    pub print_symbol: Option<String>,
    pub property: String,
    pub dim: char,
}

/// The definition a derived unit carries: a scalar times another unit
/// expression, or (for special units) a named conversion function.
#[derive(Debug, Clone)]
pub struct UnitValue {
    pub unit: String,
    pub value: Option<Decimal>,
    /// Present on special (non-ratio) units: `(name, scale, unit)`.
    pub function: Option<(String, Decimal, String)>,
}

#[derive(Debug, Clone)]
pub struct DefinedUnit {
    pub code: String,
    pub code_uc: String,
    pub names: Vec<String>,
    pub print_symbol: Option<String>,
    pub property: String,
    pub class: Option<String>,
    pub metric: bool,
    pub special: bool,
    pub arbitrary: bool,
    pub value: UnitValue,
}

/// The parsed essence file, with lookup maps by case-sensitive code.
#[derive(Debug, Default)]
pub struct UcumModel {
    pub version: String,
    pub revision: String,
    pub prefixes: Vec<Prefix>,
    pub base_units: Vec<BaseUnit>,
    pub units: Vec<DefinedUnit>,
    prefix_map: HashMap<String, usize>,
    base_map: HashMap<String, usize>,
    unit_map: HashMap<String, usize>,
}

impl UcumModel {
    pub fn from_essence_xml(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Model(e.to_string()))?;
        let root = doc.root_element();

        let mut model = UcumModel {
            version: root.attribute("version").unwrap_or_default().to_string(),
            revision: root.attribute("revision").unwrap_or_default().to_string(),
            ..Default::default()
        };

        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "prefix" => model.prefixes.push(parse_prefix(&node)?),
                "base-unit" => model.base_units.push(parse_base_unit(&node)?),
                "unit" => model.units.push(parse_unit(&node)?),
                _ => {}
            }
        }

        for (i, p) in model.prefixes.iter().enumerate() {
            model.prefix_map.insert(p.code.clone(), i);
        }
        for (i, b) in model.base_units.iter().enumerate() {
            model.base_map.insert(b.code.clone(), i);
        }
        for (i, u) in model.units.iter().enumerate() {
            model.unit_map.insert(u.code.clone(), i);
        }
        Ok(model)
    }

    pub fn prefix(&self, code: &str) -> Option<&Prefix> {
        self.prefix_map.get(code).map(|i| &self.prefixes[*i])
    }

    pub fn base_unit(&self, code: &str) -> Option<&BaseUnit> {
        self.base_map.get(code).map(|i| &self.base_units[*i])
    }

    pub fn unit(&self, code: &str) -> Option<&DefinedUnit> {
        self.unit_map.get(code).map(|i| &self.units[*i])
    }

    /// True when `code` names any unit, base or defined.
    pub fn is_unit_code(&self, code: &str) -> bool {
        self.base_map.contains_key(code) || self.unit_map.contains_key(code)
    }

    /// Name for a unit code, preferring the first declared name.
    pub fn unit_name(&self, code: &str) -> Option<&str> {
        if let Some(b) = self.base_unit(code) {
            return Some(&b.name);
        }
        self.unit(code)
            .and_then(|u| u.names.first())
            .map(|s| s.as_str())
    }
}

fn child_text(node: &roxmltree::Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
}

fn child_texts(node: &roxmltree::Node, name: &str) -> Vec<String> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .filter_map(|n| n.text())
        .map(|s| s.trim().to_string())
        .collect()
}

fn yes(node: &roxmltree::Node, attr: &str) -> bool {
    node.attribute(attr) == Some("yes")
}

fn parse_prefix(node: &roxmltree::Node) -> Result<Prefix> {
    let code = required_attr(node, "Code")?;
    let value_node = node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "value")
        .ok_or_else(|| Error::Model(format!("prefix '{code}' has no value")))?;
    let value_text = value_node
        .attribute("value")
        .ok_or_else(|| Error::Model(format!("prefix '{code}' has no value attribute")))?;
    Ok(Prefix {
        code_uc: node.attribute("CODE").unwrap_or(&code).to_string(),
        name: child_text(node, "name").unwrap_or_default(),
        print_symbol: child_text(node, "printSymbol"),
        value: Decimal::parse(value_text)
            .map_err(|e| Error::Model(format!("prefix '{code}': {e}")))?,
        code,
    })
}

fn parse_base_unit(node: &roxmltree::Node) -> Result<BaseUnit> {
    let code = required_attr(node, "Code")?;
    let dim = node
        .attribute("dim")
        .and_then(|d| d.chars().next())
        .ok_or_else(|| Error::Model(format!("base unit '{code}' has no dim")))?;
    Ok(BaseUnit {
        code_uc: node.attribute("CODE").unwrap_or(&code).to_string(),
        name: child_text(node, "name").unwrap_or_default(),
        print_symbol: child_text(node, "printSymbol"),
        property: child_text(node, "property").unwrap_or_default(),
        dim,
        code,
    })
}

fn parse_unit(node: &roxmltree::Node) -> Result<DefinedUnit> {
    let code = required_attr(node, "Code")?;
    let value_node = node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "value")
        .ok_or_else(|| Error::Model(format!("unit '{code}' has no value")))?;

    let function = value_node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "function")
        .map(|f| -> Result<(String, Decimal, String)> {
            let name = f.attribute("name").unwrap_or_default().to_string();
            let scale = parse_function_scale(f.attribute("value").unwrap_or("1"))?;
            let unit = f.attribute("Unit").unwrap_or("1").to_string();
            Ok((name, scale, unit))
        })
        .transpose()?;

    let value = UnitValue {
        unit: value_node.attribute("Unit").unwrap_or("1").to_string(),
        value: value_node
            .attribute("value")
            .map(Decimal::parse)
            .transpose()
            .map_err(|e| Error::Model(format!("unit '{code}': {e}")))?,
        function,
    };

    Ok(DefinedUnit {
        code_uc: node.attribute("CODE").unwrap_or(&code).to_string(),
        names: child_texts(node, "name"),
        print_symbol: child_text(node, "printSymbol"),
        property: child_text(node, "property").unwrap_or_default(),
        class: node.attribute("class").map(|s| s.to_string()),
        metric: yes(node, "isMetric"),
        special: yes(node, "isSpecial"),
        arbitrary: yes(node, "isArbitrary"),
        value,
        code,
    })
}

/// Function scales in the essence file are plain decimals.
fn parse_function_scale(text: &str) -> Result<Decimal> {
    Decimal::parse(text).map_err(|e| Error::Model(format!("bad function scale '{text}': {e}")))
}

fn required_attr(node: &roxmltree::Node, name: &str) -> Result<String> {
    node.attribute(name)
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Model(format!("<{}> missing {name}", node.tag_name().name())))
}
