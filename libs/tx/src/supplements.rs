//! Supplement overlay and the language-aware display resolution algorithm
//! shared by all providers.

use crate::provider::{ConceptProperty, Designation};
use std::sync::Arc;
use terminus_langs::{LanguageTag, Languages};
use terminus_models::{CodeSystem, CodeSystemConcept};

/// Find a concept by code anywhere in a supplement's concept tree.
pub fn supplement_concept<'a>(
    supplement: &'a CodeSystem,
    code: &str,
) -> Option<&'a CodeSystemConcept> {
    let mut stack: Vec<&CodeSystemConcept> = supplement.concepts().iter().collect();
    while let Some(concept) = stack.pop() {
        if concept.code == code {
            return Some(concept);
        }
        stack.extend(concept.children().iter());
    }
    None
}

/// True when any supplement can contribute display text in one of the
/// requested languages: a matching resource `language` with any `display`,
/// or a display-use designation in a matching language.
pub fn supplements_have_any_displays(supplements: &[Arc<CodeSystem>], langs: &Languages) -> bool {
    for supplement in supplements {
        if let Some(language) = &supplement.language {
            let tag = LanguageTag::parse(language);
            if langs.has_match(&tag) && has_any_display(supplement) {
                return true;
            }
        }
        let mut stack: Vec<&CodeSystemConcept> = supplement.concepts().iter().collect();
        while let Some(concept) = stack.pop() {
            for designation in concept.designations() {
                if !designation.is_display_use() {
                    continue;
                }
                if let Some(language) = &designation.language {
                    if langs.has_match(&LanguageTag::parse(language)) {
                        return true;
                    }
                }
            }
            stack.extend(concept.children().iter());
        }
    }
    false
}

fn has_any_display(supplement: &CodeSystem) -> bool {
    let mut stack: Vec<&CodeSystemConcept> = supplement.concepts().iter().collect();
    while let Some(concept) = stack.pop() {
        if concept.display.as_deref().is_some_and(|d| !d.is_empty()) {
            return true;
        }
        stack.extend(concept.children().iter());
    }
    false
}

/// The normative display resolution algorithm.
///
/// Supplements are consulted before the host (so they can override),
/// first by resource language, then designation by designation. Host
/// designations are scanned per requested language, exact tag matches
/// beating partial ones. `fallback` is the provider-specific last resort.
pub fn resolve_display(
    langs: &Languages,
    supplements: &[Arc<CodeSystem>],
    code: &str,
    host_display: Option<&str>,
    host_designations: &[Designation],
    host_language: Option<&LanguageTag>,
    fallback: Option<&str>,
) -> Option<String> {
    // 1. Supplement whose resource language serves the request.
    for supplement in supplements {
        if let Some(language) = &supplement.language {
            if langs.has_match(&LanguageTag::parse(language)) {
                if let Some(concept) = supplement_concept(supplement, code) {
                    if let Some(display) = concept.display.as_deref().filter(|d| !d.is_empty()) {
                        return Some(display.to_string());
                    }
                }
            }
        }
    }

    // 2. Supplement display-use designations in a matching language.
    for supplement in supplements {
        if let Some(concept) = supplement_concept(supplement, code) {
            for designation in concept.designations() {
                if !designation.is_display_use() {
                    continue;
                }
                if let Some(language) = &designation.language {
                    if langs.has_match(&LanguageTag::parse(language)) {
                        return Some(designation.value.clone());
                    }
                }
            }
        }
    }

    // 3. English or nothing: the host's primary display serves.
    if langs.is_english_or_nothing() {
        if let Some(display) = host_display {
            return Some(display.to_string());
        }
    }

    // 4. Host designations, exact tag match before partial, first wins.
    for preference in langs.iter() {
        for designation in host_designations {
            if designation
                .tag()
                .is_some_and(|tag| tag.matches_exactly(&preference.tag))
            {
                return Some(designation.value.clone());
            }
        }
        for designation in host_designations {
            if designation
                .tag()
                .is_some_and(|tag| tag.matches_for_display(&preference.tag))
            {
                return Some(designation.value.clone());
            }
        }
    }

    // 5. Host resource language serves the request.
    if let Some(language) = host_language {
        if langs.has_match(language) {
            if let Some(display) = host_display {
                return Some(display.to_string());
            }
        }
    }

    // 6. Provider-specific default.
    fallback.map(|f| f.to_string())
}

/// Merged designation view: host first, then each supplement in order.
pub fn merged_designations(
    host: Vec<Designation>,
    supplements: &[Arc<CodeSystem>],
    code: &str,
) -> Vec<Designation> {
    let mut out = host;
    for supplement in supplements {
        if let Some(concept) = supplement_concept(supplement, code) {
            if let Some(display) = concept.display.as_deref().filter(|d| !d.is_empty()) {
                let language = concept
                    .designations()
                    .iter()
                    .find(|d| d.value == display)
                    .and_then(|d| d.language.clone())
                    .or_else(|| supplement.language.clone());
                out.push(Designation::new(language, None, display));
            }
            for designation in concept.designations() {
                out.push(Designation::new(
                    designation.language.clone(),
                    designation.use_.clone(),
                    designation.value.clone(),
                ));
            }
        }
    }
    out
}

/// Properties contributed by supplements for a concept.
pub fn supplement_properties(supplements: &[Arc<CodeSystem>], code: &str) -> Vec<ConceptProperty> {
    let mut out = Vec::new();
    for supplement in supplements {
        if let Some(concept) = supplement_concept(supplement, code) {
            for property in concept.properties() {
                if let Some(text) = property.value_text() {
                    out.push(ConceptProperty::string(&property.code, text));
                }
            }
        }
    }
    out
}

/// Validate a supplement set for a host system at provider build time.
pub fn check_supplements(
    system: &str,
    supplements: &[Arc<CodeSystem>],
) -> crate::error::Result<()> {
    for supplement in supplements {
        if !supplement.is_supplement() {
            return Err(crate::error::Error::InvalidSupplement(format!(
                "{} is not a supplement (content = {})",
                supplement.url,
                supplement.content.as_str()
            )));
        }
        match supplement.supplements_target() {
            Some((url, _)) if url == system => {}
            Some((url, _)) => {
                return Err(crate::error::Error::InvalidSupplement(format!(
                    "{} supplements {url}, not {system}",
                    supplement.url
                )))
            }
            None => {
                return Err(crate::error::Error::InvalidSupplement(format!(
                    "{} does not declare what it supplements",
                    supplement.url
                )))
            }
        }
    }
    Ok(())
}
