//! Generic provider over a parsed FHIR CodeSystem resource. Hierarchy,
//! filters, search ratings, and supplement merging all run off the
//! document's prebuilt maps.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{CodeFilter, FilterContext};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation,
    FilterOperator, LocateResult, LookupResult, PropertyDefinition, SubsumptionOutcome,
};
use crate::supplements;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use terminus_langs::LanguageTag;
use terminus_models::{
    CodeSystem, CodeSystemConcept, CodeSystemContentMode, CodeSystemDocument, ConceptIndex,
    PublicationStatus,
};

#[derive(Debug, Clone)]
pub struct FhirContext {
    index: ConceptIndex,
    code: String,
}

impl ConceptContext for FhirContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct FhirProvider {
    document: Arc<CodeSystemDocument>,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl FhirProvider {
    pub fn new(
        document: Arc<CodeSystemDocument>,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Self> {
        supplements::check_supplements(document.url(), &supplements)?;
        Ok(Self {
            document,
            op_context,
            supplements,
        })
    }

    fn ctx<'a>(&self, ctx: &'a dyn ConceptContext) -> Result<&'a FhirContext> {
        downcast_ctx::<FhirContext>(ctx, "fhir")
    }

    fn concept(&self, index: ConceptIndex) -> &CodeSystemConcept {
        self.document.concept(index)
    }

    fn context_for(&self, index: ConceptIndex) -> FhirContext {
        FhirContext {
            index,
            code: self.concept(index).code.clone(),
        }
    }

    fn resource_language(&self) -> Option<LanguageTag> {
        self.document
            .resource()
            .language
            .as_deref()
            .map(LanguageTag::parse)
    }

    fn host_designations(&self, concept: &CodeSystemConcept) -> Vec<Designation> {
        concept
            .designations()
            .iter()
            .map(|d| Designation::new(d.language.clone(), d.use_.clone(), d.value.clone()))
            .collect()
    }

    fn status_of(&self, concept: &CodeSystemConcept) -> Option<String> {
        concept
            .property("status")
            .and_then(|p| p.value_text())
    }

    fn bool_property(&self, concept: &CodeSystemConcept, code: &str) -> bool {
        concept
            .property(code)
            .and_then(|p| p.value_boolean())
            .unwrap_or(false)
    }

    /// Materialize `is-a`-style sets over the document maps.
    fn hierarchy_codes(&self, root: ConceptIndex, include_self: bool, invert: bool) -> Vec<String> {
        let descendants = self.document.descendants(root);
        let mut member = vec![false; self.document.total_count()];
        for d in descendants {
            member[*d] = true;
        }
        if include_self {
            member[root] = true;
        }
        self.document
            .concepts_in_order()
            .filter(|(i, _)| member[*i] != invert)
            .map(|(_, c)| c.code.clone())
            .collect()
    }

    fn property_filter(
        &self,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<Vec<String>> {
        let values: Vec<&str> = match op {
            FilterOperator::In | FilterOperator::NotIn => value.split(',').map(str::trim).collect(),
            _ => vec![value],
        };
        let regex = if op == FilterOperator::Regex {
            Some(
                regex::Regex::new(&format!("^(?:{value})$"))
                    .map_err(|_| Error::InvalidRegex(value.to_string()))?,
            )
        } else {
            None
        };

        let mut codes = Vec::new();
        for (_, concept) in self.document.concepts_in_order() {
            let actual = match prop {
                "status" => self.status_of(concept),
                "notSelectable" | "inactive" | "deprecated" => {
                    Some(self.bool_property(concept, prop).to_string())
                }
                _ => concept.property(prop).and_then(|p| p.value_text()),
            };
            let matched = match (&regex, &actual) {
                (Some(re), Some(actual)) => re.is_match(actual),
                (None, Some(actual)) => {
                    let contains = values.iter().any(|v| v == actual);
                    match op {
                        FilterOperator::NotIn => !contains,
                        _ => contains,
                    }
                }
                (_, None) => op == FilterOperator::NotIn,
            };
            if matched {
                codes.push(concept.code.clone());
            }
        }
        Ok(codes)
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for FhirProvider {
    fn system(&self) -> &str {
        self.document.url()
    }

    fn version(&self) -> Option<&str> {
        self.document.version()
    }

    fn name(&self) -> &str {
        self.document
            .resource()
            .name
            .as_deref()
            .unwrap_or("CodeSystem")
    }

    fn description(&self) -> &str {
        self.document
            .resource()
            .description
            .as_deref()
            .unwrap_or("")
    }

    fn def_lang(&self) -> LanguageTag {
        self.resource_language()
            .unwrap_or_else(|| LanguageTag::parse("en"))
    }

    fn content_mode(&self) -> CodeSystemContentMode {
        self.document.content_mode()
    }

    fn total_count(&self) -> i64 {
        self.document.total_count() as i64
    }

    fn has_parents(&self) -> bool {
        self.document.has_hierarchy()
    }

    fn status(&self) -> PublicationStatus {
        self.document.resource().status
    }

    fn property_definitions(&self) -> Vec<PropertyDefinition> {
        self.document
            .resource()
            .property_definitions()
            .iter()
            .map(|p| PropertyDefinition {
                code: p.code.clone(),
                uri: p.uri.clone(),
                property_type: p.property_type.clone(),
            })
            .collect()
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    fn has_any_displays(&self, langs: &terminus_langs::Languages) -> bool {
        if langs.is_english_or_nothing() {
            return true;
        }
        if let Some(language) = self.resource_language() {
            if langs.has_match(&language) {
                return true;
            }
        }
        for (_, concept) in self.document.concepts_in_order() {
            for designation in concept.designations() {
                if let Some(lang) = designation.language.as_deref() {
                    if langs.has_match(&LanguageTag::parse(lang)) {
                        return true;
                    }
                }
            }
        }
        supplements::supplements_have_any_displays(&self.supplements, langs)
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        match self.document.find(code) {
            Some(index) => Ok(LocateResult::found(self.context_for(index))),
            None => Ok(LocateResult::unknown_code(code, self.system())),
        }
    }

    async fn locate_is_a(
        &self,
        code: &str,
        parent: &str,
        disallow_self: bool,
    ) -> Result<LocateResult> {
        let Some(index) = self.document.find(code) else {
            return Ok(LocateResult::unknown_code(code, self.system()));
        };
        let Some(parent_index) = self.document.find(parent) else {
            return Ok(LocateResult::unknown_code(parent, self.system()));
        };
        if index == parent_index {
            if disallow_self {
                return Ok(LocateResult::not_found(format!(
                    "Code '{code}' is the same as '{parent}'"
                )));
            }
            return Ok(LocateResult::found(self.context_for(index)));
        }
        if self.document.is_ancestor(parent_index, index) {
            Ok(LocateResult::found(self.context_for(index)))
        } else {
            Ok(LocateResult::not_found(format!(
                "Code '{code}' is not subsumed by '{parent}'"
            )))
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(self.ctx(ctx)?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let fctx = self.ctx(ctx)?;
        let concept = self.concept(fctx.index);
        let host_designations = self.host_designations(concept);
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &fctx.code,
            concept.display.as_deref(),
            &host_designations,
            self.resource_language().as_ref(),
            concept.display.as_deref(),
        ))
    }

    async fn definition(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let fctx = self.ctx(ctx)?;
        Ok(self.concept(fctx.index).definition.clone())
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let fctx = self.ctx(ctx)?;
        let concept = self.concept(fctx.index);
        let mut host = Vec::new();
        if let Some(display) = concept.display.as_deref() {
            host.push(Designation::display_use(
                &self.def_lang().code(),
                display,
            ));
        }
        host.extend(self.host_designations(concept));
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &fctx.code,
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let fctx = self.ctx(ctx)?;
        let concept = self.concept(fctx.index);
        let mut out = Vec::new();
        for property in concept.properties() {
            if let Some(value) = property.value_text() {
                out.push(ConceptProperty {
                    code: property.code.clone(),
                    value: Value::String(value),
                });
            }
        }
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &fctx.code,
        ));
        Ok(out)
    }

    fn is_abstract(&self, ctx: &dyn ConceptContext) -> Result<bool> {
        let fctx = self.ctx(ctx)?;
        Ok(self.bool_property(self.concept(fctx.index), "notSelectable"))
    }

    fn is_inactive(&self, ctx: &dyn ConceptContext) -> Result<bool> {
        let fctx = self.ctx(ctx)?;
        let concept = self.concept(fctx.index);
        if self.bool_property(concept, "inactive") {
            return Ok(true);
        }
        Ok(matches!(
            self.status_of(concept).as_deref(),
            Some("inactive") | Some("retired")
        ))
    }

    fn is_deprecated(&self, ctx: &dyn ConceptContext) -> Result<bool> {
        let fctx = self.ctx(ctx)?;
        let concept = self.concept(fctx.index);
        if self.status_of(concept).as_deref() == Some("deprecated") {
            return Ok(true);
        }
        Ok(concept.property("deprecationDate").is_some())
    }

    async fn parent(&self, ctx: &dyn ConceptContext) -> Result<Option<Box<dyn ConceptContext>>> {
        let fctx = self.ctx(ctx)?;
        Ok(self
            .document
            .parents(fctx.index)
            .first()
            .map(|p| Box::new(self.context_for(*p)) as Box<dyn ConceptContext>))
    }

    async fn extend_lookup(
        &self,
        ctx: &dyn ConceptContext,
        _requested: &[String],
        out: &mut LookupResult,
    ) -> Result<()> {
        let fctx = self.ctx(ctx)?;
        for parent in self.document.parents(fctx.index) {
            out.properties.push(ConceptProperty::string(
                "parent",
                self.concept(*parent).code.clone(),
            ));
        }
        for child in self.document.children(fctx.index) {
            out.properties.push(ConceptProperty::string(
                "child",
                self.concept(*child).code.clone(),
            ));
        }
        Ok(())
    }

    async fn subsumes_test(&self, a: &str, b: &str) -> Result<SubsumptionOutcome> {
        let (Some(ia), Some(ib)) = (self.document.find(a), self.document.find(b)) else {
            return Ok(SubsumptionOutcome::NotSubsumed);
        };
        Ok(if ia == ib {
            SubsumptionOutcome::Equivalent
        } else if self.document.is_ancestor(ia, ib) {
            SubsumptionOutcome::Subsumes
        } else if self.document.is_ancestor(ib, ia) {
            SubsumptionOutcome::SubsumedBy
        } else {
            SubsumptionOutcome::NotSubsumed
        })
    }

    async fn iterator(&self, ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        let codes = match ctx {
            None => self
                .document
                .concepts_in_order()
                .map(|(_, c)| c.code.clone())
                .collect(),
            Some(ctx) => {
                let fctx = self.ctx(ctx)?;
                self.document
                    .children(fctx.index)
                    .iter()
                    .map(|i| self.concept(*i).code.clone())
                    .collect()
            }
        };
        Ok(Some(ConceptIter::new(codes)))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        match prop {
            "concept" | "code" => matches!(
                op,
                FilterOperator::IsA
                    | FilterOperator::DescendentOf
                    | FilterOperator::IsNotA
                    | FilterOperator::In
                    | FilterOperator::Equal
                    | FilterOperator::Regex
            ),
            "child" => op == FilterOperator::Exists && matches!(value, "true" | "false"),
            "notSelectable" | "inactive" | "deprecated" | "status" => matches!(
                op,
                FilterOperator::Equal | FilterOperator::In | FilterOperator::NotIn
            ),
            _ => {
                self.document.resource().property_definition(prop).is_some()
                    && matches!(
                        op,
                        FilterOperator::Equal
                            | FilterOperator::In
                            | FilterOperator::NotIn
                            | FilterOperator::Regex
                    )
            }
        }
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        let unsupported = || Error::FilterNotSupported {
            system: self.system().to_string(),
            property: prop.to_string(),
            op: op.as_str().to_string(),
            value: value.to_string(),
        };

        let codes = match prop {
            "concept" | "code" => match op {
                FilterOperator::IsA | FilterOperator::DescendentOf | FilterOperator::IsNotA => {
                    let Some(root) = self.document.find(value) else {
                        return Err(Error::Internal(format!(
                            "Code '{value}' not found in {}",
                            self.system()
                        )));
                    };
                    match op {
                        FilterOperator::IsA => self.hierarchy_codes(root, true, false),
                        FilterOperator::DescendentOf => self.hierarchy_codes(root, false, false),
                        FilterOperator::IsNotA => self.hierarchy_codes(root, true, true),
                        _ => unreachable!(),
                    }
                }
                FilterOperator::In => {
                    let wanted: Vec<&str> = value.split(',').map(str::trim).collect();
                    self.document
                        .concepts_in_order()
                        .filter(|(_, c)| wanted.iter().any(|w| *w == c.code))
                        .map(|(_, c)| c.code.clone())
                        .collect()
                }
                FilterOperator::Equal => self
                    .document
                    .find(value)
                    .map(|i| vec![self.concept(i).code.clone()])
                    .unwrap_or_default(),
                FilterOperator::Regex => {
                    let re = regex::Regex::new(&format!("^(?:{value})$"))
                        .map_err(|_| Error::InvalidRegex(value.to_string()))?;
                    self.document
                        .concepts_in_order()
                        .filter(|(_, c)| re.is_match(&c.code))
                        .map(|(_, c)| c.code.clone())
                        .collect()
                }
                _ => return Err(unsupported()),
            },
            "child" if op == FilterOperator::Exists => {
                let want_children = match value {
                    "true" => true,
                    "false" => false,
                    _ => return Err(unsupported()),
                };
                self.document
                    .concepts_in_order()
                    .filter(|(i, _)| !self.document.children(*i).is_empty() == want_children)
                    .map(|(_, c)| c.code.clone())
                    .collect()
            }
            "status" | "notSelectable" | "inactive" | "deprecated" => {
                if !matches!(
                    op,
                    FilterOperator::Equal | FilterOperator::In | FilterOperator::NotIn
                ) {
                    return Err(unsupported());
                }
                self.property_filter(prop, op, value)?
            }
            _ => {
                if self.document.resource().property_definition(prop).is_none() {
                    return Err(unsupported());
                }
                if !matches!(
                    op,
                    FilterOperator::Equal
                        | FilterOperator::In
                        | FilterOperator::NotIn
                        | FilterOperator::Regex
                ) {
                    return Err(unsupported());
                }
                self.property_filter(prop, op, value)?
            }
        };
        fctx.push(CodeFilter::new(codes));
        Ok(())
    }

    async fn search_filter(&self, fctx: &mut FilterContext, text: &str, sort: bool) -> Result<()> {
        let needle = text.to_lowercase();
        let mut rated: Vec<(String, i32)> = Vec::new();
        for (_, concept) in self.document.concepts_in_order() {
            let code = concept.code.to_lowercase();
            let display = concept.display.as_deref().unwrap_or("").to_lowercase();
            let rating = if code == needle {
                100
            } else if code.starts_with(&needle) {
                90
            } else if !display.is_empty() && display.starts_with(&needle) {
                (80 * needle.len() / display.len().max(1)) as i32 + 10
            } else if code.contains(&needle) {
                60
            } else if display.contains(&needle) {
                50
            } else if concept
                .designations()
                .iter()
                .any(|d| d.value.to_lowercase().contains(&needle))
            {
                40
            } else if concept
                .definition
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
            {
                30
            } else {
                continue;
            };
            rated.push((concept.code.clone(), rating));
        }
        fctx.push(CodeFilter::with_ratings(rated, sort));
        Ok(())
    }
}
