//! The uniform provider contract every code system implements.
//!
//! Callers obtain a provider from its factory (binding the operation
//! context and any supplements), then drive these read-only operations
//! polymorphically. Concept contexts are opaque: each provider downcasts
//! its own and rejects anything else as a programmer error.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{CodeFilter, FilterContext, PreparedFilter};
use serde_json::Value;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;
use terminus_langs::{LanguageTag, Languages};
use terminus_models::{CodeSystem, CodeSystemContentMode, Coding, PublicationStatus};

/// Opaque handle to a located concept. Valid only with the provider that
/// produced it.
pub trait ConceptContext: Any + Send + Sync + Debug {
    fn code(&self) -> String;
    fn as_any(&self) -> &dyn Any;
}

/// Downcast a foreign context to this provider's concrete type.
pub fn downcast_ctx<'a, T: 'static>(
    ctx: &'a dyn ConceptContext,
    provider: &'static str,
) -> Result<&'a T> {
    ctx.as_any()
        .downcast_ref::<T>()
        .ok_or(Error::WrongContext(provider))
}

/// The outcome of `locate`: a context, or a caller-facing message saying
/// why there is none. Never an error.
pub struct LocateResult {
    pub context: Option<Box<dyn ConceptContext>>,
    pub message: Option<String>,
}

impl LocateResult {
    pub fn found(context: impl ConceptContext) -> Self {
        Self {
            context: Some(Box::new(context)),
            message: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            context: None,
            message: Some(message.into()),
        }
    }

    pub fn unknown_code(code: &str, system: &str) -> Self {
        Self::not_found(format!("Code '{code}' not found in {system}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsumptionOutcome {
    Subsumes,
    SubsumedBy,
    Equivalent,
    NotSubsumed,
}

impl SubsumptionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsumptionOutcome::Subsumes => "subsumes",
            SubsumptionOutcome::SubsumedBy => "subsumed-by",
            SubsumptionOutcome::Equivalent => "equivalent",
            SubsumptionOutcome::NotSubsumed => "not-subsumed",
        }
    }
}

/// An alternative textual form of a concept.
#[derive(Debug, Clone, PartialEq)]
pub struct Designation {
    pub language: Option<String>,
    pub use_: Option<Coding>,
    pub value: String,
}

impl Designation {
    pub fn new(language: Option<String>, use_: Option<Coding>, value: impl Into<String>) -> Self {
        Self {
            language,
            use_,
            value: value.into(),
        }
    }

    pub fn display_use(language: &str, value: impl Into<String>) -> Self {
        Self {
            language: Some(language.to_string()),
            use_: Some(Coding {
                system: Some("http://terminology.hl7.org/CodeSystem/designation-usage".to_string()),
                code: Some("display".to_string()),
                display: None,
            }),
            value: value.into(),
        }
    }

    /// True when the `use` marks this designation as display text.
    pub fn is_display(&self) -> bool {
        match &self.use_ {
            None => false,
            Some(coding) => matches!(
                coding.code.as_deref(),
                Some("display") | Some("preferredForLanguage") | Some("900000000000003001")
            ),
        }
    }

    pub fn tag(&self) -> Option<LanguageTag> {
        self.language.as_deref().map(LanguageTag::parse)
    }
}

/// One property value on a concept, as surfaced by `$lookup`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptProperty {
    pub code: String,
    pub value: Value,
}

impl ConceptProperty {
    pub fn string(code: &str, value: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            value: Value::String(value.into()),
        }
    }

    pub fn boolean(code: &str, value: bool) -> Self {
        Self {
            code: code.to_string(),
            value: Value::Bool(value),
        }
    }
}

/// Declared property definition surfaced through provider metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub code: String,
    pub uri: Option<String>,
    pub property_type: String,
}

/// Accumulator for `extend_lookup` output.
#[derive(Debug, Clone, Default)]
pub struct LookupResult {
    pub properties: Vec<ConceptProperty>,
    pub designations: Vec<Designation>,
}

/// Value-set filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    IsA,
    DescendentOf,
    IsNotA,
    In,
    NotIn,
    Regex,
    Exists,
    Generalizes,
    ChildOf,
}

impl FilterOperator {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" => FilterOperator::Equal,
            "is-a" => FilterOperator::IsA,
            "descendent-of" | "descendant-of" => FilterOperator::DescendentOf,
            "is-not-a" => FilterOperator::IsNotA,
            "in" => FilterOperator::In,
            "not-in" => FilterOperator::NotIn,
            "regex" => FilterOperator::Regex,
            "exists" => FilterOperator::Exists,
            "generalizes" => FilterOperator::Generalizes,
            "child-of" => FilterOperator::ChildOf,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "=",
            FilterOperator::IsA => "is-a",
            FilterOperator::DescendentOf => "descendent-of",
            FilterOperator::IsNotA => "is-not-a",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not-in",
            FilterOperator::Regex => "regex",
            FilterOperator::Exists => "exists",
            FilterOperator::Generalizes => "generalizes",
            FilterOperator::ChildOf => "child-of",
        }
    }
}

/// Iterator over a provider's concepts: the whole system, or one concept's
/// direct children.
pub struct ConceptIter {
    codes: VecDeque<String>,
    pub total: usize,
}

impl ConceptIter {
    pub fn new(codes: Vec<String>) -> Self {
        let total = codes.len();
        Self {
            codes: codes.into(),
            total,
        }
    }

    pub fn next_code(&mut self) -> Option<String> {
        self.codes.pop_front()
    }
}

/// The provider contract. Metadata is synchronous; resolution, iteration,
/// and filtering are suspension points for the database- and HTTP-backed
/// providers and plain synchronous bodies everywhere else.
#[async_trait::async_trait]
pub trait CodeSystemProvider: Send + Sync {
    // --- metadata ---

    fn system(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn def_lang(&self) -> LanguageTag {
        LanguageTag::parse("en")
    }

    fn content_mode(&self) -> CodeSystemContentMode {
        CodeSystemContentMode::Complete
    }

    /// `-1` means unbounded / grammar-defined.
    fn total_count(&self) -> i64;

    fn has_parents(&self) -> bool {
        false
    }

    fn property_definitions(&self) -> Vec<PropertyDefinition> {
        Vec::new()
    }

    fn status(&self) -> PublicationStatus {
        PublicationStatus::Active
    }

    fn expand_limitation(&self) -> Option<u32> {
        None
    }

    fn op_context(&self) -> &OperationContext;

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &[]
    }

    fn has_supplement(&self, url: &str) -> bool {
        self.supplements().iter().any(|s| {
            s.url == url
                || s.version
                    .as_deref()
                    .is_some_and(|v| format!("{}|{v}", s.url) == url)
        })
    }

    fn list_supplements(&self) -> Vec<String> {
        self.supplements()
            .iter()
            .map(|s| match &s.version {
                Some(v) => format!("{}|{v}", s.url),
                None => s.url.clone(),
            })
            .collect()
    }

    /// True when `v2` carries at least the detail of `v1` (e.g. `2023` vs
    /// `2023-09`).
    fn version_is_more_detailed(&self, v1: Option<&str>, v2: Option<&str>) -> bool {
        match (v1, v2) {
            (None, Some(_)) => true,
            (Some(a), Some(b)) => b.len() > a.len() && b.starts_with(a),
            _ => false,
        }
    }

    /// Whether this provider can produce display text in any of the given
    /// languages. The base rule: host displays serve "English or nothing";
    /// supplements serve whatever languages they declare.
    fn has_any_displays(&self, langs: &Languages) -> bool {
        if langs.is_english_or_nothing() {
            return true;
        }
        crate::supplements::supplements_have_any_displays(self.supplements(), langs)
    }

    // --- concept resolution ---

    async fn locate(&self, code: &str) -> Result<LocateResult>;

    async fn locate_is_a(
        &self,
        _code: &str,
        _parent: &str,
        _disallow_self: bool,
    ) -> Result<LocateResult> {
        Err(Error::NoParents(self.system().to_string()))
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String>;

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>>;

    async fn definition(&self, _ctx: &dyn ConceptContext) -> Result<Option<String>> {
        Ok(None)
    }

    async fn designations(&self, _ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        Ok(Vec::new())
    }

    async fn properties(&self, _ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        Ok(Vec::new())
    }

    async fn extensions(&self, _ctx: &dyn ConceptContext) -> Result<Vec<(String, Value)>> {
        Ok(Vec::new())
    }

    fn is_abstract(&self, _ctx: &dyn ConceptContext) -> Result<bool> {
        Ok(false)
    }

    fn is_inactive(&self, _ctx: &dyn ConceptContext) -> Result<bool> {
        Ok(false)
    }

    fn is_deprecated(&self, _ctx: &dyn ConceptContext) -> Result<bool> {
        Ok(false)
    }

    async fn parent(&self, _ctx: &dyn ConceptContext) -> Result<Option<Box<dyn ConceptContext>>> {
        Ok(None)
    }

    fn same_concept(&self, a: &dyn ConceptContext, b: &dyn ConceptContext) -> Result<bool> {
        Ok(a.code() == b.code())
    }

    async fn extend_lookup(
        &self,
        _ctx: &dyn ConceptContext,
        _requested: &[String],
        _out: &mut LookupResult,
    ) -> Result<()> {
        Ok(())
    }

    async fn subsumes_test(&self, _a: &str, _b: &str) -> Result<SubsumptionOutcome> {
        Err(Error::NotSupported)
    }

    // --- iteration ---

    /// Iterate all concepts (`None`) or one concept's direct children.
    async fn iterator(&self, _ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        Ok(None)
    }

    async fn next_context(&self, iter: &mut ConceptIter) -> Result<Option<Box<dyn ConceptContext>>> {
        while let Some(code) = iter.next_code() {
            if let Some(ctx) = self.locate(&code).await?.context {
                return Ok(Some(ctx));
            }
        }
        Ok(None)
    }

    // --- filtering ---

    /// Advisory capability probe; `filter` is the source of truth.
    fn does_filter(&self, _prop: &str, _op: FilterOperator, _value: &str) -> bool {
        false
    }

    fn get_prep_context(&self, iterate: bool) -> FilterContext {
        FilterContext::new(iterate)
    }

    async fn filter(
        &self,
        _fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        Err(Error::FilterNotSupported {
            system: self.system().to_string(),
            property: prop.to_string(),
            op: op.as_str().to_string(),
            value: value.to_string(),
        })
    }

    async fn search_filter(
        &self,
        _fctx: &mut FilterContext,
        text: &str,
        _sort: bool,
    ) -> Result<()> {
        Err(Error::FilterNotSupported {
            system: self.system().to_string(),
            property: "search".to_string(),
            op: "=".to_string(),
            value: text.to_string(),
        })
    }

    async fn special_filter(
        &self,
        _fctx: &mut FilterContext,
        filter: &str,
        _sort: bool,
    ) -> Result<()> {
        Err(Error::FilterNotSupported {
            system: self.system().to_string(),
            property: "special".to_string(),
            op: "=".to_string(),
            value: filter.to_string(),
        })
    }

    /// Run any deferred work; afterwards each prepared set is ready for
    /// iteration and membership checks.
    async fn execute_filters(&self, _fctx: &mut FilterContext) -> Result<()> {
        Ok(())
    }

    fn filters_not_closed(&self, fctx: &FilterContext) -> bool {
        fctx.filters().iter().any(|f| !f.closed())
    }

    fn filter_size(&self, filter: &dyn PreparedFilter) -> Result<i64> {
        match filter.size() {
            Some(size) => Ok(size as i64),
            None => Ok(-1),
        }
    }

    /// Advance the set's cursor; true while a concept is available.
    async fn filter_more(&self, filter: &mut dyn PreparedFilter) -> Result<bool> {
        let cf = filter
            .as_any_mut()
            .downcast_mut::<CodeFilter>()
            .ok_or(Error::WrongFilter("code-filter"))?;
        Ok(cf.advance())
    }

    /// The concept at the cursor.
    async fn filter_concept(
        &self,
        filter: &mut dyn PreparedFilter,
    ) -> Result<Option<Box<dyn ConceptContext>>> {
        let code = {
            let cf = filter
                .as_any()
                .downcast_ref::<CodeFilter>()
                .ok_or(Error::WrongFilter("code-filter"))?;
            match cf.current() {
                Some(code) => code.to_string(),
                None => return Ok(None),
            }
        };
        Ok(self.locate(&code).await?.context)
    }

    /// Locate a code inside the filtered set: a context, or a message.
    async fn filter_locate(
        &self,
        filter: &mut dyn PreparedFilter,
        code: &str,
    ) -> Result<std::result::Result<Box<dyn ConceptContext>, String>> {
        let contains = {
            let cf = filter
                .as_any()
                .downcast_ref::<CodeFilter>()
                .ok_or(Error::WrongFilter("code-filter"))?;
            cf.contains(code)
        };
        if !contains {
            return Ok(Err(format!(
                "Code '{code}' not found in filtered set on {}",
                self.system()
            )));
        }
        match self.locate(code).await?.context {
            Some(ctx) => Ok(Ok(ctx)),
            None => Ok(Err(format!("Code '{code}' not found in {}", self.system()))),
        }
    }

    /// Membership test for an already-located concept.
    async fn filter_check(
        &self,
        filter: &mut dyn PreparedFilter,
        ctx: &dyn ConceptContext,
    ) -> Result<bool> {
        let cf = filter
            .as_any()
            .downcast_ref::<CodeFilter>()
            .ok_or(Error::WrongFilter("code-filter"))?;
        Ok(cf.contains(&ctx.code()))
    }

    fn filter_finish(&self, _filter: Box<dyn PreparedFilter>) {}
}
