//! SNOMED CT provider (`http://snomed.info/sct`) over the binary cache.
//! `locate` accepts plain concept ids and post-coordinated Compositional
//! Grammar expressions.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{CodeFilter, FilterContext};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation,
    FilterOperator, LocateResult, SubsumptionOutcome,
};
use crate::supplements;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use terminus_models::CodeSystem;
use terminus_snomed::cache::DescriptionKind;
use terminus_snomed::{parse_expression, CacheFile, ExpressionContext, ExpressionServices};

pub const SYSTEM: &str = "http://snomed.info/sct";

#[derive(Debug)]
pub struct SnomedContext {
    inner: ExpressionContext,
}

impl ConceptContext for SnomedContext {
    fn code(&self) -> String {
        self.inner.code()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct SnomedProvider {
    cache: Arc<CacheFile>,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl SnomedProvider {
    pub fn new(
        cache: Arc<CacheFile>,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Self> {
        supplements::check_supplements(SYSTEM, &supplements)?;
        Ok(Self {
            cache,
            op_context,
            supplements,
        })
    }

    fn services(&self) -> ExpressionServices<'_> {
        ExpressionServices::new(&self.cache)
    }

    fn display_language(&self) -> String {
        self.op_context
            .langs
            .tags()
            .next()
            .map(|t| t.primary.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.cache.default_language().to_string())
    }

    fn locate_sync(&self, code: &str) -> Result<LocateResult> {
        if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
            let id: u64 = match code.parse() {
                Ok(id) => id,
                Err(_) => {
                    return Ok(LocateResult::not_found(format!(
                        "'{code}' is not a valid SNOMED CT identifier"
                    )))
                }
            };
            return Ok(match self.cache.concepts().find(id) {
                Some(record) => {
                    LocateResult::found(SnomedContext {
                        inner: ExpressionContext::from_reference(record.offset, id),
                    })
                }
                None => LocateResult::unknown_code(code, SYSTEM),
            });
        }

        // Post-coordinated expression: parse, then validate against the
        // loaded edition. Both failures are semantic outcomes.
        let expression = match parse_expression(code) {
            Ok(e) => e,
            Err(e) => return Ok(LocateResult::not_found(e.to_string())),
        };
        if let Err(e) = self.services().validate(&expression) {
            return Ok(LocateResult::not_found(e.to_string()));
        }
        Ok(LocateResult::found(SnomedContext {
            inner: ExpressionContext::from_expression(expression),
        }))
    }

    /// Offsets of a concept and all its descendants, via active children.
    fn descendants_of(&self, root_offset: u32, include_self: bool) -> Result<Vec<u32>> {
        let concepts = self.cache.concepts();
        let refs = self.cache.refs();
        let mut seen = std::collections::HashSet::new();
        let mut queue: VecDeque<u32> = VecDeque::new();
        queue.push_back(root_offset);
        while let Some(offset) = queue.pop_front() {
            if !seen.insert(offset) {
                continue;
            }
            let record = concepts.at(offset)?;
            for child in refs.at(record.active_children_ref())?.iter() {
                queue.push_back(child);
            }
        }
        if !include_self {
            seen.remove(&root_offset);
        }
        let mut out: Vec<u32> = seen.into_iter().collect();
        out.sort_unstable();
        Ok(out)
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for SnomedProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn version(&self) -> Option<&str> {
        Some(self.cache.version_uri())
    }

    fn name(&self) -> &str {
        "SNOMED CT"
    }

    fn description(&self) -> &str {
        "SNOMED Clinical Terms"
    }

    fn total_count(&self) -> i64 {
        self.cache.concepts().count() as i64
    }

    fn has_parents(&self) -> bool {
        true
    }

    fn def_lang(&self) -> terminus_langs::LanguageTag {
        terminus_langs::LanguageTag::parse(self.cache.default_language())
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        self.locate_sync(code)
    }

    async fn locate_is_a(
        &self,
        code: &str,
        parent: &str,
        disallow_self: bool,
    ) -> Result<LocateResult> {
        let located = self.locate_sync(code)?;
        let Some(ctx) = located.context else {
            return Ok(located);
        };
        let snomed = downcast_ctx::<SnomedContext>(ctx.as_ref(), "snomed")?;
        let Some(offset) = snomed.inner.reference else {
            return Ok(LocateResult::not_found(
                "post-coordinated expressions are not supported here",
            ));
        };
        let Some(parent_record) = parent
            .parse::<u64>()
            .ok()
            .and_then(|id| self.cache.concepts().find(id))
        else {
            return Ok(LocateResult::unknown_code(parent, SYSTEM));
        };
        if offset == parent_record.offset {
            if disallow_self {
                return Ok(LocateResult::not_found(format!(
                    "Code '{code}' is the same as '{parent}'"
                )));
            }
            return Ok(LocateResult {
                context: Some(ctx),
                message: None,
            });
        }
        if self.services().has_ancestor(offset, parent_record.offset)? {
            Ok(LocateResult {
                context: Some(ctx),
                message: None,
            })
        } else {
            Ok(LocateResult::not_found(format!(
                "Code '{code}' is not subsumed by '{parent}'"
            )))
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<SnomedContext>(ctx, "snomed")?.inner.code())
    }

    fn is_abstract(&self, ctx: &dyn ConceptContext) -> Result<bool> {
        let _ = downcast_ctx::<SnomedContext>(ctx, "snomed")?;
        Ok(false)
    }

    fn is_inactive(&self, ctx: &dyn ConceptContext) -> Result<bool> {
        let snomed = downcast_ctx::<SnomedContext>(ctx, "snomed")?;
        match snomed.inner.reference {
            Some(offset) => Ok(!self.cache.concepts().at(offset)?.is_active()),
            None => Ok(false),
        }
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let snomed = downcast_ctx::<SnomedContext>(ctx, "snomed")?;
        let code = snomed.inner.code();

        let host_display = match snomed.inner.reference {
            Some(offset) => self.services().display(offset, &self.display_language())?,
            None => Some(snomed.inner.code()),
        };
        let host_designations = match snomed.inner.reference {
            Some(offset) => designations_from_cache(&self.services(), offset)?,
            None => Vec::new(),
        };
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &code,
            host_display.as_deref(),
            &host_designations,
            Some(&self.def_lang()),
            host_display.as_deref(),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let snomed = downcast_ctx::<SnomedContext>(ctx, "snomed")?;
        let host = match snomed.inner.reference {
            Some(offset) => designations_from_cache(&self.services(), offset)?,
            None => Vec::new(),
        };
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &snomed.inner.code(),
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let snomed = downcast_ctx::<SnomedContext>(ctx, "snomed")?;
        let mut out = Vec::new();
        if let Some(offset) = snomed.inner.reference {
            let record = self.cache.concepts().at(offset)?;
            out.push(ConceptProperty::boolean("inactive", !record.is_active()));
            out.push(ConceptProperty::string(
                "effectiveTime",
                record.effective_date().to_string(),
            ));
            let parents = self.cache.refs().at(record.active_parents_ref())?;
            for parent in parents.iter() {
                out.push(ConceptProperty::string(
                    "parent",
                    self.cache.concepts().at(parent)?.identity().to_string(),
                ));
            }
        }
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &snomed.inner.code(),
        ));
        Ok(out)
    }

    async fn parent(&self, ctx: &dyn ConceptContext) -> Result<Option<Box<dyn ConceptContext>>> {
        let snomed = downcast_ctx::<SnomedContext>(ctx, "snomed")?;
        let Some(offset) = snomed.inner.reference else {
            return Ok(None);
        };
        let record = self.cache.concepts().at(offset)?;
        let parents = self.cache.refs().at(record.active_parents_ref())?;
        if parents.is_empty() {
            return Ok(None);
        }
        let parent = self.cache.concepts().at(parents.get(0))?;
        Ok(Some(Box::new(SnomedContext {
            inner: ExpressionContext::from_reference(parent.offset, parent.identity()),
        })))
    }

    async fn subsumes_test(&self, a: &str, b: &str) -> Result<SubsumptionOutcome> {
        let ea = match parse_expression(a) {
            Ok(e) => e,
            Err(_) => return Ok(SubsumptionOutcome::NotSubsumed),
        };
        let eb = match parse_expression(b) {
            Ok(e) => e,
            Err(_) => return Ok(SubsumptionOutcome::NotSubsumed),
        };
        let services = self.services();
        let forward = services.subsumes(&ea, &eb)?;
        let backward = services.subsumes(&eb, &ea)?;
        Ok(match (forward, backward) {
            (true, true) => SubsumptionOutcome::Equivalent,
            (true, false) => SubsumptionOutcome::Subsumes,
            (false, true) => SubsumptionOutcome::SubsumedBy,
            (false, false) => SubsumptionOutcome::NotSubsumed,
        })
    }

    async fn iterator(&self, ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        let codes = match ctx {
            None => self
                .cache
                .concepts()
                .iter()
                .map(|c| c.identity().to_string())
                .collect(),
            Some(ctx) => {
                let snomed = downcast_ctx::<SnomedContext>(ctx, "snomed")?;
                let Some(offset) = snomed.inner.reference else {
                    return Ok(Some(ConceptIter::new(Vec::new())));
                };
                let record = self.cache.concepts().at(offset)?;
                let children = self.cache.refs().at(record.active_children_ref())?;
                let mut codes = Vec::with_capacity(children.len());
                for child in children.iter() {
                    codes.push(self.cache.concepts().at(child)?.identity().to_string());
                }
                codes
            }
        };
        Ok(Some(ConceptIter::new(codes)))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        matches!(prop, "concept" | "code")
            && matches!(op, FilterOperator::IsA | FilterOperator::DescendentOf)
            && value.chars().all(|c| c.is_ascii_digit())
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        if !matches!(prop, "concept" | "code")
            || !matches!(op, FilterOperator::IsA | FilterOperator::DescendentOf)
        {
            return Err(Error::FilterNotSupported {
                system: SYSTEM.to_string(),
                property: prop.to_string(),
                op: op.as_str().to_string(),
                value: value.to_string(),
            });
        }
        let Some(root) = value
            .parse::<u64>()
            .ok()
            .and_then(|id| self.cache.concepts().find(id))
        else {
            return Err(Error::Internal(format!(
                "Code '{value}' not found in {SYSTEM}"
            )));
        };
        let include_self = op == FilterOperator::IsA;
        let offsets = self.descendants_of(root.offset, include_self)?;
        let mut codes = Vec::with_capacity(offsets.len());
        for offset in offsets {
            codes.push(self.cache.concepts().at(offset)?.identity().to_string());
        }
        fctx.push(CodeFilter::new(codes));
        Ok(())
    }
}

fn designations_from_cache(
    services: &ExpressionServices<'_>,
    offset: u32,
) -> Result<Vec<Designation>> {
    let mut out = Vec::new();
    for (lang, text, kind, preferred) in services.descriptions_of(offset)? {
        let designation = match kind {
            DescriptionKind::Synonym if preferred => Designation::display_use(&lang, text),
            _ => Designation::new(Some(lang), None, text),
        };
        out.push(designation);
    }
    Ok(out)
}
