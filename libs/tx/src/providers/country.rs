//! ISO 3166 country code provider (`urn:iso:std:iso:3166`).
//!
//! Each code format (alpha-2, alpha-3, numeric) is a distinct concept;
//! `locate("US")` and `locate("USA")` return different contexts that share
//! a display.

use crate::context::OperationContext;
use crate::error::Result;
use crate::filter::{CodeFilter, FilterContext};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, Designation, FilterOperator,
    LocateResult,
};
use crate::providers::country_data::COUNTRIES;
use crate::supplements;
use std::any::Any;
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "urn:iso:std:iso:3166";

#[derive(Debug, Clone)]
pub struct CountryContext {
    code: String,
    name: &'static str,
}

impl ConceptContext for CountryContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct CountryProvider {
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl CountryProvider {
    pub fn new(
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Self> {
        supplements::check_supplements(SYSTEM, &supplements)?;
        Ok(Self {
            op_context,
            supplements,
        })
    }

    fn find(code: &str) -> Option<CountryContext> {
        for (alpha2, alpha3, numeric, name) in COUNTRIES {
            if code == *alpha2 || code == *alpha3 || code == *numeric {
                return Some(CountryContext {
                    code: code.to_string(),
                    name,
                });
            }
        }
        None
    }

    fn all_codes() -> Vec<String> {
        let mut codes = Vec::with_capacity(COUNTRIES.len() * 3);
        for (alpha2, _, _, _) in COUNTRIES {
            codes.push(alpha2.to_string());
        }
        for (_, alpha3, _, _) in COUNTRIES {
            codes.push(alpha3.to_string());
        }
        for (_, _, numeric, _) in COUNTRIES {
            codes.push(numeric.to_string());
        }
        codes
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for CountryProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn name(&self) -> &str {
        "ISO Country Codes"
    }

    fn description(&self) -> &str {
        "ISO 3166 codes for the representation of names of countries"
    }

    fn total_count(&self) -> i64 {
        (COUNTRIES.len() * 3) as i64
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        match Self::find(code) {
            Some(ctx) => Ok(LocateResult::found(ctx)),
            None => Ok(LocateResult::unknown_code(code, SYSTEM)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<CountryContext>(ctx, "country")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let country = downcast_ctx::<CountryContext>(ctx, "country")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &country.code,
            Some(country.name),
            &[],
            None,
            Some(country.name),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let country = downcast_ctx::<CountryContext>(ctx, "country")?;
        let host = vec![Designation::display_use("en", country.name)];
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &country.code,
        ))
    }

    async fn iterator(&self, ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        if ctx.is_some() {
            // Flat code system: no children to iterate.
            return Ok(Some(ConceptIter::new(Vec::new())));
        }
        Ok(Some(ConceptIter::new(Self::all_codes())))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, _value: &str) -> bool {
        prop == "code" && op == FilterOperator::Regex
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        if prop != "code" || op != FilterOperator::Regex {
            return Err(crate::error::Error::FilterNotSupported {
                system: SYSTEM.to_string(),
                property: prop.to_string(),
                op: op.as_str().to_string(),
                value: value.to_string(),
            });
        }
        let re = regex::Regex::new(&format!("^(?:{value})$"))
            .map_err(|_| crate::error::Error::InvalidRegex(value.to_string()))?;
        let codes = Self::all_codes()
            .into_iter()
            .filter(|c| re.is_match(c))
            .collect();
        fctx.push(CodeFilter::new(codes));
        Ok(())
    }
}
