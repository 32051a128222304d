//! UCUM provider (`http://unitsofmeasure.org`), grammar-based over the
//! unit engine.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{FilterContext, PreparedFilter};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptProperty, Designation,
    FilterOperator, LocateResult, PropertyDefinition,
};
use crate::supplements;
use std::any::Any;
use std::sync::Arc;
use terminus_models::CodeSystem;
use terminus_ucum::UcumService;

pub const SYSTEM: &str = "http://unitsofmeasure.org";

#[derive(Debug, Clone)]
pub struct UcumContext {
    code: String,
}

impl ConceptContext for UcumContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Grammar-based set of all units measuring one property.
struct UcumPropertyFilter {
    property: String,
}

impl PreparedFilter for UcumPropertyFilter {
    fn closed(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct UcumProvider {
    service: &'static UcumService,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl UcumProvider {
    pub fn new(
        service: &'static UcumService,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Self> {
        supplements::check_supplements(SYSTEM, &supplements)?;
        Ok(Self {
            service,
            op_context,
            supplements,
        })
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for UcumProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn version(&self) -> Option<&str> {
        Some(self.service.version())
    }

    fn name(&self) -> &str {
        "UCUM"
    }

    fn description(&self) -> &str {
        "Unified Code for Units of Measure"
    }

    fn total_count(&self) -> i64 {
        -1
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    fn property_definitions(&self) -> Vec<PropertyDefinition> {
        vec![PropertyDefinition {
            code: "canonical".to_string(),
            uri: None,
            property_type: "string".to_string(),
        }]
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        match self.service.validate(code) {
            None => Ok(LocateResult::found(UcumContext {
                code: code.to_string(),
            })),
            Some(message) => Ok(LocateResult::not_found(message)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<UcumContext>(ctx, "ucum")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let unit = downcast_ctx::<UcumContext>(ctx, "ucum")?;
        let analysed = self.service.get_common_display(&unit.code);
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &unit.code,
            Some(&analysed),
            &[],
            None,
            Some(&analysed),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let unit = downcast_ctx::<UcumContext>(ctx, "ucum")?;
        let host = vec![Designation::display_use(
            "en",
            self.service.get_common_display(&unit.code),
        )];
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &unit.code,
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let unit = downcast_ctx::<UcumContext>(ctx, "ucum")?;
        let mut out = Vec::new();
        if let Ok(canonical) = self.service.get_canonical_units(&unit.code) {
            out.push(ConceptProperty::string("canonical", canonical));
        }
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &unit.code,
        ));
        Ok(out)
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, _value: &str) -> bool {
        prop == "property" && op == FilterOperator::Equal
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        if prop != "property" || op != FilterOperator::Equal {
            return Err(Error::FilterNotSupported {
                system: SYSTEM.to_string(),
                property: prop.to_string(),
                op: op.as_str().to_string(),
                value: value.to_string(),
            });
        }
        fctx.push(UcumPropertyFilter {
            property: value.to_string(),
        });
        Ok(())
    }

    fn filter_size(&self, _filter: &dyn PreparedFilter) -> Result<i64> {
        Ok(-1)
    }

    async fn filter_more(&self, _filter: &mut dyn PreparedFilter) -> Result<bool> {
        Ok(false)
    }

    async fn filter_locate(
        &self,
        filter: &mut dyn PreparedFilter,
        code: &str,
    ) -> Result<std::result::Result<Box<dyn ConceptContext>, String>> {
        let f = filter
            .as_any()
            .downcast_ref::<UcumPropertyFilter>()
            .ok_or(Error::WrongFilter("ucum"))?;
        match self.service.validate_in_property(code, &f.property) {
            None => Ok(Ok(Box::new(UcumContext {
                code: code.to_string(),
            }))),
            Some(message) => Ok(Err(message)),
        }
    }

    async fn filter_check(
        &self,
        filter: &mut dyn PreparedFilter,
        ctx: &dyn ConceptContext,
    ) -> Result<bool> {
        let f = filter
            .as_any()
            .downcast_ref::<UcumPropertyFilter>()
            .ok_or(Error::WrongFilter("ucum"))?;
        let unit = downcast_ctx::<UcumContext>(ctx, "ucum")?;
        Ok(self
            .service
            .validate_in_property(&unit.code, &f.property)
            .is_none())
    }
}
