//! UN M49 area/region provider
//! (`http://unstats.un.org/unsd/methods/m49/m49.htm`).

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{CodeFilter, FilterContext};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation,
    FilterOperator, LocateResult, PropertyDefinition,
};
use crate::providers::country_data::COUNTRIES;
use crate::supplements;
use std::any::Any;
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "http://unstats.un.org/unsd/methods/m49/m49.htm";

/// The standard M49 regions: (code, name, parent region).
const REGIONS: &[(&str, &str, &str)] = &[
    ("001", "World", ""),
    ("002", "Africa", "001"),
    ("015", "Northern Africa", "002"),
    ("202", "Sub-Saharan Africa", "002"),
    ("014", "Eastern Africa", "202"),
    ("017", "Middle Africa", "202"),
    ("018", "Southern Africa", "202"),
    ("011", "Western Africa", "202"),
    ("019", "Americas", "001"),
    ("419", "Latin America and the Caribbean", "019"),
    ("029", "Caribbean", "419"),
    ("013", "Central America", "419"),
    ("005", "South America", "419"),
    ("021", "Northern America", "019"),
    ("142", "Asia", "001"),
    ("143", "Central Asia", "142"),
    ("030", "Eastern Asia", "142"),
    ("035", "South-eastern Asia", "142"),
    ("034", "Southern Asia", "142"),
    ("145", "Western Asia", "142"),
    ("150", "Europe", "001"),
    ("151", "Eastern Europe", "150"),
    ("154", "Northern Europe", "150"),
    ("039", "Southern Europe", "150"),
    ("155", "Western Europe", "150"),
    ("009", "Oceania", "001"),
    ("053", "Australia and New Zealand", "009"),
    ("054", "Melanesia", "009"),
    ("057", "Micronesia", "009"),
    ("061", "Polynesia", "009"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaClass {
    Country,
    Region,
}

impl AreaClass {
    fn as_str(&self) -> &'static str {
        match self {
            AreaClass::Country => "country",
            AreaClass::Region => "region",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AreaContext {
    code: String,
    name: &'static str,
    class: AreaClass,
}

impl ConceptContext for AreaContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct AreaProvider {
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl AreaProvider {
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

    fn find(code: &str) -> Option<AreaContext> {
        for (region, name, _) in REGIONS {
            if code == *region {
                return Some(AreaContext {
                    code: code.to_string(),
                    name,
                    class: AreaClass::Region,
                });
            }
        }
        for (_, _, numeric, name) in COUNTRIES {
            if code == *numeric {
                return Some(AreaContext {
                    code: code.to_string(),
                    name,
                    class: AreaClass::Country,
                });
            }
        }
        None
    }

    fn codes_of_class(class: AreaClass) -> Vec<String> {
        match class {
            AreaClass::Region => REGIONS.iter().map(|(c, _, _)| c.to_string()).collect(),
            AreaClass::Country => COUNTRIES
                .iter()
                .map(|(_, _, numeric, _)| numeric.to_string())
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for AreaProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn name(&self) -> &str {
        "UN Standard Country or Area Codes for Statistical Use (M49)"
    }

    fn description(&self) -> &str {
        "United Nations M49 area and region codes"
    }

    fn total_count(&self) -> i64 {
        (REGIONS.len() + COUNTRIES.len()) as i64
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    fn property_definitions(&self) -> Vec<PropertyDefinition> {
        vec![PropertyDefinition {
            code: "class".to_string(),
            uri: None,
            property_type: "code".to_string(),
        }]
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        match Self::find(code) {
            Some(ctx) => Ok(LocateResult::found(ctx)),
            None => Ok(LocateResult::unknown_code(code, SYSTEM)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<AreaContext>(ctx, "area")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let area = downcast_ctx::<AreaContext>(ctx, "area")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &area.code,
            Some(area.name),
            &[],
            None,
            Some(area.name),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let area = downcast_ctx::<AreaContext>(ctx, "area")?;
        let host = vec![Designation::display_use("en", area.name)];
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &area.code,
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let area = downcast_ctx::<AreaContext>(ctx, "area")?;
        let mut out = vec![ConceptProperty::string("class", area.class.as_str())];
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &area.code,
        ));
        Ok(out)
    }

    async fn iterator(&self, ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        if ctx.is_some() {
            return Ok(Some(ConceptIter::new(Vec::new())));
        }
        let mut codes = Self::codes_of_class(AreaClass::Region);
        codes.extend(Self::codes_of_class(AreaClass::Country));
        Ok(Some(ConceptIter::new(codes)))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        matches!(prop, "class" | "type")
            && op == FilterOperator::Equal
            && matches!(value, "country" | "region")
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        let class = match (prop, op, value) {
            ("class" | "type", FilterOperator::Equal, "country") => AreaClass::Country,
            ("class" | "type", FilterOperator::Equal, "region") => AreaClass::Region,
            _ => {
                return Err(Error::FilterNotSupported {
                    system: SYSTEM.to_string(),
                    property: prop.to_string(),
                    op: op.as_str().to_string(),
                    value: value.to_string(),
                })
            }
        };
        fctx.push(CodeFilter::new(Self::codes_of_class(class)));
        Ok(())
    }
}
