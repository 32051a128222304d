//! CPT provider (`http://www.ama-assn.org/go/cpt`): codes, modifiers, and
//! colon-separated expressions (`base:modifier[:modifier]*`), backed by the
//! CPT SQLite store. The code and modifier tables load eagerly; an
//! expression validates structurally before any context is produced.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{CodeFilter, FilterContext};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation,
    FilterOperator, LocateResult, PropertyDefinition,
};
use crate::supplements;
use sqlx::{Row, SqlitePool};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "http://www.ama-assn.org/go/cpt";

/// At most one modifier from each of these sets may appear in an
/// expression.
const EXCLUSIVE_MODIFIER_SETS: &[&[&str]] = &[
    &["25", "57", "59"],
    &["52", "53", "73", "74"],
    &["76", "77", "78", "79"],
    &["93", "95"],
];

/// Laboratory codes that accept modifier 92.
const MOD_92_CODES: &[&str] = &["86701", "86702", "86703", "87389"];

/// Surgical range that accepts modifier 63.
const MOD_63_RANGE: (u32, u32) = (20005, 69990);

#[derive(Debug, Clone)]
struct CptConceptInfo {
    code: String,
    modifier: bool,
    kind: String,
    display: String,
    abstract_: bool,
    telemedicine: bool,
}

pub struct CptShared {
    pub version: Option<String>,
    concepts: HashMap<String, CptConceptInfo>,
}

impl CptShared {
    pub async fn load(pool: &SqlitePool) -> Result<Arc<Self>> {
        let version: Option<String> =
            sqlx::query_scalar("SELECT Value FROM Information WHERE Name = 'version'")
                .fetch_optional(pool)
                .await?;

        let mut concepts = HashMap::new();
        let rows =
            sqlx::query("SELECT Code, Modifier, Kind, Display, Abstract FROM Concepts")
                .fetch_all(pool)
                .await?;
        for row in rows {
            let code: String = row.get("Code");
            concepts.insert(
                code.clone(),
                CptConceptInfo {
                    modifier: row.get::<i64, _>("Modifier") != 0,
                    kind: row.get("Kind"),
                    display: row.get("Display"),
                    abstract_: row.get::<i64, _>("Abstract") != 0,
                    telemedicine: false,
                    code,
                },
            );
        }

        let rows = sqlx::query(
            "SELECT Code FROM Properties WHERE Name = 'telemedicine' AND Value = 'true'",
        )
        .fetch_all(pool)
        .await?;
        for row in rows {
            if let Some(info) = concepts.get_mut(&row.get::<String, _>("Code")) {
                info.telemedicine = true;
            }
        }

        tracing::info!(count = concepts.len(), "loaded CPT concept table");
        Ok(Arc::new(Self { version, concepts }))
    }

    fn get(&self, code: &str) -> Option<&CptConceptInfo> {
        self.concepts.get(code)
    }
}

#[derive(Debug, Clone)]
pub struct CptContext {
    base: String,
    modifiers: Vec<String>,
    abstract_: bool,
    display: String,
}

impl CptContext {
    fn render(&self) -> String {
        let mut out = self.base.clone();
        for modifier in &self.modifiers {
            out.push(':');
            out.push_str(modifier);
        }
        out
    }

    pub fn is_expression(&self) -> bool {
        !self.modifiers.is_empty()
    }
}

impl ConceptContext for CptContext {
    fn code(&self) -> String {
        self.render()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct CptProvider {
    shared: Arc<CptShared>,
    pool: SqlitePool,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl CptProvider {
    pub fn new(
        shared: Arc<CptShared>,
        pool: SqlitePool,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Self> {
        supplements::check_supplements(SYSTEM, &supplements)?;
        Ok(Self {
            shared,
            pool,
            op_context,
            supplements,
        })
    }

    /// Validate `base:modifier[:modifier]*`. Returns a context or the
    /// reason the expression is invalid.
    fn parse_expression(&self, code: &str) -> std::result::Result<CptContext, String> {
        let mut parts = code.split(':');
        let base = parts.next().unwrap_or("");
        let Some(base_info) = self.shared.get(base) else {
            return Err(format!("Code '{base}' not found in {SYSTEM}"));
        };
        if base_info.modifier {
            return Err(format!("Code '{base}' is a modifier, not a base code"));
        }

        let modifiers: Vec<String> = parts.map(|m| m.to_string()).collect();
        let modifier_set: HashSet<&str> = modifiers.iter().map(|m| m.as_str()).collect();

        for set in EXCLUSIVE_MODIFIER_SETS {
            let present: Vec<&str> = set.iter().copied().filter(|m| modifier_set.contains(m)).collect();
            if present.len() > 1 {
                return Err(format!(
                    "The modifiers {} are mutually exclusive",
                    present.join(" and ")
                ));
            }
        }

        let base_number = base.parse::<u32>().ok();
        for modifier in &modifiers {
            let Some(info) = self.shared.get(modifier) else {
                return Err(format!("Modifier '{modifier}' not found in {SYSTEM}"));
            };
            if !info.modifier {
                return Err(format!("Code '{modifier}' is not a modifier"));
            }
            match info.kind.as_str() {
                "cat-2" => {
                    if base_info.kind != "cat-2" {
                        return Err(format!(
                            "Modifier '{modifier}' requires a category 2 code"
                        ));
                    }
                }
                "physical-status" => {
                    if !base_number.is_some_and(|n| (100..=1999).contains(&n)) {
                        return Err(format!(
                            "Modifier '{modifier}' requires an anesthesia code (00100-01999)"
                        ));
                    }
                }
                "hcpcs" => {
                    if !modifier_set.contains("59") {
                        return Err(format!(
                            "Modifier '{modifier}' requires modifier 59 to be present"
                        ));
                    }
                }
                _ => {}
            }
            match modifier.as_str() {
                "63" => {
                    if !base_number
                        .is_some_and(|n| (MOD_63_RANGE.0..=MOD_63_RANGE.1).contains(&n))
                    {
                        return Err(format!(
                            "Modifier 63 may only be used with codes {}-{}",
                            MOD_63_RANGE.0, MOD_63_RANGE.1
                        ));
                    }
                }
                "92" => {
                    if !MOD_92_CODES.contains(&base) {
                        return Err(format!("Modifier 92 may not be used with '{base}'"));
                    }
                }
                "95" => {
                    if !base_info.telemedicine {
                        return Err(format!(
                            "Modifier 95 may only be used with telemedicine codes"
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(CptContext {
            base: base.to_string(),
            modifiers,
            // Expression contexts are never abstract; plain modifier or
            // base contexts reflect their table row.
            abstract_: base_info.abstract_ && code.split(':').count() == 1,
            display: base_info.display.clone(),
        })
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for CptProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn version(&self) -> Option<&str> {
        self.shared.version.as_deref()
    }

    fn name(&self) -> &str {
        "CPT"
    }

    fn description(&self) -> &str {
        "Current Procedural Terminology"
    }

    fn total_count(&self) -> i64 {
        self.shared.concepts.len() as i64
    }

    fn expand_limitation(&self) -> Option<u32> {
        Some(1000)
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    fn property_definitions(&self) -> Vec<PropertyDefinition> {
        ["modifier", "modified", "kind"]
            .iter()
            .map(|code| PropertyDefinition {
                code: code.to_string(),
                uri: None,
                property_type: "string".to_string(),
            })
            .collect()
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        match self.parse_expression(code) {
            Ok(ctx) => Ok(LocateResult::found(ctx)),
            Err(message) => Ok(LocateResult::not_found(message)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<CptContext>(ctx, "cpt")?.render())
    }

    fn is_abstract(&self, ctx: &dyn ConceptContext) -> Result<bool> {
        Ok(downcast_ctx::<CptContext>(ctx, "cpt")?.abstract_)
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let cpt = downcast_ctx::<CptContext>(ctx, "cpt")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &cpt.render(),
            Some(&cpt.display),
            &[],
            None,
            Some(&cpt.display),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let cpt = downcast_ctx::<CptContext>(ctx, "cpt")?;
        let rows = sqlx::query("SELECT Type, Value FROM Designations WHERE Code = ?")
            .bind(&cpt.base)
            .fetch_all(&self.pool)
            .await?;
        let mut host = vec![Designation::display_use("en", cpt.display.clone())];
        for row in rows {
            host.push(Designation::new(
                Some("en".to_string()),
                None,
                row.get::<String, _>("Value"),
            ));
        }
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &cpt.render(),
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let cpt = downcast_ctx::<CptContext>(ctx, "cpt")?;
        let info = self.shared.get(&cpt.base);
        let mut out = Vec::new();
        if let Some(info) = info {
            out.push(ConceptProperty::boolean("modifier", info.modifier));
            out.push(ConceptProperty::boolean("modified", cpt.is_expression()));
            out.push(ConceptProperty::string("kind", info.kind.clone()));
        }
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &cpt.render(),
        ));
        Ok(out)
    }

    async fn iterator(&self, ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        if ctx.is_some() {
            return Ok(Some(ConceptIter::new(Vec::new())));
        }
        let mut codes: Vec<String> = self.shared.concepts.keys().cloned().collect();
        codes.sort_unstable();
        Ok(Some(ConceptIter::new(codes)))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        op == FilterOperator::Equal
            && match prop {
                "modifier" | "modified" => matches!(value, "true" | "false"),
                "kind" => true,
                _ => false,
            }
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        if op != FilterOperator::Equal {
            return Err(Error::FilterNotSupported {
                system: SYSTEM.to_string(),
                property: prop.to_string(),
                op: op.as_str().to_string(),
                value: value.to_string(),
            });
        }
        let codes: Vec<String> = match prop {
            "modifier" => {
                let want = value == "true";
                self.shared
                    .concepts
                    .values()
                    .filter(|c| c.modifier == want)
                    .map(|c| c.code.clone())
                    .collect()
            }
            "modified" => {
                // Stored concepts are never expressions; "modified = true"
                // is the empty set.
                if value == "true" {
                    Vec::new()
                } else {
                    self.shared.concepts.keys().cloned().collect()
                }
            }
            "kind" => self
                .shared
                .concepts
                .values()
                .filter(|c| c.kind == value)
                .map(|c| c.code.clone())
                .collect(),
            _ => {
                return Err(Error::FilterNotSupported {
                    system: SYSTEM.to_string(),
                    property: prop.to_string(),
                    op: op.as_str().to_string(),
                    value: value.to_string(),
                })
            }
        };
        let mut codes = codes;
        codes.sort_unstable();
        fctx.push(CodeFilter::new(codes));
        Ok(())
    }
}
