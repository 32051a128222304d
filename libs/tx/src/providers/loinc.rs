//! LOINC provider (`http://loinc.org`), backed by the LOINC SQLite store.
//!
//! The factory eagerly loads the code table and hierarchy into shared
//! immutable maps (the hot paths); descriptions and properties stay in the
//! database and are queried per concept.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{FilterContext, KeyFilter, PreparedFilter};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation,
    FilterOperator, LocateResult, LookupResult, PropertyDefinition, SubsumptionOutcome,
};
use crate::supplements;
use sqlx::{Row, SqlitePool};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "http://loinc.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoincKind {
    Code,
    Part,
    List,
    Answer,
}

impl LoincKind {
    fn from_i64(value: i64) -> Self {
        match value {
            2 => LoincKind::Part,
            3 => LoincKind::List,
            4 => LoincKind::Answer,
            _ => LoincKind::Code,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoincCodeInfo {
    pub key: i64,
    pub code: String,
    pub kind: LoincKind,
    pub display: String,
    pub status_key: i64,
}

/// Immutable shared state owned by the factory.
pub struct LoincShared {
    pub version: Option<String>,
    codes: HashMap<String, LoincCodeInfo>,
    by_key: BTreeMap<i64, String>,
    children: HashMap<i64, Vec<i64>>,
    parents: HashMap<i64, Vec<i64>>,
    status_by_name: HashMap<String, i64>,
    relationship_types: HashSet<String>,
    property_types: HashSet<String>,
}

impl LoincShared {
    pub async fn load(pool: &SqlitePool) -> Result<Arc<Self>> {
        let version: Option<String> =
            sqlx::query_scalar("SELECT Value FROM Config WHERE ConfigKey = 1")
                .fetch_optional(pool)
                .await?;

        let mut codes = HashMap::new();
        let mut by_key = BTreeMap::new();
        let rows = sqlx::query("SELECT CodeKey, Code, Type, StatusKey, Description FROM Codes")
            .fetch_all(pool)
            .await?;
        for row in rows {
            let info = LoincCodeInfo {
                key: row.get("CodeKey"),
                code: row.get("Code"),
                kind: LoincKind::from_i64(row.get("Type")),
                display: row.get("Description"),
                status_key: row.get("StatusKey"),
            };
            by_key.insert(info.key, info.code.clone());
            codes.insert(info.code.clone(), info);
        }

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut parents: HashMap<i64, Vec<i64>> = HashMap::new();
        let rows = sqlx::query(
            "SELECT r.SourceKey, r.TargetKey
             FROM Relationships r
             JOIN RelationshipTypes t ON t.RelationshipTypeKey = r.RelationshipTypeKey
             WHERE t.Code = 'child'",
        )
        .fetch_all(pool)
        .await?;
        for row in rows {
            let source: i64 = row.get("SourceKey");
            let target: i64 = row.get("TargetKey");
            children.entry(source).or_default().push(target);
            parents.entry(target).or_default().push(source);
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut status_by_name = HashMap::new();
        let rows = sqlx::query("SELECT StatusKey, Description FROM StatusCodes")
            .fetch_all(pool)
            .await?;
        for row in rows {
            status_by_name.insert(row.get::<String, _>("Description"), row.get("StatusKey"));
        }

        let relationship_types: HashSet<String> =
            sqlx::query_scalar("SELECT Code FROM RelationshipTypes")
                .fetch_all(pool)
                .await?
                .into_iter()
                .collect();
        let property_types: HashSet<String> =
            sqlx::query_scalar("SELECT Code FROM PropertyTypes")
                .fetch_all(pool)
                .await?
                .into_iter()
                .collect();

        tracing::info!(count = codes.len(), "loaded LOINC code table");
        Ok(Arc::new(Self {
            version,
            codes,
            by_key,
            children,
            parents,
            status_by_name,
            relationship_types,
            property_types,
        }))
    }

    pub fn total(&self) -> usize {
        self.codes.len()
    }

    fn info(&self, code: &str) -> Option<&LoincCodeInfo> {
        self.codes
            .get(code)
            .or_else(|| self.codes.get(&code.to_uppercase()))
    }

    fn code_for_key(&self, key: i64) -> Option<&str> {
        self.by_key.get(&key).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LoincContext {
    pub key: i64,
    pub code: String,
    pub kind: LoincKind,
    display: String,
}

impl ConceptContext for LoincContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct LoincProvider {
    shared: Arc<LoincShared>,
    pool: SqlitePool,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

/// `CLASSTYPE` is stored numerically; filters accept the names.
const CLASS_TYPES: &[(&str, &str)] = &[
    ("Laboratory class", "1"),
    ("Clinical class", "2"),
    ("Claims attachments", "3"),
    ("Surveys", "4"),
];

impl LoincProvider {
    pub fn new(
        shared: Arc<LoincShared>,
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

    fn context_for(&self, info: &LoincCodeInfo) -> LoincContext {
        LoincContext {
            key: info.key,
            code: info.code.clone(),
            kind: info.kind,
            display: info.display.clone(),
        }
    }

    fn unsupported(&self, prop: &str, op: FilterOperator, value: &str) -> Error {
        Error::FilterNotSupported {
            system: SYSTEM.to_string(),
            property: prop.to_string(),
            op: op.as_str().to_string(),
            value: value.to_string(),
        }
    }

    async fn relationship_type_key(&self, code: &str) -> Result<Option<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT RelationshipTypeKey FROM RelationshipTypes WHERE Code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn property_type_key(&self, code: &str) -> Result<Option<i64>> {
        Ok(
            sqlx::query_scalar("SELECT PropertyTypeKey FROM PropertyTypes WHERE Code = ?")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Resolve a filter value naming a target concept: a code first, then a
    /// description.
    async fn target_keys(&self, value: &str) -> Result<Vec<i64>> {
        if let Some(info) = self.shared.info(value) {
            return Ok(vec![info.key]);
        }
        Ok(
            sqlx::query_scalar("SELECT CodeKey FROM Codes WHERE Description = ?")
                .bind(value)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn relationship_filter(
        &self,
        type_key: i64,
        targets: &[i64],
    ) -> Result<Vec<i64>> {
        let mut keys = Vec::new();
        for target in targets {
            let rows: Vec<i64> = sqlx::query_scalar(
                "SELECT SourceKey FROM Relationships
                 WHERE RelationshipTypeKey = ? AND TargetKey = ?",
            )
            .bind(type_key)
            .bind(target)
            .fetch_all(&self.pool)
            .await?;
            keys.extend(rows);
        }
        Ok(keys)
    }

    async fn relationship_regex_filter(&self, type_key: i64, pattern: &str) -> Result<Vec<i64>> {
        let re = regex::Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|_| Error::InvalidRegex(pattern.to_string()))?;
        let rows = sqlx::query(
            "SELECT r.SourceKey AS SourceKey, c.Code AS Code, c.Description AS Description
             FROM Relationships r
             JOIN Codes c ON c.CodeKey = r.TargetKey
             WHERE r.RelationshipTypeKey = ?",
        )
        .bind(type_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                re.is_match(&row.get::<String, _>("Code"))
                    || re.is_match(&row.get::<String, _>("Description"))
            })
            .map(|row| row.get("SourceKey"))
            .collect())
    }

    async fn property_value_filter(
        &self,
        type_key: i64,
        value: &str,
        as_regex: bool,
    ) -> Result<Vec<i64>> {
        if as_regex {
            let re = regex::Regex::new(&format!("^(?:{value})$"))
                .map_err(|_| Error::InvalidRegex(value.to_string()))?;
            let rows = sqlx::query(
                "SELECT p.CodeKey AS CodeKey, v.Value AS Value
                 FROM Properties p
                 JOIN PropertyValues v ON v.PropertyValueKey = p.PropertyValueKey
                 WHERE p.PropertyTypeKey = ?",
            )
            .bind(type_key)
            .fetch_all(&self.pool)
            .await?;
            return Ok(rows
                .into_iter()
                .filter(|row| re.is_match(&row.get::<String, _>("Value")))
                .map(|row| row.get("CodeKey"))
                .collect());
        }
        Ok(sqlx::query_scalar(
            "SELECT p.CodeKey
             FROM Properties p
             JOIN PropertyValues v ON v.PropertyValueKey = p.PropertyValueKey
             WHERE p.PropertyTypeKey = ? AND v.Value = ?",
        )
        .bind(type_key)
        .bind(value)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn closure_descendants(&self, key: i64, include_self: bool) -> Result<Vec<i64>> {
        let mut keys: Vec<i64> =
            sqlx::query_scalar("SELECT DescendantKey FROM Closure WHERE AncestorKey = ?")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;
        if include_self {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn copyright_filter(&self, value: &str) -> Result<Vec<i64>> {
        let Some(type_key) = self.property_type_key("EXTERNAL_COPYRIGHT_NOTICE").await? else {
            return Ok(Vec::new());
        };
        let third_party: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT CodeKey FROM Properties WHERE PropertyTypeKey = ?")
                .bind(type_key)
                .fetch_all(&self.pool)
                .await?;
        if value == "3rdParty" {
            return Ok(third_party);
        }
        let marked: std::collections::HashSet<i64> = third_party.into_iter().collect();
        Ok(self
            .shared
            .by_key
            .keys()
            .filter(|k| !marked.contains(k))
            .copied()
            .collect())
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for LoincProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn version(&self) -> Option<&str> {
        self.shared.version.as_deref()
    }

    fn name(&self) -> &str {
        "LOINC"
    }

    fn description(&self) -> &str {
        "Logical Observation Identifiers, Names and Codes"
    }

    fn total_count(&self) -> i64 {
        self.shared.total() as i64
    }

    fn has_parents(&self) -> bool {
        true
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    fn property_definitions(&self) -> Vec<PropertyDefinition> {
        ["COMPONENT", "PROPERTY", "TIME_ASPCT", "SYSTEM", "SCALE_TYP", "METHOD_TYP", "CLASS", "CLASSTYPE", "STATUS"]
            .iter()
            .map(|code| PropertyDefinition {
                code: code.to_string(),
                uri: None,
                property_type: "string".to_string(),
            })
            .collect()
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        match self.shared.info(code) {
            Some(info) => Ok(LocateResult::found(self.context_for(info))),
            None => Ok(LocateResult::unknown_code(code, SYSTEM)),
        }
    }

    async fn locate_is_a(
        &self,
        code: &str,
        parent: &str,
        disallow_self: bool,
    ) -> Result<LocateResult> {
        let Some(info) = self.shared.info(code) else {
            return Ok(LocateResult::unknown_code(code, SYSTEM));
        };
        let Some(parent_info) = self.shared.info(parent) else {
            return Ok(LocateResult::unknown_code(parent, SYSTEM));
        };
        if info.key == parent_info.key {
            if disallow_self {
                return Ok(LocateResult::not_found(format!(
                    "Code '{code}' is the same as '{parent}'"
                )));
            }
            return Ok(LocateResult::found(self.context_for(info)));
        }
        let subsumed: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM Closure WHERE AncestorKey = ? AND DescendantKey = ?",
        )
        .bind(parent_info.key)
        .bind(info.key)
        .fetch_optional(&self.pool)
        .await?;
        if subsumed.is_some() {
            Ok(LocateResult::found(self.context_for(info)))
        } else {
            Ok(LocateResult::not_found(format!(
                "Code '{code}' is not subsumed by '{parent}'"
            )))
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<LoincContext>(ctx, "loinc")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let loinc = downcast_ctx::<LoincContext>(ctx, "loinc")?;
        let host_designations = self.designations(ctx).await?;
        // LONG_COMMON_NAME is the canonical display; the code table's short
        // description only stands in when the store carries none.
        let canonical = host_designations
            .iter()
            .find(|d| d.is_display())
            .map(|d| d.value.clone())
            .unwrap_or_else(|| loinc.display.clone());
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &loinc.code,
            Some(&canonical),
            &host_designations,
            None,
            Some(&canonical),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let loinc = downcast_ctx::<LoincContext>(ctx, "loinc")?;
        let rows = sqlx::query(
            "SELECT t.Code AS Type, l.Code AS Language, d.Value AS Value
             FROM Descriptions d
             JOIN DescriptionTypes t ON t.DescriptionTypeKey = d.DescriptionTypeKey
             JOIN Languages l ON l.LanguageKey = t.LanguageKey
             WHERE d.CodeKey = ?",
        )
        .bind(loinc.key)
        .fetch_all(&self.pool)
        .await?;
        let mut host = Vec::new();
        for row in rows {
            let kind: String = row.get("Type");
            let language: String = row.get("Language");
            let value: String = row.get("Value");
            // LONG_COMMON_NAME is the canonical display form.
            let designation = if kind == "LONG_COMMON_NAME" {
                Designation::display_use(&language, value)
            } else {
                Designation::new(Some(language), None, value)
            };
            host.push(designation);
        }
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &loinc.code,
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let loinc = downcast_ctx::<LoincContext>(ctx, "loinc")?;
        let rows = sqlx::query(
            "SELECT t.Code AS Code, v.Value AS Value
             FROM Properties p
             JOIN PropertyTypes t ON t.PropertyTypeKey = p.PropertyTypeKey
             JOIN PropertyValues v ON v.PropertyValueKey = p.PropertyValueKey
             WHERE p.CodeKey = ?",
        )
        .bind(loinc.key)
        .fetch_all(&self.pool)
        .await?;
        let mut out: Vec<ConceptProperty> = rows
            .into_iter()
            .map(|row| {
                ConceptProperty::string(&row.get::<String, _>("Code"), row.get::<String, _>("Value"))
            })
            .collect();
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &loinc.code,
        ));
        Ok(out)
    }

    async fn parent(&self, ctx: &dyn ConceptContext) -> Result<Option<Box<dyn ConceptContext>>> {
        let loinc = downcast_ctx::<LoincContext>(ctx, "loinc")?;
        let parent = self
            .shared
            .parents
            .get(&loinc.key)
            .and_then(|p| p.first())
            .and_then(|key| self.shared.code_for_key(*key))
            .and_then(|code| self.shared.info(code));
        Ok(parent.map(|info| Box::new(self.context_for(info)) as Box<dyn ConceptContext>))
    }

    async fn extend_lookup(
        &self,
        ctx: &dyn ConceptContext,
        _requested: &[String],
        out: &mut LookupResult,
    ) -> Result<()> {
        let loinc = downcast_ctx::<LoincContext>(ctx, "loinc")?;
        if let Some(parents) = self.shared.parents.get(&loinc.key) {
            for key in parents {
                if let Some(code) = self.shared.code_for_key(*key) {
                    out.properties.push(ConceptProperty::string("parent", code));
                }
            }
        }
        if let Some(children) = self.shared.children.get(&loinc.key) {
            for key in children {
                if let Some(code) = self.shared.code_for_key(*key) {
                    out.properties.push(ConceptProperty::string("child", code));
                }
            }
        }
        Ok(())
    }

    async fn subsumes_test(&self, a: &str, b: &str) -> Result<SubsumptionOutcome> {
        let (Some(ia), Some(ib)) = (self.shared.info(a), self.shared.info(b)) else {
            return Ok(SubsumptionOutcome::NotSubsumed);
        };
        if ia.key == ib.key {
            return Ok(SubsumptionOutcome::Equivalent);
        }
        let forward: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM Closure WHERE AncestorKey = ? AND DescendantKey = ?")
                .bind(ia.key)
                .bind(ib.key)
                .fetch_optional(&self.pool)
                .await?;
        if forward.is_some() {
            return Ok(SubsumptionOutcome::Subsumes);
        }
        let backward: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM Closure WHERE AncestorKey = ? AND DescendantKey = ?")
                .bind(ib.key)
                .bind(ia.key)
                .fetch_optional(&self.pool)
                .await?;
        if backward.is_some() {
            return Ok(SubsumptionOutcome::SubsumedBy);
        }
        Ok(SubsumptionOutcome::NotSubsumed)
    }

    async fn iterator(&self, ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        let codes = match ctx {
            None => self.shared.by_key.values().cloned().collect(),
            Some(ctx) => {
                let loinc = downcast_ctx::<LoincContext>(ctx, "loinc")?;
                self.shared
                    .children
                    .get(&loinc.key)
                    .map(|keys| {
                        keys.iter()
                            .filter_map(|k| self.shared.code_for_key(*k))
                            .map(|c| c.to_string())
                            .collect()
                    })
                    .unwrap_or_default()
            }
        };
        Ok(Some(ConceptIter::new(codes)))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        match prop {
            "concept" | "code" => {
                matches!(op, FilterOperator::IsA | FilterOperator::DescendentOf)
                    && self.shared.info(value).is_some()
            }
            "STATUS" => op == FilterOperator::Equal && self.shared.status_by_name.contains_key(value),
            "LIST" => op == FilterOperator::Equal && self.shared.info(value).is_some(),
            "answers-for" => op == FilterOperator::Equal && self.shared.info(value).is_some(),
            "copyright" => {
                op == FilterOperator::Equal && matches!(value, "LOINC" | "3rdParty")
            }
            // Advisory only, but honest: true only when the property names
            // a loaded relationship or property type, and (for equality on
            // a relationship) the target value actually resolves.
            _ => match op {
                FilterOperator::Equal => {
                    if self.shared.relationship_types.contains(prop) {
                        self.shared.info(value).is_some()
                    } else if self.shared.property_types.contains(prop) {
                        prop != "CLASSTYPE"
                            || CLASS_TYPES
                                .iter()
                                .any(|(name, number)| *name == value || *number == value)
                    } else {
                        false
                    }
                }
                FilterOperator::Regex => {
                    self.shared.relationship_types.contains(prop)
                        || self.shared.property_types.contains(prop)
                }
                _ => false,
            },
        }
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        let keys = match (prop, op) {
            ("concept" | "code", FilterOperator::IsA) => {
                let Some(info) = self.shared.info(value) else {
                    return Err(Error::Internal(format!("Code '{value}' not found in {SYSTEM}")));
                };
                self.closure_descendants(info.key, true).await?
            }
            ("concept" | "code", FilterOperator::DescendentOf) => {
                let Some(info) = self.shared.info(value) else {
                    return Err(Error::Internal(format!("Code '{value}' not found in {SYSTEM}")));
                };
                self.closure_descendants(info.key, false).await?
            }
            ("STATUS", FilterOperator::Equal) => {
                let Some(status_key) = self.shared.status_by_name.get(value) else {
                    return Err(self.unsupported(prop, op, value));
                };
                self.shared
                    .codes
                    .values()
                    .filter(|info| info.status_key == *status_key)
                    .map(|info| info.key)
                    .collect()
            }
            ("LIST", FilterOperator::Equal) => {
                let Some(list) = self.shared.info(value) else {
                    return Err(self.unsupported(prop, op, value));
                };
                let Some(type_key) = self.relationship_type_key("Answer").await? else {
                    return Err(self.unsupported(prop, op, value));
                };
                sqlx::query_scalar(
                    "SELECT TargetKey FROM Relationships
                     WHERE RelationshipTypeKey = ? AND SourceKey = ?",
                )
                .bind(type_key)
                .bind(list.key)
                .fetch_all(&self.pool)
                .await?
            }
            ("answers-for", FilterOperator::Equal) => {
                let Some(info) = self.shared.info(value) else {
                    return Err(self.unsupported(prop, op, value));
                };
                let Some(list_type) = self.relationship_type_key("AnswerList").await? else {
                    return Err(self.unsupported(prop, op, value));
                };
                let Some(answer_type) = self.relationship_type_key("Answer").await? else {
                    return Err(self.unsupported(prop, op, value));
                };
                let lists: Vec<i64> = sqlx::query_scalar(
                    "SELECT TargetKey FROM Relationships
                     WHERE RelationshipTypeKey = ? AND SourceKey = ?",
                )
                .bind(list_type)
                .bind(info.key)
                .fetch_all(&self.pool)
                .await?;
                let mut keys = Vec::new();
                for list in lists {
                    let answers: Vec<i64> = sqlx::query_scalar(
                        "SELECT TargetKey FROM Relationships
                         WHERE RelationshipTypeKey = ? AND SourceKey = ?",
                    )
                    .bind(answer_type)
                    .bind(list)
                    .fetch_all(&self.pool)
                    .await?;
                    keys.extend(answers);
                }
                keys
            }
            ("copyright", FilterOperator::Equal) => {
                if !matches!(value, "LOINC" | "3rdParty") {
                    return Err(self.unsupported(prop, op, value));
                }
                self.copyright_filter(value).await?
            }
            (_, FilterOperator::Equal) | (_, FilterOperator::Regex) => {
                let as_regex = op == FilterOperator::Regex;
                if let Some(type_key) = self.relationship_type_key(prop).await? {
                    if as_regex {
                        self.relationship_regex_filter(type_key, value).await?
                    } else {
                        let targets = self.target_keys(value).await?;
                        if targets.is_empty() {
                            return Err(self.unsupported(prop, op, value));
                        }
                        self.relationship_filter(type_key, &targets).await?
                    }
                } else if let Some(type_key) = self.property_type_key(prop).await? {
                    let effective = if prop == "CLASSTYPE" && !as_regex {
                        CLASS_TYPES
                            .iter()
                            .find(|(name, _)| *name == value)
                            .map(|(_, number)| *number)
                            .unwrap_or(value)
                    } else {
                        value
                    };
                    self.property_value_filter(type_key, effective, as_regex)
                        .await?
                } else {
                    return Err(self.unsupported(prop, op, value));
                }
            }
            _ => return Err(self.unsupported(prop, op, value)),
        };
        fctx.push(KeyFilter::new(keys));
        Ok(())
    }

    async fn filter_more(&self, filter: &mut dyn PreparedFilter) -> Result<bool> {
        let kf = filter
            .as_any_mut()
            .downcast_mut::<KeyFilter>()
            .ok_or(Error::WrongFilter("loinc"))?;
        Ok(kf.advance())
    }

    async fn filter_concept(
        &self,
        filter: &mut dyn PreparedFilter,
    ) -> Result<Option<Box<dyn ConceptContext>>> {
        let key = {
            let kf = filter
                .as_any()
                .downcast_ref::<KeyFilter>()
                .ok_or(Error::WrongFilter("loinc"))?;
            match kf.current() {
                Some(key) => key,
                None => return Ok(None),
            }
        };
        Ok(self
            .shared
            .code_for_key(key)
            .and_then(|code| self.shared.info(code))
            .map(|info| Box::new(self.context_for(info)) as Box<dyn ConceptContext>))
    }

    async fn filter_locate(
        &self,
        filter: &mut dyn PreparedFilter,
        code: &str,
    ) -> Result<std::result::Result<Box<dyn ConceptContext>, String>> {
        let kf = filter
            .as_any()
            .downcast_ref::<KeyFilter>()
            .ok_or(Error::WrongFilter("loinc"))?;
        let Some(info) = self.shared.info(code) else {
            return Ok(Err(format!("Code '{code}' not found in {SYSTEM}")));
        };
        if kf.contains_key(info.key) {
            Ok(Ok(Box::new(self.context_for(info))))
        } else {
            Ok(Err(format!(
                "Code '{code}' is not in the filtered set"
            )))
        }
    }

    async fn filter_check(
        &self,
        filter: &mut dyn PreparedFilter,
        ctx: &dyn ConceptContext,
    ) -> Result<bool> {
        let kf = filter
            .as_any()
            .downcast_ref::<KeyFilter>()
            .ok_or(Error::WrongFilter("loinc"))?;
        let loinc = downcast_ctx::<LoincContext>(ctx, "loinc")?;
        Ok(kf.contains_key(loinc.key))
    }
}
