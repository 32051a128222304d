//! NDC provider (`http://hl7.org/fhir/sid/ndc`): drug products (10-digit)
//! and packages (10- or 11-digit), backed by the NDC SQLite store.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{CodeFilter, FilterContext};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation,
    FilterOperator, LocateResult, LookupResult,
};
use crate::supplements;
use sqlx::{Row, SqlitePool};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "http://hl7.org/fhir/sid/ndc";

const FILTER_PAGE_SIZE: i64 = 1000;

/// Immutable lookup tables loaded once by the factory.
pub struct NdcShared {
    pub version: Option<String>,
    organizations: HashMap<i64, String>,
    dose_forms: HashMap<i64, String>,
    routes: HashMap<i64, String>,
    product_count: i64,
    package_count: i64,
}

impl NdcShared {
    pub async fn load(pool: &SqlitePool) -> Result<Arc<Self>> {
        let version: Option<String> = sqlx::query_scalar("SELECT Version FROM NDCVersion")
            .fetch_optional(pool)
            .await?;

        let mut organizations = HashMap::new();
        for row in sqlx::query("SELECT OrganizationKey, Name FROM NDCOrganizations")
            .fetch_all(pool)
            .await?
        {
            organizations.insert(row.get("OrganizationKey"), row.get("Name"));
        }
        let mut dose_forms = HashMap::new();
        for row in sqlx::query("SELECT DoseFormKey, Name FROM NDCDoseForms")
            .fetch_all(pool)
            .await?
        {
            dose_forms.insert(row.get("DoseFormKey"), row.get("Name"));
        }
        let mut routes = HashMap::new();
        for row in sqlx::query("SELECT RouteKey, Name FROM NDCRoutes")
            .fetch_all(pool)
            .await?
        {
            routes.insert(row.get("RouteKey"), row.get("Name"));
        }

        let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM NDCProducts")
            .fetch_one(pool)
            .await?;
        let package_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM NDCPackages")
            .fetch_one(pool)
            .await?;

        tracing::info!(products = product_count, packages = package_count, "loaded NDC tables");
        Ok(Arc::new(Self {
            version,
            organizations,
            dose_forms,
            routes,
            product_count,
            package_count,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdcKind {
    Product,
    Package,
}

#[derive(Debug, Clone)]
pub struct NdcContext {
    code: String,
    kind: NdcKind,
    key: i64,
    product_key: i64,
    display: String,
}

impl ConceptContext for NdcContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct NdcProvider {
    shared: Arc<NdcShared>,
    pool: SqlitePool,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl NdcProvider {
    pub fn new(
        shared: Arc<NdcShared>,
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

    /// Packages first (stored code, stored 11-digit form, or the 11-digit
    /// normalization of a hyphenated code), then products (stored code or
    /// the padded two-segment form).
    async fn find(&self, code: &str) -> Result<Option<NdcContext>> {
        let eleven = normalized_package_code(code).unwrap_or_default();
        let row = sqlx::query(
            "SELECT p.PackageKey AS Key, p.ProductKey AS ProductKey, p.Code AS Code,
                    r.TradeName AS TradeName, p.Description AS Description
             FROM NDCPackages p
             JOIN NDCProducts r ON r.ProductKey = p.ProductKey
             WHERE p.Code = ? OR p.Code11 = ? OR p.Code11 = ?
             LIMIT 1",
        )
        .bind(code)
        .bind(code)
        .bind(&eleven)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            let trade: String = row.get("TradeName");
            let description: String = row.get("Description");
            return Ok(Some(NdcContext {
                code: code.to_string(),
                kind: NdcKind::Package,
                key: row.get("Key"),
                product_key: row.get("ProductKey"),
                display: format!("{trade} {description}").trim().to_string(),
            }));
        }

        let padded = normalized_product_code(code).unwrap_or_default();
        let row = sqlx::query(
            "SELECT ProductKey AS Key, TradeName FROM NDCProducts
             WHERE Code = ? OR Code = ?
             LIMIT 1",
        )
        .bind(code)
        .bind(&padded)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| NdcContext {
            code: code.to_string(),
            kind: NdcKind::Product,
            key: row.get("Key"),
            product_key: row.get("Key"),
            display: row.get("TradeName"),
        }))
    }

    fn unsupported(&self, prop: &str, op: FilterOperator, value: &str) -> Error {
        Error::FilterNotSupported {
            system: SYSTEM.to_string(),
            property: prop.to_string(),
            op: op.as_str().to_string(),
            value: value.to_string(),
        }
    }

    async fn product_row(&self, product_key: i64) -> Result<Option<sqlx::sqlite::SqliteRow>> {
        Ok(sqlx::query(
            "SELECT Code, TradeName, DoseFormKey, RouteKey, OrganizationKey, Category, Active
             FROM NDCProducts WHERE ProductKey = ?",
        )
        .bind(product_key)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for NdcProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn version(&self) -> Option<&str> {
        self.shared.version.as_deref()
    }

    fn name(&self) -> &str {
        "NDC"
    }

    fn description(&self) -> &str {
        "National Drug Codes"
    }

    fn total_count(&self) -> i64 {
        self.shared.product_count + self.shared.package_count
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        match self.find(code).await? {
            Some(ctx) => Ok(LocateResult::found(ctx)),
            None => Ok(LocateResult::unknown_code(code, SYSTEM)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<NdcContext>(ctx, "ndc")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let ndc = downcast_ctx::<NdcContext>(ctx, "ndc")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &ndc.code,
            Some(&ndc.display),
            &[],
            None,
            Some(&ndc.display),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let ndc = downcast_ctx::<NdcContext>(ctx, "ndc")?;
        let host = vec![Designation::display_use("en", ndc.display.clone())];
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &ndc.code,
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let ndc = downcast_ctx::<NdcContext>(ctx, "ndc")?;
        let mut out = vec![ConceptProperty::string(
            "code-type",
            match ndc.kind {
                NdcKind::Product => "product",
                NdcKind::Package => "package",
            },
        )];
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &ndc.code,
        ));
        Ok(out)
    }

    async fn extend_lookup(
        &self,
        ctx: &dyn ConceptContext,
        _requested: &[String],
        out: &mut LookupResult,
    ) -> Result<()> {
        let ndc = downcast_ctx::<NdcContext>(ctx, "ndc")?;
        let Some(row) = self.product_row(ndc.product_key).await? else {
            return Ok(());
        };
        out.properties
            .push(ConceptProperty::string("trade-name", row.get::<String, _>("TradeName")));
        if let Some(name) = self.shared.dose_forms.get(&row.get::<i64, _>("DoseFormKey")) {
            out.properties.push(ConceptProperty::string("dose-form", name));
        }
        if let Some(name) = self.shared.routes.get(&row.get::<i64, _>("RouteKey")) {
            out.properties.push(ConceptProperty::string("route", name));
        }
        if let Some(name) = self
            .shared
            .organizations
            .get(&row.get::<i64, _>("OrganizationKey"))
        {
            out.properties.push(ConceptProperty::string("company", name));
        }
        out.properties
            .push(ConceptProperty::string("category", row.get::<String, _>("Category")));
        out.properties
            .push(ConceptProperty::boolean("active", row.get::<i64, _>("Active") != 0));
        if ndc.kind == NdcKind::Package {
            out.properties
                .push(ConceptProperty::string("product", row.get::<String, _>("Code")));
        }
        Ok(())
    }

    async fn iterator(&self, ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        if ctx.is_some() {
            return Ok(Some(ConceptIter::new(Vec::new())));
        }
        let mut codes: Vec<String> =
            sqlx::query_scalar("SELECT Code FROM NDCProducts ORDER BY ProductKey")
                .fetch_all(&self.pool)
                .await?;
        let packages: Vec<String> =
            sqlx::query_scalar("SELECT Code FROM NDCPackages ORDER BY PackageKey")
                .fetch_all(&self.pool)
                .await?;
        codes.extend(packages);
        Ok(Some(ConceptIter::new(codes)))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        prop == "code-type"
            && op == FilterOperator::Equal
            && matches!(value, "product" | "10-digit" | "11-digit")
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        if prop != "code-type" || op != FilterOperator::Equal {
            return Err(self.unsupported(prop, op, value));
        }
        let sql = match value {
            "product" => "SELECT Code FROM NDCProducts ORDER BY ProductKey LIMIT ? OFFSET ?",
            "10-digit" => "SELECT Code FROM NDCPackages ORDER BY PackageKey LIMIT ? OFFSET ?",
            "11-digit" => "SELECT Code11 FROM NDCPackages ORDER BY PackageKey LIMIT ? OFFSET ?",
            _ => return Err(self.unsupported(prop, op, value)),
        };

        // Page through the store rather than issuing one unbounded query.
        let mut codes = Vec::new();
        let mut offset = 0i64;
        loop {
            let page: Vec<String> = sqlx::query_scalar(sql)
                .bind(FILTER_PAGE_SIZE)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
            let fetched = page.len() as i64;
            codes.extend(page);
            if fetched < FILTER_PAGE_SIZE {
                break;
            }
            offset += FILTER_PAGE_SIZE;
        }
        fctx.push(CodeFilter::new(codes));
        Ok(())
    }
}

/// Normalize a hyphenated three-segment package code (4-4-2, 5-3-2, or
/// 5-4-1) to the 11-digit form: labeler padded to five digits, product to
/// four, package to two.
fn normalized_package_code(code: &str) -> Option<String> {
    let segments: Vec<&str> = code.split('-').collect();
    let [labeler, product, package] = segments.as_slice() else {
        return None;
    };
    if !valid_segment(labeler, 5) || !valid_segment(product, 4) || !valid_segment(package, 2) {
        return None;
    }
    Some(format!("{labeler:0>5}{product:0>4}{package:0>2}"))
}

/// Normalize a hyphenated two-segment product code to the padded `5-4`
/// form the product table stores.
fn normalized_product_code(code: &str) -> Option<String> {
    let segments: Vec<&str> = code.split('-').collect();
    let [labeler, product] = segments.as_slice() else {
        return None;
    };
    if !valid_segment(labeler, 5) || !valid_segment(product, 4) {
        return None;
    }
    Some(format!("{labeler:0>5}-{product:0>4}"))
}

fn valid_segment(segment: &str, max: usize) -> bool {
    !segment.is_empty()
        && segment.len() <= max
        && segment.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_codes_normalize_to_eleven_digits() {
        assert_eq!(
            normalized_package_code("0002-1433-80").as_deref(),
            Some("00002143380")
        );
        assert_eq!(
            normalized_package_code("00002-1433-80").as_deref(),
            Some("00002143380")
        );
        assert_eq!(
            normalized_package_code("50090-339-1").as_deref(),
            Some("50090033901")
        );
        assert!(normalized_package_code("0002-1433").is_none());
        assert!(normalized_package_code("0002-1433-801").is_none());
        assert!(normalized_package_code("0002-14XX-80").is_none());
    }

    #[test]
    fn product_codes_normalize_to_padded_segments() {
        assert_eq!(
            normalized_product_code("0002-1433").as_deref(),
            Some("00002-1433")
        );
        assert_eq!(
            normalized_product_code("50090-339").as_deref(),
            Some("50090-0339")
        );
        assert!(normalized_product_code("0002-1433-80").is_none());
        assert!(normalized_product_code("0002").is_none());
    }
}
