//! UNII provider (`http://fdasis.nlm.nih.gov`): FDA substance identifiers,
//! backed by the UNII SQLite store. Flat lookups only.

use crate::context::OperationContext;
use crate::error::Result;
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, Designation, LocateResult,
};
use crate::supplements;
use sqlx::{Row, SqlitePool};
use std::any::Any;
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "http://fdasis.nlm.nih.gov";

pub struct UniiShared {
    pub version: Option<String>,
    pub total: i64,
}

impl UniiShared {
    pub async fn load(pool: &SqlitePool) -> Result<Arc<Self>> {
        let version: Option<String> = sqlx::query_scalar("SELECT Version FROM UniiVersion")
            .fetch_optional(pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Unii")
            .fetch_one(pool)
            .await?;
        Ok(Arc::new(Self { version, total }))
    }
}

#[derive(Debug, Clone)]
pub struct UniiContext {
    key: i64,
    code: String,
    display: String,
}

impl ConceptContext for UniiContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct UniiProvider {
    shared: Arc<UniiShared>,
    pool: SqlitePool,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl UniiProvider {
    pub fn new(
        shared: Arc<UniiShared>,
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
}

#[async_trait::async_trait]
impl CodeSystemProvider for UniiProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn version(&self) -> Option<&str> {
        self.shared.version.as_deref()
    }

    fn name(&self) -> &str {
        "UNII"
    }

    fn description(&self) -> &str {
        "FDA Unique Ingredient Identifiers"
    }

    fn total_count(&self) -> i64 {
        self.shared.total
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        let row = sqlx::query("SELECT UniiKey, Code, Display FROM Unii WHERE Code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(LocateResult::found(UniiContext {
                key: row.get("UniiKey"),
                code: row.get("Code"),
                display: row.get("Display"),
            })),
            None => Ok(LocateResult::unknown_code(code, SYSTEM)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<UniiContext>(ctx, "unii")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let unii = downcast_ctx::<UniiContext>(ctx, "unii")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &unii.code,
            Some(&unii.display),
            &[],
            None,
            Some(&unii.display),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let unii = downcast_ctx::<UniiContext>(ctx, "unii")?;
        let mut host = vec![Designation::display_use("en", unii.display.clone())];
        let descriptions: Vec<String> =
            sqlx::query_scalar("SELECT Description FROM UniiDesc WHERE UniiKey = ?")
                .bind(unii.key)
                .fetch_all(&self.pool)
                .await?;
        let mut seen = std::collections::HashSet::new();
        seen.insert(unii.display.clone());
        for description in descriptions {
            // The description table repeats entries across source types.
            if seen.insert(description.clone()) {
                host.push(Designation::new(None, None, description));
            }
        }
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &unii.code,
        ))
    }
}
