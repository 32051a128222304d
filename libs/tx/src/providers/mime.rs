//! MIME type provider (`urn:ietf:bcp:13`). Grammar-based: `locate`
//! validates the `type/subtype` shape. No hierarchy, no filters.

use crate::context::OperationContext;
use crate::error::Result;
use crate::provider::{downcast_ctx, CodeSystemProvider, ConceptContext, LocateResult};
use crate::supplements;
use std::any::Any;
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "urn:ietf:bcp:13";

#[derive(Debug, Clone)]
pub struct MimeContext {
    code: String,
}

impl ConceptContext for MimeContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MimeProvider {
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl MimeProvider {
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

    fn valid(code: &str) -> bool {
        let Some((main, rest)) = code.split_once('/') else {
            return false;
        };
        // Parameters (";charset=utf-8") ride along after the subtype.
        let subtype = rest.split(';').next().unwrap_or("");
        is_token(main) && is_token(subtype)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '*' | '_'))
}

#[async_trait::async_trait]
impl CodeSystemProvider for MimeProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn name(&self) -> &str {
        "Mime Types"
    }

    fn description(&self) -> &str {
        "Media types per BCP 13"
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

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        if !Self::valid(code) {
            return Ok(LocateResult::not_found(format!(
                "'{code}' is not a valid mime type"
            )));
        }
        Ok(LocateResult::found(MimeContext {
            code: code.to_string(),
        }))
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<MimeContext>(ctx, "mime")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let mime = downcast_ctx::<MimeContext>(ctx, "mime")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &mime.code,
            Some(&mime.code),
            &[],
            None,
            Some(&mime.code),
        ))
    }
}
