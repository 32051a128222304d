//! RFC 3986 URI provider (`urn:ietf:rfc:3986`). Grammar-based: any
//! non-empty string is a valid URI code; displays come from supplements
//! only.

use crate::context::OperationContext;
use crate::error::Result;
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptProperty, Designation, LocateResult,
};
use crate::supplements;
use std::any::Any;
use std::sync::Arc;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "urn:ietf:rfc:3986";

#[derive(Debug, Clone)]
pub struct UriContext {
    code: String,
}

impl ConceptContext for UriContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct UriProvider {
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl UriProvider {
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
}

#[async_trait::async_trait]
impl CodeSystemProvider for UriProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn name(&self) -> &str {
        "URIs"
    }

    fn description(&self) -> &str {
        "Uniform Resource Identifiers (RFC 3986)"
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
        if code.is_empty() {
            return Ok(LocateResult::not_found("an empty string is not a valid URI"));
        }
        Ok(LocateResult::found(UriContext {
            code: code.to_string(),
        }))
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<UriContext>(ctx, "uri")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let uri = downcast_ctx::<UriContext>(ctx, "uri")?;
        // The URI provider's own displays are empty; only supplements talk.
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &uri.code,
            None,
            &[],
            None,
            Some(""),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let uri = downcast_ctx::<UriContext>(ctx, "uri")?;
        Ok(supplements::merged_designations(
            Vec::new(),
            &self.supplements,
            &uri.code,
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let uri = downcast_ctx::<UriContext>(ctx, "uri")?;
        Ok(supplements::supplement_properties(
            &self.supplements,
            &uri.code,
        ))
    }
}
