//! HGVS provider (`http://varnomen.hgvs.org`): grammar-based, validated by
//! a remote terminology validator over HTTP (5 second hard timeout).

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::provider::{downcast_ctx, CodeSystemProvider, ConceptContext, LocateResult};
use crate::supplements;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "http://varnomen.hgvs.org";

pub const VALIDATION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct HgvsContext {
    code: String,
}

impl ConceptContext for HgvsContext {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The validator's verdict, parsed from a FHIR Parameters response.
#[derive(Debug, Clone, PartialEq)]
pub struct HgvsVerdict {
    pub result: bool,
    pub message: Option<String>,
}

/// Parse `{parameter: [{name: "result", valueBoolean}, {name: "message",
/// valueString}]}`.
pub fn parse_parameters(body: &Value) -> std::result::Result<HgvsVerdict, String> {
    if body.get("resourceType").and_then(Value::as_str) != Some("Parameters") {
        return Err("response is not a Parameters resource".to_string());
    }
    let parameters = body
        .get("parameter")
        .and_then(Value::as_array)
        .ok_or_else(|| "Parameters response has no parameter list".to_string())?;
    let mut result = None;
    let mut message = None;
    for parameter in parameters {
        match parameter.get("name").and_then(Value::as_str) {
            Some("result") => result = parameter.get("valueBoolean").and_then(Value::as_bool),
            Some("message") => {
                message = parameter
                    .get("valueString")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
            }
            _ => {}
        }
    }
    match result {
        Some(result) => Ok(HgvsVerdict { result, message }),
        None => Err("Parameters response has no result parameter".to_string()),
    }
}

/// Build the validation request URL.
pub fn validation_url(endpoint: &str, code: &str) -> String {
    format!("{endpoint}?code={}", urlencoding::encode(code))
}

pub struct HgvsProvider {
    endpoint: String,
    client: reqwest::Client,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl HgvsProvider {
    pub fn new(
        endpoint: String,
        client: reqwest::Client,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Self> {
        supplements::check_supplements(SYSTEM, &supplements)?;
        Ok(Self {
            endpoint,
            client,
            op_context,
            supplements,
        })
    }

    /// A client with the provider's hard timeout baked in.
    pub fn default_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(VALIDATION_TIMEOUT_SECS))
            .build()
            .expect("default reqwest client")
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for HgvsProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn name(&self) -> &str {
        "HGVS"
    }

    fn description(&self) -> &str {
        "Human Genome Variation Society nomenclature"
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
        let url = validation_url(&self.endpoint, code);
        tracing::debug!(%url, "validating HGVS code remotely");
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(VALIDATION_TIMEOUT_SECS)
            } else {
                Error::Http(e)
            }
        })?;
        let body: Value = response.json().await?;
        match parse_parameters(&body) {
            Ok(verdict) if verdict.result => Ok(LocateResult::found(HgvsContext {
                code: code.to_string(),
            })),
            Ok(verdict) => Ok(LocateResult::not_found(verdict.message.unwrap_or_else(
                || format!("'{code}' is not a valid HGVS expression"),
            ))),
            Err(message) => Err(Error::Remote(message)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<HgvsContext>(ctx, "hgvs")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let hgvs = downcast_ctx::<HgvsContext>(ctx, "hgvs")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &hgvs.code,
            Some(&hgvs.code),
            &[],
            None,
            Some(&hgvs.code),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_positive_verdict() {
        let verdict = parse_parameters(&json!({
            "resourceType": "Parameters",
            "parameter": [{"name": "result", "valueBoolean": true}]
        }))
        .unwrap();
        assert!(verdict.result);
        assert!(verdict.message.is_none());
    }

    #[test]
    fn parses_negative_verdict_with_message() {
        let verdict = parse_parameters(&json!({
            "resourceType": "Parameters",
            "parameter": [
                {"name": "result", "valueBoolean": false},
                {"name": "message", "valueString": "invalid reference sequence"}
            ]
        }))
        .unwrap();
        assert!(!verdict.result);
        assert_eq!(verdict.message.as_deref(), Some("invalid reference sequence"));
    }

    #[test]
    fn rejects_malformed_responses() {
        assert!(parse_parameters(&json!({"resourceType": "OperationOutcome"})).is_err());
        assert!(parse_parameters(&json!({
            "resourceType": "Parameters",
            "parameter": []
        }))
        .is_err());
    }

    #[test]
    fn encodes_query() {
        let url = validation_url("http://tx.example.org/validate", "NM_000059.3:c.1521_1523del");
        assert_eq!(
            url,
            "http://tx.example.org/validate?code=NM_000059.3%3Ac.1521_1523del"
        );
    }
}
