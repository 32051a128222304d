//! OMOP vocabulary provider (`https://fhir-terminology.ohdsi.org`), backed
//! by the OMOP SQLite store. Concepts are keyed by integer `concept_id`;
//! the full vocabulary is too large to iterate.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{CodeFilter, FilterContext};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation,
    FilterOperator, LocateResult,
};
use crate::supplements;
use sqlx::{Row, SqlitePool};
use std::any::Any;
use std::sync::Arc;
use terminus_models::{CodeSystem, Coding};

pub const SYSTEM: &str = "https://fhir-terminology.ohdsi.org";

/// Fixed bidirectional mapping between vocabulary ids and the UI URIs that
/// name them.
const VOCABULARY_URIS: &[(&str, &str)] = &[
    ("SNOMED", "http://snomed.info/sct"),
    ("LOINC", "http://loinc.org"),
    ("RxNorm", "http://www.nlm.nih.gov/research/umls/rxnorm"),
    ("ICD10CM", "http://hl7.org/fhir/sid/icd-10-cm"),
    ("ICD9CM", "http://hl7.org/fhir/sid/icd-9-cm"),
    ("CPT4", "http://www.ama-assn.org/go/cpt"),
    ("NDC", "http://hl7.org/fhir/sid/ndc"),
    ("UCUM", "http://unitsofmeasure.org"),
];

pub fn vocabulary_for_uri(uri: &str) -> Option<&'static str> {
    VOCABULARY_URIS
        .iter()
        .find(|(_, u)| *u == uri)
        .map(|(v, _)| *v)
}

pub fn uri_for_vocabulary(vocabulary: &str) -> Option<&'static str> {
    VOCABULARY_URIS
        .iter()
        .find(|(v, _)| *v == vocabulary)
        .map(|(_, u)| *u)
}

pub struct OmopShared {
    pub version: Option<String>,
}

impl OmopShared {
    pub async fn load(pool: &SqlitePool) -> Result<Arc<Self>> {
        let version: Option<String> = sqlx::query_scalar(
            "SELECT vocabulary_version FROM Vocabularies WHERE vocabulary_id = 'None'",
        )
        .fetch_optional(pool)
        .await?;
        Ok(Arc::new(Self { version }))
    }
}

#[derive(Debug, Clone)]
pub struct OmopContext {
    concept_id: i64,
    name: String,
    domain: String,
    vocabulary: String,
    class: String,
    standard: Option<String>,
    concept_code: String,
}

impl ConceptContext for OmopContext {
    fn code(&self) -> String {
        self.concept_id.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A translation of an OMOP concept into another vocabulary.
#[derive(Debug, Clone)]
pub struct OmopTranslation {
    pub system: String,
    pub code: String,
    pub display: String,
}

pub struct OmopProvider {
    shared: Arc<OmopShared>,
    pool: SqlitePool,
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl OmopProvider {
    pub fn new(
        shared: Arc<OmopShared>,
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

    async fn find(&self, concept_id: i64) -> Result<Option<OmopContext>> {
        let row = sqlx::query(
            "SELECT concept_id, concept_name, domain_id, vocabulary_id, concept_class_id,
                    standard_concept, concept_code
             FROM Concepts WHERE concept_id = ?",
        )
        .bind(concept_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| OmopContext {
            concept_id: row.get("concept_id"),
            name: row.get("concept_name"),
            domain: row.get("domain_id"),
            vocabulary: row.get("vocabulary_id"),
            class: row.get("concept_class_id"),
            standard: row.get("standard_concept"),
            concept_code: row.get("concept_code"),
        }))
    }

    /// Translate an OMOP coding into `target` (a vocabulary id or its UI
    /// URI): the concepts of the target vocabulary sharing the source
    /// concept id.
    pub async fn get_translations(
        &self,
        coding: &Coding,
        target: &str,
    ) -> Result<Vec<OmopTranslation>> {
        let vocabulary = vocabulary_for_uri(target).unwrap_or(target);
        let Some(code) = coding.code.as_deref() else {
            return Ok(Vec::new());
        };
        let Ok(concept_id) = code.parse::<i64>() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            "SELECT concept_code, concept_name FROM Concepts
             WHERE vocabulary_id = ? AND concept_id = ?",
        )
        .bind(vocabulary)
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;
        let system = uri_for_vocabulary(vocabulary)
            .map(|u| u.to_string())
            .unwrap_or_else(|| vocabulary.to_string());
        Ok(rows
            .into_iter()
            .map(|row| OmopTranslation {
                system: system.clone(),
                code: row.get("concept_code"),
                display: row.get("concept_name"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for OmopProvider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn version(&self) -> Option<&str> {
        self.shared.version.as_deref()
    }

    fn name(&self) -> &str {
        "OMOP"
    }

    fn description(&self) -> &str {
        "OMOP standardized vocabularies"
    }

    fn total_count(&self) -> i64 {
        // Too large to enumerate; callers must filter.
        -1
    }

    fn op_context(&self) -> &OperationContext {
        self.op_context.as_ref()
    }

    fn supplements(&self) -> &[Arc<CodeSystem>] {
        &self.supplements
    }

    async fn locate(&self, code: &str) -> Result<LocateResult> {
        let Ok(concept_id) = code.parse::<i64>() else {
            return Ok(LocateResult::not_found(format!(
                "'{code}' is not a valid OMOP concept id"
            )));
        };
        match self.find(concept_id).await? {
            Some(ctx) => Ok(LocateResult::found(ctx)),
            None => Ok(LocateResult::unknown_code(code, SYSTEM)),
        }
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<OmopContext>(ctx, "omop")?.code())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let omop = downcast_ctx::<OmopContext>(ctx, "omop")?;
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &omop.code(),
            Some(&omop.name),
            &[],
            None,
            Some(&omop.name),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let omop = downcast_ctx::<OmopContext>(ctx, "omop")?;
        let mut host = vec![Designation::display_use("en", omop.name.clone())];
        let synonyms: Vec<String> = sqlx::query_scalar(
            "SELECT concept_synonym_name FROM ConceptSynonyms WHERE concept_id = ?",
        )
        .bind(omop.concept_id)
        .fetch_all(&self.pool)
        .await?;
        for synonym in synonyms {
            host.push(Designation::new(None, None, synonym));
        }
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &omop.code(),
        ))
    }

    async fn properties(&self, ctx: &dyn ConceptContext) -> Result<Vec<ConceptProperty>> {
        let omop = downcast_ctx::<OmopContext>(ctx, "omop")?;
        let mut out = vec![
            ConceptProperty::string("domain", omop.domain.clone()),
            ConceptProperty::string("vocabulary", omop.vocabulary.clone()),
            ConceptProperty::string("concept-class", omop.class.clone()),
            ConceptProperty::string("concept-code", omop.concept_code.clone()),
        ];
        if let Some(standard) = &omop.standard {
            out.push(ConceptProperty::string("standard-concept", standard.clone()));
        }
        out.extend(supplements::supplement_properties(
            &self.supplements,
            &omop.code(),
        ));
        Ok(out)
    }

    async fn iterator(&self, _ctx: Option<&dyn ConceptContext>) -> Result<Option<ConceptIter>> {
        // Deliberately not iterable in full.
        Ok(None)
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, _value: &str) -> bool {
        prop == "domain" && op == FilterOperator::Equal
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        if prop != "domain" || op != FilterOperator::Equal {
            return Err(Error::FilterNotSupported {
                system: SYSTEM.to_string(),
                property: prop.to_string(),
                op: op.as_str().to_string(),
                value: value.to_string(),
            });
        }
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT concept_id FROM Concepts
             WHERE domain_id = ? AND standard_concept = 'S'
             ORDER BY concept_id",
        )
        .bind(value)
        .fetch_all(&self.pool)
        .await?;
        fctx.push(CodeFilter::new(
            ids.into_iter().map(|id| id.to_string()).collect(),
        ));
        Ok(())
    }
}
