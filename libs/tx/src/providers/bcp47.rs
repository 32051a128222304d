//! BCP-47 language tag provider (`urn:ietf:bcp:47`). Grammar-based via the
//! language registry; designations are synthesized English descriptions.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::filter::{FilterContext, PreparedFilter};
use crate::provider::{
    downcast_ctx, CodeSystemProvider, ConceptContext, Designation, FilterOperator, LocateResult,
};
use crate::providers::country_data;
use crate::supplements;
use std::any::Any;
use std::sync::Arc;
use terminus_langs::LanguageTag;
use terminus_models::CodeSystem;

pub const SYSTEM: &str = "urn:ietf:bcp:47";

/// English names for common primary language subtags.
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("bg", "Bulgarian"),
    ("bn", "Bengali"),
    ("cs", "Czech"),
    ("cy", "Welsh"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("ga", "Irish"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hr", "Croatian"),
    ("hu", "Hungarian"),
    ("is", "Icelandic"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("mt", "Maltese"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sr", "Serbian"),
    ("sv", "Swedish"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("zh", "Chinese"),
];

fn language_name(primary: &str) -> Option<&'static str> {
    LANGUAGE_NAMES
        .iter()
        .find(|(code, _)| *code == primary)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone)]
pub struct Bcp47Context {
    code: String,
    tag: LanguageTag,
}

impl ConceptContext for Bcp47Context {
    fn code(&self) -> String {
        self.code.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Which subfield a filter probes for existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagField {
    Language,
    ExtLang,
    Script,
    Region,
    Variant,
    Extension,
    PrivateUse,
}

impl TagField {
    fn parse(prop: &str) -> Option<Self> {
        Some(match prop {
            "language" => TagField::Language,
            "ext-lang" => TagField::ExtLang,
            "script" => TagField::Script,
            "region" => TagField::Region,
            "variant" => TagField::Variant,
            "extension" => TagField::Extension,
            "private-use" => TagField::PrivateUse,
            _ => return None,
        })
    }

    fn present(&self, tag: &LanguageTag) -> bool {
        match self {
            TagField::Language => !tag.primary.is_empty(),
            TagField::ExtLang => !tag.ext_lang.is_empty(),
            TagField::Script => tag.script.is_some(),
            TagField::Region => tag.region.is_some(),
            TagField::Variant => tag.variant.is_some(),
            TagField::Extension => tag.extension.is_some(),
            TagField::PrivateUse => !tag.private_use.is_empty(),
        }
    }
}

/// Grammar-based filter set: cannot be enumerated, only checked.
struct Bcp47Filter {
    field: TagField,
    must_exist: bool,
}

impl PreparedFilter for Bcp47Filter {
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

pub struct Bcp47Provider {
    op_context: Arc<OperationContext>,
    supplements: Vec<Arc<CodeSystem>>,
}

impl Bcp47Provider {
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

    /// Synthesized English display, e.g. `nl-NL` → "Dutch (Netherlands)".
    fn display_for(tag: &LanguageTag) -> String {
        let base = language_name(&tag.primary)
            .map(|n| n.to_string())
            .unwrap_or_else(|| tag.primary.clone());
        match tag
            .region
            .as_deref()
            .and_then(country_data::name_for_alpha2)
        {
            Some(region_name) => format!("{base} ({region_name})"),
            None => base,
        }
    }
}

#[async_trait::async_trait]
impl CodeSystemProvider for Bcp47Provider {
    fn system(&self) -> &str {
        SYSTEM
    }

    fn name(&self) -> &str {
        "IETF language"
    }

    fn description(&self) -> &str {
        "BCP 47 language tags"
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
        if code.trim().is_empty() {
            return Ok(LocateResult::not_found(
                "an empty string is not a valid language tag",
            ));
        }
        let tag = LanguageTag::parse(code);
        if tag.primary.is_empty() && tag.private_use.is_empty() {
            return Ok(LocateResult::not_found(format!(
                "'{code}' is not a valid language tag"
            )));
        }
        Ok(LocateResult::found(Bcp47Context {
            code: code.to_string(),
            tag,
        }))
    }

    fn code(&self, ctx: &dyn ConceptContext) -> Result<String> {
        Ok(downcast_ctx::<Bcp47Context>(ctx, "bcp47")?.code.clone())
    }

    async fn display(&self, ctx: &dyn ConceptContext) -> Result<Option<String>> {
        let lang = downcast_ctx::<Bcp47Context>(ctx, "bcp47")?;
        let synthesized = Self::display_for(&lang.tag);
        Ok(supplements::resolve_display(
            &self.op_context.langs,
            &self.supplements,
            &lang.code,
            Some(&synthesized),
            &[],
            None,
            Some(&synthesized),
        ))
    }

    async fn designations(&self, ctx: &dyn ConceptContext) -> Result<Vec<Designation>> {
        let lang = downcast_ctx::<Bcp47Context>(ctx, "bcp47")?;
        let mut host = vec![Designation::display_use("en", Self::display_for(&lang.tag))];
        if let Some(region) = lang.tag.region.as_deref() {
            let base = language_name(&lang.tag.primary)
                .map(|n| n.to_string())
                .unwrap_or_else(|| lang.tag.primary.clone());
            if let Some(region_name) = country_data::name_for_alpha2(region) {
                host.push(Designation::new(
                    Some("en".to_string()),
                    None,
                    format!("{base} ({region_name})"),
                ));
            }
            host.push(Designation::new(
                Some("en".to_string()),
                None,
                format!("{base} (Region={region})"),
            ));
        }
        Ok(supplements::merged_designations(
            host,
            &self.supplements,
            &lang.code,
        ))
    }

    fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        TagField::parse(prop).is_some()
            && op == FilterOperator::Exists
            && matches!(value, "true" | "false")
    }

    async fn filter(
        &self,
        fctx: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        let field = TagField::parse(prop);
        let must_exist = match value {
            "true" => true,
            "false" => false,
            _ => {
                return Err(Error::FilterNotSupported {
                    system: SYSTEM.to_string(),
                    property: prop.to_string(),
                    op: op.as_str().to_string(),
                    value: value.to_string(),
                })
            }
        };
        match (field, op) {
            (Some(field), FilterOperator::Exists) => {
                fctx.push(Bcp47Filter { field, must_exist });
                Ok(())
            }
            _ => Err(Error::FilterNotSupported {
                system: SYSTEM.to_string(),
                property: prop.to_string(),
                op: op.as_str().to_string(),
                value: value.to_string(),
            }),
        }
    }

    fn filter_size(&self, _filter: &dyn PreparedFilter) -> Result<i64> {
        Ok(-1)
    }

    async fn filter_more(&self, _filter: &mut dyn PreparedFilter) -> Result<bool> {
        // Grammar-based sets cannot be enumerated.
        Ok(false)
    }

    async fn filter_locate(
        &self,
        filter: &mut dyn PreparedFilter,
        code: &str,
    ) -> Result<std::result::Result<Box<dyn ConceptContext>, String>> {
        let f = filter
            .as_any()
            .downcast_ref::<Bcp47Filter>()
            .ok_or(Error::WrongFilter("bcp47"))?;
        let tag = LanguageTag::parse(code);
        if f.field.present(&tag) == f.must_exist {
            match self.locate(code).await?.context {
                Some(ctx) => Ok(Ok(ctx)),
                None => Ok(Err(format!("'{code}' is not a valid language tag"))),
            }
        } else {
            Ok(Err(format!("Code '{code}' is excluded by the filter")))
        }
    }

    async fn filter_check(
        &self,
        filter: &mut dyn PreparedFilter,
        ctx: &dyn ConceptContext,
    ) -> Result<bool> {
        let f = filter
            .as_any()
            .downcast_ref::<Bcp47Filter>()
            .ok_or(Error::WrongFilter("bcp47"))?;
        let lang = downcast_ctx::<Bcp47Context>(ctx, "bcp47")?;
        Ok(f.field.present(&lang.tag) == f.must_exist)
    }
}
