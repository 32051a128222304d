//! Contract tests for the in-memory and grammar-based providers.

use serde_json::json;
use std::sync::Arc;
use terminus_models::{CodeSystem, CodeSystemDocument};
use terminus_tx::factory::{FactoryRegistry, FhirFactory, ProviderFactory, SnomedFactory};
use terminus_tx::providers::fhir::FhirProvider;
use terminus_tx::{
    CodeSystemProvider, Error, FilterOperator, OperationContext, SubsumptionOutcome,
};

fn op(accept_language: &str) -> Arc<OperationContext> {
    Arc::new(OperationContext::from_accept_language(accept_language).unwrap())
}

fn supplement(resource: serde_json::Value) -> Arc<CodeSystem> {
    Arc::new(CodeSystem::from_json(resource).unwrap())
}

// --- country ---

mod country {
    use super::*;

    async fn provider() -> Box<dyn CodeSystemProvider> {
        FactoryRegistry::with_defaults()
            .provider_for("urn:iso:std:iso:3166", None, op(""), Vec::new())
            .unwrap()
    }

    #[tokio::test]
    async fn locates_all_three_formats() {
        let provider = provider().await;

        let numeric = provider.locate("840").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(numeric.as_ref()).await.unwrap().as_deref(),
            Some("United States of America")
        );

        let alpha2 = provider.locate("US").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(alpha2.as_ref()).await.unwrap().as_deref(),
            Some("United States of America")
        );
        let alpha3 = provider.locate("USA").await.unwrap().context.unwrap();
        assert_eq!(alpha3.code(), "USA");

        // Different formats are different concepts.
        assert!(!provider
            .same_concept(alpha2.as_ref(), alpha3.as_ref())
            .unwrap());

        let missing = provider.locate("XX").await.unwrap();
        assert!(missing.context.is_none());
        assert!(missing.message.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn regex_filter_selects_numeric_range() {
        let provider = provider().await;
        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "code", FilterOperator::Regex, "8[0-9]{2}")
            .await
            .unwrap();
        provider.execute_filters(&mut fctx).await.unwrap();
        assert!(!provider.filters_not_closed(&fctx));

        let mut filters = fctx.take_filters();
        let filter = filters[0].as_mut();

        let mut codes = Vec::new();
        while provider.filter_more(filter).await.unwrap() {
            let ctx = provider.filter_concept(filter).await.unwrap().unwrap();
            codes.push(ctx.code());
        }
        assert!(codes.contains(&"840".to_string()));
        assert!(codes.contains(&"826".to_string()));
        assert!(codes.iter().all(|c| {
            c.len() == 3 && c.starts_with('8') && c.chars().all(|ch| ch.is_ascii_digit())
        }));

        let located = provider.filter_locate(filter, "840").await.unwrap();
        assert_eq!(located.unwrap().code(), "840");
        let rejected = provider.filter_locate(filter, "CAN").await.unwrap();
        assert!(rejected.unwrap_err().contains("not found"));
    }

    #[tokio::test]
    async fn unsupported_filters_error() {
        let provider = provider().await;
        let mut fctx = provider.get_prep_context(false);
        let err = provider
            .filter(&mut fctx, "class", FilterOperator::Equal, "region")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FilterNotSupported { .. }));
        assert!(!provider.does_filter("class", FilterOperator::Equal, "region"));
    }
}

// --- area ---

mod area {
    use super::*;

    #[tokio::test]
    async fn classes_and_filters() {
        let provider = FactoryRegistry::with_defaults()
            .provider_for(
                "http://unstats.un.org/unsd/methods/m49/m49.htm",
                None,
                op(""),
                Vec::new(),
            )
            .unwrap();

        let world = provider.locate("001").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(world.as_ref()).await.unwrap().as_deref(),
            Some("World")
        );
        let props = provider.properties(world.as_ref()).await.unwrap();
        assert!(props
            .iter()
            .any(|p| p.code == "class" && p.value == json!("region")));

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "class", FilterOperator::Equal, "region")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();
        let filter = filters[0].as_mut();
        assert_eq!(provider.filter_size(filter).unwrap(), 30);
        let ctx = provider.locate("150").await.unwrap().context.unwrap();
        assert!(provider.filter_check(filter, ctx.as_ref()).await.unwrap());
        let country = provider.locate("840").await.unwrap().context.unwrap();
        assert!(!provider.filter_check(filter, country.as_ref()).await.unwrap());
    }
}

// --- mime / uri ---

mod grammar_systems {
    use super::*;

    #[tokio::test]
    async fn mime_shape_validation() {
        let provider = FactoryRegistry::with_defaults()
            .provider_for("urn:ietf:bcp:13", None, op(""), Vec::new())
            .unwrap();
        assert_eq!(provider.total_count(), -1);
        assert!(provider
            .locate("application/fhir+json")
            .await
            .unwrap()
            .context
            .is_some());
        assert!(provider
            .locate("text/plain; charset=utf-8")
            .await
            .unwrap()
            .context
            .is_some());
        assert!(provider.locate("nonsense").await.unwrap().context.is_none());
        assert!(provider.locate("a//b").await.unwrap().context.is_none());
    }

    #[tokio::test]
    async fn uri_accepts_anything_nonempty() {
        let provider = FactoryRegistry::with_defaults()
            .provider_for("urn:ietf:rfc:3986", None, op(""), Vec::new())
            .unwrap();
        let ctx = provider
            .locate("http://example.org/anything")
            .await
            .unwrap()
            .context
            .unwrap();
        // The URI provider has no displays of its own.
        assert_eq!(
            provider.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("")
        );
        assert!(provider.locate("").await.unwrap().context.is_none());
    }
}

// --- bcp47 ---

mod bcp47 {
    use super::*;

    async fn provider() -> Box<dyn CodeSystemProvider> {
        FactoryRegistry::with_defaults()
            .provider_for("urn:ietf:bcp:47", None, op(""), Vec::new())
            .unwrap()
    }

    #[tokio::test]
    async fn synthesizes_designations() {
        let provider = provider().await;
        let ctx = provider.locate("nl-NL").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("Dutch (Netherlands)")
        );
        let designations = provider.designations(ctx.as_ref()).await.unwrap();
        let values: Vec<&str> = designations.iter().map(|d| d.value.as_str()).collect();
        assert!(values.contains(&"Dutch (Netherlands)"));
        assert!(values.contains(&"Dutch (Region=NL)"));
    }

    #[tokio::test]
    async fn exists_filters_are_not_closed() {
        let provider = provider().await;
        let mut fctx = provider.get_prep_context(false);
        provider
            .filter(&mut fctx, "region", FilterOperator::Exists, "true")
            .await
            .unwrap();
        assert!(provider.filters_not_closed(&fctx));

        let mut filters = fctx.take_filters();
        let filter = filters[0].as_mut();
        assert_eq!(provider.filter_size(filter).unwrap(), -1);
        assert!(!provider.filter_more(filter).await.unwrap());

        let with_region = provider.locate("de-CH").await.unwrap().context.unwrap();
        assert!(provider
            .filter_check(filter, with_region.as_ref())
            .await
            .unwrap());
        let without = provider.locate("de").await.unwrap().context.unwrap();
        assert!(!provider.filter_check(filter, without.as_ref()).await.unwrap());

        let located = provider.filter_locate(filter, "fr-CA").await.unwrap();
        assert!(located.is_ok());
        let excluded = provider.filter_locate(filter, "fr").await.unwrap();
        assert!(excluded.is_err());
    }
}

// --- fhir generic ---

mod fhir {
    use super::*;

    fn extensions_resource() -> serde_json::Value {
        json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/extensions",
            "version": "1.0.0",
            "name": "Extensions",
            "status": "active",
            "content": "complete",
            "language": "en",
            "property": [
                {"code": "kind", "type": "code"},
                {"code": "notSelectable", "type": "boolean"}
            ],
            "concept": [
                {
                    "code": "top",
                    "display": "Top",
                    "property": [{"code": "notSelectable", "valueBoolean": true}],
                    "concept": [
                        {
                            "code": "middle",
                            "display": "Middle",
                            "definition": "The middle one",
                            "property": [{"code": "kind", "valueCode": "useful"}],
                            "concept": [
                                {"code": "leaf-a", "display": "Leaf A"},
                                {"code": "leaf-b", "display": "Leaf B"}
                            ]
                        },
                        {"code": "other", "display": "Other", "property": [{"code": "kind", "valueCode": "other"}]}
                    ]
                }
            ]
        })
    }

    fn dutch_supplement() -> serde_json::Value {
        json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/extensions-nl",
            "status": "active",
            "content": "supplement",
            "language": "nl",
            "supplements": "http://example.org/fhir/CodeSystem/extensions",
            "concept": [
                {"code": "middle", "display": "Midden"},
                {"code": "leaf-a", "display": "Blad A"}
            ]
        })
    }

    fn provider(accept_language: &str, supplements: Vec<Arc<CodeSystem>>) -> FhirProvider {
        let resource = CodeSystem::from_json(extensions_resource()).unwrap();
        let document = Arc::new(CodeSystemDocument::new(resource).unwrap());
        FhirProvider::new(document, op(accept_language), supplements).unwrap()
    }

    #[tokio::test]
    async fn metadata_and_locate() {
        let provider = provider("", Vec::new());
        assert_eq!(provider.total_count(), 5);
        assert!(provider.has_parents());

        let located = provider.locate("middle").await.unwrap();
        let ctx = located.context.unwrap();
        assert_eq!(provider.code(ctx.as_ref()).unwrap(), "middle");
        assert_eq!(
            provider.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("Middle")
        );
        assert_eq!(
            provider.definition(ctx.as_ref()).await.unwrap().as_deref(),
            Some("The middle one")
        );
        assert!(provider.same_concept(ctx.as_ref(), ctx.as_ref()).unwrap());

        let top = provider.locate("top").await.unwrap().context.unwrap();
        assert!(provider.is_abstract(top.as_ref()).unwrap());
        assert!(!provider.is_abstract(ctx.as_ref()).unwrap());
    }

    #[tokio::test]
    async fn hierarchy_and_subsumption() {
        let provider = provider("", Vec::new());

        let hit = provider.locate_is_a("leaf-a", "top", false).await.unwrap();
        assert!(hit.context.is_some());
        let self_hit = provider.locate_is_a("top", "top", true).await.unwrap();
        assert!(self_hit.context.is_none());

        assert_eq!(
            provider.subsumes_test("top", "leaf-a").await.unwrap(),
            SubsumptionOutcome::Subsumes
        );
        assert_eq!(
            provider.subsumes_test("leaf-a", "top").await.unwrap(),
            SubsumptionOutcome::SubsumedBy
        );
        assert_eq!(
            provider.subsumes_test("top", "top").await.unwrap(),
            SubsumptionOutcome::Equivalent
        );
        assert_eq!(
            provider.subsumes_test("leaf-a", "other").await.unwrap(),
            SubsumptionOutcome::NotSubsumed
        );
    }

    #[tokio::test]
    async fn iteration_in_preorder() {
        let provider = provider("", Vec::new());
        let mut iter = provider.iterator(None).await.unwrap().unwrap();
        let mut codes = Vec::new();
        while let Some(ctx) = provider.next_context(&mut iter).await.unwrap() {
            codes.push(ctx.code());
        }
        assert_eq!(codes, vec!["top", "middle", "leaf-a", "leaf-b", "other"]);

        let middle = provider.locate("middle").await.unwrap().context.unwrap();
        let mut children = provider
            .iterator(Some(middle.as_ref()))
            .await
            .unwrap()
            .unwrap();
        let mut codes = Vec::new();
        while let Some(ctx) = provider.next_context(&mut children).await.unwrap() {
            codes.push(ctx.code());
        }
        assert_eq!(codes, vec!["leaf-a", "leaf-b"]);
    }

    #[tokio::test]
    async fn hierarchy_filters() {
        let provider = provider("", Vec::new());

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "concept", FilterOperator::IsA, "middle")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "concept", FilterOperator::DescendentOf, "middle")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "concept", FilterOperator::IsNotA, "middle")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();

        assert_eq!(provider.filter_size(filters[0].as_ref()).unwrap(), 3);
        assert_eq!(provider.filter_size(filters[1].as_ref()).unwrap(), 2);
        assert_eq!(provider.filter_size(filters[2].as_ref()).unwrap(), 2);

        let leaf = provider.locate("leaf-a").await.unwrap().context.unwrap();
        assert!(provider
            .filter_check(filters[0].as_mut(), leaf.as_ref())
            .await
            .unwrap());
        assert!(!provider
            .filter_check(filters[2].as_mut(), leaf.as_ref())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn property_and_child_filters() {
        let provider = provider("", Vec::new());

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "kind", FilterOperator::Equal, "useful")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "child", FilterOperator::Exists, "false")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();

        assert_eq!(provider.filter_size(filters[0].as_ref()).unwrap(), 1);
        let middle = provider.locate("middle").await.unwrap().context.unwrap();
        assert!(provider
            .filter_check(filters[0].as_mut(), middle.as_ref())
            .await
            .unwrap());

        // Leaves: leaf-a, leaf-b, other.
        assert_eq!(provider.filter_size(filters[1].as_ref()).unwrap(), 3);

        // An undeclared property is rejected by filter(), not just by
        // does_filter().
        let mut fctx = provider.get_prep_context(false);
        let err = provider
            .filter(&mut fctx, "nosuch", FilterOperator::Equal, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FilterNotSupported { .. }));
        assert!(!provider.does_filter("nosuch", FilterOperator::Equal, "x"));
    }

    #[tokio::test]
    async fn regex_filter_is_anchored() {
        let provider = provider("", Vec::new());
        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "code", FilterOperator::Regex, "leaf-[ab]")
            .await
            .unwrap();
        let filters = fctx.take_filters();
        assert_eq!(provider.filter_size(filters[0].as_ref()).unwrap(), 2);

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "code", FilterOperator::Regex, "leaf")
            .await
            .unwrap();
        let filters = fctx.take_filters();
        // Anchored: "leaf" alone matches nothing.
        assert_eq!(provider.filter_size(filters[0].as_ref()).unwrap(), 0);
    }

    #[tokio::test]
    async fn search_filter_rates_matches() {
        let provider = provider("", Vec::new());
        let mut fctx = provider.get_prep_context(true);
        provider.search_filter(&mut fctx, "leaf", true).await.unwrap();
        let mut filters = fctx.take_filters();
        let filter = filters[0].as_mut();

        let mut codes = Vec::new();
        while provider.filter_more(filter).await.unwrap() {
            codes.push(provider.filter_concept(filter).await.unwrap().unwrap().code());
        }
        // Display-prefix matches outrank substring matches.
        assert_eq!(codes.len(), 2);
        assert!(codes.contains(&"leaf-a".to_string()));
        assert!(codes.contains(&"leaf-b".to_string()));
    }

    #[tokio::test]
    async fn supplement_displays_win_for_matching_language() {
        let supplements = vec![supplement(dutch_supplement())];
        let provider = provider("nl", supplements.clone());

        assert!(provider.has_any_displays(&terminus_langs::Languages::from_accept_language("nl").unwrap()));

        let ctx = provider.locate("middle").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("Midden")
        );

        // Designation view is host first, then supplements.
        let designations = provider.designations(ctx.as_ref()).await.unwrap();
        assert_eq!(designations.first().unwrap().value, "Middle");
        assert!(designations.iter().any(|d| d.value == "Midden"));

        // An English request still gets the host display.
        let english = provider_with_supplements("en", supplements);
        let ctx = english.locate("middle").await.unwrap().context.unwrap();
        assert_eq!(
            english.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("Middle")
        );
    }

    fn provider_with_supplements(
        accept_language: &str,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> FhirProvider {
        provider(accept_language, supplements)
    }

    #[tokio::test]
    async fn display_matching_is_asymmetric() {
        // A German resource serves a request for plain German...
        let german = CodeSystem::from_json(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/german",
            "status": "active",
            "content": "complete",
            "language": "de",
            "concept": [{"code": "k", "display": "Konzept"}]
        }))
        .unwrap();
        let document = Arc::new(CodeSystemDocument::new(german).unwrap());
        let provider = FhirProvider::new(document.clone(), op("de"), Vec::new()).unwrap();
        let de = terminus_langs::Languages::from_accept_language("de").unwrap();
        assert!(provider.has_any_displays(&de));

        // ...but not a request narrowed to de-DE.
        let de_de = terminus_langs::Languages::from_accept_language("de-DE").unwrap();
        let narrow = FhirProvider::new(document, op("de-DE"), Vec::new()).unwrap();
        assert!(!narrow.has_any_displays(&de_de));
    }

    #[tokio::test]
    async fn rejects_foreign_supplements() {
        let foreign = supplement(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/other-supp",
            "status": "active",
            "content": "supplement",
            "supplements": "http://example.org/fhir/CodeSystem/some-other-system"
        }));
        let resource = CodeSystem::from_json(extensions_resource()).unwrap();
        let document = Arc::new(CodeSystemDocument::new(resource).unwrap());
        let err = FhirProvider::new(document, op(""), vec![foreign]).unwrap_err();
        assert!(matches!(err, Error::InvalidSupplement(_)));
    }

    #[tokio::test]
    async fn wrong_context_is_a_programmer_error() {
        let provider = provider("", Vec::new());
        let registry = FactoryRegistry::with_defaults();
        let country = registry
            .provider_for("urn:iso:std:iso:3166", None, op(""), Vec::new())
            .unwrap();
        let foreign = country.locate("US").await.unwrap().context.unwrap();
        assert!(matches!(
            provider.display(foreign.as_ref()).await.unwrap_err(),
            Error::WrongContext(_)
        ));
    }
}

// --- snomed provider over a miniature cache ---

mod snomed {
    use super::*;
    use terminus_snomed::cache::DescriptionKind;
    use terminus_snomed::{CacheBuilder, CacheFile, IS_A_ID, ROOT_CONCEPT_ID};

    fn mini_cache() -> CacheFile {
        let mut b = CacheBuilder::new(
            "http://snomed.info/sct/900000000000207008/version/20240101",
            "20240101",
        );
        b.concept(ROOT_CONCEPT_ID, &[])
            .concept(IS_A_ID, &[ROOT_CONCEPT_ID])
            .concept(terminus_snomed::CONCEPT_MODEL_ATTRIBUTE_ID, &[ROOT_CONCEPT_ID])
            .concept(363698007, &[terminus_snomed::CONCEPT_MODEL_ATTRIBUTE_ID])
            .concept(64572001, &[ROOT_CONCEPT_ID])
            .concept(128045006, &[64572001])
            .concept(123037004, &[ROOT_CONCEPT_ID])
            .concept(56459004, &[123037004]);
        b.description(1, 128045006, "Cellulitis (disorder)", "en", DescriptionKind::FullySpecifiedName, false)
            .description(2, 128045006, "Cellulitis", "en", DescriptionKind::Synonym, true)
            .description(3, 56459004, "Foot structure", "en", DescriptionKind::Synonym, true);
        CacheFile::from_bytes(b.build().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn locates_ids_and_expressions() {
        let factory = SnomedFactory::new(mini_cache());
        let provider = factory.build(op(""), Vec::new()).unwrap();

        let simple = provider.locate("128045006").await.unwrap().context.unwrap();
        assert_eq!(simple.code(), "128045006");
        assert_eq!(
            provider.display(simple.as_ref()).await.unwrap().as_deref(),
            Some("Cellulitis")
        );

        let expression = provider
            .locate("128045006|Cellulitis|:{363698007|finding site|=56459004|foot structure|}")
            .await
            .unwrap()
            .context
            .unwrap();
        assert_eq!(expression.code(), "128045006:{363698007=56459004}");

        let bogus = provider.locate("99999999").await.unwrap();
        assert!(bogus.context.is_none());

        let invalid = provider.locate("128045006:{64572001=1}").await.unwrap();
        assert!(invalid.context.is_none());
    }

    #[tokio::test]
    async fn subsumption_and_filters() {
        let factory = SnomedFactory::new(mini_cache());
        let provider = factory.build(op(""), Vec::new()).unwrap();

        assert_eq!(
            provider.subsumes_test("64572001", "128045006").await.unwrap(),
            SubsumptionOutcome::Subsumes
        );
        assert_eq!(
            provider.subsumes_test("128045006", "64572001").await.unwrap(),
            SubsumptionOutcome::SubsumedBy
        );

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "concept", FilterOperator::IsA, "64572001")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();
        let filter = filters[0].as_mut();
        assert_eq!(provider.filter_size(filter).unwrap(), 2);
        let cellulitis = provider.locate("128045006").await.unwrap().context.unwrap();
        assert!(provider.filter_check(filter, cellulitis.as_ref()).await.unwrap());
    }
}

// --- factory registry ---

mod registry {
    use super::*;

    #[tokio::test]
    async fn builds_and_counts() {
        let registry = FactoryRegistry::with_defaults();
        assert!(registry.factory("urn:iso:std:iso:3166", None).is_some());
        assert!(registry.factory("http://nosuch.example.org", None).is_none());

        let factory = registry.factory("urn:ietf:bcp:47", None).unwrap();
        assert_eq!(factory.use_count(), 0);
        let _p1 = factory.build(op(""), Vec::new()).unwrap();
        let _p2 = factory.build(op("de"), Vec::new()).unwrap();
        assert_eq!(factory.use_count(), 2);
    }

    #[tokio::test]
    async fn registers_fhir_factories_by_url() {
        let mut registry = FactoryRegistry::with_defaults();
        let resource = CodeSystem::from_json(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/local",
            "version": "2.1.0",
            "status": "active",
            "content": "complete",
            "concept": [{"code": "x", "display": "X"}]
        }))
        .unwrap();
        registry.register(Arc::new(FhirFactory::from_resource(resource).unwrap()));

        let provider = registry
            .provider_for(
                "http://example.org/fhir/CodeSystem/local",
                Some("2.1"),
                op(""),
                Vec::new(),
            )
            .unwrap();
        assert_eq!(provider.version(), Some("2.1.0"));
        assert!(provider.locate("x").await.unwrap().context.is_some());
    }
}
