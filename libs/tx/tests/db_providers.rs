//! Contract tests for the SQLite-backed providers, over in-memory
//! fixtures that follow each store's schema.

use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use terminus_models::Coding;
use terminus_tx::factory::{
    CptFactory, LoincFactory, NdcFactory, OmopFactory, ProviderFactory, UniiFactory,
};
use terminus_tx::{CodeSystemProvider, FilterOperator, OperationContext};

fn op() -> Arc<OperationContext> {
    Arc::new(OperationContext::english())
}

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn execute_all(pool: &SqlitePool, statements: &[&str]) {
    for statement in statements {
        sqlx::query(statement).execute(pool).await.unwrap();
    }
}

mod loinc {
    use super::*;

    async fn fixture() -> SqlitePool {
        let pool = memory_pool().await;
        execute_all(
            &pool,
            &[
                "CREATE TABLE Codes (CodeKey INTEGER PRIMARY KEY, Code TEXT, Type INTEGER, StatusKey INTEGER, Description TEXT)",
                "CREATE TABLE Descriptions (CodeKey INTEGER, DescriptionTypeKey INTEGER, Value TEXT)",
                "CREATE TABLE DescriptionTypes (DescriptionTypeKey INTEGER PRIMARY KEY, Code TEXT, LanguageKey INTEGER)",
                "CREATE TABLE Languages (LanguageKey INTEGER PRIMARY KEY, Code TEXT)",
                "CREATE TABLE Relationships (RelationshipTypeKey INTEGER, SourceKey INTEGER, TargetKey INTEGER)",
                "CREATE TABLE RelationshipTypes (RelationshipTypeKey INTEGER PRIMARY KEY, Code TEXT)",
                "CREATE TABLE Properties (CodeKey INTEGER, PropertyTypeKey INTEGER, PropertyValueKey INTEGER)",
                "CREATE TABLE PropertyTypes (PropertyTypeKey INTEGER PRIMARY KEY, Code TEXT)",
                "CREATE TABLE PropertyValues (PropertyValueKey INTEGER PRIMARY KEY, Value TEXT)",
                "CREATE TABLE StatusCodes (StatusKey INTEGER PRIMARY KEY, Description TEXT)",
                "CREATE TABLE Closure (AncestorKey INTEGER, DescendantKey INTEGER)",
                "CREATE TABLE Config (ConfigKey INTEGER PRIMARY KEY, Value TEXT)",
                "INSERT INTO Config VALUES (1, '2.78')",
                "INSERT INTO Languages VALUES (1, 'en-US')",
                "INSERT INTO DescriptionTypes VALUES (1, 'LONG_COMMON_NAME', 1), (2, 'SHORTNAME', 1)",
                "INSERT INTO StatusCodes VALUES (1, 'ACTIVE'), (2, 'DEPRECATED')",
                "INSERT INTO Codes VALUES
                    (1, '1000-9', 1, 1, 'Example observation'),
                    (2, 'LP7751-3', 2, 1, 'Bld'),
                    (3, 'LL123-4', 3, 1, 'Example answer list'),
                    (4, 'LA1-1', 4, 1, 'Yes'),
                    (5, 'LA2-2', 4, 1, 'No'),
                    (6, '2000-8', 1, 2, 'Licensed observation')",
                "INSERT INTO RelationshipTypes VALUES (1, 'child'), (2, 'COMPONENT'), (3, 'Answer'), (4, 'AnswerList')",
                "INSERT INTO Relationships VALUES
                    (1, 2, 1),
                    (2, 1, 2),
                    (3, 3, 4), (3, 3, 5),
                    (4, 1, 3)",
                "INSERT INTO PropertyTypes VALUES (1, 'CLASSTYPE'), (2, 'EXTERNAL_COPYRIGHT_NOTICE')",
                "INSERT INTO PropertyValues VALUES (1, '1'), (2, 'Copyright Example Corp')",
                "INSERT INTO Properties VALUES (1, 1, 1), (6, 2, 2)",
                "INSERT INTO Closure VALUES (2, 1)",
                "INSERT INTO Descriptions VALUES
                    (1, 1, 'Example observation long common name'),
                    (1, 2, 'ExObs')",
            ],
        )
        .await;
        pool
    }

    async fn provider() -> Box<dyn CodeSystemProvider> {
        let factory = LoincFactory::load(fixture().await).await.unwrap();
        factory.build(op(), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn metadata_and_locate() {
        let provider = provider().await;
        assert_eq!(provider.version(), Some("2.78"));
        assert_eq!(provider.total_count(), 6);
        assert!(provider.has_parents());

        let located = provider.locate("1000-9").await.unwrap();
        let ctx = located.context.unwrap();
        assert_eq!(ctx.code(), "1000-9");
        // LONG_COMMON_NAME is the canonical display.
        assert_eq!(
            provider.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("Example observation long common name")
        );

        assert!(provider.locate("9999-9").await.unwrap().context.is_none());
    }

    #[tokio::test]
    async fn hierarchy_via_closure() {
        let provider = provider().await;
        let hit = provider
            .locate_is_a("1000-9", "LP7751-3", false)
            .await
            .unwrap();
        assert!(hit.context.is_some());
        let miss = provider
            .locate_is_a("LP7751-3", "1000-9", false)
            .await
            .unwrap();
        assert!(miss.context.is_none());
    }

    #[tokio::test]
    async fn does_filter_requires_resolvable_values() {
        let provider = provider().await;

        // Relationship filters resolve only when the target value does.
        assert!(provider.does_filter("COMPONENT", FilterOperator::Equal, "LP7751-3"));
        assert!(!provider.does_filter("COMPONENT", FilterOperator::Equal, "LP9999-9"));
        assert!(!provider.does_filter("NOSUCH", FilterOperator::Equal, "LP7751-3"));

        // Property filters need a known property type, and CLASSTYPE only
        // takes its defined names or numbers.
        assert!(provider.does_filter("CLASSTYPE", FilterOperator::Equal, "Laboratory class"));
        assert!(provider.does_filter("CLASSTYPE", FilterOperator::Equal, "1"));
        assert!(!provider.does_filter("CLASSTYPE", FilterOperator::Equal, "Bogus class"));

        // Regex probes still need a real relationship or property type.
        assert!(provider.does_filter("COMPONENT", FilterOperator::Regex, "LP.*"));
        assert!(provider.does_filter("CLASSTYPE", FilterOperator::Regex, "[12]"));
        assert!(!provider.does_filter("NOSUCH", FilterOperator::Regex, "LP.*"));

        // Hierarchy probes resolve their root code too.
        assert!(provider.does_filter("concept", FilterOperator::IsA, "LP7751-3"));
        assert!(!provider.does_filter("concept", FilterOperator::IsA, "LP9999-9"));
    }

    #[tokio::test]
    async fn relationship_and_property_filters() {
        let provider = provider().await;

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "COMPONENT", FilterOperator::Equal, "LP7751-3")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "CLASSTYPE", FilterOperator::Equal, "Laboratory class")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "STATUS", FilterOperator::Equal, "DEPRECATED")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();

        let code = provider.locate("1000-9").await.unwrap().context.unwrap();
        assert!(provider
            .filter_check(filters[0].as_mut(), code.as_ref())
            .await
            .unwrap());
        assert!(provider
            .filter_check(filters[1].as_mut(), code.as_ref())
            .await
            .unwrap());

        assert_eq!(provider.filter_size(filters[2].as_ref()).unwrap(), 1);
        let deprecated = provider.locate("2000-8").await.unwrap().context.unwrap();
        assert!(provider
            .filter_check(filters[2].as_mut(), deprecated.as_ref())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn list_and_answer_filters() {
        let provider = provider().await;

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "LIST", FilterOperator::Equal, "LL123-4")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "answers-for", FilterOperator::Equal, "1000-9")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();

        for filter in filters.iter_mut() {
            assert_eq!(provider.filter_size(filter.as_ref()).unwrap(), 2);
            let yes = provider.locate("LA1-1").await.unwrap().context.unwrap();
            assert!(provider
                .filter_check(filter.as_mut(), yes.as_ref())
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn copyright_filters() {
        let provider = provider().await;

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "copyright", FilterOperator::Equal, "3rdParty")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "copyright", FilterOperator::Equal, "LOINC")
            .await
            .unwrap();
        let filters = fctx.take_filters();
        assert_eq!(provider.filter_size(filters[0].as_ref()).unwrap(), 1);
        assert_eq!(provider.filter_size(filters[1].as_ref()).unwrap(), 5);
    }

    #[tokio::test]
    async fn is_a_filter_over_closure() {
        let provider = provider().await;
        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "concept", FilterOperator::IsA, "LP7751-3")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();
        let filter = filters[0].as_mut();
        assert_eq!(provider.filter_size(filter).unwrap(), 2);

        let mut codes = Vec::new();
        while provider.filter_more(filter).await.unwrap() {
            codes.push(provider.filter_concept(filter).await.unwrap().unwrap().code());
        }
        // Sorted by integer key.
        assert_eq!(codes, vec!["1000-9", "LP7751-3"]);
    }

    #[tokio::test]
    async fn iteration_by_key() {
        let provider = provider().await;
        let mut iter = provider.iterator(None).await.unwrap().unwrap();
        let mut codes = Vec::new();
        while let Some(ctx) = provider.next_context(&mut iter).await.unwrap() {
            codes.push(ctx.code());
        }
        assert_eq!(
            codes,
            vec!["1000-9", "LP7751-3", "LL123-4", "LA1-1", "LA2-2", "2000-8"]
        );
    }
}

mod ndc {
    use super::*;

    async fn fixture() -> SqlitePool {
        let pool = memory_pool().await;
        execute_all(
            &pool,
            &[
                "CREATE TABLE NDCProducts (ProductKey INTEGER PRIMARY KEY, Code TEXT, TradeName TEXT,
                    DoseFormKey INTEGER, RouteKey INTEGER, OrganizationKey INTEGER, Category TEXT, Active INTEGER)",
                "CREATE TABLE NDCPackages (PackageKey INTEGER PRIMARY KEY, ProductKey INTEGER, Code TEXT,
                    Code11 TEXT, Description TEXT, Active INTEGER)",
                "CREATE TABLE NDCVersion (Version TEXT)",
                "CREATE TABLE NDCOrganizations (OrganizationKey INTEGER PRIMARY KEY, Name TEXT)",
                "CREATE TABLE NDCDoseForms (DoseFormKey INTEGER PRIMARY KEY, Name TEXT)",
                "CREATE TABLE NDCRoutes (RouteKey INTEGER PRIMARY KEY, Name TEXT)",
                "INSERT INTO NDCVersion VALUES ('20240601')",
                "INSERT INTO NDCOrganizations VALUES (1, 'Example Pharma')",
                "INSERT INTO NDCDoseForms VALUES (1, 'TABLET')",
                "INSERT INTO NDCRoutes VALUES (1, 'ORAL')",
                "INSERT INTO NDCProducts VALUES (1, '00002-1433', 'Amoxil', 1, 1, 1, 'HUMAN PRESCRIPTION DRUG', 1)",
                "INSERT INTO NDCPackages VALUES (1, 1, '0002-1433-80', '00002143380', '30 TABLET in 1 BOTTLE', 1)",
            ],
        )
        .await;
        pool
    }

    async fn provider() -> Box<dyn CodeSystemProvider> {
        let factory = NdcFactory::load(fixture().await).await.unwrap();
        factory.build(op(), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn locates_packages_then_products() {
        let provider = provider().await;
        assert_eq!(provider.version(), Some("20240601"));
        assert_eq!(provider.total_count(), 2);

        let by_ten = provider.locate("0002-1433-80").await.unwrap().context.unwrap();
        assert_eq!(by_ten.code(), "0002-1433-80");
        let by_eleven = provider.locate("00002143380").await.unwrap().context.unwrap();
        assert_eq!(by_eleven.code(), "00002143380");

        let product = provider.locate("00002-1433").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(product.as_ref()).await.unwrap().as_deref(),
            Some("Amoxil")
        );

        assert!(provider.locate("9999-9999").await.unwrap().context.is_none());
    }

    #[tokio::test]
    async fn normalizes_hyphenated_segments() {
        let provider = provider().await;

        // A 5-4-2 rendering of the stored 4-4-2 package code lands on the
        // 11-digit form.
        let padded = provider
            .locate("00002-1433-80")
            .await
            .unwrap()
            .context
            .unwrap();
        assert_eq!(padded.code(), "00002-1433-80");

        // Two-segment product codes pad to the stored 5-4 form.
        let product = provider.locate("0002-1433").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(product.as_ref()).await.unwrap().as_deref(),
            Some("Amoxil")
        );
    }

    #[tokio::test]
    async fn extend_lookup_enriches() {
        let provider = provider().await;
        let package = provider.locate("0002-1433-80").await.unwrap().context.unwrap();
        let mut out = terminus_tx::LookupResult::default();
        provider
            .extend_lookup(package.as_ref(), &[], &mut out)
            .await
            .unwrap();
        let get = |code: &str| {
            out.properties
                .iter()
                .find(|p| p.code == code)
                .map(|p| p.value.clone())
        };
        assert_eq!(get("trade-name"), Some(json!("Amoxil")));
        assert_eq!(get("dose-form"), Some(json!("TABLET")));
        assert_eq!(get("route"), Some(json!("ORAL")));
        assert_eq!(get("company"), Some(json!("Example Pharma")));
        assert_eq!(get("active"), Some(json!(true)));
        assert_eq!(get("product"), Some(json!("00002-1433")));
    }

    #[tokio::test]
    async fn code_type_filters() {
        let provider = provider().await;
        for (value, expected) in [
            ("product", "00002-1433"),
            ("10-digit", "0002-1433-80"),
            ("11-digit", "00002143380"),
        ] {
            let mut fctx = provider.get_prep_context(true);
            provider
                .filter(&mut fctx, "code-type", FilterOperator::Equal, value)
                .await
                .unwrap();
            let mut filters = fctx.take_filters();
            let filter = filters[0].as_mut();
            assert_eq!(provider.filter_size(filter).unwrap(), 1);
            assert!(provider.filter_more(filter).await.unwrap());
            let ctx = provider.filter_concept(filter).await.unwrap().unwrap();
            assert_eq!(ctx.code(), expected);
        }
    }
}

mod omop {
    use super::*;
    use terminus_tx::providers::omop::OmopProvider;

    async fn fixture() -> SqlitePool {
        let pool = memory_pool().await;
        execute_all(
            &pool,
            &[
                "CREATE TABLE Concepts (concept_id INTEGER PRIMARY KEY, concept_name TEXT, domain_id TEXT,
                    vocabulary_id TEXT, concept_class_id TEXT, standard_concept TEXT, concept_code TEXT)",
                "CREATE TABLE Vocabularies (vocabulary_id TEXT, vocabulary_version TEXT)",
                "CREATE TABLE ConceptSynonyms (concept_id INTEGER, concept_synonym_name TEXT)",
                "INSERT INTO Vocabularies VALUES ('None', 'v5.0 22-JUN-22'), ('SNOMED', '2023-07-31')",
                "INSERT INTO Concepts VALUES
                    (201826, 'Type 2 diabetes mellitus', 'Condition', 'SNOMED', 'Clinical Finding', 'S', '44054006'),
                    (1112807, 'Aspirin', 'Drug', 'RxNorm', 'Ingredient', 'S', '1191')",
                "INSERT INTO ConceptSynonyms VALUES (201826, 'Diabetes mellitus type 2')",
            ],
        )
        .await;
        pool
    }

    #[tokio::test]
    async fn locate_and_properties() {
        let factory = OmopFactory::load(fixture().await).await.unwrap();
        let provider = factory.build(op(), Vec::new()).unwrap();
        assert_eq!(provider.total_count(), -1);
        assert!(provider.iterator(None).await.unwrap().is_none());

        let ctx = provider.locate("201826").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("Type 2 diabetes mellitus")
        );
        let properties = provider.properties(ctx.as_ref()).await.unwrap();
        assert!(properties
            .iter()
            .any(|p| p.code == "domain" && p.value == json!("Condition")));
        assert!(properties
            .iter()
            .any(|p| p.code == "concept-code" && p.value == json!("44054006")));

        let designations = provider.designations(ctx.as_ref()).await.unwrap();
        assert!(designations
            .iter()
            .any(|d| d.value == "Diabetes mellitus type 2"));

        assert!(provider.locate("notanumber").await.unwrap().context.is_none());
    }

    #[tokio::test]
    async fn domain_filter_returns_standard_concepts() {
        let factory = OmopFactory::load(fixture().await).await.unwrap();
        let provider = factory.build(op(), Vec::new()).unwrap();
        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "domain", FilterOperator::Equal, "Condition")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();
        let filter = filters[0].as_mut();
        assert_eq!(provider.filter_size(filter).unwrap(), 1);
        assert!(provider.filter_more(filter).await.unwrap());
        let ctx = provider.filter_concept(filter).await.unwrap().unwrap();
        assert_eq!(ctx.code(), "201826");
    }

    #[tokio::test]
    async fn translates_by_concept_id() {
        let pool = fixture().await;
        let shared = terminus_tx::providers::omop::OmopShared::load(&pool)
            .await
            .unwrap();
        let provider = OmopProvider::new(shared, pool, op(), Vec::new()).unwrap();
        let translations = provider
            .get_translations(
                &Coding {
                    system: Some("https://fhir-terminology.ohdsi.org".to_string()),
                    code: Some("201826".to_string()),
                    display: None,
                },
                "http://snomed.info/sct",
            )
            .await
            .unwrap();
        assert_eq!(translations.len(), 1);
        assert_eq!(translations[0].code, "44054006");
        assert_eq!(translations[0].system, "http://snomed.info/sct");
    }
}

mod cpt {
    use super::*;

    async fn fixture() -> SqlitePool {
        let pool = memory_pool().await;
        execute_all(
            &pool,
            &[
                "CREATE TABLE Information (Name TEXT, Value TEXT)",
                "CREATE TABLE Concepts (Code TEXT PRIMARY KEY, Modifier INTEGER, Kind TEXT, Display TEXT, Abstract INTEGER)",
                "CREATE TABLE Properties (Code TEXT, Name TEXT, Value TEXT)",
                "CREATE TABLE Designations (Code TEXT, Type TEXT, Value TEXT)",
                "INSERT INTO Information VALUES ('version', '2024')",
                "INSERT INTO Concepts VALUES
                    ('99213', 0, 'code', 'Office visit, established patient', 0),
                    ('00100', 0, 'code', 'Anesthesia for salivary gland procedure', 0),
                    ('20610', 0, 'code', 'Arthrocentesis, major joint', 0),
                    ('86701', 0, 'code', 'Antibody; HIV-1', 0),
                    ('0001F', 0, 'cat-2', 'Heart failure assessed', 0),
                    ('metadata-kinds', 0, 'metadata', 'Kinds of codes', 1),
                    ('25', 1, 'general', 'Significant separate E/M service', 0),
                    ('57', 1, 'general', 'Decision for surgery', 0),
                    ('59', 1, 'general', 'Distinct procedural service', 0),
                    ('52', 1, 'general', 'Reduced services', 0),
                    ('95', 1, 'general', 'Synchronous telemedicine service', 0),
                    ('93', 1, 'general', 'Synchronous audio-only service', 0),
                    ('63', 1, 'general', 'Procedure on infants less than 4kg', 0),
                    ('92', 1, 'general', 'Alternative laboratory platform testing', 0),
                    ('1P', 1, 'cat-2', 'Performance measure exclusion, medical reasons', 0),
                    ('P1', 1, 'physical-status', 'Normal healthy patient', 0),
                    ('XE', 1, 'hcpcs', 'Separate encounter', 0)",
                "INSERT INTO Properties VALUES ('99213', 'telemedicine', 'true')",
                "INSERT INTO Designations VALUES ('99213', 'consumer', 'Established patient office visit')",
            ],
        )
        .await;
        pool
    }

    async fn provider() -> Box<dyn CodeSystemProvider> {
        let factory = CptFactory::load(fixture().await).await.unwrap();
        factory.build(op(), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn expression_validation() {
        let provider = provider().await;

        // 25 and 57 conflict; 25 alone is fine.
        let conflict = provider.locate("99213:25:57").await.unwrap();
        assert!(conflict.context.is_none());
        assert!(conflict.message.unwrap().contains("mutually exclusive"));

        let ok = provider.locate("99213:25").await.unwrap().context.unwrap();
        assert_eq!(provider.code(ok.as_ref()).unwrap(), "99213:25");
        assert!(!provider.is_abstract(ok.as_ref()).unwrap());

        assert!(provider.locate("99213:52:53").await.unwrap().context.is_none());
        assert!(provider.locate("99213:93:95").await.unwrap().context.is_none());
    }

    #[tokio::test]
    async fn kind_constraints() {
        let provider = provider().await;

        // cat-2 modifiers need cat-2 bases.
        assert!(provider.locate("0001F:1P").await.unwrap().context.is_some());
        assert!(provider.locate("99213:1P").await.unwrap().context.is_none());

        // physical status modifiers need anesthesia codes.
        assert!(provider.locate("00100:P1").await.unwrap().context.is_some());
        assert!(provider.locate("99213:P1").await.unwrap().context.is_none());

        // hcpcs modifiers require 59 alongside.
        assert!(provider.locate("99213:XE").await.unwrap().context.is_none());
        assert!(provider.locate("99213:XE:59").await.unwrap().context.is_some());
    }

    #[tokio::test]
    async fn code_specific_allow_lists() {
        let provider = provider().await;

        assert!(provider.locate("20610:63").await.unwrap().context.is_some());
        assert!(provider.locate("99213:63").await.unwrap().context.is_none());

        assert!(provider.locate("86701:92").await.unwrap().context.is_some());
        assert!(provider.locate("99213:92").await.unwrap().context.is_none());

        assert!(provider.locate("99213:95").await.unwrap().context.is_some());
        assert!(provider.locate("20610:95").await.unwrap().context.is_none());
    }

    #[tokio::test]
    async fn metadata_and_filters() {
        let provider = provider().await;
        assert_eq!(provider.expand_limitation(), Some(1000));
        assert_eq!(provider.version(), Some("2024"));

        let abstract_ctx = provider
            .locate("metadata-kinds")
            .await
            .unwrap()
            .context
            .unwrap();
        assert!(provider.is_abstract(abstract_ctx.as_ref()).unwrap());

        let mut fctx = provider.get_prep_context(true);
        provider
            .filter(&mut fctx, "modifier", FilterOperator::Equal, "true")
            .await
            .unwrap();
        provider
            .filter(&mut fctx, "kind", FilterOperator::Equal, "cat-2")
            .await
            .unwrap();
        let mut filters = fctx.take_filters();
        assert_eq!(provider.filter_size(filters[0].as_ref()).unwrap(), 11);
        assert_eq!(provider.filter_size(filters[1].as_ref()).unwrap(), 2);

        let modifier = provider.locate("25").await.unwrap().context.unwrap();
        assert!(provider
            .filter_check(filters[0].as_mut(), modifier.as_ref())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn designations_include_consumer_names() {
        let provider = provider().await;
        let ctx = provider.locate("99213").await.unwrap().context.unwrap();
        let designations = provider.designations(ctx.as_ref()).await.unwrap();
        assert!(designations
            .iter()
            .any(|d| d.value == "Established patient office visit"));
    }
}

mod unii {
    use super::*;

    async fn fixture() -> SqlitePool {
        let pool = memory_pool().await;
        execute_all(
            &pool,
            &[
                "CREATE TABLE Unii (UniiKey INTEGER PRIMARY KEY, Code TEXT, Display TEXT)",
                "CREATE TABLE UniiDesc (UniiKey INTEGER, Type TEXT, Description TEXT)",
                "CREATE TABLE UniiVersion (Version TEXT)",
                "INSERT INTO UniiVersion VALUES ('20240115')",
                "INSERT INTO Unii VALUES (1, 'R16CO5Y76E', 'ASPIRIN')",
                "INSERT INTO UniiDesc VALUES
                    (1, 'cn', 'ACETYLSALICYLIC ACID'),
                    (1, 'sys', 'ACETYLSALICYLIC ACID'),
                    (1, 'cd', '2-ACETOXYBENZOIC ACID')",
            ],
        )
        .await;
        pool
    }

    #[tokio::test]
    async fn lookup_with_deduplicated_descriptions() {
        let factory = UniiFactory::load(fixture().await).await.unwrap();
        let provider = factory.build(op(), Vec::new()).unwrap();
        assert_eq!(provider.version(), Some("20240115"));
        assert_eq!(provider.total_count(), 1);

        let ctx = provider.locate("R16CO5Y76E").await.unwrap().context.unwrap();
        assert_eq!(
            provider.display(ctx.as_ref()).await.unwrap().as_deref(),
            Some("ASPIRIN")
        );
        let designations = provider.designations(ctx.as_ref()).await.unwrap();
        let values: Vec<&str> = designations.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(
            values,
            vec!["ASPIRIN", "ACETYLSALICYLIC ACID", "2-ACETOXYBENZOIC ACID"]
        );

        assert!(provider.locate("XXXXXXXXXX").await.unwrap().context.is_none());
        assert!(provider.iterator(None).await.unwrap().is_none());
    }
}
