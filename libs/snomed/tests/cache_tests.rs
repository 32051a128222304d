use terminus_snomed::cache::DescriptionKind;
use terminus_snomed::{
    parse_expression, CacheBuilder, CacheFile, Error, ExpressionServices, IS_A_ID,
    CONCEPT_MODEL_ATTRIBUTE_ID, ROOT_CONCEPT_ID,
};

const DISEASE: u64 = 64572001;
const CELLULITIS: u64 = 128045006;
const FINDING_SITE: u64 = 363698007;
const BODY_STRUCTURE: u64 = 123037004;
const FOOT: u64 = 56459004;
const DIABETES: u64 = 73211009;
const DIABETES_T1: u64 = 46635009;
const INACTIVE: u64 = 111222333;
const SIMPLE_REFSET: u64 = 446609009;

fn build_cache() -> CacheFile {
    let mut b = CacheBuilder::new(
        "http://snomed.info/sct/900000000000207008/version/20240101",
        "20240101",
    );
    b.concept(ROOT_CONCEPT_ID, &[])
        .concept(IS_A_ID, &[ROOT_CONCEPT_ID])
        .concept(CONCEPT_MODEL_ATTRIBUTE_ID, &[ROOT_CONCEPT_ID])
        .concept(FINDING_SITE, &[CONCEPT_MODEL_ATTRIBUTE_ID])
        .concept(DISEASE, &[ROOT_CONCEPT_ID])
        .concept(BODY_STRUCTURE, &[ROOT_CONCEPT_ID])
        .concept(FOOT, &[BODY_STRUCTURE])
        .concept(CELLULITIS, &[DISEASE])
        .concept(DIABETES, &[DISEASE])
        .concept(DIABETES_T1, &[DIABETES])
        .inactive_concept(INACTIVE)
        .concept(SIMPLE_REFSET, &[ROOT_CONCEPT_ID]);

    b.description(
        1001,
        ROOT_CONCEPT_ID,
        "SNOMED CT Concept (SNOMED RT+CTV3)",
        "en",
        DescriptionKind::FullySpecifiedName,
        false,
    )
    .description(1002, ROOT_CONCEPT_ID, "SNOMED CT Concept", "en", DescriptionKind::Synonym, true)
    .description(
        2001,
        CELLULITIS,
        "Cellulitis (disorder)",
        "en",
        DescriptionKind::FullySpecifiedName,
        false,
    )
    .description(2002, CELLULITIS, "Cellulitis", "en", DescriptionKind::Synonym, true)
    .description(2003, CELLULITIS, "Zellulitis", "de", DescriptionKind::Synonym, true)
    .description(
        3001,
        DIABETES,
        "Diabetes mellitus (disorder)",
        "en",
        DescriptionKind::FullySpecifiedName,
        false,
    )
    .description(3002, DIABETES, "Diabetes mellitus", "en", DescriptionKind::Synonym, true)
    .description(4001, FOOT, "Foot structure", "en", DescriptionKind::Synonym, true)
    .description(5001, FINDING_SITE, "Finding site", "en", DescriptionKind::Synonym, true);

    b.refset_member(SIMPLE_REFSET, DIABETES)
        .refset_member(SIMPLE_REFSET, DIABETES_T1);

    CacheFile::from_bytes(b.build().unwrap()).unwrap()
}

#[test]
fn header_fields_roundtrip() {
    let cache = build_cache();
    assert_eq!(
        cache.version_uri(),
        "http://snomed.info/sct/900000000000207008/version/20240101"
    );
    assert_eq!(cache.version_date(), "20240101");
    assert_eq!(cache.default_language(), "en");
    assert_eq!(cache.active_roots(), &[ROOT_CONCEPT_ID]);

    let is_a = cache.concepts().at(cache.is_a_index()).unwrap();
    assert_eq!(is_a.identity(), IS_A_ID);
}

#[test]
fn rejects_unknown_cache_version() {
    let mut bytes = {
        let mut b = CacheBuilder::new("uri", "date");
        b.concept(ROOT_CONCEPT_ID, &[]).concept(IS_A_ID, &[ROOT_CONCEPT_ID]);
        b.build().unwrap()
    };
    bytes[0] = 99;
    let err = CacheFile::from_bytes(bytes).unwrap_err();
    assert!(matches!(err, Error::UnknownCacheVersion { found: 99, .. }));
}

#[test]
fn finds_concepts_by_identity() {
    let cache = build_cache();
    let concepts = cache.concepts();
    let cellulitis = concepts.find(CELLULITIS).unwrap();
    assert_eq!(cellulitis.identity(), CELLULITIS);
    assert!(cellulitis.is_active());
    assert!(concepts.find(999000111).is_none());

    let inactive = concepts.find(INACTIVE).unwrap();
    assert!(!inactive.is_active());
}

#[test]
fn parents_and_children_refs() {
    let cache = build_cache();
    let concepts = cache.concepts();
    let refs = cache.refs();

    let diabetes = concepts.find(DIABETES).unwrap();
    let parents = refs.at(diabetes.active_parents_ref()).unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(concepts.at(parents.get(0)).unwrap().identity(), DISEASE);

    let children = refs.at(diabetes.active_children_ref()).unwrap();
    let child_ids: Vec<u64> = children
        .iter()
        .map(|o| concepts.at(o).unwrap().identity())
        .collect();
    assert_eq!(child_ids, vec![DIABETES_T1]);
}

#[test]
fn description_index_and_display() {
    let cache = build_cache();
    let services = ExpressionServices::new(&cache);
    let concepts = cache.concepts();

    let offset = cache.description_index().find(2002).unwrap();
    let desc = cache.descriptions().at(offset).unwrap();
    assert_eq!(desc.id(), 2002);
    assert_eq!(cache.strings().at(desc.string_ref()).unwrap(), "Cellulitis");

    let cellulitis = concepts.find(CELLULITIS).unwrap();
    assert_eq!(
        services.display(cellulitis.offset, "en").unwrap().as_deref(),
        Some("Cellulitis")
    );
    assert_eq!(
        services.display(cellulitis.offset, "de").unwrap().as_deref(),
        Some("Zellulitis")
    );
}

#[test]
fn word_index_prefix_lookup() {
    let cache = build_cache();
    let words = cache.words();
    let strings = cache.strings();
    let entries = words.find_prefix(&strings, "cellu").unwrap();
    assert_eq!(entries.len(), 1);
    let concepts = cache.refs().at(entries[0].concepts_ref).unwrap();
    let ids: Vec<u64> = concepts
        .iter()
        .map(|o| cache.concepts().at(o).unwrap().identity())
        .collect();
    assert_eq!(ids, vec![CELLULITIS]);

    assert!(words.find_prefix(&strings, "zzz").unwrap().is_empty());
}

#[test]
fn ancestors_follow_is_a_edges() {
    let cache = build_cache();
    let services = ExpressionServices::new(&cache);
    let concepts = cache.concepts();

    let t1 = concepts.find(DIABETES_T1).unwrap();
    let ancestors = services.ancestors(t1.offset).unwrap();
    let ids: Vec<u64> = ancestors
        .iter()
        .map(|o| concepts.at(*o).unwrap().identity())
        .collect();
    assert!(ids.contains(&DIABETES));
    assert!(ids.contains(&DISEASE));
    assert!(ids.contains(&ROOT_CONCEPT_ID));
    assert!(!ids.contains(&FOOT));
}

#[test]
fn validates_expressions_against_cache() {
    let cache = build_cache();
    let services = ExpressionServices::new(&cache);

    let good = parse_expression("128045006:{363698007=56459004}").unwrap();
    services.validate(&good).unwrap();

    let unknown = parse_expression("999000111").unwrap();
    assert!(matches!(
        services.validate(&unknown),
        Err(Error::ConceptNotFound(999000111))
    ));

    let inactive = parse_expression("111222333").unwrap();
    assert!(matches!(
        services.validate(&inactive),
        Err(Error::InactiveConcept(111222333))
    ));

    // A disease is not an attribute, so it cannot name a refinement.
    let bad_name = parse_expression("128045006:{64572001=56459004}").unwrap();
    assert!(matches!(
        services.validate(&bad_name),
        Err(Error::NotAnAttribute(64572001))
    ));
}

#[test]
fn subsumption_over_focus_and_refinements() {
    let cache = build_cache();
    let services = ExpressionServices::new(&cache);

    let diabetes = parse_expression("73211009").unwrap();
    let t1 = parse_expression("46635009").unwrap();
    assert!(services.subsumes(&diabetes, &t1).unwrap());
    assert!(!services.subsumes(&t1, &diabetes).unwrap());
    assert!(services.subsumes(&diabetes, &diabetes).unwrap());

    let plain = parse_expression("128045006").unwrap();
    let refined = parse_expression("128045006:{363698007=56459004}").unwrap();
    assert!(services.subsumes(&plain, &refined).unwrap());
    assert!(!services.subsumes(&refined, &plain).unwrap());
}

#[test]
fn refset_members_are_indexed() {
    let cache = build_cache();
    let refset_ref = cache.concepts().find(SIMPLE_REFSET).unwrap().offset;
    let entry = cache.refset_index().find(refset_ref).unwrap();
    assert_eq!(entry.member_count, 2);
    let members = cache
        .refset_members()
        .run(entry.members_start, entry.member_count)
        .unwrap();
    let ids: Vec<u64> = members.iter().map(|m| m.component_id()).collect();
    assert_eq!(ids, vec![DIABETES, DIABETES_T1]);
}

#[test]
fn out_of_range_offsets_are_errors() {
    let cache = build_cache();
    assert!(cache.concepts().at(10_000_000).is_err());
    assert!(cache.refs().at(10_000_000).is_err());
    assert!(cache.strings().at(10_000_000).is_err());
}
