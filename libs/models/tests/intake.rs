use serde_json::json;
use terminus_models::{CodeSystem, CodeSystemContentMode, Error};

#[test]
fn parses_r4_json() {
    let cs = CodeSystem::from_json(json!({
        "resourceType": "CodeSystem",
        "url": "http://example.org/fhir/CodeSystem/ex",
        "version": "2.0.0",
        "status": "active",
        "content": "complete",
        "language": "en",
        "concept": [{"code": "a", "display": "A"}]
    }))
    .unwrap();
    assert_eq!(cs.url, "http://example.org/fhir/CodeSystem/ex");
    assert_eq!(cs.content, CodeSystemContentMode::Complete);
    assert_eq!(cs.concepts().len(), 1);
}

#[test]
fn wraps_r3_identifier() {
    let cs = CodeSystem::from_json(json!({
        "resourceType": "CodeSystem",
        "url": "http://example.org/fhir/CodeSystem/r3",
        "status": "active",
        "content": "complete",
        "identifier": {"system": "urn:ietf:rfc:3986", "value": "urn:oid:2.16.840"}
    }))
    .unwrap();
    let identifier = cs.extensions.get("identifier").unwrap();
    assert!(identifier.is_array());
}

#[test]
fn rejects_other_resource_types() {
    let err = CodeSystem::from_json(json!({
        "resourceType": "ValueSet",
        "url": "http://example.org/fhir/ValueSet/vs",
        "status": "active"
    }))
    .unwrap_err();
    assert!(matches!(err, Error::WrongResourceType(_)));
}

#[test]
fn parses_xml_with_designations() {
    let xml = r#"
    <CodeSystem xmlns="http://hl7.org/fhir">
        <url value="http://example.org/fhir/CodeSystem/xmlcs"/>
        <status value="active"/>
        <content value="complete"/>
        <concept>
            <code value="x"/>
            <display value="X"/>
            <designation>
                <language value="de"/>
                <use>
                    <system value="http://terminology.hl7.org/CodeSystem/designation-usage"/>
                    <code value="display"/>
                </use>
                <value value="Iks"/>
            </designation>
        </concept>
    </CodeSystem>
    "#;
    let cs = CodeSystem::from_xml(xml).unwrap();
    let concept = &cs.concepts()[0];
    let designation = &concept.designations()[0];
    assert_eq!(designation.language.as_deref(), Some("de"));
    assert!(designation.is_display_use());
    assert_eq!(designation.value, "Iks");
}

#[test]
fn supplement_target_splits_version() {
    let cs = CodeSystem::from_json(json!({
        "resourceType": "CodeSystem",
        "url": "http://example.org/fhir/CodeSystem/supp",
        "status": "active",
        "content": "supplement",
        "supplements": "http://hl7.org/fhir/CodeSystem/example|1.2.0"
    }))
    .unwrap();
    assert!(cs.is_supplement());
    let (url, version) = cs.supplements_target().unwrap();
    assert_eq!(url, "http://hl7.org/fhir/CodeSystem/example");
    assert_eq!(version, Some("1.2.0"));
}
