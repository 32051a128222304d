use serde_json::Value;
use terminus_format::{json_to_xml, xml_to_json};

#[test]
fn code_system_xml_to_json() {
    let xml = r#"
    <CodeSystem xmlns="http://hl7.org/fhir">
        <url value="http://example.org/fhir/CodeSystem/colors"/>
        <version value="1.0.0"/>
        <name value="Colors"/>
        <status value="active"/>
        <content value="complete"/>
        <count value="2"/>
        <concept>
            <code value="red"/>
            <display value="Red"/>
            <designation>
                <language value="nl"/>
                <value value="Rood"/>
            </designation>
        </concept>
        <concept>
            <code value="007"/>
            <display value="Leading Zero"/>
        </concept>
    </CodeSystem>
    "#;

    let json = xml_to_json(xml).unwrap();
    assert_eq!(json["resourceType"], "CodeSystem");
    assert_eq!(json["url"], "http://example.org/fhir/CodeSystem/colors");
    assert_eq!(json["count"], 2);

    let concepts = json["concept"].as_array().unwrap();
    assert_eq!(concepts.len(), 2);
    // Codes stay strings even when they look numeric.
    assert_eq!(concepts[1]["code"], "007");
    // designation is a list field: one element still yields an array.
    let designations = concepts[0]["designation"].as_array().unwrap();
    assert_eq!(designations[0]["language"], "nl");
    assert_eq!(designations[0]["value"], "Rood");
}

#[test]
fn single_concept_becomes_array() {
    let xml = r#"
    <CodeSystem xmlns="http://hl7.org/fhir">
        <url value="http://example.org/fhir/CodeSystem/single"/>
        <status value="active"/>
        <content value="complete"/>
        <concept><code value="only"/></concept>
    </CodeSystem>
    "#;

    let json = xml_to_json(xml).unwrap();
    assert!(json["concept"].is_array());
    assert_eq!(json["concept"][0]["code"], "only");
}

#[test]
fn json_to_xml_writes_primitive_attributes() {
    let resource: Value = serde_json::json!({
        "resourceType": "CodeSystem",
        "url": "http://example.org/fhir/CodeSystem/colors",
        "status": "active",
        "content": "complete",
        "caseSensitive": true,
        "concept": [{"code": "red", "display": "Red"}]
    });

    let xml = json_to_xml(&resource).unwrap();
    assert!(xml.contains("<CodeSystem"));
    assert!(xml.contains(r#"<url value="http://example.org/fhir/CodeSystem/colors"/>"#));
    assert!(xml.contains(r#"<caseSensitive value="true"/>"#));
    assert!(xml.contains(r#"<code value="red"/>"#));
}

#[test]
fn roundtrip_preserves_structure() {
    let resource: Value = serde_json::json!({
        "resourceType": "CodeSystem",
        "url": "http://example.org/fhir/CodeSystem/rt",
        "status": "draft",
        "content": "complete",
        "concept": [
            {"code": "a", "display": "A", "concept": [{"code": "a1", "display": "A1"}]}
        ]
    });

    let xml = json_to_xml(&resource).unwrap();
    let back = xml_to_json(&xml).unwrap();
    assert_eq!(back["url"], resource["url"]);
    assert_eq!(back["concept"][0]["concept"][0]["code"], "a1");
}

#[test]
fn primitive_metadata_survives_roundtrip() {
    let resource: Value = serde_json::json!({
        "resourceType": "CodeSystem",
        "url": "http://example.org/fhir/CodeSystem/meta",
        "status": "active",
        "content": "complete",
        "publisher": "Example",
        "_publisher": {"id": "pub1"}
    });

    let xml = json_to_xml(&resource).unwrap();
    assert!(xml.contains(r#"id="pub1""#));

    let back = xml_to_json(&xml).unwrap();
    assert_eq!(back["publisher"], "Example");
    assert_eq!(back["_publisher"]["id"], "pub1");
}
