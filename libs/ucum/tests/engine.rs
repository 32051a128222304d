use terminus_ucum::{shared, Decimal, Error, Pair};

fn dec(s: &str) -> Decimal {
    Decimal::parse(s).unwrap()
}

#[test]
fn validates_good_and_bad_expressions() {
    assert!(terminus_ucum::validate("mg/dL").is_none());
    assert!(terminus_ucum::validate("kg.m/s2").is_none());
    assert!(terminus_ucum::validate("10*-2").is_none());
    assert!(terminus_ucum::validate("mL{total}").is_none());
    assert!(terminus_ucum::validate("/min").is_none());

    assert!(terminus_ucum::validate("mg//dL").is_some());
    assert!(terminus_ucum::validate("kg/(m.s2").is_some());
    assert!(terminus_ucum::validate("m..s").is_some());
    assert!(terminus_ucum::validate("xyzzy").is_some());
}

#[test]
fn symbols_are_case_sensitive() {
    assert!(terminus_ucum::validate("[iU]").is_none());
    assert!(terminus_ucum::validate("[IU]").is_none());
    assert!(terminus_ucum::validate("iu").is_some());
}

#[test]
fn gram_to_kilogram() {
    let v = shared().convert(&dec("1000"), "g", "kg").unwrap();
    assert_eq!(v.as_decimal(), "1");
}

#[test]
fn centimeter_to_meter() {
    let v = shared().convert(&dec("100"), "cm", "m").unwrap();
    assert_eq!(v.as_decimal(), "1");
}

#[test]
fn per_minute_to_per_hour() {
    let v = shared().convert(&dec("15"), "/min", "/h").unwrap();
    assert_eq!(v.as_decimal(), "900");
}

#[test]
fn speed_units_are_comparable() {
    assert!(shared().is_comparable("m/s", "km/h").unwrap());
    assert!(!shared().is_comparable("mg", "m").unwrap());
    assert!(shared().is_comparable("mg/dL", "g/L").unwrap());
}

#[test]
fn celsius_conversion_is_rejected() {
    let err = shared().convert(&dec("100"), "Cel", "K").unwrap_err();
    assert!(matches!(err, Error::OffsetConversion));
    let err = shared().convert(&dec("37"), "Cel", "[degF]").unwrap_err();
    assert!(matches!(err, Error::OffsetConversion));
}

#[test]
fn conversion_roundtrip_is_stable() {
    let out = shared().convert(&dec("2.5"), "[lb_av]", "g").unwrap();
    let back = shared().convert(&out, "g", "[lb_av]").unwrap();
    assert_eq!(back.compares_to(&dec("2.5")), std::cmp::Ordering::Equal);
}

#[test]
fn canonical_units() {
    assert_eq!(shared().get_canonical_units("km/h").unwrap(), "m.s-1");
    assert_eq!(shared().get_canonical_units("N").unwrap(), "m.s-2.g");
    assert_eq!(shared().get_canonical_units("{score}").unwrap(), "1");
}

#[test]
fn canonical_form_scales_value() {
    let pair = Pair::new(dec("1"), "km");
    let canonical = shared().get_canonical_form(&pair).unwrap();
    assert_eq!(canonical.code, "m");
    assert_eq!(canonical.value.as_decimal(), "1000");
}

#[test]
fn multiply_and_divide_pairs() {
    let distance = Pair::new(dec("6"), "m");
    let time = Pair::new(dec("3"), "s");
    let speed = shared().divide_by(&distance, &time).unwrap();
    assert_eq!(speed.code, "m.s-1");
    assert_eq!(speed.value.as_decimal(), "2");

    let area = shared()
        .multiply(&Pair::new(dec("2"), "m"), &Pair::new(dec("4"), "m"))
        .unwrap();
    assert_eq!(area.code, "m2");
    assert_eq!(area.value.as_decimal(), "8");
}

#[test]
fn analyse_expands_exponents() {
    assert_eq!(
        shared().analyse("kg.m/s2").unwrap(),
        "kilogram · meter / (second · second)"
    );
    assert_eq!(shared().analyse("/min").unwrap(), "1 / minute");
}

#[test]
fn search_finds_units_by_name() {
    let hits = shared().search(None, "newton", false).unwrap();
    assert!(hits.iter().any(|h| h.code == "N"));
    assert!(shared().search(None, "(unclosed", true).is_err());
}

#[test]
fn validate_in_property() {
    assert!(shared().validate_in_property("km", "length").is_none());
    assert!(shared().validate_in_property("kg", "length").is_some());
}
