//! BCP-47 language tags and Accept-Language negotiation.
//!
//! Display resolution across code systems needs two things from language
//! tags: a structured parse of the subtags, and the asymmetric
//! "matches for display" relation (`de-CH` can stand in for a request for
//! `de`, but plain `de` cannot satisfy a request for `de-DE`).

#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid quality value '{0}' in Accept-Language header")]
    InvalidQuality(String),
}

/// A parsed BCP-47 language tag.
///
/// Parsing is lenient: subtags that do not fit the expected shapes are
/// pushed into the nearest later field so the original text always
/// round-trips (`code()` re-renders an equivalent structure).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanguageTag {
    pub primary: String,
    pub ext_lang: Vec<String>,
    pub script: Option<String>,
    pub region: Option<String>,
    pub variant: Option<String>,
    pub extension: Option<String>,
    pub private_use: Vec<String>,
}

impl LanguageTag {
    pub fn parse(text: &str) -> Self {
        let mut tag = LanguageTag::default();
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return tag;
        }

        let parts: Vec<&str> = text.split('-').collect();
        let mut i = 0;

        if parts[0].eq_ignore_ascii_case("x") {
            tag.private_use = parts[1..].iter().map(|s| s.to_string()).collect();
            return tag;
        }

        tag.primary = parts[0].to_ascii_lowercase();
        i += 1;

        // Up to three extended-language subtags (3 letters each).
        while i < parts.len()
            && tag.ext_lang.len() < 3
            && parts[i].len() == 3
            && is_alpha(parts[i])
        {
            tag.ext_lang.push(parts[i].to_ascii_lowercase());
            i += 1;
        }

        if i < parts.len() && parts[i].len() == 4 && is_alpha(parts[i]) {
            tag.script = Some(title_case(parts[i]));
            i += 1;
        }

        if i < parts.len()
            && ((parts[i].len() == 2 && is_alpha(parts[i]))
                || (parts[i].len() == 3 && is_digits(parts[i])))
        {
            tag.region = Some(parts[i].to_ascii_uppercase());
            i += 1;
        }

        let mut variants = Vec::new();
        while i < parts.len() && is_variant(parts[i]) {
            variants.push(parts[i].to_ascii_lowercase());
            i += 1;
        }
        if !variants.is_empty() {
            tag.variant = Some(variants.join("-"));
        }

        if i < parts.len() && parts[i].len() == 1 && !parts[i].eq_ignore_ascii_case("x") {
            let ext: Vec<String> = parts[i..]
                .iter()
                .take_while(|p| !p.eq_ignore_ascii_case("x"))
                .map(|s| s.to_ascii_lowercase())
                .collect();
            i += ext.len();
            tag.extension = Some(ext.join("-"));
        }

        if i < parts.len() && parts[i].eq_ignore_ascii_case("x") {
            tag.private_use = parts[i + 1..].iter().map(|s| s.to_string()).collect();
            i = parts.len();
        }

        // Anything left over is preserved as private use so nothing is lost.
        if i < parts.len() {
            tag.private_use
                .extend(parts[i..].iter().map(|s| s.to_string()));
        }

        tag
    }

    /// Render the tag back to its canonical string form.
    pub fn code(&self) -> String {
        let mut out = String::new();
        if !self.primary.is_empty() {
            out.push_str(&self.primary);
        }
        for e in &self.ext_lang {
            out.push('-');
            out.push_str(e);
        }
        if let Some(s) = &self.script {
            out.push('-');
            out.push_str(s);
        }
        if let Some(r) = &self.region {
            out.push('-');
            out.push_str(r);
        }
        if let Some(v) = &self.variant {
            out.push('-');
            out.push_str(v);
        }
        if let Some(e) = &self.extension {
            out.push('-');
            out.push_str(e);
        }
        if !self.private_use.is_empty() {
            if !out.is_empty() {
                out.push('-');
            }
            out.push('x');
            for p in &self.private_use {
                out.push('-');
                out.push_str(p);
            }
        }
        out
    }

    /// True when this tag's text can be shown to a user who asked for
    /// `requested`.
    ///
    /// The relation is asymmetric: every subtag present in `requested` must
    /// be carried identically here, while extra precision on this side is
    /// fine. `de-CH` matches a request for `de`; `de` does not match a
    /// request for `de-DE`; `de-DE` does not match `de-AT`.
    pub fn matches_for_display(&self, requested: &LanguageTag) -> bool {
        if !self.primary.eq_ignore_ascii_case(&requested.primary) {
            return false;
        }
        if !requested.ext_lang.is_empty() && self.ext_lang != requested.ext_lang {
            return false;
        }
        if requested.script.is_some() && self.script != requested.script {
            return false;
        }
        if requested.region.is_some() && self.region != requested.region {
            return false;
        }
        if requested.variant.is_some() && self.variant != requested.variant {
            return false;
        }
        if requested.extension.is_some() && self.extension != requested.extension {
            return false;
        }
        if !requested.private_use.is_empty() && self.private_use != requested.private_use {
            return false;
        }
        true
    }

    /// Exact subtag-for-subtag equality (used to rank exact over partial
    /// designation matches).
    pub fn matches_exactly(&self, other: &LanguageTag) -> bool {
        self.primary.eq_ignore_ascii_case(&other.primary)
            && self.ext_lang == other.ext_lang
            && self.script == other.script
            && self.region == other.region
            && self.variant == other.variant
            && self.extension == other.extension
            && self.private_use == other.private_use
    }

    /// Primary-subtag-only match (`en` ~ `en-AU`), the "partial" rung of
    /// designation selection.
    pub fn matches_primary(&self, other: &LanguageTag) -> bool {
        !self.primary.is_empty() && self.primary.eq_ignore_ascii_case(&other.primary)
    }

    pub fn is_english_or_nothing(&self) -> bool {
        self.primary.is_empty() || self.primary.eq_ignore_ascii_case("en")
    }
}

fn is_alpha(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn is_variant(s: &str) -> bool {
    (s.len() >= 5 && s.len() <= 8 && s.chars().all(|c| c.is_ascii_alphanumeric()))
        || (s.len() == 4
            && s.chars().next().is_some_and(|c| c.is_ascii_digit())
            && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        if i == 0 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

/// One entry of an `Accept-Language` header: a tag plus its quality weight.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguagePreference {
    pub tag: LanguageTag,
    pub quality: f64,
}

/// An ordered, quality-ranked list of requested display languages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Languages {
    entries: Vec<LanguagePreference>,
}

impl Languages {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse an `Accept-Language` header.
    ///
    /// Entries keep their declared order among equal qualities; zero-quality
    /// entries are dropped; a missing quality means 1.0. The empty header
    /// yields the empty list (treated downstream as "English or nothing").
    pub fn from_accept_language(header: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for item in header.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let mut quality = 1.0f64;
            let mut tag_text = item;
            if let Some((tag_part, params)) = item.split_once(';') {
                tag_text = tag_part.trim();
                for param in params.split(';') {
                    let param = param.trim();
                    if let Some(q) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
                        quality = q
                            .trim()
                            .parse::<f64>()
                            .map_err(|_| Error::InvalidQuality(q.trim().to_string()))?;
                    }
                }
            }
            if quality <= 0.0 {
                continue;
            }
            entries.push(LanguagePreference {
                tag: LanguageTag::parse(tag_text),
                quality: quality.min(1.0),
            });
        }
        entries.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguagePreference> {
        self.entries.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = &LanguageTag> {
        self.entries.iter().map(|e| &e.tag)
    }

    /// True when the whole request can be served by English text: the list
    /// is empty or every entry is `en` (or a wildcard).
    pub fn is_english_or_nothing(&self) -> bool {
        self.entries.iter().all(|e| e.tag.is_english_or_nothing())
    }

    /// True when `candidate` (a resource or designation language) can serve
    /// some entry of this list.
    pub fn has_match(&self, candidate: &LanguageTag) -> bool {
        self.entries
            .iter()
            .any(|e| candidate.matches_for_display(&e.tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subfields() {
        let tag = LanguageTag::parse("zh-yue-Hant-HK");
        assert_eq!(tag.primary, "zh");
        assert_eq!(tag.ext_lang, vec!["yue".to_string()]);
        assert_eq!(tag.script.as_deref(), Some("Hant"));
        assert_eq!(tag.region.as_deref(), Some("HK"));
        assert_eq!(tag.code(), "zh-yue-Hant-HK");
    }

    #[test]
    fn parses_region_and_variant() {
        let tag = LanguageTag::parse("sl-IT-nedis");
        assert_eq!(tag.primary, "sl");
        assert_eq!(tag.region.as_deref(), Some("IT"));
        assert_eq!(tag.variant.as_deref(), Some("nedis"));
    }

    #[test]
    fn parses_private_use() {
        let tag = LanguageTag::parse("en-US-x-twain");
        assert_eq!(tag.region.as_deref(), Some("US"));
        assert_eq!(tag.private_use, vec!["twain".to_string()]);
        assert_eq!(tag.code(), "en-US-x-twain");
    }

    #[test]
    fn roundtrips_numeric_region() {
        let tag = LanguageTag::parse("es-419");
        assert_eq!(tag.region.as_deref(), Some("419"));
        assert_eq!(tag.code(), "es-419");
    }

    #[test]
    fn display_matching_is_asymmetric() {
        let de = LanguageTag::parse("de");
        let de_ch = LanguageTag::parse("de-CH");
        let de_de = LanguageTag::parse("de-DE");
        let de_at = LanguageTag::parse("de-AT");
        let fr = LanguageTag::parse("fr");
        let fr_ca = LanguageTag::parse("fr-CA");

        assert!(de_ch.matches_for_display(&de));
        assert!(fr_ca.matches_for_display(&fr));
        assert!(!de_de.matches_for_display(&de_at));
        assert!(!de.matches_for_display(&de_de));
        assert!(de.matches_for_display(&de));
    }

    #[test]
    fn english_or_nothing() {
        assert!(LanguageTag::parse("").is_english_or_nothing());
        assert!(LanguageTag::parse("en-AU").is_english_or_nothing());
        assert!(!LanguageTag::parse("de").is_english_or_nothing());
    }

    #[test]
    fn accept_language_ordering() {
        let langs = Languages::from_accept_language("en-GB;q=0.8, nl, fr;q=0.9").unwrap();
        let codes: Vec<String> = langs.tags().map(|t| t.code()).collect();
        assert_eq!(codes, vec!["nl", "fr", "en-GB"]);
    }

    #[test]
    fn accept_language_drops_zero_quality() {
        let langs = Languages::from_accept_language("da, en;q=0").unwrap();
        assert_eq!(langs.len(), 1);
        assert_eq!(langs.tags().next().unwrap().code(), "da");
    }

    #[test]
    fn accept_language_empty_header() {
        let langs = Languages::from_accept_language("").unwrap();
        assert!(langs.is_empty());
        assert!(langs.is_english_or_nothing());
    }

    #[test]
    fn accept_language_rejects_bad_quality() {
        assert!(Languages::from_accept_language("en;q=high").is_err());
    }

    #[test]
    fn has_match_uses_display_relation() {
        let langs = Languages::from_accept_language("de").unwrap();
        assert!(langs.has_match(&LanguageTag::parse("de-CH")));
        let narrow = Languages::from_accept_language("de-DE").unwrap();
        assert!(!narrow.has_match(&LanguageTag::parse("de")));
    }
}
