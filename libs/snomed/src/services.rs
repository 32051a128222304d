//! Cache-backed expression services: validation, subsumption, and display
//! selection.

use crate::cache::{CacheFile, ConceptRecord, DescriptionKind, CONCEPT_MODEL_ATTRIBUTE_ID};
use crate::error::{Error, Result};
use crate::expressions::{Expression, ExpressionConcept, Refinement};
use std::collections::{HashSet, VecDeque};

/// A located SNOMED concept: either a straight reference into the cache or
/// a post-coordinated expression.
#[derive(Debug, Clone)]
pub struct ExpressionContext {
    pub reference: Option<u32>,
    pub expression: Expression,
}

impl ExpressionContext {
    pub fn from_reference(offset: u32, identity: u64) -> Self {
        Self {
            reference: Some(offset),
            expression: Expression::simple(identity.to_string()),
        }
    }

    pub fn from_expression(expression: Expression) -> Self {
        Self {
            reference: None,
            expression,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.expression.is_complex()
    }

    pub fn code(&self) -> String {
        self.expression
            .render(crate::expressions::RenderOption::Minimal)
    }
}

pub struct ExpressionServices<'a> {
    cache: &'a CacheFile,
}

impl<'a> ExpressionServices<'a> {
    pub fn new(cache: &'a CacheFile) -> Self {
        Self { cache }
    }

    fn find_active(&self, concept: &ExpressionConcept) -> Result<ConceptRecord<'a>> {
        let id = concept.id()?;
        let record = self
            .cache
            .concepts()
            .find(id)
            .ok_or(Error::ConceptNotFound(id))?;
        if !record.is_active() {
            return Err(Error::InactiveConcept(id));
        }
        Ok(record)
    }

    /// Validate an expression against the loaded edition: every concept
    /// must resolve and be active, and every refinement name must descend
    /// from the concept model attribute root.
    pub fn validate(&self, expression: &Expression) -> Result<()> {
        for concept in &expression.concepts {
            self.find_active(concept)?;
        }
        for refinement in &expression.refinements {
            self.validate_refinement(refinement)?;
        }
        for group in &expression.groups {
            for refinement in &group.refinements {
                self.validate_refinement(refinement)?;
            }
        }
        Ok(())
    }

    fn validate_refinement(&self, refinement: &Refinement) -> Result<()> {
        let name = self.find_active(&refinement.name)?;
        let attribute_root = self
            .cache
            .concepts()
            .find(CONCEPT_MODEL_ATTRIBUTE_ID)
            .ok_or(Error::ConceptNotFound(CONCEPT_MODEL_ATTRIBUTE_ID))?;
        if name.offset != attribute_root.offset
            && !self.has_ancestor(name.offset, attribute_root.offset)?
        {
            return Err(Error::NotAnAttribute(name.identity()));
        }
        self.validate(&refinement.value)
    }

    /// All transitive ancestors of a concept, following active outbound
    /// Is-A edges. The cache invariant rules out cycles, but the visited
    /// set keeps diamonds linear.
    pub fn ancestors(&self, concept_offset: u32) -> Result<Vec<u32>> {
        let concepts = self.cache.concepts();
        let relationships = self.cache.relationships();
        let refs = self.cache.refs();
        let is_a = self.cache.is_a_index();

        let mut seen: HashSet<u32> = HashSet::new();
        let mut queue: VecDeque<u32> = VecDeque::new();
        queue.push_back(concept_offset);
        while let Some(offset) = queue.pop_front() {
            let record = concepts.at(offset)?;
            for rel_offset in refs.at(record.outbounds_ref())?.iter() {
                let rel = relationships.at(rel_offset)?;
                if !rel.is_active() || rel.type_ref() != is_a {
                    continue;
                }
                if seen.insert(rel.target_ref()) {
                    queue.push_back(rel.target_ref());
                }
            }
        }
        seen.remove(&concept_offset);
        let mut out: Vec<u32> = seen.into_iter().collect();
        out.sort_unstable();
        Ok(out)
    }

    pub fn has_ancestor(&self, concept_offset: u32, ancestor_offset: u32) -> Result<bool> {
        Ok(self.ancestors(concept_offset)?.contains(&ancestor_offset))
    }

    fn subsumed_or_equal(&self, ancestor: &ExpressionConcept, descendant: &ExpressionConcept) -> Result<bool> {
        if ancestor.code == descendant.code {
            return Ok(true);
        }
        let a = self.find_active(ancestor)?;
        let d = self.find_active(descendant)?;
        self.has_ancestor(d.offset, a.offset)
    }

    /// `a` subsumes `b` when every focus concept of `a` covers some focus
    /// concept of `b`, and every refinement of `a` is satisfied by some
    /// refinement of `b`.
    pub fn subsumes(&self, a: &Expression, b: &Expression) -> Result<bool> {
        for focus in &a.concepts {
            let mut covered = false;
            for candidate in &b.concepts {
                if self.subsumed_or_equal(focus, candidate)? {
                    covered = true;
                    break;
                }
            }
            if !covered {
                return Ok(false);
            }
        }

        let b_refinements = collect_refinements(b);
        for refinement in collect_refinements(a) {
            let mut satisfied = false;
            for candidate in &b_refinements {
                if self.subsumed_or_equal(&refinement.name, &candidate.name)?
                    && self.subsumes(&refinement.value, &candidate.value)?
                {
                    satisfied = true;
                    break;
                }
            }
            if !satisfied {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Display text for a cached concept: the preferred synonym in the
    /// requested language, then any synonym in it, then the fully
    /// specified name, then anything.
    pub fn display(&self, concept_offset: u32, language: &str) -> Result<Option<String>> {
        let concepts = self.cache.concepts();
        let descriptions = self.cache.descriptions();
        let strings = self.cache.strings();
        let refs = self.cache.refs();

        let record = concepts.at(concept_offset)?;
        let mut preferred = None;
        let mut synonym = None;
        let mut fsn = None;
        let mut any = None;
        for desc_offset in refs.at(record.descriptions_ref())?.iter() {
            let desc = descriptions.at(desc_offset)?;
            if !desc.is_active() {
                continue;
            }
            let text = strings.at(desc.string_ref())?;
            let lang = strings.at(desc.lang_ref())?;
            if any.is_none() {
                any = Some(text);
            }
            let lang_matches = language.is_empty() || lang.eq_ignore_ascii_case(language);
            match desc.kind() {
                DescriptionKind::FullySpecifiedName => {
                    if fsn.is_none() {
                        fsn = Some(text);
                    }
                }
                DescriptionKind::Synonym if lang_matches => {
                    if desc.is_preferred() && preferred.is_none() {
                        preferred = Some(text);
                    } else if synonym.is_none() {
                        synonym = Some(text);
                    }
                }
                _ => {}
            }
        }
        Ok(preferred
            .or(synonym)
            .or(fsn)
            .or(any)
            .map(|s| s.to_string()))
    }

    /// All designations (description texts with language and kind) of a
    /// cached concept.
    pub fn descriptions_of(
        &self,
        concept_offset: u32,
    ) -> Result<Vec<(String, String, DescriptionKind, bool)>> {
        let concepts = self.cache.concepts();
        let descriptions = self.cache.descriptions();
        let strings = self.cache.strings();
        let refs = self.cache.refs();

        let record = concepts.at(concept_offset)?;
        let mut out = Vec::new();
        for desc_offset in refs.at(record.descriptions_ref())?.iter() {
            let desc = descriptions.at(desc_offset)?;
            if !desc.is_active() {
                continue;
            }
            out.push((
                strings.at(desc.lang_ref())?.to_string(),
                strings.at(desc.string_ref())?.to_string(),
                desc.kind(),
                desc.is_preferred(),
            ));
        }
        Ok(out)
    }
}

fn collect_refinements(expression: &Expression) -> Vec<&Refinement> {
    let mut out: Vec<&Refinement> = expression.refinements.iter().collect();
    for group in &expression.groups {
        out.extend(group.refinements.iter());
    }
    out
}
