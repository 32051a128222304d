//! Derived view over a CodeSystem: flattened concepts plus hierarchy
//! closure maps, built once at construction and immutable afterwards.

use crate::code_system::{CodeSystem, CodeSystemConcept, CodeSystemContentMode};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// Index of a concept within a [`CodeSystemDocument`].
pub type ConceptIndex = usize;

#[derive(Debug)]
pub struct CodeSystemDocument {
    resource: CodeSystem,
    /// Flattened concepts in declared tree preorder.
    concepts: Vec<CodeSystemConcept>,
    code_map: HashMap<String, ConceptIndex>,
    parent_map: Vec<Vec<ConceptIndex>>,
    child_map: Vec<Vec<ConceptIndex>>,
    ancestor_map: Vec<Vec<ConceptIndex>>,
    descendant_map: Vec<Vec<ConceptIndex>>,
    roots: Vec<ConceptIndex>,
}

impl CodeSystemDocument {
    pub fn new(resource: CodeSystem) -> Result<Self> {
        let mut concepts = Vec::new();
        let mut code_map = HashMap::new();
        let mut parent_map: Vec<Vec<ConceptIndex>> = Vec::new();
        let mut roots = Vec::new();

        // Flatten the declared tree iteratively in preorder.
        // Stack entries: (concept clone, declared parent index).
        let mut stack: Vec<(CodeSystemConcept, Option<ConceptIndex>)> = Vec::new();
        for concept in resource.concepts().iter().rev() {
            stack.push((concept.clone(), None));
        }
        while let Some((concept, parent)) = stack.pop() {
            let index = concepts.len();
            if code_map.insert(concept.code.clone(), index).is_some() {
                return Err(Error::DuplicateCode(concept.code));
            }
            parent_map.push(parent.into_iter().collect());
            if parent_map[index].is_empty() {
                roots.push(index);
            }
            for child in concept.children().iter().rev() {
                stack.push((child.clone(), Some(index)));
            }
            let mut flat = concept;
            flat.concept = None;
            concepts.push(flat);
        }

        // Property-declared edges ("parent" / "subsumedBy" / "child").
        for index in 0..concepts.len() {
            let mut extra_parents = Vec::new();
            let mut extra_children = Vec::new();
            for prop in concepts[index].properties() {
                let target = prop.value_code().or_else(|| prop.value_string());
                let Some(code) = target else { continue };
                match prop.code.as_str() {
                    "parent" | "subsumedBy" => match code_map.get(code) {
                        Some(p) => extra_parents.push(*p),
                        None => {
                            return Err(Error::UnknownParent {
                                code: concepts[index].code.clone(),
                                parent: code.to_string(),
                            })
                        }
                    },
                    "child" => match code_map.get(code) {
                        Some(c) => extra_children.push(*c),
                        None => {
                            return Err(Error::UnknownParent {
                                code: concepts[index].code.clone(),
                                parent: code.to_string(),
                            })
                        }
                    },
                    _ => {}
                }
            }
            for p in extra_parents {
                if !parent_map[index].contains(&p) {
                    parent_map[index].push(p);
                    roots.retain(|r| *r != index);
                }
            }
            for c in extra_children {
                if !parent_map[c].contains(&index) {
                    parent_map[c].push(index);
                    roots.retain(|r| *r != c);
                }
            }
        }

        let mut child_map: Vec<Vec<ConceptIndex>> = vec![Vec::new(); concepts.len()];
        for (index, parents) in parent_map.iter().enumerate() {
            for parent in parents {
                child_map[*parent].push(index);
            }
        }

        let ancestor_map = build_closure(&parent_map, &concepts)?;
        let descendant_map = build_closure(&child_map, &concepts)?;

        Ok(Self {
            resource,
            concepts,
            code_map,
            parent_map,
            child_map,
            ancestor_map,
            descendant_map,
            roots,
        })
    }

    pub fn resource(&self) -> &CodeSystem {
        &self.resource
    }

    pub fn url(&self) -> &str {
        &self.resource.url
    }

    pub fn version(&self) -> Option<&str> {
        self.resource.version.as_deref()
    }

    pub fn content_mode(&self) -> CodeSystemContentMode {
        self.resource.content
    }

    /// Total number of concepts; for `content=complete` this equals the
    /// concept count visible to expansion.
    pub fn total_count(&self) -> usize {
        self.concepts.len()
    }

    pub fn has_hierarchy(&self) -> bool {
        self.parent_map.iter().any(|p| !p.is_empty())
    }

    pub fn find(&self, code: &str) -> Option<ConceptIndex> {
        // Case sensitivity defaults to sensitive; an explicit `false`
        // enables the relaxed match.
        if let Some(index) = self.code_map.get(code) {
            return Some(*index);
        }
        if self.resource.case_sensitive == Some(false) {
            return self
                .code_map
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(code))
                .map(|(_, v)| *v);
        }
        None
    }

    pub fn concept(&self, index: ConceptIndex) -> &CodeSystemConcept {
        &self.concepts[index]
    }

    pub fn concept_by_code(&self, code: &str) -> Option<&CodeSystemConcept> {
        self.find(code).map(|i| self.concept(i))
    }

    /// All concepts in declared preorder.
    pub fn concepts_in_order(&self) -> impl Iterator<Item = (ConceptIndex, &CodeSystemConcept)> {
        self.concepts.iter().enumerate()
    }

    pub fn parents(&self, index: ConceptIndex) -> &[ConceptIndex] {
        &self.parent_map[index]
    }

    pub fn children(&self, index: ConceptIndex) -> &[ConceptIndex] {
        &self.child_map[index]
    }

    pub fn ancestors(&self, index: ConceptIndex) -> &[ConceptIndex] {
        &self.ancestor_map[index]
    }

    pub fn descendants(&self, index: ConceptIndex) -> &[ConceptIndex] {
        &self.descendant_map[index]
    }

    pub fn roots(&self) -> &[ConceptIndex] {
        &self.roots
    }

    pub fn is_ancestor(&self, ancestor: ConceptIndex, of: ConceptIndex) -> bool {
        self.ancestor_map[of].contains(&ancestor)
    }
}

/// Transitive closure over an edge list, iteratively (BFS per node).
/// A node reaching itself means the declared hierarchy has a cycle.
fn build_closure(
    edges: &[Vec<ConceptIndex>],
    concepts: &[CodeSystemConcept],
) -> Result<Vec<Vec<ConceptIndex>>> {
    let mut closure = Vec::with_capacity(edges.len());
    for start in 0..edges.len() {
        let mut seen: HashSet<ConceptIndex> = HashSet::new();
        let mut queue: VecDeque<ConceptIndex> = edges[start].iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            if node == start {
                return Err(Error::HierarchyCycle(concepts[start].code.clone()));
            }
            if seen.insert(node) {
                queue.extend(edges[node].iter().copied());
            }
        }
        let mut reachable: Vec<ConceptIndex> = seen.into_iter().collect();
        reachable.sort_unstable();
        closure.push(reachable);
    }
    Ok(closure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(resource: serde_json::Value) -> Result<CodeSystemDocument> {
        CodeSystemDocument::new(CodeSystem::from_json(resource).unwrap())
    }

    fn sample() -> serde_json::Value {
        json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/animals",
            "status": "active",
            "content": "complete",
            "concept": [
                {
                    "code": "animal",
                    "display": "Animal",
                    "concept": [
                        {
                            "code": "mammal",
                            "display": "Mammal",
                            "concept": [
                                {"code": "dog", "display": "Dog"},
                                {"code": "cat", "display": "Cat"}
                            ]
                        },
                        {"code": "bird", "display": "Bird"}
                    ]
                },
                {"code": "mineral", "display": "Mineral"}
            ]
        })
    }

    #[test]
    fn builds_maps() {
        let doc = document(sample()).unwrap();
        assert_eq!(doc.total_count(), 6);
        assert!(doc.has_hierarchy());

        let animal = doc.find("animal").unwrap();
        let mammal = doc.find("mammal").unwrap();
        let dog = doc.find("dog").unwrap();

        assert!(doc.parents(animal).is_empty());
        assert_eq!(doc.parents(dog), &[mammal]);
        assert!(doc.is_ancestor(animal, dog));
        assert!(!doc.is_ancestor(dog, animal));
        assert!(doc.descendants(animal).contains(&dog));
        assert_eq!(doc.roots().len(), 2);
    }

    #[test]
    fn rejects_duplicate_codes() {
        let err = document(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/dup",
            "status": "active",
            "content": "complete",
            "concept": [{"code": "a"}, {"code": "a"}]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateCode(_)));
    }

    #[test]
    fn property_edges_join_hierarchy() {
        let doc = document(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/props",
            "status": "active",
            "content": "complete",
            "concept": [
                {"code": "root"},
                {"code": "leaf", "property": [{"code": "parent", "valueCode": "root"}]}
            ]
        }))
        .unwrap();
        let root = doc.find("root").unwrap();
        let leaf = doc.find("leaf").unwrap();
        assert_eq!(doc.parents(leaf), &[root]);
        assert!(doc.is_ancestor(root, leaf));
    }

    #[test]
    fn rejects_cycles() {
        let err = document(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/cycle",
            "status": "active",
            "content": "complete",
            "concept": [
                {"code": "a", "property": [{"code": "parent", "valueCode": "b"}]},
                {"code": "b", "property": [{"code": "parent", "valueCode": "a"}]}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::HierarchyCycle(_)));
    }

    #[test]
    fn rejects_unknown_parent() {
        let err = document(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/orphan",
            "status": "active",
            "content": "complete",
            "concept": [
                {"code": "a", "property": [{"code": "parent", "valueCode": "missing"}]}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::UnknownParent { .. }));
    }

    #[test]
    fn case_insensitive_lookup() {
        let doc = document(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/fhir/CodeSystem/ci",
            "status": "active",
            "content": "complete",
            "caseSensitive": false,
            "concept": [{"code": "Abc"}]
        }))
        .unwrap();
        assert!(doc.find("abc").is_some());
        assert!(doc.find("ABC").is_some());
    }
}
