//! Cache writer: assembles the binary cache format from structured input.
//! Importers feed it from RF2 releases; the test suites feed it miniature
//! editions.

use crate::cache::{
    DescriptionKind, CACHE_VERSION, CONCEPT_FLAG_ACTIVE, CONCEPT_FLAG_PRIMITIVE,
    CONCEPT_RECORD_SIZE, DESCRIPTION_FLAG_ACTIVE, DESCRIPTION_FLAG_PREFERRED,
    DESCRIPTION_RECORD_SIZE, IS_A_ID, RELATIONSHIP_FLAG_ACTIVE, RELATIONSHIP_RECORD_SIZE,
};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, VecDeque};

pub struct ConceptSpec {
    pub id: u64,
    pub active: bool,
    pub primitive: bool,
    pub effective_date: u32,
    pub module: u64,
    /// Active Is-A targets.
    pub parents: Vec<u64>,
}

pub struct DescriptionSpec {
    pub id: u64,
    pub concept: u64,
    pub text: String,
    pub lang: String,
    pub kind: DescriptionKind,
    pub active: bool,
    pub preferred: bool,
}

pub struct RelationshipSpec {
    pub source: u64,
    pub type_id: u64,
    pub target: u64,
    pub group: u8,
    pub active: bool,
}

pub struct RefSetMemberSpec {
    pub refset: u64,
    pub component: u64,
    pub active: bool,
}

#[derive(Default)]
pub struct CacheBuilder {
    pub version_uri: String,
    pub version_date: String,
    pub edition: String,
    pub version: String,
    pub default_language: String,
    concepts: Vec<ConceptSpec>,
    descriptions: Vec<DescriptionSpec>,
    relationships: Vec<RelationshipSpec>,
    refset_members: Vec<RefSetMemberSpec>,
    active_roots: Vec<u64>,
    inactive_roots: Vec<u64>,
}

impl CacheBuilder {
    pub fn new(version_uri: impl Into<String>, version_date: impl Into<String>) -> Self {
        Self {
            version_uri: version_uri.into(),
            version_date: version_date.into(),
            edition: "900000000000207008".to_string(),
            version: "test".to_string(),
            default_language: "en".to_string(),
            ..Default::default()
        }
    }

    pub fn concept(&mut self, id: u64, parents: &[u64]) -> &mut Self {
        self.concepts.push(ConceptSpec {
            id,
            active: true,
            primitive: true,
            effective_date: 20240101,
            module: 0,
            parents: parents.to_vec(),
        });
        self
    }

    pub fn inactive_concept(&mut self, id: u64) -> &mut Self {
        self.concepts.push(ConceptSpec {
            id,
            active: false,
            primitive: true,
            effective_date: 20240101,
            module: 0,
            parents: Vec::new(),
        });
        self
    }

    pub fn description(
        &mut self,
        id: u64,
        concept: u64,
        text: &str,
        lang: &str,
        kind: DescriptionKind,
        preferred: bool,
    ) -> &mut Self {
        self.descriptions.push(DescriptionSpec {
            id,
            concept,
            text: text.to_string(),
            lang: lang.to_string(),
            kind,
            active: true,
            preferred,
        });
        self
    }

    pub fn relationship(&mut self, source: u64, type_id: u64, target: u64, group: u8) -> &mut Self {
        self.relationships.push(RelationshipSpec {
            source,
            type_id,
            target,
            group,
            active: true,
        });
        self
    }

    pub fn refset_member(&mut self, refset: u64, component: u64) -> &mut Self {
        self.refset_members.push(RefSetMemberSpec {
            refset,
            component,
            active: true,
        });
        self
    }

    pub fn active_root(&mut self, id: u64) -> &mut Self {
        self.active_roots.push(id);
        self
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut concepts: Vec<&ConceptSpec> = self.concepts.iter().collect();
        concepts.sort_by_key(|c| c.id);

        let mut offset_of: HashMap<u64, u32> = HashMap::new();
        for (i, c) in concepts.iter().enumerate() {
            if offset_of
                .insert(c.id, (i * CONCEPT_RECORD_SIZE) as u32)
                .is_some()
            {
                return Err(Error::Corrupt(format!("duplicate concept {}", c.id)));
            }
        }
        let resolve = |id: u64| -> Result<u32> {
            offset_of
                .get(&id)
                .copied()
                .ok_or(Error::ConceptNotFound(id))
        };
        let is_a_index = resolve(IS_A_ID)?;

        let mut strings = StringsTable::default();
        let mut refs = RefsTable::default();

        // Is-A relationships derived from declared parents, then the
        // explicitly modelled ones.
        let mut relationships: Vec<(u32, u32, u32, u8, bool)> = Vec::new();
        for c in &concepts {
            for parent in &c.parents {
                relationships.push((resolve(c.id)?, resolve(*parent)?, is_a_index, 0, true));
            }
        }
        for r in &self.relationships {
            relationships.push((
                resolve(r.source)?,
                resolve(r.target)?,
                resolve(r.type_id)?,
                r.group,
                r.active,
            ));
        }

        let mut rel_blob = Vec::new();
        for (source, target, type_ref, group, active) in &relationships {
            rel_blob.extend_from_slice(&source.to_le_bytes());
            rel_blob.extend_from_slice(&target.to_le_bytes());
            rel_blob.extend_from_slice(&type_ref.to_le_bytes());
            rel_blob.push(*group);
            rel_blob.push(if *active { RELATIONSHIP_FLAG_ACTIVE } else { 0 });
            rel_blob.extend_from_slice(&20240101u32.to_le_bytes());
        }

        // Descriptions sorted by id, with the per-concept grouping refs.
        let mut descriptions: Vec<&DescriptionSpec> = self.descriptions.iter().collect();
        descriptions.sort_by_key(|d| d.id);
        let mut desc_blob = Vec::new();
        let mut desc_offset_of: HashMap<u64, u32> = HashMap::new();
        let mut descs_by_concept: HashMap<u64, Vec<u32>> = HashMap::new();
        for (i, d) in descriptions.iter().enumerate() {
            let offset = (i * DESCRIPTION_RECORD_SIZE) as u32;
            desc_offset_of.insert(d.id, offset);
            descs_by_concept.entry(d.concept).or_default().push(offset);
            desc_blob.extend_from_slice(&d.id.to_le_bytes());
            desc_blob.extend_from_slice(&resolve(d.concept)?.to_le_bytes());
            desc_blob.extend_from_slice(&strings.intern(&d.text).to_le_bytes());
            desc_blob.extend_from_slice(&strings.intern(&d.lang).to_le_bytes());
            desc_blob.push(d.kind.to_byte());
            let mut flags = 0u8;
            if d.active {
                flags |= DESCRIPTION_FLAG_ACTIVE;
            }
            if d.preferred {
                flags |= DESCRIPTION_FLAG_PREFERRED;
            }
            desc_blob.push(flags);
            desc_blob.extend_from_slice(&20240101u32.to_le_bytes());
        }

        // Relationship adjacency per concept.
        let mut outbound: HashMap<u64, Vec<u32>> = HashMap::new();
        let mut inbound: HashMap<u64, Vec<u32>> = HashMap::new();
        let mut children: HashMap<u64, Vec<u32>> = HashMap::new();
        for (i, (source, target, type_ref, _, active)) in relationships.iter().enumerate() {
            let rel_offset = (i * RELATIONSHIP_RECORD_SIZE) as u32;
            let source_id = concepts[*source as usize / CONCEPT_RECORD_SIZE].id;
            let target_id = concepts[*target as usize / CONCEPT_RECORD_SIZE].id;
            outbound.entry(source_id).or_default().push(rel_offset);
            inbound.entry(target_id).or_default().push(rel_offset);
            if *active && *type_ref == is_a_index {
                children.entry(target_id).or_default().push(*source);
            }
        }

        // Depths via BFS from parentless active concepts.
        let mut depth: HashMap<u64, u8> = HashMap::new();
        let mut queue: VecDeque<(u64, u8)> = concepts
            .iter()
            .filter(|c| c.parents.is_empty())
            .map(|c| (c.id, 0u8))
            .collect();
        while let Some((id, d)) = queue.pop_front() {
            if depth.contains_key(&id) {
                continue;
            }
            depth.insert(id, d);
            if let Some(kids) = children.get(&id) {
                for child_offset in kids {
                    let child_id = concepts[*child_offset as usize / CONCEPT_RECORD_SIZE].id;
                    queue.push_back((child_id, d.saturating_add(1)));
                }
            }
        }

        // Concept records.
        let mut concept_blob = Vec::new();
        for c in &concepts {
            let parents_ref =
                refs.store(&c.parents.iter().map(|p| resolve(*p)).collect::<Result<Vec<_>>>()?);
            let children_ref = refs.store(children.get(&c.id).map(|v| v.as_slice()).unwrap_or(&[]));
            let descriptions_ref =
                refs.store(descs_by_concept.get(&c.id).map(|v| v.as_slice()).unwrap_or(&[]));
            let inbounds_ref = refs.store(inbound.get(&c.id).map(|v| v.as_slice()).unwrap_or(&[]));
            let outbounds_ref =
                refs.store(outbound.get(&c.id).map(|v| v.as_slice()).unwrap_or(&[]));

            concept_blob.extend_from_slice(&c.id.to_le_bytes());
            let mut flags = 0u8;
            if c.active {
                flags |= CONCEPT_FLAG_ACTIVE;
            }
            if c.primitive {
                flags |= CONCEPT_FLAG_PRIMITIVE;
            }
            concept_blob.push(flags);
            concept_blob.extend_from_slice(&c.effective_date.to_le_bytes());
            concept_blob.extend_from_slice(&parents_ref.to_le_bytes());
            concept_blob.extend_from_slice(&children_ref.to_le_bytes());
            concept_blob.extend_from_slice(&descriptions_ref.to_le_bytes());
            concept_blob.extend_from_slice(&inbounds_ref.to_le_bytes());
            concept_blob.extend_from_slice(&outbounds_ref.to_le_bytes());
            concept_blob.push(depth.get(&c.id).copied().unwrap_or(0));
            let module_ref = if c.module != 0 {
                resolve(c.module)?
            } else {
                0
            };
            concept_blob.extend_from_slice(&module_ref.to_le_bytes());
        }

        // Word and stem indexes over active description texts.
        let mut words: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut stems: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for d in &descriptions {
            if !d.active {
                continue;
            }
            let concept_ref = resolve(d.concept)?;
            for word in d
                .text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let lower = word.to_lowercase();
                let stem = lower.strip_suffix('s').unwrap_or(&lower).to_string();
                words.entry(lower).or_default().push(concept_ref);
                stems.entry(stem).or_default().push(concept_ref);
            }
        }
        let mut word_blob = Vec::new();
        for (word, mut concept_refs) in words {
            concept_refs.sort_unstable();
            concept_refs.dedup();
            word_blob.extend_from_slice(&strings.intern(&word).to_le_bytes());
            word_blob.extend_from_slice(&refs.store(&concept_refs).to_le_bytes());
        }
        let mut stem_blob = Vec::new();
        for (stem, mut concept_refs) in stems {
            concept_refs.sort_unstable();
            concept_refs.dedup();
            stem_blob.extend_from_slice(&strings.intern(&stem).to_le_bytes());
            stem_blob.extend_from_slice(&refs.store(&concept_refs).to_le_bytes());
        }

        // Description id index.
        let mut desc_index_blob = Vec::new();
        for d in &descriptions {
            desc_index_blob.extend_from_slice(&d.id.to_le_bytes());
            desc_index_blob.extend_from_slice(&desc_offset_of[&d.id].to_le_bytes());
        }

        // Reference set members grouped by refset.
        let mut members_by_refset: BTreeMap<u64, Vec<&RefSetMemberSpec>> = BTreeMap::new();
        for m in &self.refset_members {
            members_by_refset.entry(m.refset).or_default().push(m);
        }
        let mut member_blob = Vec::new();
        let mut refset_index_blob = Vec::new();
        for (refset, members) in members_by_refset {
            let refset_ref = resolve(refset)?;
            let start = member_blob.len() as u32;
            for m in &members {
                member_blob.extend_from_slice(&refset_ref.to_le_bytes());
                member_blob.extend_from_slice(&m.component.to_le_bytes());
                member_blob.push(if m.active { 0x01 } else { 0 });
                member_blob.extend_from_slice(&20240101u32.to_le_bytes());
            }
            refset_index_blob.extend_from_slice(&refset_ref.to_le_bytes());
            refset_index_blob.extend_from_slice(&start.to_le_bytes());
            refset_index_blob.extend_from_slice(&(members.len() as u32).to_le_bytes());
        }

        // Assemble the file.
        let mut out = Vec::new();
        out.push(CACHE_VERSION);
        write_string(&mut out, &self.version_uri);
        write_string(&mut out, &self.version_date);
        write_string(&mut out, &self.edition);
        write_string(&mut out, &self.version);
        write_string(&mut out, &self.default_language);
        out.extend_from_slice(&is_a_index.to_le_bytes());

        let active_roots: Vec<u64> = if self.active_roots.is_empty() {
            concepts
                .iter()
                .filter(|c| c.active && c.parents.is_empty())
                .map(|c| c.id)
                .collect()
        } else {
            self.active_roots.clone()
        };
        out.extend_from_slice(&(active_roots.len() as u32).to_le_bytes());
        for r in &active_roots {
            out.extend_from_slice(&r.to_le_bytes());
        }
        out.extend_from_slice(&(self.inactive_roots.len() as u32).to_le_bytes());
        for r in &self.inactive_roots {
            out.extend_from_slice(&r.to_le_bytes());
        }

        write_blob(&mut out, &strings.blob);
        write_blob(&mut out, &refs.blob);
        write_blob(&mut out, &desc_blob);
        write_blob(&mut out, &word_blob);
        write_blob(&mut out, &stem_blob);
        write_blob(&mut out, &concept_blob);
        write_blob(&mut out, &rel_blob);
        write_blob(&mut out, &desc_index_blob);
        write_blob(&mut out, &member_blob);
        write_blob(&mut out, &refset_index_blob);
        Ok(out)
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn write_blob(out: &mut Vec<u8>, blob: &[u8]) {
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(blob);
}

#[derive(Default)]
struct StringsTable {
    blob: Vec<u8>,
    interned: HashMap<String, u32>,
}

impl StringsTable {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(offset) = self.interned.get(s) {
            return *offset;
        }
        let offset = self.blob.len() as u32;
        self.blob.extend_from_slice(&(s.len() as u16).to_le_bytes());
        self.blob.extend_from_slice(s.as_bytes());
        self.interned.insert(s.to_string(), offset);
        offset
    }
}

#[derive(Default)]
struct RefsTable {
    blob: Vec<u8>,
}

impl RefsTable {
    fn store(&mut self, values: &[u32]) -> u32 {
        // Offset 0 is the shared empty list.
        if self.blob.is_empty() {
            self.blob.extend_from_slice(&0u32.to_le_bytes());
        }
        if values.is_empty() {
            return 0;
        }
        let offset = self.blob.len() as u32;
        self.blob
            .extend_from_slice(&(values.len() as u32).to_le_bytes());
        for v in values {
            self.blob.extend_from_slice(&v.to_le_bytes());
        }
        offset
    }
}
