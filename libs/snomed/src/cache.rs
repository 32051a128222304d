//! The SNOMED CT binary cache.
//!
//! A single little-endian file of length-prefixed tables, memory-mapped and
//! exposed through typed views that borrow the underlying buffer. Record
//! cross-references are byte offsets into the owning table; every offset is
//! bounds-checked before use.

use crate::error::{Error, Result};
use std::fs::File;
use std::ops::Range;
use std::path::Path;

/// Magic first byte; bumped whenever the layout changes.
pub const CACHE_VERSION: u8 = 5;

/// SNOMED CT "Is a" relationship type.
pub const IS_A_ID: u64 = 116680003;
/// SNOMED CT "Concept model attribute": every refinement name must descend
/// from it.
pub const CONCEPT_MODEL_ATTRIBUTE_ID: u64 = 410662002;
/// SNOMED CT root concept.
pub const ROOT_CONCEPT_ID: u64 = 138875005;

pub const CONCEPT_RECORD_SIZE: usize = 38;
pub const DESCRIPTION_RECORD_SIZE: usize = 26;
pub const DESCRIPTION_INDEX_RECORD_SIZE: usize = 12;
pub const RELATIONSHIP_RECORD_SIZE: usize = 18;
pub const WORD_RECORD_SIZE: usize = 8;
pub const REFSET_MEMBER_RECORD_SIZE: usize = 17;
pub const REFSET_INDEX_RECORD_SIZE: usize = 12;

pub const CONCEPT_FLAG_ACTIVE: u8 = 0x01;
pub const CONCEPT_FLAG_PRIMITIVE: u8 = 0x02;
pub const DESCRIPTION_FLAG_ACTIVE: u8 = 0x01;
pub const DESCRIPTION_FLAG_PREFERRED: u8 = 0x02;
pub const RELATIONSHIP_FLAG_ACTIVE: u8 = 0x01;

/// Description kinds stored in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    FullySpecifiedName,
    Synonym,
    Definition,
}

impl DescriptionKind {
    pub fn to_byte(self) -> u8 {
        match self {
            DescriptionKind::FullySpecifiedName => 1,
            DescriptionKind::Synonym => 2,
            DescriptionKind::Definition => 3,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            1 => DescriptionKind::FullySpecifiedName,
            3 => DescriptionKind::Definition,
            _ => DescriptionKind::Synonym,
        }
    }
}

#[derive(Debug)]
enum CacheData {
    Mapped(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl CacheData {
    fn bytes(&self) -> &[u8] {
        match self {
            CacheData::Mapped(m) => m,
            CacheData::Owned(v) => v,
        }
    }
}

/// Byte ranges of each table within the file, plus decoded header fields.
#[derive(Debug)]
struct Layout {
    version_uri: String,
    version_date: String,
    edition: String,
    version: String,
    default_language: String,
    is_a_index: u32,
    active_roots: Vec<u64>,
    inactive_roots: Vec<u64>,
    strings: Range<usize>,
    refs: Range<usize>,
    descriptions: Range<usize>,
    words: Range<usize>,
    stems: Range<usize>,
    concepts: Range<usize>,
    relationships: Range<usize>,
    description_index: Range<usize>,
    refset_members: Range<usize>,
    refset_index: Range<usize>,
}

#[derive(Debug)]
pub struct CacheFile {
    data: CacheData,
    layout: Layout,
}

impl CacheFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // The cache is read-only for the whole process lifetime.
        let map = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_data(CacheData::Mapped(map))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(CacheData::Owned(bytes))
    }

    fn from_data(data: CacheData) -> Result<Self> {
        let layout = read_layout(data.bytes())?;
        Ok(Self { data, layout })
    }

    pub fn version_uri(&self) -> &str {
        &self.layout.version_uri
    }

    pub fn version_date(&self) -> &str {
        &self.layout.version_date
    }

    pub fn edition(&self) -> &str {
        &self.layout.edition
    }

    pub fn version(&self) -> &str {
        &self.layout.version
    }

    pub fn default_language(&self) -> &str {
        &self.layout.default_language
    }

    /// Byte offset of the Is-A relationship type concept in the Concepts
    /// table.
    pub fn is_a_index(&self) -> u32 {
        self.layout.is_a_index
    }

    pub fn active_roots(&self) -> &[u64] {
        &self.layout.active_roots
    }

    pub fn inactive_roots(&self) -> &[u64] {
        &self.layout.inactive_roots
    }

    fn table(&self, range: &Range<usize>) -> &[u8] {
        &self.data.bytes()[range.clone()]
    }

    pub fn strings(&self) -> Strings<'_> {
        Strings {
            data: self.table(&self.layout.strings),
        }
    }

    pub fn refs(&self) -> References<'_> {
        References {
            data: self.table(&self.layout.refs),
        }
    }

    pub fn concepts(&self) -> Concepts<'_> {
        Concepts {
            data: self.table(&self.layout.concepts),
        }
    }

    pub fn descriptions(&self) -> Descriptions<'_> {
        Descriptions {
            data: self.table(&self.layout.descriptions),
        }
    }

    pub fn description_index(&self) -> DescriptionIndex<'_> {
        DescriptionIndex {
            data: self.table(&self.layout.description_index),
        }
    }

    pub fn relationships(&self) -> Relationships<'_> {
        Relationships {
            data: self.table(&self.layout.relationships),
        }
    }

    pub fn words(&self) -> WordIndex<'_> {
        WordIndex {
            data: self.table(&self.layout.words),
        }
    }

    pub fn stems(&self) -> WordIndex<'_> {
        WordIndex {
            data: self.table(&self.layout.stems),
        }
    }

    pub fn refset_members(&self) -> RefSetMembers<'_> {
        RefSetMembers {
            data: self.table(&self.layout.refset_members),
        }
    }

    pub fn refset_index(&self) -> RefSetIndex<'_> {
        RefSetIndex {
            data: self.table(&self.layout.refset_index),
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::Corrupt("truncated header".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::Corrupt("truncated file".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn string(&mut self) -> Result<String> {
        let len = u16::from_le_bytes(self.take(2)?.try_into().unwrap()) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Corrupt("header string is not UTF-8".into()))
    }

    fn blob(&mut self) -> Result<Range<usize>> {
        let len = self.u32()? as usize;
        let start = self.pos;
        self.take(len)?;
        Ok(start..start + len)
    }
}

fn read_layout(bytes: &[u8]) -> Result<Layout> {
    let mut r = Reader {
        data: bytes,
        pos: 0,
    };
    let version = r.u8()?;
    if version != CACHE_VERSION {
        return Err(Error::UnknownCacheVersion {
            found: version,
            expected: CACHE_VERSION,
        });
    }

    let version_uri = r.string()?;
    let version_date = r.string()?;
    let edition = r.string()?;
    let release_version = r.string()?;
    let default_language = r.string()?;
    let is_a_index = r.u32()?;

    let mut active_roots = Vec::new();
    for _ in 0..r.u32()? {
        active_roots.push(r.u64()?);
    }
    let mut inactive_roots = Vec::new();
    for _ in 0..r.u32()? {
        inactive_roots.push(r.u64()?);
    }

    let strings = r.blob()?;
    let refs = r.blob()?;
    let descriptions = r.blob()?;
    let words = r.blob()?;
    let stems = r.blob()?;
    let concepts = r.blob()?;
    let relationships = r.blob()?;
    let description_index = r.blob()?;
    let refset_members = r.blob()?;
    let refset_index = r.blob()?;

    if concepts.len() % CONCEPT_RECORD_SIZE != 0 {
        return Err(Error::Corrupt("concept table length is not a whole number of records".into()));
    }
    if relationships.len() % RELATIONSHIP_RECORD_SIZE != 0 {
        return Err(Error::Corrupt("relationship table length is not a whole number of records".into()));
    }

    Ok(Layout {
        version_uri,
        version_date,
        edition,
        version: release_version,
        default_language,
        is_a_index,
        active_roots,
        inactive_roots,
        strings,
        refs,
        descriptions,
        words,
        stems,
        concepts,
        relationships,
        description_index,
        refset_members,
        refset_index,
    })
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn check_range(table: &'static str, data: &[u8], offset: u32, need: usize) -> Result<usize> {
    let at = offset as usize;
    if at.checked_add(need).map_or(true, |end| end > data.len()) {
        return Err(Error::OffsetOutOfRange {
            table,
            offset,
            len: data.len(),
        });
    }
    Ok(at)
}

/// Raw UTF-8 entries addressed by byte offset (u16 length prefix).
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    pub fn at(&self, offset: u32) -> Result<&'a str> {
        let at = check_range("strings", self.data, offset, 2)?;
        let len = read_u16(self.data, at) as usize;
        let start = check_range("strings", self.data, offset + 2, len)?;
        std::str::from_utf8(&self.data[start..start + len])
            .map_err(|_| Error::Corrupt(format!("string at {offset} is not UTF-8")))
    }
}

/// A borrowed, length-prefixed array of 32-bit offsets.
#[derive(Clone, Copy)]
pub struct RefSlice<'a> {
    data: &'a [u8],
}

impl<'a> RefSlice<'a> {
    pub fn len(&self) -> usize {
        self.data.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> u32 {
        read_u32(self.data, index * 4)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + 'a {
        let data = self.data;
        (0..self.len()).map(move |i| read_u32(data, i * 4))
    }

    pub fn contains(&self, value: u32) -> bool {
        self.iter().any(|v| v == value)
    }
}

/// Packed arrays of offsets, addressed by byte offset (u32 count prefix).
pub struct References<'a> {
    data: &'a [u8],
}

impl<'a> References<'a> {
    /// Sentinel for "no list": offset 0 holds an empty list in every cache
    /// this crate writes.
    pub fn at(&self, offset: u32) -> Result<RefSlice<'a>> {
        let at = check_range("refs", self.data, offset, 4)?;
        let count = read_u32(self.data, at) as usize;
        let start = check_range("refs", self.data, offset + 4, count * 4)?;
        Ok(RefSlice {
            data: &self.data[start..start + count * 4],
        })
    }
}

/// Constant-time structured view of one concept record.
#[derive(Clone, Copy)]
pub struct ConceptRecord<'a> {
    data: &'a [u8],
    pub offset: u32,
}

impl<'a> ConceptRecord<'a> {
    pub fn identity(&self) -> u64 {
        read_u64(self.data, 0)
    }

    pub fn flags(&self) -> u8 {
        self.data[8]
    }

    pub fn is_active(&self) -> bool {
        self.flags() & CONCEPT_FLAG_ACTIVE != 0
    }

    pub fn is_primitive(&self) -> bool {
        self.flags() & CONCEPT_FLAG_PRIMITIVE != 0
    }

    pub fn effective_date(&self) -> u32 {
        read_u32(self.data, 9)
    }

    pub fn active_parents_ref(&self) -> u32 {
        read_u32(self.data, 13)
    }

    pub fn active_children_ref(&self) -> u32 {
        read_u32(self.data, 17)
    }

    pub fn descriptions_ref(&self) -> u32 {
        read_u32(self.data, 21)
    }

    pub fn inbounds_ref(&self) -> u32 {
        read_u32(self.data, 25)
    }

    pub fn outbounds_ref(&self) -> u32 {
        read_u32(self.data, 29)
    }

    pub fn depth(&self) -> u8 {
        self.data[33]
    }

    pub fn module_ref(&self) -> u32 {
        read_u32(self.data, 34)
    }
}

pub struct Concepts<'a> {
    data: &'a [u8],
}

impl<'a> Concepts<'a> {
    pub fn count(&self) -> usize {
        self.data.len() / CONCEPT_RECORD_SIZE
    }

    pub fn at(&self, offset: u32) -> Result<ConceptRecord<'a>> {
        if offset as usize % CONCEPT_RECORD_SIZE != 0 {
            return Err(Error::Corrupt(format!(
                "concept offset {offset} is not record-aligned"
            )));
        }
        let at = check_range("concepts", self.data, offset, CONCEPT_RECORD_SIZE)?;
        Ok(ConceptRecord {
            data: &self.data[at..at + CONCEPT_RECORD_SIZE],
            offset,
        })
    }

    pub fn by_index(&self, index: usize) -> Result<ConceptRecord<'a>> {
        self.at((index * CONCEPT_RECORD_SIZE) as u32)
    }

    /// Binary search over the identity-sorted records.
    pub fn find(&self, identity: u64) -> Option<ConceptRecord<'a>> {
        let mut low = 0usize;
        let mut high = self.count();
        while low < high {
            let mid = (low + high) / 2;
            let record = self.by_index(mid).ok()?;
            match record.identity().cmp(&identity) {
                std::cmp::Ordering::Equal => return Some(record),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = ConceptRecord<'a>> + '_ {
        (0..self.count()).filter_map(|i| self.by_index(i).ok())
    }
}

#[derive(Clone, Copy)]
pub struct DescriptionRecord<'a> {
    data: &'a [u8],
    pub offset: u32,
}

impl<'a> DescriptionRecord<'a> {
    pub fn id(&self) -> u64 {
        read_u64(self.data, 0)
    }

    pub fn concept_ref(&self) -> u32 {
        read_u32(self.data, 8)
    }

    pub fn string_ref(&self) -> u32 {
        read_u32(self.data, 12)
    }

    pub fn lang_ref(&self) -> u32 {
        read_u32(self.data, 16)
    }

    pub fn kind(&self) -> DescriptionKind {
        DescriptionKind::from_byte(self.data[20])
    }

    pub fn is_active(&self) -> bool {
        self.data[21] & DESCRIPTION_FLAG_ACTIVE != 0
    }

    pub fn is_preferred(&self) -> bool {
        self.data[21] & DESCRIPTION_FLAG_PREFERRED != 0
    }

    pub fn effective_date(&self) -> u32 {
        read_u32(self.data, 22)
    }
}

pub struct Descriptions<'a> {
    data: &'a [u8],
}

impl<'a> Descriptions<'a> {
    pub fn at(&self, offset: u32) -> Result<DescriptionRecord<'a>> {
        if offset as usize % DESCRIPTION_RECORD_SIZE != 0 {
            return Err(Error::Corrupt(format!(
                "description offset {offset} is not record-aligned"
            )));
        }
        let at = check_range("descriptions", self.data, offset, DESCRIPTION_RECORD_SIZE)?;
        Ok(DescriptionRecord {
            data: &self.data[at..at + DESCRIPTION_RECORD_SIZE],
            offset,
        })
    }
}

/// Sorted `(description id → description offset)` pairs.
pub struct DescriptionIndex<'a> {
    data: &'a [u8],
}

impl<'a> DescriptionIndex<'a> {
    pub fn count(&self) -> usize {
        self.data.len() / DESCRIPTION_INDEX_RECORD_SIZE
    }

    pub fn find(&self, description_id: u64) -> Option<u32> {
        let mut low = 0usize;
        let mut high = self.count();
        while low < high {
            let mid = (low + high) / 2;
            let at = mid * DESCRIPTION_INDEX_RECORD_SIZE;
            let id = read_u64(self.data, at);
            match id.cmp(&description_id) {
                std::cmp::Ordering::Equal => return Some(read_u32(self.data, at + 8)),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        None
    }
}

#[derive(Clone, Copy)]
pub struct RelationshipRecord<'a> {
    data: &'a [u8],
    pub offset: u32,
}

impl<'a> RelationshipRecord<'a> {
    pub fn source_ref(&self) -> u32 {
        read_u32(self.data, 0)
    }

    pub fn target_ref(&self) -> u32 {
        read_u32(self.data, 4)
    }

    pub fn type_ref(&self) -> u32 {
        read_u32(self.data, 8)
    }

    pub fn group(&self) -> u8 {
        self.data[12]
    }

    pub fn is_active(&self) -> bool {
        self.data[13] & RELATIONSHIP_FLAG_ACTIVE != 0
    }

    pub fn effective_date(&self) -> u32 {
        read_u32(self.data, 14)
    }
}

pub struct Relationships<'a> {
    data: &'a [u8],
}

impl<'a> Relationships<'a> {
    pub fn at(&self, offset: u32) -> Result<RelationshipRecord<'a>> {
        if offset as usize % RELATIONSHIP_RECORD_SIZE != 0 {
            return Err(Error::Corrupt(format!(
                "relationship offset {offset} is not record-aligned"
            )));
        }
        let at = check_range("relationships", self.data, offset, RELATIONSHIP_RECORD_SIZE)?;
        Ok(RelationshipRecord {
            data: &self.data[at..at + RELATIONSHIP_RECORD_SIZE],
            offset,
        })
    }
}

/// Case-insensitive sorted word (or stem) index into the Strings table.
pub struct WordIndex<'a> {
    data: &'a [u8],
}

pub struct WordEntry<'a> {
    pub string_ref: u32,
    pub concepts_ref: u32,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> WordIndex<'a> {
    pub fn count(&self) -> usize {
        self.data.len() / WORD_RECORD_SIZE
    }

    pub fn entry(&self, index: usize) -> WordEntry<'a> {
        let at = index * WORD_RECORD_SIZE;
        WordEntry {
            string_ref: read_u32(self.data, at),
            concepts_ref: read_u32(self.data, at + 4),
            _marker: std::marker::PhantomData,
        }
    }

    /// All entries whose word starts with `prefix`, case-insensitively.
    /// The index is sorted by lowercased word, so a binary search finds the
    /// first candidate and a linear scan collects the run.
    pub fn find_prefix(&self, strings: &Strings<'a>, prefix: &str) -> Result<Vec<WordEntry<'a>>> {
        let needle = prefix.to_lowercase();
        let mut low = 0usize;
        let mut high = self.count();
        while low < high {
            let mid = (low + high) / 2;
            let word = strings.at(self.entry(mid).string_ref)?.to_lowercase();
            if word.as_str() < needle.as_str() {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        let mut out = Vec::new();
        for i in low..self.count() {
            let entry = self.entry(i);
            let word = strings.at(entry.string_ref)?.to_lowercase();
            if !word.starts_with(&needle) {
                break;
            }
            out.push(entry);
        }
        Ok(out)
    }
}

#[derive(Clone, Copy)]
pub struct RefSetMemberRecord<'a> {
    data: &'a [u8],
}

impl<'a> RefSetMemberRecord<'a> {
    pub fn refset_ref(&self) -> u32 {
        read_u32(self.data, 0)
    }

    pub fn component_id(&self) -> u64 {
        read_u64(self.data, 4)
    }

    pub fn is_active(&self) -> bool {
        self.data[12] & 0x01 != 0
    }

    pub fn effective_date(&self) -> u32 {
        read_u32(self.data, 13)
    }
}

pub struct RefSetMembers<'a> {
    data: &'a [u8],
}

impl<'a> RefSetMembers<'a> {
    pub fn at(&self, offset: u32) -> Result<RefSetMemberRecord<'a>> {
        let at = check_range("refset-members", self.data, offset, REFSET_MEMBER_RECORD_SIZE)?;
        Ok(RefSetMemberRecord {
            data: &self.data[at..at + REFSET_MEMBER_RECORD_SIZE],
        })
    }

    pub fn run(&self, start: u32, count: u32) -> Result<Vec<RefSetMemberRecord<'a>>> {
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            out.push(self.at(start + i * REFSET_MEMBER_RECORD_SIZE as u32)?);
        }
        Ok(out)
    }
}

pub struct RefSetIndexEntry {
    pub concept_ref: u32,
    pub members_start: u32,
    pub member_count: u32,
}

pub struct RefSetIndex<'a> {
    data: &'a [u8],
}

impl<'a> RefSetIndex<'a> {
    pub fn count(&self) -> usize {
        self.data.len() / REFSET_INDEX_RECORD_SIZE
    }

    pub fn entry(&self, index: usize) -> RefSetIndexEntry {
        let at = index * REFSET_INDEX_RECORD_SIZE;
        RefSetIndexEntry {
            concept_ref: read_u32(self.data, at),
            members_start: read_u32(self.data, at + 4),
            member_count: read_u32(self.data, at + 8),
        }
    }

    pub fn find(&self, concept_ref: u32) -> Option<RefSetIndexEntry> {
        (0..self.count())
            .map(|i| self.entry(i))
            .find(|e| e.concept_ref == concept_ref)
    }
}
