//! Filter execution machinery: a per-request context accumulating prepared
//! filter sets.

use std::any::Any;

/// One prepared filter set. Closed sets can be enumerated; grammar-based
/// sets (BCP-47, UCUM, SNOMED post-coordination) can only answer
/// membership.
pub trait PreparedFilter: Send {
    /// False for grammar-based sets that cannot be enumerated.
    fn closed(&self) -> bool {
        true
    }

    /// Number of concepts, when the set is closed and counted.
    fn size(&self) -> Option<usize> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Per-request filter execution context. Filter sets keep the order in
/// which they were added.
pub struct FilterContext {
    iterate: bool,
    filters: Vec<Box<dyn PreparedFilter>>,
}

impl FilterContext {
    pub fn new(iterate: bool) -> Self {
        Self {
            iterate,
            filters: Vec::new(),
        }
    }

    pub fn iterate(&self) -> bool {
        self.iterate
    }

    pub fn push(&mut self, filter: impl PreparedFilter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn filters(&self) -> &[Box<dyn PreparedFilter>] {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut [Box<dyn PreparedFilter>] {
        &mut self.filters
    }

    /// Hand the prepared sets to the caller for iteration.
    pub fn take_filters(&mut self) -> Vec<Box<dyn PreparedFilter>> {
        std::mem::take(&mut self.filters)
    }
}

/// The common closed filter set: a list of codes, optionally tagged with
/// search relevance ratings, plus an iteration cursor.
pub struct CodeFilter {
    codes: Vec<String>,
    ratings: Option<Vec<i32>>,
    cursor: Option<usize>,
}

impl CodeFilter {
    pub fn new(codes: Vec<String>) -> Self {
        Self {
            codes,
            ratings: None,
            cursor: None,
        }
    }

    pub fn with_ratings(mut rated: Vec<(String, i32)>, sort: bool) -> Self {
        if sort {
            rated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        }
        Self {
            codes: rated.iter().map(|(c, _)| c.clone()).collect(),
            ratings: Some(rated.into_iter().map(|(_, r)| r).collect()),
            cursor: None,
        }
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    /// Step the cursor; true while positioned on a concept.
    pub fn advance(&mut self) -> bool {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        self.cursor = Some(next);
        next < self.codes.len()
    }

    pub fn current(&self) -> Option<&str> {
        self.cursor
            .and_then(|i| self.codes.get(i))
            .map(|s| s.as_str())
    }

    pub fn current_rating(&self) -> Option<i32> {
        match (&self.ratings, self.cursor) {
            (Some(r), Some(i)) => r.get(i).copied(),
            _ => None,
        }
    }
}

impl PreparedFilter for CodeFilter {
    fn size(&self) -> Option<usize> {
        Some(self.codes.len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Closed filter set over sorted integer keys; membership is a binary
/// search. The database-backed providers materialize into this shape.
pub struct KeyFilter {
    keys: Vec<i64>,
    cursor: Option<usize>,
}

impl KeyFilter {
    pub fn new(mut keys: Vec<i64>) -> Self {
        keys.sort_unstable();
        keys.dedup();
        Self { keys, cursor: None }
    }

    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.keys.binary_search(&key).is_ok()
    }

    pub fn advance(&mut self) -> bool {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        self.cursor = Some(next);
        next < self.keys.len()
    }

    pub fn current(&self) -> Option<i64> {
        self.cursor.and_then(|i| self.keys.get(i)).copied()
    }
}

impl PreparedFilter for KeyFilter {
    fn size(&self) -> Option<usize> {
        Some(self.keys.len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
