use crate::error::{RecResult, RecommenderError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::RawId;

/// Bidirectional mapping between raw dataset ids and dense embedding rows.
///
/// Indices are handed out in first-seen order: the arena holds the raw id of
/// every slot, the lookup table answers the reverse question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<RawId>", into = "Vec<RawId>")]
pub struct IdIndex {
    ids: Vec<RawId>,
    lookup: HashMap<RawId, usize>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<I>(raw_ids: I) -> Self
    where
        I: IntoIterator<Item = RawId>,
    {
        let mut index = Self::new();
        for id in raw_ids {
            index.insert(id);
        }
        index
    }

    /// Returns the dense index for `id`, assigning the next slot on first sight.
    pub fn insert(&mut self, id: RawId) -> usize {
        if let Some(&idx) = self.lookup.get(&id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id);
        self.lookup.insert(id, idx);
        idx
    }

    pub fn index_of(&self, id: RawId) -> Option<usize> {
        self.lookup.get(&id).copied()
    }

    pub fn raw_id(&self, index: usize) -> RecResult<RawId> {
        self.ids
            .get(index)
            .copied()
            .ok_or(RecommenderError::UnknownIndex(index))
    }

    pub fn reverse(&self) -> HashMap<usize, RawId> {
        self.ids.iter().enumerate().map(|(i, &id)| (i, id)).collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates `(index, raw_id)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, RawId)> + '_ {
        self.ids.iter().copied().enumerate()
    }
}

/// A persisted index lists every raw id exactly once; a repeat means the file is corrupt.
impl TryFrom<Vec<RawId>> for IdIndex {
    type Error = RecommenderError;

    fn try_from(ids: Vec<RawId>) -> Result<Self, Self::Error> {
        let mut index = Self::new();
        for id in ids {
            if index.index_of(id).is_some() {
                return Err(RecommenderError::DuplicateId(id));
            }
            index.insert(id);
        }
        Ok(index)
    }
}

impl From<IdIndex> for Vec<RawId> {
    fn from(index: IdIndex) -> Self {
        index.ids
    }
}

impl PartialEq for IdIndex {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

/// User and movie indices built from the same training slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdMappings {
    pub users: IdIndex,
    pub movies: IdIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order_with_duplicates() {
        let index = IdIndex::build(vec![42, 7, 42, 13, 7, 99]);
        assert_eq!(index.len(), 4);
        assert_eq!(index.index_of(42), Some(0));
        assert_eq!(index.index_of(7), Some(1));
        assert_eq!(index.index_of(13), Some(2));
        assert_eq!(index.index_of(99), Some(3));
        assert_eq!(index.index_of(5), None);
    }

    #[test]
    fn test_reverse_is_exact_inverse() {
        let raw = vec![10, -3, 10, 250, 8, -3, 8, 1];
        let index = IdIndex::build(raw.clone());
        let reverse = index.reverse();
        assert_eq!(reverse.len(), index.len());
        for x in raw {
            let idx = index.index_of(x).unwrap();
            assert_eq!(reverse[&idx], x);
            assert_eq!(index.raw_id(idx).unwrap(), x);
        }
    }

    #[test]
    fn test_unknown_index_fails_loudly() {
        let index = IdIndex::build(vec![1, 2]);
        assert!(matches!(
            index.raw_id(2),
            Err(RecommenderError::UnknownIndex(2))
        ));
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut index = IdIndex::new();
        assert_eq!(index.insert(5), 0);
        assert_eq!(index.insert(6), 1);
        assert_eq!(index.insert(5), 0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_serde_keeps_assignment() {
        let mappings = IdMappings {
            users: IdIndex::build(vec![3, 1, 2]),
            movies: IdIndex::build(vec![100, 50]),
        };
        let json = serde_json::to_string(&mappings).unwrap();
        assert_eq!(json, r#"{"users":[3,1,2],"movies":[100,50]}"#);
        let back: IdMappings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mappings);
        assert_eq!(back.users.index_of(2), Some(2));
    }

    #[test]
    fn test_duplicate_ids_are_rejected_on_load() {
        let err = serde_json::from_str::<IdMappings>(r#"{"users":[3,1,3],"movies":[100]}"#).unwrap_err();
        assert!(err.to_string().contains("Duplicate raw id 3"));

        assert!(matches!(
            IdIndex::try_from(vec![5, 6, 5]),
            Err(RecommenderError::DuplicateId(5))
        ));
        assert_eq!(IdIndex::try_from(vec![5, 6]).unwrap().len(), 2);
    }
}
