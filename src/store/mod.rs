//! Concurrent per-identity array storage.
//!
//! Each identity owns at most one array. The map is sharded by key
//! (dashmap), so operations for different identities never contend on
//! one lock, while operations for the same identity serialize on its
//! entry. Stored content is always a defensive copy of the caller's
//! buffer.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes for repository operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The identity has no stored array.
    #[error("no array is stored for this identity")]
    NotFound,
    /// An `AfterIndex` insertion position outside `-1..=len-1`.
    #[error("insertion index {index} is outside -1..={max}")]
    InvalidIndex { index: i64, max: i64 },
    /// Placement was `AfterIndex` but no index was supplied.
    #[error("placement AfterIndex requires an index")]
    MissingIndex,
}

/// Where appended values land relative to the existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Prepend before the first element.
    Start,
    /// Append after the last element.
    End,
    /// Insert immediately after a 0-based index; `-1` means `Start`.
    AfterIndex,
}

/// One identity's array plus bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArray {
    pub numbers: Vec<i64>,
    /// Where the content came from (a file path, or `"generated"`).
    pub provenance: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Sharded identity -> array map.
#[derive(Debug, Default)]
pub struct ArrayRepository {
    arrays: DashMap<String, StoredArray>,
}

impl ArrayRepository {
    pub fn new() -> Self {
        Self {
            arrays: DashMap::new(),
        }
    }

    /// Store a copy of `numbers`, replacing any previous array wholesale.
    pub fn replace(&self, identity: &str, numbers: &[i64], provenance: Option<&str>) -> StoredArray {
        let stored = StoredArray {
            numbers: numbers.to_vec(),
            provenance: provenance.map(str::to_owned),
            updated_at: Utc::now(),
        };
        self.arrays.insert(identity.to_owned(), stored.clone());
        stored
    }

    /// Snapshot of the identity's current array.
    pub fn get(&self, identity: &str) -> Result<StoredArray, StoreError> {
        self.arrays
            .get(identity)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    /// Remove the identity's array. Returns whether one existed.
    pub fn delete(&self, identity: &str) -> bool {
        self.arrays.remove(identity).is_some()
    }

    /// Insert `values` as a contiguous block at the requested placement
    /// and return a snapshot of the updated array.
    pub fn append(
        &self,
        identity: &str,
        placement: Placement,
        values: &[i64],
        after_index: Option<i64>,
    ) -> Result<StoredArray, StoreError> {
        let mut entry = self.arrays.get_mut(identity).ok_or(StoreError::NotFound)?;

        let insert_at = match placement {
            Placement::Start => 0,
            Placement::End => entry.numbers.len(),
            Placement::AfterIndex => {
                let index = after_index.ok_or(StoreError::MissingIndex)?;
                let max = entry.numbers.len() as i64 - 1;
                if index < -1 || index > max {
                    return Err(StoreError::InvalidIndex { index, max });
                }
                (index + 1) as usize
            }
        };

        entry.numbers.splice(insert_at..insert_at, values.iter().copied());
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_then_get_returns_same_numbers() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[1, 2, 3], None);

        let stored = repo.get("user").unwrap();
        assert_eq!(stored.numbers, vec![1, 2, 3]);
        assert_eq!(stored.provenance, None);
    }

    #[test]
    fn replace_keeps_a_defensive_copy() {
        let repo = ArrayRepository::new();
        let mut buffer = vec![1, 2, 3];
        repo.replace("user", &buffer, Some("/tmp/input.txt"));

        buffer[0] = 99;
        assert_eq!(repo.get("user").unwrap().numbers, vec![1, 2, 3]);
    }

    #[test]
    fn replace_discards_previous_provenance() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[1], Some("/tmp/a.txt"));
        repo.replace("user", &[2], None);

        let stored = repo.get("user").unwrap();
        assert_eq!(stored.numbers, vec![2]);
        assert_eq!(stored.provenance, None);
    }

    #[test]
    fn get_unknown_identity_is_not_found() {
        let repo = ArrayRepository::new();
        assert_eq!(repo.get("ghost"), Err(StoreError::NotFound));
    }

    #[test]
    fn delete_reports_whether_array_existed() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[1], None);

        assert!(repo.delete("user"));
        assert!(!repo.delete("user"));
        assert_eq!(repo.get("user"), Err(StoreError::NotFound));
    }

    #[test]
    fn append_end() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[2, 3], None);

        let updated = repo.append("user", Placement::End, &[4, 5], None).unwrap();
        assert_eq!(updated.numbers, vec![2, 3, 4, 5]);
    }

    #[test]
    fn append_start_preserves_value_order() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[3, 4], None);

        let updated = repo.append("user", Placement::Start, &[1, 2], None).unwrap();
        assert_eq!(updated.numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn append_after_index_inserts_contiguous_block() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[1, 2, 5], None);

        let updated = repo
            .append("user", Placement::AfterIndex, &[3, 4], Some(1))
            .unwrap();
        assert_eq!(updated.numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn append_after_index_minus_one_matches_start() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[2, 3], None);

        let updated = repo
            .append("user", Placement::AfterIndex, &[9], Some(-1))
            .unwrap();
        assert_eq!(updated.numbers, vec![9, 2, 3]);
    }

    #[test]
    fn append_after_last_index_matches_end() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[2, 3], None);

        let updated = repo
            .append("user", Placement::AfterIndex, &[4], Some(1))
            .unwrap();
        assert_eq!(updated.numbers, vec![2, 3, 4]);
    }

    #[test]
    fn append_index_out_of_bounds_rejected() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[1, 2], None);

        for index in [-2, 2, 100] {
            let result = repo.append("user", Placement::AfterIndex, &[0], Some(index));
            assert_eq!(result, Err(StoreError::InvalidIndex { index, max: 1 }));
        }
    }

    #[test]
    fn append_after_index_without_index_rejected() {
        let repo = ArrayRepository::new();
        repo.replace("user", &[1], None);

        let result = repo.append("user", Placement::AfterIndex, &[0], None);
        assert_eq!(result, Err(StoreError::MissingIndex));
    }

    #[test]
    fn append_to_missing_array_is_not_found() {
        let repo = ArrayRepository::new();
        let result = repo.append("ghost", Placement::End, &[1], None);
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[test]
    fn append_refreshes_last_modified() {
        let repo = ArrayRepository::new();
        let before = repo.replace("user", &[1], None).updated_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        let after = repo.append("user", Placement::End, &[2], None).unwrap().updated_at;
        assert!(after > before);
    }

    #[test]
    fn identities_are_isolated() {
        let repo = ArrayRepository::new();
        repo.replace("alice", &[1], None);
        repo.replace("bob", &[2], None);

        repo.append("alice", Placement::End, &[3], None).unwrap();
        assert_eq!(repo.get("alice").unwrap().numbers, vec![1, 3]);
        assert_eq!(repo.get("bob").unwrap().numbers, vec![2]);

        assert!(repo.delete("alice"));
        assert_eq!(repo.get("bob").unwrap().numbers, vec![2]);
    }

    #[test]
    fn concurrent_mutation_of_distinct_identities() {
        use std::sync::Arc;

        let repo = Arc::new(ArrayRepository::new());
        for i in 0..8 {
            repo.replace(&format!("user_{i}"), &[0], None);
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    let identity = format!("user_{i}");
                    for value in 1..=50 {
                        repo.append(&identity, Placement::End, &[value], None).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8 {
            let stored = repo.get(&format!("user_{i}")).unwrap();
            assert_eq!(stored.numbers.len(), 51);
        }
    }
}
