//! Range-bounded heap sort with operation instrumentation.
//!
//! Sorts a contiguous inclusive sub-range of an integer sequence in
//! ascending order using a binary max-heap, counting heap operations as
//! it goes:
//! - `build_operations`: one per sift-down call made while building the
//!   initial heap.
//! - `restore_operations`: one per sift-down call made while extracting
//!   maxima, plus one per element exchange performed inside any
//!   sift-down (including exchanges that happen during the build phase —
//!   consumers depend on these exact counts).
//!
//! The sorter is a pure function of its inputs: identical `(numbers,
//! range)` pairs always produce identical sorted output and counters.
//! Only the duration and completion timestamp vary between calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

/// Failure modes for a sort request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SortError {
    /// The input sequence has no elements.
    #[error("array contains no elements to sort")]
    EmptyInput,
    /// A range bound falls outside `0..=len-1`.
    #[error("range bound {bound} is outside 0..={max}")]
    RangeOutOfBounds { bound: i64, max: usize },
    /// The left bound is greater than the right bound.
    #[error("range start {start} is greater than range end {end}")]
    InvalidRange { start: usize, end: usize },
}

/// Everything a caller needs to report about one sort run.
///
/// `sorted_numbers` is the full array with the sorted sub-range spliced
/// back in; positions outside `range_start..=range_end` are untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOutcome {
    pub original_numbers: Vec<i64>,
    pub sorted_numbers: Vec<i64>,
    pub range_start: usize,
    pub range_end: usize,
    pub build_operations: u64,
    pub restore_operations: u64,
    pub duration_milliseconds: f64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct HeapCounters {
    build: u64,
    restore: u64,
}

/// Sort `numbers[start..=end]` ascending, leaving the rest untouched.
///
/// Bounds default to the full array when `None`. The timed section
/// covers only the heap algorithm itself, not the snapshot copies.
pub fn sort_range(
    numbers: &[i64],
    range_start: Option<i64>,
    range_end: Option<i64>,
) -> Result<SortOutcome, SortError> {
    if numbers.is_empty() {
        return Err(SortError::EmptyInput);
    }

    let max = numbers.len() - 1;
    let start = resolve_bound(range_start, 0, max)?;
    let end = resolve_bound(range_end, max, max)?;
    if start > end {
        return Err(SortError::InvalidRange { start, end });
    }

    let mut sorted = numbers.to_vec();
    let mut segment = sorted[start..=end].to_vec();

    let started = Instant::now();
    let counters = heap_sort_segment(&mut segment);
    let duration = started.elapsed();

    sorted[start..=end].copy_from_slice(&segment);

    Ok(SortOutcome {
        original_numbers: numbers.to_vec(),
        sorted_numbers: sorted,
        range_start: start,
        range_end: end,
        build_operations: counters.build,
        restore_operations: counters.restore,
        duration_milliseconds: duration.as_secs_f64() * 1000.0,
        finished_at: Utc::now(),
    })
}

fn resolve_bound(bound: Option<i64>, default: usize, max: usize) -> Result<usize, SortError> {
    match bound {
        None => Ok(default),
        Some(value) if value < 0 || value as usize > max => {
            Err(SortError::RangeOutOfBounds { bound: value, max })
        }
        Some(value) => Ok(value as usize),
    }
}

/// In-place heap sort of one segment, counting operations.
fn heap_sort_segment(segment: &mut [i64]) -> HeapCounters {
    let mut counters = HeapCounters::default();
    let len = segment.len();

    // Build phase: heapify from the last parent down to the root.
    for index in (0..len / 2).rev() {
        counters.build += 1;
        counters.restore += sift_down(segment, len, index);
    }

    // Extraction phase: move the max to the end, repair the remainder.
    for heap_end in (1..len).rev() {
        segment.swap(0, heap_end);
        counters.restore += 1 + sift_down(segment, heap_end, 0);
    }

    counters
}

/// Move the node at `index` down until the max-heap property holds for
/// its subtree. Returns the number of exchanges performed.
fn sift_down(heap: &mut [i64], len: usize, index: usize) -> u64 {
    let mut exchanges = 0;
    let mut current = index;

    loop {
        let left = 2 * current + 1;
        let right = left + 1;
        let mut largest = current;

        if left < len && heap[left] > heap[largest] {
            largest = left;
        }
        if right < len && heap[right] > heap[largest] {
            largest = right;
        }
        if largest == current {
            break;
        }

        heap.swap(current, largest);
        current = largest;
        exchanges += 1;
    }

    exchanges
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sort_ascending() {
        let outcome = sort_range(&[3, 1, 2], None, None).unwrap();
        assert_eq!(outcome.sorted_numbers, vec![1, 2, 3]);
        assert_eq!(outcome.original_numbers, vec![3, 1, 2]);
        assert_eq!(outcome.range_start, 0);
        assert_eq!(outcome.range_end, 2);
    }

    #[test]
    fn full_sort_is_permutation_of_input() {
        let input = vec![9, -3, 7, 7, 0, -100, 42, 5, 5, 1];
        let outcome = sort_range(&input, None, None).unwrap();

        let mut expected = input.clone();
        expected.sort_unstable();
        assert_eq!(outcome.sorted_numbers, expected);
    }

    #[test]
    fn range_sort_leaves_outside_untouched() {
        let outcome = sort_range(&[5, 4, 3, 2, 1], Some(1), Some(3)).unwrap();
        assert_eq!(outcome.sorted_numbers, vec![5, 2, 3, 4, 1]);
        assert_eq!(outcome.range_start, 1);
        assert_eq!(outcome.range_end, 3);
    }

    #[test]
    fn range_sub_segment_is_permutation_of_original_segment() {
        let input = vec![8, 1, 9, -2, 4, 7, 0];
        let outcome = sort_range(&input, Some(2), Some(5)).unwrap();

        let mut segment: Vec<i64> = input[2..=5].to_vec();
        segment.sort_unstable();
        assert_eq!(&outcome.sorted_numbers[2..=5], segment.as_slice());
        assert_eq!(&outcome.sorted_numbers[..2], &input[..2]);
        assert_eq!(&outcome.sorted_numbers[6..], &input[6..]);
    }

    #[test]
    fn empty_input_rejected() {
        assert_eq!(sort_range(&[], None, None), Err(SortError::EmptyInput));
    }

    #[test]
    fn negative_bound_rejected() {
        let result = sort_range(&[1, 2, 3], Some(-1), None);
        assert_eq!(
            result,
            Err(SortError::RangeOutOfBounds { bound: -1, max: 2 })
        );
    }

    #[test]
    fn bound_past_end_rejected() {
        let result = sort_range(&[1, 2, 3], None, Some(3));
        assert_eq!(result, Err(SortError::RangeOutOfBounds { bound: 3, max: 2 }));
    }

    #[test]
    fn inverted_range_rejected() {
        let result = sort_range(&[1, 2, 3], Some(2), Some(0));
        assert_eq!(result, Err(SortError::InvalidRange { start: 2, end: 0 }));
    }

    #[test]
    fn single_element_sorts_with_zero_restore_operations() {
        let outcome = sort_range(&[42], None, None).unwrap();
        assert_eq!(outcome.sorted_numbers, vec![42]);
        assert_eq!(outcome.build_operations, 0);
        assert_eq!(outcome.restore_operations, 0);
    }

    #[test]
    fn build_operations_is_half_segment_length() {
        for input in [
            vec![1],
            vec![2, 1],
            vec![3, 1, 2],
            vec![5, 4, 3, 2, 1],
            vec![1, 2, 3, 4, 5, 6],
            vec![0; 9],
        ] {
            let len = input.len() as u64;
            let outcome = sort_range(&input, None, None).unwrap();
            assert_eq!(outcome.build_operations, len / 2, "len {len}");
        }
    }

    #[test]
    fn restore_operations_has_one_call_per_extraction_at_minimum() {
        for input in [vec![2, 1], vec![3, 1, 2], vec![7, 2, 9, 4, 1, 8]] {
            let len = input.len() as u64;
            let outcome = sort_range(&input, None, None).unwrap();
            assert!(
                outcome.restore_operations >= len - 1,
                "restore {} < {} for len {len}",
                outcome.restore_operations,
                len - 1
            );
        }
    }

    // Hand-traced counts. [2,1] is already a max heap: the build call
    // does no exchange, the one extraction call does none either.
    #[test]
    fn exact_counts_for_descending_pair() {
        let outcome = sort_range(&[2, 1], None, None).unwrap();
        assert_eq!(outcome.build_operations, 1);
        assert_eq!(outcome.restore_operations, 1);
    }

    // [1,2] needs one exchange while building the heap, which feeds the
    // restore counter alongside the extraction call.
    #[test]
    fn exact_counts_for_ascending_pair() {
        let outcome = sort_range(&[1, 2], None, None).unwrap();
        assert_eq!(outcome.build_operations, 1);
        assert_eq!(outcome.restore_operations, 2);
    }

    #[test]
    fn exact_counts_for_reversed_five() {
        let outcome = sort_range(&[5, 4, 3, 2, 1], None, None).unwrap();
        assert_eq!(outcome.sorted_numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(outcome.build_operations, 2);
        assert_eq!(outcome.restore_operations, 8);
    }

    #[test]
    fn exact_counts_for_range_scenario() {
        let outcome = sort_range(&[5, 4, 3, 2, 1], Some(1), Some(3)).unwrap();
        assert_eq!(outcome.build_operations, 1);
        assert_eq!(outcome.restore_operations, 3);
    }

    #[test]
    fn counters_are_deterministic() {
        let input = vec![13, -7, 22, 0, 5, 5, 19, -1];
        let first = sort_range(&input, Some(1), Some(6)).unwrap();
        let second = sort_range(&input, Some(1), Some(6)).unwrap();

        assert_eq!(first.sorted_numbers, second.sorted_numbers);
        assert_eq!(first.build_operations, second.build_operations);
        assert_eq!(first.restore_operations, second.restore_operations);
    }

    #[test]
    fn duplicates_sort_stably_by_value() {
        let outcome = sort_range(&[3, 3, 3, 1, 1], None, None).unwrap();
        assert_eq!(outcome.sorted_numbers, vec![1, 1, 3, 3, 3]);
    }
}
