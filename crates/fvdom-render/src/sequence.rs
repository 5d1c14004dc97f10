#![forbid(unsafe_code)]

//! Longest increasing subsequence over the keyed-diff position map.
//!
//! The keyed reconciler records, for each position in the unmatched new
//! range, `old_index + 1` (or 0 when the node is new). Nodes on the longest
//! strictly increasing run of that array are already in relative order and
//! never move; everything else is moved or mounted.
//!
//! Patience sorting with predecessor back-pointers, O(n log n).

/// Indices of one longest strictly increasing subsequence of `values`,
/// ignoring zero entries. The returned indices are ascending.
///
/// ```
/// use fvdom_render::sequence::longest_increasing_subsequence;
///
/// assert_eq!(longest_increasing_subsequence(&[3, 4, 2]), vec![0, 1]);
/// assert_eq!(longest_increasing_subsequence(&[0, 2, 0, 1]), vec![3]);
/// ```
#[must_use]
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    let mut predecessors = vec![0usize; values.len()];
    // tails[k] = index of the smallest tail of an increasing run of length k+1
    let mut tails: Vec<usize> = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        if value == 0 {
            continue;
        }
        if let Some(&last) = tails.last()
            && values[last] < value
        {
            predecessors[i] = last;
            tails.push(i);
            continue;
        }
        let slot = tails.partition_point(|&t| values[t] < value);
        if slot > 0 {
            predecessors[i] = tails[slot - 1];
        }
        if slot == tails.len() {
            tails.push(i);
        } else if value < values[tails[slot]] {
            tails[slot] = i;
        }
    }

    let mut out = vec![0usize; tails.len()];
    let Some(&last) = tails.last() else {
        return out;
    };
    let mut cursor = last;
    for slot in out.iter_mut().rev() {
        *slot = cursor;
        cursor = predecessors[cursor];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_strictly_increasing(values: &[usize], indices: &[usize]) -> bool {
        indices.windows(2).all(|w| w[0] < w[1] && values[w[0]] < values[w[1]])
    }

    fn brute_force_len(values: &[usize]) -> usize {
        let filtered: Vec<usize> = values.iter().copied().filter(|v| *v != 0).collect();
        let mut best = vec![1usize; filtered.len()];
        for i in 0..filtered.len() {
            for j in 0..i {
                if filtered[j] < filtered[i] {
                    best[i] = best[i].max(best[j] + 1);
                }
            }
        }
        best.into_iter().max().unwrap_or(0)
    }

    #[test]
    fn empty_and_all_zero() {
        assert!(longest_increasing_subsequence(&[]).is_empty());
        assert!(longest_increasing_subsequence(&[0, 0, 0]).is_empty());
    }

    #[test]
    fn already_sorted_keeps_everything() {
        assert_eq!(longest_increasing_subsequence(&[1, 2, 3, 4]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn reversed_keeps_one() {
        assert_eq!(longest_increasing_subsequence(&[4, 3, 2, 1]).len(), 1);
    }

    #[test]
    fn classic_example() {
        let values = [2, 3, 1, 5, 6, 8, 7, 9, 4];
        let lis = longest_increasing_subsequence(&values);
        assert_eq!(lis.len(), 6);
        assert!(is_strictly_increasing(&values, &lis));
    }

    #[test]
    fn zeros_are_skipped() {
        let values = [5, 0, 1, 0, 2, 3];
        let lis = longest_increasing_subsequence(&values);
        assert_eq!(lis, vec![2, 4, 5]);
    }

    proptest! {
        #[test]
        fn result_is_a_longest_increasing_run(values in proptest::collection::vec(0usize..20, 0..40)) {
            let lis = longest_increasing_subsequence(&values);
            prop_assert!(is_strictly_increasing(&values, &lis));
            prop_assert!(lis.iter().all(|&i| values[i] != 0));
            prop_assert_eq!(lis.len(), brute_force_len(&values));
        }
    }
}
