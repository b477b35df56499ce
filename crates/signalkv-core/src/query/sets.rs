//! Set operations used by query evaluation
//!
//! All three take their operands by value and reuse the allocation of
//! whichever side survives, so evaluating a deep query never copies set
//! elements.

use std::collections::HashSet;
use std::hash::Hash;

pub fn union<T: Eq + Hash>(left: HashSet<T>, right: HashSet<T>) -> HashSet<T> {
    let (small, mut big) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    big.extend(small);
    big
}

pub fn intersection<T: Eq + Hash>(left: HashSet<T>, right: HashSet<T>) -> HashSet<T> {
    let (mut small, big) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    small.retain(|elem| big.contains(elem));
    small
}

pub fn difference<T: Eq + Hash>(mut left: HashSet<T>, right: HashSet<T>) -> HashSet<T> {
    if right.len() < left.len() {
        for elem in &right {
            left.remove(elem);
        }
    } else {
        left.retain(|elem| !right.contains(elem));
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u32]) -> HashSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_union() {
        assert_eq!(union(set(&[1, 2]), set(&[2, 3])), set(&[1, 2, 3]));
        assert_eq!(union(set(&[]), set(&[1])), set(&[1]));
    }

    #[test]
    fn test_intersection() {
        assert_eq!(intersection(set(&[1, 2, 3]), set(&[2, 3, 4])), set(&[2, 3]));
        assert_eq!(intersection(set(&[1]), set(&[])), set(&[]));
    }

    #[test]
    fn test_difference_is_not_symmetric() {
        assert_eq!(difference(set(&[1, 2, 3]), set(&[2])), set(&[1, 3]));
        assert_eq!(difference(set(&[2]), set(&[1, 2, 3])), set(&[]));
    }
}
