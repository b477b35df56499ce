//! Boolean set-query DSL over named key-sets
//!
//! Queries combine named sets with union (`|`), intersection (`&`) and
//! difference (`-`), with `&` binding tighter and the same-level operators
//! left-associative:
//!
//! ```text
//! (campaigns_us & campaigns_display) - blocked_publishers
//! ```
//!
//! Bare identifiers are `[A-Za-z0-9_]+`; any other key name can be written
//! as a double-quoted string. Parsing yields an immutable [`ast::Node`];
//! evaluation is bottom-up against a resolver that maps set names to their
//! elements, with unknown names resolving to the empty set.

pub mod ast;
mod lexer;
mod parser;
pub mod sets;
mod token;

pub use ast::{eval, Node};
pub use parser::parse;

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use proptest::prelude::*;

    fn set(values: &[u32]) -> HashSet<u32> {
        values.iter().copied().collect()
    }

    fn eval_with(query: &str, a: &[u32], b: &[u32], c: &[u32]) -> HashSet<u32> {
        let ast = parse(query).unwrap();
        eval(&ast, |name| match name {
            "A" => set(a),
            "B" => set(b),
            "C" => set(c),
            _ => HashSet::new(),
        })
    }

    #[test]
    fn test_intersection_then_difference() {
        let result = eval_with("(A & B) - C", &[1, 2, 3], &[2, 3, 4], &[3]);
        assert_eq!(result, set(&[2]));
    }

    #[test]
    fn test_precedence_intersection_binds_tighter() {
        // A | B & C parses as A | (B & C).
        let result = eval_with("A | B & C", &[1], &[2, 3], &[3, 4]);
        assert_eq!(result, set(&[1, 3]));
    }

    #[test]
    fn test_difference_is_left_associative() {
        let result = eval_with("A - B - C", &[1, 2, 3, 4], &[2], &[3]);
        assert_eq!(result, set(&[1, 4]));
    }

    #[test]
    fn test_unknown_set_is_empty() {
        let ast = parse("A & unknown").unwrap();
        let result = eval(&ast, |name| match name {
            "A" => set(&[1, 2]),
            _ => HashSet::new(),
        });
        assert!(result.is_empty());
    }

    proptest! {
        #[test]
        fn prop_union_and_intersection_commute(
            a in prop::collection::hash_set(0u32..20, 0..12),
            b in prop::collection::hash_set(0u32..20, 0..12),
        ) {
            let resolver = |name: &str| match name {
                "A" => a.clone(),
                "B" => b.clone(),
                _ => HashSet::new(),
            };
            prop_assert_eq!(
                eval(&parse("A | B").unwrap(), resolver),
                eval(&parse("B | A").unwrap(), resolver)
            );
            prop_assert_eq!(
                eval(&parse("A & B").unwrap(), resolver),
                eval(&parse("B & A").unwrap(), resolver)
            );
        }

        #[test]
        fn prop_intersection_distributes_over_union(
            a in prop::collection::hash_set(0u32..20, 0..12),
            b in prop::collection::hash_set(0u32..20, 0..12),
            c in prop::collection::hash_set(0u32..20, 0..12),
        ) {
            let resolver = |name: &str| match name {
                "A" => a.clone(),
                "B" => b.clone(),
                "C" => c.clone(),
                _ => HashSet::new(),
            };
            prop_assert_eq!(
                eval(&parse("A & (B | C)").unwrap(), resolver),
                eval(&parse("(A & B) | (A & C)").unwrap(), resolver)
            );
        }

        #[test]
        fn prop_union_is_associative(
            a in prop::collection::hash_set(0u32..20, 0..12),
            b in prop::collection::hash_set(0u32..20, 0..12),
            c in prop::collection::hash_set(0u32..20, 0..12),
        ) {
            let resolver = |name: &str| match name {
                "A" => a.clone(),
                "B" => b.clone(),
                "C" => c.clone(),
                _ => HashSet::new(),
            };
            prop_assert_eq!(
                eval(&parse("(A | B) | C").unwrap(), resolver),
                eval(&parse("A | (B | C)").unwrap(), resolver)
            );
        }
    }
}
