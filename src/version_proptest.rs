//! Property-based tests for version parsing, ordering and constraints.
//!
//! These tests use proptest to generate random versions and verify that
//! the precedence and satisfaction laws hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::version::{compare, parse, satisfies, Operator, SemanticVersion, VersionConstraint};
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn release_strategy() -> impl Strategy<Value = SemanticVersion> {
        (
            0u64..20,
            0u64..20,
            0u64..20,
            prop::option::of("[a-z]{1,5}(\\.[1-9][0-9]{0,2})?"),
            prop::option::of("[a-z0-9]{1,6}"),
        )
            .prop_map(|(major, minor, patch, pre, build)| {
                let mut text = format!("{}.{}.{}", major, minor, patch);
                if let Some(pre) = pre {
                    text.push('-');
                    text.push_str(&pre);
                }
                if let Some(build) = build {
                    text.push('+');
                    text.push_str(&build);
                }
                SemanticVersion::parse(&text).expect("generated version is valid")
            })
    }

    fn version_strategy() -> impl Strategy<Value = SemanticVersion> {
        prop_oneof![
            9 => release_strategy(),
            1 => Just(SemanticVersion::Wildcard),
        ]
    }

    // ============================================================================
    // Ordering laws
    // ============================================================================

    proptest! {
        /// Property: printing and re-parsing a concrete version preserves precedence
        #[test]
        fn parse_display_round_trip(v in release_strategy()) {
            let reparsed = parse(&v.to_string()).unwrap();
            prop_assert_eq!(compare(&reparsed, &v), Ordering::Equal);
            prop_assert_eq!(reparsed, v);
        }

        /// Property: compare is antisymmetric
        #[test]
        fn compare_is_antisymmetric(a in version_strategy(), b in version_strategy()) {
            prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
        }

        /// Property: compare is transitive
        #[test]
        fn compare_is_transitive(
            a in version_strategy(),
            b in version_strategy(),
            c in version_strategy(),
        ) {
            if compare(&a, &b) != Ordering::Greater && compare(&b, &c) != Ordering::Greater {
                prop_assert_ne!(compare(&a, &c), Ordering::Greater);
            }
        }

        /// Property: wildcard ranks below every concrete version
        #[test]
        fn wildcard_is_lowest(v in release_strategy()) {
            prop_assert_eq!(compare(&SemanticVersion::Wildcard, &v), Ordering::Less);
        }
    }

    // ============================================================================
    // Constraint laws
    // ============================================================================

    proptest! {
        /// Property: every concrete version satisfies an exact constraint on itself
        #[test]
        fn exact_constraint_is_reflexive(v in release_strategy()) {
            let constraint = VersionConstraint::new(Operator::Exact, v.clone());
            prop_assert!(satisfies(&v, &constraint));
        }

        /// Property: caret satisfaction implies same major and not lower
        #[test]
        fn caret_implies_same_major_and_not_lower(
            v in release_strategy(),
            base in release_strategy(),
        ) {
            let constraint = VersionConstraint::new(Operator::Caret, base.clone());
            if satisfies(&v, &constraint) {
                let (rv, rb) = (v.as_release().unwrap(), base.as_release().unwrap());
                prop_assert_eq!(rv.major, rb.major);
                prop_assert_ne!(compare(&v, &base), Ordering::Less);
            }
        }

        /// Property: tilde satisfaction implies caret satisfaction
        #[test]
        fn tilde_is_narrower_than_caret(v in release_strategy(), base in release_strategy()) {
            let tilde = VersionConstraint::new(Operator::Tilde, base.clone());
            let caret = VersionConstraint::new(Operator::Caret, base);
            if satisfies(&v, &tilde) {
                prop_assert!(satisfies(&v, &caret));
            }
        }

        /// Property: `<` and `>=` partition concrete versions
        #[test]
        fn less_and_greater_eq_partition(v in release_strategy(), base in release_strategy()) {
            let less = VersionConstraint::new(Operator::Less, base.clone());
            let ge = VersionConstraint::new(Operator::GreaterEq, base);
            prop_assert!(satisfies(&v, &less) != satisfies(&v, &ge));
        }

        /// Property: constraint display re-parses to the same constraint
        #[test]
        fn constraint_display_round_trip(v in release_strategy(), op_index in 0usize..7) {
            let ops = [
                Operator::Exact,
                Operator::Less,
                Operator::LessEq,
                Operator::Greater,
                Operator::GreaterEq,
                Operator::Caret,
                Operator::Tilde,
            ];
            let constraint = VersionConstraint::new(ops[op_index], v);
            let reparsed = VersionConstraint::parse(&constraint.to_string()).unwrap();
            prop_assert_eq!(reparsed, constraint);
        }
    }
}
