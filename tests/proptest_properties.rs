//! Property tests for the pure evaluators: similarity, failure
//! classification, checksums.

use airgate::guardrails::failures::classify_failure;
use airgate::guardrails::similarity::jaccard;
use airgate::vault;
use proptest::prelude::*;

proptest! {
    #[test]
    fn jaccard_identity(s in ".{0,200}") {
        prop_assert_eq!(jaccard(&s, &s), 1.0);
    }

    #[test]
    fn jaccard_symmetry(a in ".{0,100}", b in ".{0,100}") {
        prop_assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
    }

    #[test]
    fn jaccard_bounded(a in ".{0,100}", b in ".{0,100}") {
        let score = jaccard(&a, &b);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn jaccard_nonempty_vs_empty_is_zero(a in "[a-z]{1,40}") {
        prop_assert_eq!(jaccard(&a, ""), 0.0);
    }

    #[test]
    fn classify_failure_is_total(status in 0u16..1000, body in ".{0,200}") {
        // Any input maps to some category without panicking.
        let _ = classify_failure(status, &body);
    }

    #[test]
    fn classify_failure_is_deterministic(status in 0u16..1000, body in ".{0,200}") {
        prop_assert_eq!(
            classify_failure(status, &body),
            classify_failure(status, &body)
        );
    }

    #[test]
    fn checksum_round_trip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let sum = vault::checksum(&data);
        prop_assert!(vault::verify_checksum(&data, &sum));
    }

    #[test]
    fn checksum_rejects_other_data(
        data in proptest::collection::vec(any::<u8>(), 1..256),
        extra in any::<u8>(),
    ) {
        let mut other = data.clone();
        other.push(extra);
        let sum = vault::checksum(&data);
        prop_assert!(!vault::verify_checksum(&other, &sum));
    }
}
