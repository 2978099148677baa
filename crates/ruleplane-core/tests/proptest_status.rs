// crates/ruleplane-core/tests/proptest_status.rs
// ============================================================================
// Module: Status and Identifier Property-Based Tests
// Description: Property tests for the error classifier and sid encoding.
// Purpose: Detect panics and invariant breaks across wide input ranges.
// ============================================================================

//! Property-based tests for classifier and identifier invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use ruleplane_core::Sid;
use ruleplane_core::StatusCode;
use ruleplane_core::StatusError;
use ruleplane_core::classify_error;
use ruleplane_core::classify_message;

fn code_strategy() -> impl Strategy<Value = StatusCode> {
    prop_oneof![
        Just(StatusCode::Ok),
        Just(StatusCode::EmptyParams),
        Just(StatusCode::OutOfRange),
        Just(StatusCode::DuplicateEntry),
        Just(StatusCode::ForeignKeyViolation),
        Just(StatusCode::Deadlock),
        Just(StatusCode::AffectedRowsMismatch),
        Just(StatusCode::NotFoundOwner),
        Just(StatusCode::NotFoundResource),
        Just(StatusCode::Unknown),
    ]
}

fn flip_case(text: &str, mask: &[bool]) -> String {
    text.chars()
        .zip(mask.iter().cycle())
        .map(|(ch, upper)| if *upper { ch.to_ascii_uppercase() } else { ch.to_ascii_lowercase() })
        .collect()
}

proptest! {
    #[test]
    fn classifier_never_panics(message in ".*") {
        let _ = classify_message(&message);
    }

    #[test]
    fn lock_phrases_classify_as_deadlock_in_any_case(
        prefix in "[0-9 ]{0,16}",
        suffix in "[0-9 ]{0,16}",
        mask in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        for phrase in ["database is locked", "database table is locked", "deadlock found"] {
            let message = format!("{prefix}{}{suffix}", flip_case(phrase, &mask));
            prop_assert_eq!(classify_message(&message), StatusCode::Deadlock);
        }
    }

    #[test]
    fn constraint_phrases_keep_their_kind(
        prefix in "[0-9 ]{0,16}",
        mask in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let cases = [
            ("UNIQUE constraint failed: rate_limit_rules.id", StatusCode::DuplicateEntry),
            ("CHECK constraint failed: revision", StatusCode::OutOfRange),
            ("FOREIGN KEY constraint failed", StatusCode::ForeignKeyViolation),
        ];
        for (phrase, code) in cases {
            let message = format!("{prefix}{}", flip_case(phrase, &mask));
            prop_assert_eq!(classify_message(&message), code);
        }
    }

    #[test]
    fn classification_is_idempotent(code in code_strategy(), message in ".*") {
        let original = StatusError::new(code, message);
        let once = classify_error(&original);
        let twice = classify_error(&once);
        prop_assert_eq!(&once, &original);
        prop_assert_eq!(twice, original);
    }

    #[test]
    fn sid_round_trips(module_id in any::<u32>(), command_id in any::<u32>()) {
        let sid = Sid::new(module_id, command_id);
        let text = sid.to_string();
        prop_assert_eq!(text.parse::<Sid>().unwrap(), sid);
        prop_assert_eq!(text, format!("{module_id}:{command_id}"));
    }

    #[test]
    fn sid_without_single_colon_fails(raw in "[0-9]{1,5}(:[0-9]{1,5}){2,3}|[0-9]{0,9}") {
        prop_assert!(raw.parse::<Sid>().is_err());
    }
}
