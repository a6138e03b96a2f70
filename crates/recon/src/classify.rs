use crate::model::Status;

/// Differences smaller than this count as floating-point noise.
pub const DIFF_EPSILON: f64 = 0.001;

/// Map one reconciled key's quantities to a status.
///
/// `None` means the key was absent from that side entirely; the decision
/// treats it like zero, but callers keep the distinction for reporting.
/// Decision order, each branch terminal:
///  1. system > 0, manual absent/0  → SystemOnly
///  2. manual > 0, system absent/0  → ManualOnly
///  3. both 0                       → Match
///  4. |difference| < 0.001         → Match
///  5. otherwise                    → Differ
pub fn classify(manual: Option<f64>, system: Option<f64>, difference: f64) -> Status {
    let manual_qty = manual.unwrap_or(0.0);
    let system_qty = system.unwrap_or(0.0);

    if system_qty > 0.0 && manual_qty == 0.0 {
        return Status::SystemOnly;
    }
    if manual_qty > 0.0 && system_qty == 0.0 {
        return Status::ManualOnly;
    }
    if manual_qty == 0.0 && system_qty == 0.0 {
        return Status::Match;
    }
    if difference.abs() < DIFF_EPSILON {
        return Status::Match;
    }
    Status::Differ
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equal_quantities_match() {
        assert_eq!(classify(Some(100.0), Some(100.0), 0.0), Status::Match);
    }

    #[test]
    fn small_noise_still_matches() {
        assert_eq!(classify(Some(100.0), Some(100.0005), -0.0005), Status::Match);
    }

    #[test]
    fn real_difference_differs() {
        assert_eq!(classify(Some(200.0), Some(150.0), 50.0), Status::Differ);
    }

    #[test]
    fn system_only_when_manual_absent_or_zero() {
        assert_eq!(classify(None, Some(300.0), -300.0), Status::SystemOnly);
        assert_eq!(classify(Some(0.0), Some(300.0), -300.0), Status::SystemOnly);
    }

    #[test]
    fn system_only_ignores_the_difference_value() {
        assert_eq!(classify(None, Some(300.0), 0.0), Status::SystemOnly);
    }

    #[test]
    fn manual_only_when_system_absent_or_zero() {
        assert_eq!(classify(Some(50.0), None, 50.0), Status::ManualOnly);
        assert_eq!(classify(Some(50.0), Some(0.0), 50.0), Status::ManualOnly);
    }

    #[test]
    fn both_zero_matches() {
        assert_eq!(classify(Some(0.0), Some(0.0), 0.0), Status::Match);
        assert_eq!(classify(None, None, 0.0), Status::Match);
    }

    #[test]
    fn custom_formula_can_rescue_a_difference() {
        // manual 200 vs system 150, but the formula nets out to ~0
        assert_eq!(classify(Some(200.0), Some(150.0), 0.0), Status::Match);
    }

    proptest! {
        // Totality: every input triple maps to exactly one status, and
        // zero/zero is always a match.
        #[test]
        fn classify_is_total(
            manual in proptest::option::of(-1e7..1e7f64),
            system in proptest::option::of(-1e7..1e7f64),
            diff in -1e7..1e7f64,
        ) {
            let status = classify(manual, system, diff);
            prop_assert!(matches!(
                status,
                Status::Match | Status::Differ | Status::SystemOnly | Status::ManualOnly
            ));
        }

        #[test]
        fn zero_on_both_sides_always_matches(diff in -1e7..1e7f64) {
            prop_assert_eq!(classify(Some(0.0), Some(0.0), diff), Status::Match);
            prop_assert_eq!(classify(None, Some(0.0), diff), Status::Match);
        }
    }
}
