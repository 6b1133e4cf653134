//! Tests for the fixed-point numeric primitives: classifier equivalence,
//! division-table accuracy, and binary-search convergence.

use rstest::rstest;

use super::{ApproxDivisionTable, MsbClassifier, Ratio, RatioMath, lowest_input_reaching};
use crate::config::InterpolatorKind;

#[test]
fn classifier_matches_leading_zeros_for_every_bit() {
    let classifier = MsbClassifier::new();
    for exponent in 0..32u32 {
        let exact = 1u32 << exponent;
        assert_eq!(classifier.classify(exact), Some(exponent));
        // Fill the low bits; the leftmost bit must still win.
        let noisy = exact | (exact - 1);
        assert_eq!(classifier.classify(noisy), Some(exponent));
    }
}

#[test]
fn classifier_rejects_zero() {
    assert_eq!(MsbClassifier::new().classify(0), None);
}

#[test]
fn classifier_agrees_with_leading_zeros_on_random_values() {
    let classifier = MsbClassifier::new();
    let mut value = 0x9E37_79B9u32;
    for _ in 0..1000 {
        value = value.wrapping_mul(0x0019_660D).wrapping_add(0x3C6E_F35F);
        if value == 0 {
            continue;
        }
        assert_eq!(classifier.classify(value), Some(31 - value.leading_zeros()));
    }
}

#[test]
fn classifier_entries_are_priority_ordered() {
    let entries: Vec<_> = MsbClassifier::new().entries().collect();
    assert_eq!(entries.len(), 32);
    assert_eq!(entries[0], (1 << 31, u32::MAX << 31, 31));
    assert_eq!(entries[31], (1, u32::MAX, 0));
}

// Ports the clipped-doubler search cases from the reference controller.
#[rstest]
#[case(30, 0, 15, 15)]
#[case(35, 0, 50, 18)]
#[case(15, 0, 50, 8)]
#[case(0, 0, 50, 0)]
#[case(14, 0, 28, 7)]
fn binary_search_finds_lowest_reaching_input(
    #[case] target: u64,
    #[case] lo: u64,
    #[case] hi: u64,
    #[case] expected: u64,
) {
    let found = lowest_input_reaching(target, lo, hi, |x| (x * 2).min(35));
    assert_eq!(found, expected);
}

#[test]
fn binary_search_returns_hi_when_unreachable() {
    assert_eq!(lowest_input_reaching(100, 0, 50, |x| (x * 2).min(35)), 50);
}

#[test]
fn binary_search_is_logarithmic() {
    let mut evaluations = 0u32;
    lowest_input_reaching(u64::MAX / 2, 0, u64::MAX - 1, |x| {
        evaluations += 1;
        x
    });
    assert!(evaluations <= 64, "took {evaluations} evaluations");
}

#[test]
fn table_ratio_error_stays_within_budget() {
    let table = ApproxDivisionTable::new(7, 8);
    let probe = 1u64 << 20;
    // Numerators below den/4 are dominated by the +0.5 unbias term, so the
    // sweep starts at a quarter of the denominator.
    for den in [100u64, 127, 4096, 65_537, 1_000_000] {
        for step in 5..20u64 {
            let num = den * step / 20;
            let approx = table.ratio(num, den).apply(probe);
            let exact = probe * num / den;
            let error = approx.abs_diff(exact) as f64 / exact.max(1) as f64;
            assert!(
                error < 0.05,
                "ratio {num}/{den}: approx {approx}, exact {exact}, error {error:.3}"
            );
        }
    }
}

#[test]
fn table_clamps_out_of_contract_operands() {
    let table = ApproxDivisionTable::new(6, 8);
    assert_eq!(table.ratio(10, 0), Ratio::ZERO);
    assert_eq!(table.ratio(0, 10), Ratio::ZERO);
    assert_eq!(table.ratio(10, 10), Ratio::ONE);
    assert_eq!(table.ratio(20, 10), Ratio::ONE);
}

#[test]
fn table_normalises_small_denominators() {
    let table = ApproxDivisionTable::new(7, 8);
    // den = 3 < 2^6 must be left-shifted into range, not underflow.
    let approx = table.ratio(1, 3).apply(3000);
    assert!(approx.abs_diff(1000) < 50, "1/3 of 3000 was {approx}");
}

#[test]
fn exact_ratio_matches_integer_division() {
    let math = RatioMath::from_kind(InterpolatorKind::Exact);
    for (num, den, x) in [(25u64, 50u64, 50u64), (1, 4, 4096), (3, 8, 800), (7, 7, 123)] {
        assert_eq!(math.ratio(num, den).apply(x), x * num / den);
    }
}

#[test]
fn ratio_apply_saturates_instead_of_wrapping() {
    let wide = Ratio::new(u64::MAX, 32);
    assert_eq!(wide.apply(u64::MAX), u64::MAX);
}

#[rstest]
#[case(InterpolatorKind::Exact)]
#[case(InterpolatorKind::table_default())]
fn bytes_accepted_admits_slow_flows_whole(#[case] kind: InterpolatorKind) {
    let math = RatioMath::from_kind(kind);
    assert_eq!(math.bytes_accepted(100, 100, 1500), 1500);
    assert_eq!(math.bytes_accepted(99, 100, 1500), 1500);
}

#[test]
fn bytes_accepted_scales_fast_flows_down() {
    let math = RatioMath::from_kind(InterpolatorKind::Exact);
    // A flow at twice the limit keeps half its bytes.
    assert_eq!(math.bytes_accepted(2000, 1000, 1500), 750);
    // Unit-sized packets round toward zero below the limit ratio.
    assert_eq!(math.bytes_accepted(40, 20, 1), 0);
}
