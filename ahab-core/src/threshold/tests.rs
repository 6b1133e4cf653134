//! Tests for candidate generation, bracket selection, and interpolation.

use proptest::prelude::*;
use rstest::rstest;

use super::{ThresholdEstimator, candidate_thresholds, interpolate, round_log2};
use crate::{
    config::{CandidateStrategy, InterpolatorKind, SliceConfig},
    lpf::{LpfMode, LpfParams},
    numeric::RatioMath,
};

/// A time constant long enough that nothing decays within a test epoch.
fn still_lpf() -> LpfParams {
    LpfParams::new(1 << 40, 0, LpfMode::Rate)
}

fn wide_clamps() -> SliceConfig {
    SliceConfig {
        scale_factor: 1,
        clamp_min: 8,
        clamp_max: 1 << 30,
    }
}

fn exact() -> RatioMath {
    RatioMath::from_kind(InterpolatorKind::Exact)
}

#[rstest]
#[case(CandidateStrategy::PowerTwoJump, 3)]
#[case(CandidateStrategy::RatioThree, 3)]
#[case(CandidateStrategy::RatioFive, 5)]
fn candidates_are_strictly_increasing(
    #[case] strategy: CandidateStrategy,
    #[case] expected_len: usize,
) {
    for threshold in [8u64, 13, 50, 1000, 1 << 20, 1 << 30] {
        let thresholds = candidate_thresholds(strategy, threshold);
        assert_eq!(thresholds.len(), expected_len);
        assert!(
            thresholds.windows(2).all(|pair| pair[0] < pair[1]),
            "{strategy:?} at {threshold} produced {thresholds:?}"
        );
        assert!(
            thresholds.contains(&threshold),
            "{strategy:?} at {threshold} lost the current threshold: {thresholds:?}"
        );
    }
}

#[test]
fn power_two_jump_brackets_by_shift_amounts() {
    // At an exact power of two the jumps are (T/2, T, 1.25T).
    assert_eq!(
        candidate_thresholds(CandidateStrategy::PowerTwoJump, 64),
        vec![32, 64, 80]
    );
    // 50 rounds up to 2^6, so it keeps the same power-of-two deltas as 64.
    assert_eq!(
        candidate_thresholds(CandidateStrategy::PowerTwoJump, 50),
        vec![18, 50, 66]
    );
}

#[rstest]
#[case(1, 0)]
#[case(2, 1)]
#[case(3, 2)]
#[case(50, 6)]
#[case(64, 6)]
#[case(90, 6)]
#[case(91, 7)]
fn round_log2_picks_nearest_power(#[case] input: u64, #[case] expected: u32) {
    assert_eq!(round_log2(input), expected);
}

#[test]
fn threshold_halves_under_pressure() {
    let math = exact();
    let mut estimator =
        ThresholdEstimator::new(50, CandidateStrategy::RatioThree, still_lpf());
    for _ in 0..10 {
        estimator.observe(&math, 0, 50, 50);
    }
    let new = estimator.end_epoch(&math, &wide_clamps(), 50, 500, false);
    assert_eq!(new, 25);
}

#[test]
fn threshold_doubles_under_slack() {
    let math = exact();
    let mut estimator =
        ThresholdEstimator::new(50, CandidateStrategy::RatioThree, still_lpf());
    for _ in 0..10 {
        estimator.observe(&math, 0, 50, 50);
    }
    let new = estimator.end_epoch(&math, &wide_clamps(), 10_000, 500, false);
    assert_eq!(new, 100);
}

#[test]
fn idle_epoch_keeps_threshold() {
    let math = exact();
    let mut estimator =
        ThresholdEstimator::new(640, CandidateStrategy::PowerTwoJump, still_lpf());
    for _ in 0..3 {
        assert_eq!(estimator.end_epoch(&math, &wide_clamps(), 10_000, 0, true), 640);
    }
}

#[test]
fn speculative_clamp_caps_idle_growth() {
    let math = exact();
    let mut estimator =
        ThresholdEstimator::new(1000, CandidateStrategy::RatioThree, still_lpf());
    // One slow flow: every candidate admits everything, so the bracket alone
    // would double the threshold.
    estimator.observe(&math, 0, 100, 10);
    let new = estimator.end_epoch(&math, &wide_clamps(), 150, 100, true);
    // Capped at max observed rate (10) plus the slice's slack (150 - 100).
    assert_eq!(new, 60);
}

#[test]
fn clamps_bound_every_update() {
    let math = exact();
    let config = SliceConfig {
        scale_factor: 1,
        clamp_min: 30,
        clamp_max: 60,
    };
    let mut estimator =
        ThresholdEstimator::new(50, CandidateStrategy::RatioThree, still_lpf());
    for _ in 0..10 {
        estimator.observe(&math, 0, 50, 50);
    }
    assert_eq!(estimator.end_epoch(&math, &config, 50, 500, false), 30);
    for _ in 0..10 {
        estimator.observe(&math, 0, 50, 50);
    }
    assert_eq!(estimator.end_epoch(&math, &config, 10_000, 500, false), 60);
}

#[test]
fn interpolation_lands_between_bracket_candidates() {
    let math = exact();
    let mut estimator =
        ThresholdEstimator::new(40, CandidateStrategy::RatioThree, still_lpf());
    // Twenty flows of linearly growing rates, unit-sized packets: each
    // candidate's admitted bytes equal the clipped sum of flow sizes.
    for flow_size in (12..=50u64).step_by(2) {
        for sent in 1..=flow_size {
            estimator.observe(&math, 0, 1, sent);
        }
    }
    let new = estimator.end_epoch(&math, &wide_clamps(), 480, 620, false);
    assert!((20..40).contains(&new), "interpolated threshold was {new}");
}

#[test]
fn candidate_regeneration_follows_new_threshold() {
    let math = exact();
    let mut estimator =
        ThresholdEstimator::new(50, CandidateStrategy::RatioThree, still_lpf());
    for _ in 0..10 {
        estimator.observe(&math, 0, 50, 50);
    }
    estimator.end_epoch(&math, &wide_clamps(), 10_000, 500, false);
    assert_eq!(estimator.current(), 100);
    assert_eq!(estimator.candidate_thresholds(), vec![50, 100, 200]);
}

#[test]
fn table_interpolation_tracks_exact_interpolation() {
    let table = RatioMath::from_kind(InterpolatorKind::TableBased {
        ratio_bits: 7,
        mantissa_bits: 8,
    });
    for (c_a, c_b) in [(20_000u64, 40_000u64), (100_000, 600_000)] {
        for (t_a, t_b) in [(2048u64, 4096u64), (128, 256)] {
            let span = c_b - c_a;
            for step in 1..100u64 {
                let capacity = c_a + span * step / 100;
                let approx = interpolate(&table, t_a, t_b, c_a, c_b, capacity);
                let ideal = t_a as f64
                    + ((capacity - c_a) as f64 / span as f64) * (t_b - t_a) as f64;
                let error = (approx as f64 - ideal).abs() / ideal;
                assert!(
                    error < 0.05,
                    "interpolate({t_a},{t_b},{c_a},{c_b},{capacity}) = {approx}, ideal {ideal:.1}"
                );
            }
        }
    }
}

#[test]
fn degenerate_bracket_returns_low_candidate() {
    let math = exact();
    assert_eq!(interpolate(&math, 100, 200, 500, 500, 600), 100);
    assert_eq!(interpolate(&math, 100, 100, 500, 900, 600), 100);
}

proptest! {
    // Whenever the capacity lies inside the bracket, the interpolated
    // threshold must lie inside the candidate range.
    #[test]
    fn interpolation_stays_inside_bracket(
        t_a in 8u64..1_000_000,
        t_span in 1u64..1_000_000,
        c_a in 0u64..1_000_000_000,
        c_span in 1u64..1_000_000_000,
        numer in 0u64..=1_000,
    ) {
        let t_b = t_a + t_span;
        let c_b = c_a + c_span;
        let capacity = c_a + c_span * numer / 1_000;
        for math in [
            RatioMath::from_kind(InterpolatorKind::Exact),
            RatioMath::from_kind(InterpolatorKind::table_default()),
        ] {
            let result = interpolate(&math, t_a, t_b, c_a, c_b, capacity);
            prop_assert!(result >= t_a, "{result} fell below {t_a}");
            prop_assert!(result <= t_b, "{result} exceeded {t_b}");
        }
    }
}
