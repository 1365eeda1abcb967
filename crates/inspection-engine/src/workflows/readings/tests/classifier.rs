use crate::workflows::readings::domain::Verdict;
use crate::workflows::readings::thresholds::{classify, Direction, Thresholds};

#[test]
fn floor_thresholds_are_inclusive_upper_bounds() {
    // 40 VRLA cells at 2.11 V and 2.15 V per cell.
    let thresholds = Thresholds::floors(84.4, 86.0);

    assert_eq!(classify(83.0, &thresholds, Direction::LowIsBad), Verdict::Replace);
    assert_eq!(classify(84.4, &thresholds, Direction::LowIsBad), Verdict::Replace);
    assert_eq!(classify(85.0, &thresholds, Direction::LowIsBad), Verdict::Monitor);
    assert_eq!(classify(90.0, &thresholds, Direction::LowIsBad), Verdict::Pass);
}

#[test]
fn ceiling_bands_are_half_open() {
    let thresholds = Thresholds::bands(0.0, 24.0, 24.0, 25.6);

    assert_eq!(classify(23.9, &thresholds, Direction::LowIsBad), Verdict::Replace);
    assert_eq!(classify(24.0, &thresholds, Direction::LowIsBad), Verdict::Monitor);
    assert_eq!(classify(25.5, &thresholds, Direction::LowIsBad), Verdict::Monitor);
    assert_eq!(classify(25.6, &thresholds, Direction::LowIsBad), Verdict::Pass);
    assert_eq!(classify(-1.0, &thresholds, Direction::LowIsBad), Verdict::Pass);
}

#[test]
fn high_is_bad_flags_values_above_the_limits() {
    let thresholds = Thresholds::floors(150.0, 140.0);

    assert_eq!(classify(151.0, &thresholds, Direction::HighIsBad), Verdict::Replace);
    assert_eq!(classify(145.0, &thresholds, Direction::HighIsBad), Verdict::Monitor);
    assert_eq!(classify(140.0, &thresholds, Direction::HighIsBad), Verdict::Pass);
    assert_eq!(classify(90.0, &thresholds, Direction::HighIsBad), Verdict::Pass);
}

#[test]
fn non_finite_values_never_flag() {
    let thresholds = Thresholds::floors(12.0, 12.6);

    assert_eq!(classify(f64::NAN, &thresholds, Direction::LowIsBad), Verdict::Pass);
    assert_eq!(
        classify(f64::INFINITY, &thresholds, Direction::HighIsBad),
        Verdict::Pass
    );
}

#[test]
fn scaling_multiplies_floors_and_ceilings() {
    let scaled = Thresholds::bands(1.0, 2.0, 2.0, 3.0).scaled(4.0);

    assert_eq!(scaled, Thresholds::bands(4.0, 8.0, 8.0, 12.0));
}
