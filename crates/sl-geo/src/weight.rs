//! Quality-score to ordinal-weight quantization.
//!
//! Legacy location solvers consume a 5-class pick weight where 0 is the
//! highest confidence. The forward mapping quantizes a continuous score in
//! [0, 1] against a log-spaced boundary table rescaled to
//! `[min_weight, 1.0]`; the reverse mapping yields one representative score
//! per class. The two directions are deliberately not inverses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordinal pick weight, 0 (best) through 4 (worst).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightClass(u8);

impl WeightClass {
    pub const BEST: WeightClass = WeightClass(0);
    pub const WORST: WeightClass = WeightClass(4);

    /// Construct from a raw ordinal; values above 4 are rejected.
    pub fn new(class: u8) -> Option<Self> {
        (class <= 4).then_some(WeightClass(class))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for WeightClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descending quantization boundaries `b0=1.0 .. b4=min_weight`.
///
/// Five log-spaced values over `[min_weight, 1.0]` are rescaled back into
/// that range, reproducing the boundary geometry of the legacy weight
/// mapper: classes near full confidence are narrow, low-confidence classes
/// are wide.
fn boundaries(min_weight: f64) -> [f64; 5] {
    let min_weight = min_weight.clamp(0.0, 0.99);
    let step = (1.0 - min_weight) / 4.0;
    let raw: [f64; 5] = std::array::from_fn(|j| 10f64.powf(min_weight + j as f64 * step));
    let (lo, hi) = (raw[0], raw[4]);
    std::array::from_fn(|k| min_weight + (raw[4 - k] - lo) * (1.0 - min_weight) / (hi - lo))
}

/// Quantize a quality score into a weight class.
///
/// The score is clamped into [0, 1] rather than rejected: out-of-range
/// values are expected sensor/model noise. Scores at or below the lowest
/// boundary map to the worst class; ties at interior boundaries resolve to
/// the higher-confidence class.
pub fn score_to_class(score: f64, min_weight: f64) -> WeightClass {
    let score = if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    };
    let b = boundaries(min_weight);
    if score <= b[4] {
        return WeightClass(4);
    }
    for k in 0..4 {
        if score >= b[k + 1] {
            return WeightClass(k as u8);
        }
    }
    WeightClass(4)
}

/// Representative score per weight class.
///
/// Used when a probability-like quality metric must be reconstructed from
/// weight-annotated solver output.
pub fn class_to_score(class: WeightClass) -> f64 {
    const REPRESENTATIVE: [f64; 5] = [1.00, 0.75, 0.50, 0.25, 0.00];
    REPRESENTATIVE[class.0 as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundary_table_shape() {
        let b = boundaries(0.3);
        assert!((b[0] - 1.0).abs() < 1e-12);
        assert!((b[4] - 0.3).abs() < 1e-12);
        for k in 0..4 {
            assert!(b[k] > b[k + 1], "boundaries must descend: {b:?}");
        }
    }

    #[test]
    fn test_full_confidence_is_best_class() {
        assert_eq!(score_to_class(1.0, 0.3), WeightClass::BEST);
    }

    #[test]
    fn test_at_or_below_lowest_boundary_is_worst() {
        assert_eq!(score_to_class(0.3, 0.3), WeightClass::WORST);
        assert_eq!(score_to_class(0.1, 0.3), WeightClass::WORST);
        assert_eq!(score_to_class(0.0, 0.3), WeightClass::WORST);
    }

    #[test]
    fn test_interior_tie_takes_higher_confidence() {
        let b = boundaries(0.3);
        for k in 1..4usize {
            let class = score_to_class(b[k], 0.3);
            assert_eq!(class.index(), (k - 1) as u8, "tie at b[{k}]");
        }
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        assert_eq!(score_to_class(1.7, 0.3), WeightClass::BEST);
        assert_eq!(score_to_class(-0.5, 0.3), WeightClass::WORST);
    }

    #[test]
    fn test_class_to_score_table() {
        assert_eq!(class_to_score(WeightClass(0)), 1.00);
        assert_eq!(class_to_score(WeightClass(1)), 0.75);
        assert_eq!(class_to_score(WeightClass(2)), 0.50);
        assert_eq!(class_to_score(WeightClass(3)), 0.25);
        assert_eq!(class_to_score(WeightClass(4)), 0.00);
    }

    #[test]
    fn test_rejects_class_above_four() {
        assert!(WeightClass::new(5).is_none());
        assert!(WeightClass::new(4).is_some());
    }

    proptest! {
        #[test]
        fn mapping_is_total(score in -1.0f64..2.0, min_w in 0.0f64..0.95) {
            let class = score_to_class(score, min_w);
            prop_assert!(class.index() <= 4);
        }

        #[test]
        fn mapping_is_monotonic(
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
            min_w in 0.0f64..0.95,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let c_lo = score_to_class(lo, min_w);
            let c_hi = score_to_class(hi, min_w);
            prop_assert!(c_hi.index() <= c_lo.index(), "higher score, lower class");
        }

        #[test]
        fn stable_after_one_quantization_round(score in 0.0f64..1.0) {
            // At the default picker threshold (0.3) the representative
            // scores settle after a single quantization round.
            let min_w = 0.3;
            let once = class_to_score(score_to_class(score, min_w));
            let twice = class_to_score(score_to_class(once, min_w));
            let thrice = class_to_score(score_to_class(twice, min_w));
            prop_assert_eq!(twice, thrice);
        }
    }
}
