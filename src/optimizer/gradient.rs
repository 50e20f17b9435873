// src/optimizer/gradient.rs — Heuristic "gradient" math for rewrites
//
// The magnitude is a scalar in (0.1, 1.0] that grows as the score falls. It
// only biases rewrite temperature and guidance wording.

use crate::core::model::Gradient;
use crate::core::types::PromptFeedback;

const MAGNITUDE_FLOOR: f32 = 0.1;
const MAGNITUDE_EXPONENT: f32 = 1.2;
const TEMPERATURE_GAIN: f32 = 0.3;
const REWRITE_TEMPERATURE_CAP: f32 = 0.9;
const VARIANT_TEMPERATURE_CAP: f32 = 1.0;

/// `0.1 + 0.9 * (1 - score/max_score)^1.2`, the ratio clamped to `[0, 1]`.
pub fn gradient_magnitude(score: f32, max_score: f32) -> f32 {
    let ratio = if max_score > 0.0 {
        (score / max_score).clamp(0.0, 1.0)
    } else {
        0.0
    };
    MAGNITUDE_FLOOR + (1.0 - MAGNITUDE_FLOOR) * (1.0 - ratio).powf(MAGNITUDE_EXPONENT)
}

pub fn rewrite_temperature(base: f32, magnitude: f32) -> f32 {
    (base + magnitude * TEMPERATURE_GAIN).min(REWRITE_TEMPERATURE_CAP)
}

/// Temperature for variant `index` on retry `retry` (both 0-based).
pub fn variant_temperature(base: f32, index: usize, retry: u32) -> f32 {
    (base + index as f32 * 0.1 + retry as f32 * 0.05).min(VARIANT_TEMPERATURE_CAP)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guidance {
    SignificantRewrite,
    ModerateImprovement,
    MinorRefinement,
}

impl Guidance {
    pub fn for_score(score: f32) -> Self {
        if score < 3.0 {
            Guidance::SignificantRewrite
        } else if score < 4.0 {
            Guidance::ModerateImprovement
        } else {
            Guidance::MinorRefinement
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Guidance::SignificantRewrite => "significant rewrite",
            Guidance::ModerateImprovement => "moderate improvement",
            Guidance::MinorRefinement => "minor refinement",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Guidance::SignificantRewrite => {
                "The prompt performs poorly. Make a significant rewrite: restructure it, \
                 state the task and constraints explicitly, and fix every issue raised."
            }
            Guidance::ModerateImprovement => {
                "The prompt works but has clear gaps. Make a moderate improvement that \
                 addresses the feedback while keeping what already works."
            }
            Guidance::MinorRefinement => {
                "The prompt performs well. Apply a minor refinement only; keep its \
                 structure and wording unless the feedback demands a change."
            }
        }
    }
}

/// Gradient for one prompt/feedback pair. Traits are the stylistic
/// directions the proposal step may lean toward.
pub fn compute_gradient(item: &PromptFeedback, traits: &[String], max_score: f32) -> Gradient {
    Gradient {
        score: item.score,
        feedback: item.feedback.clone(),
        magnitude: gradient_magnitude(item.score, max_score),
        traits: traits.to_vec(),
        critique: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompt::Prompt;

    #[test]
    fn test_magnitude_ordering() {
        let low = gradient_magnitude(1.0, 5.0);
        let mid = gradient_magnitude(3.0, 5.0);
        let high = gradient_magnitude(4.5, 5.0);
        assert!(low > mid && mid > high);
        assert!(low > 0.7);
        assert!(high < 0.3);
    }

    #[test]
    fn test_magnitude_bounds() {
        assert!((gradient_magnitude(0.0, 5.0) - 1.0).abs() < 1e-6);
        assert!((gradient_magnitude(5.0, 5.0) - 0.1).abs() < 1e-6);
        // out-of-range scores clamp
        assert!((gradient_magnitude(-3.0, 5.0) - 1.0).abs() < 1e-6);
        assert!((gradient_magnitude(9.0, 5.0) - 0.1).abs() < 1e-6);
        assert!((gradient_magnitude(2.0, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rewrite_temperature_capped() {
        assert!((rewrite_temperature(0.7, 0.1) - 0.73).abs() < 1e-5);
        assert_eq!(rewrite_temperature(0.7, 1.0), 0.9);
    }

    #[test]
    fn test_variant_temperature_schedule() {
        assert!((variant_temperature(0.7, 0, 0) - 0.7).abs() < 1e-6);
        assert!((variant_temperature(0.7, 1, 2) - 0.9).abs() < 1e-6);
        assert_eq!(variant_temperature(0.7, 5, 3), 1.0);
    }

    #[test]
    fn test_guidance_tiers() {
        assert_eq!(Guidance::for_score(2.99), Guidance::SignificantRewrite);
        assert_eq!(Guidance::for_score(3.0), Guidance::ModerateImprovement);
        assert_eq!(Guidance::for_score(4.0), Guidance::MinorRefinement);
        assert_eq!(Guidance::SignificantRewrite.label(), "significant rewrite");
    }

    #[test]
    fn test_compute_gradient() {
        let item = PromptFeedback::new(Prompt::new("p"), "vague", 2.0);
        let g = compute_gradient(&item, &["terse".into()], 5.0);
        assert_eq!(g.score, 2.0);
        assert_eq!(g.feedback, "vague");
        assert_eq!(g.traits, vec!["terse".to_string()]);
        assert!(g.magnitude > 0.5);
        assert!(g.critique.is_none());
    }
}
