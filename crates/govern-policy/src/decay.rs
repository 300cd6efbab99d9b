//! Confidence decay, applied at read time
//!
//! Stored verdicts keep the confidence they were issued with; readers derive
//! the effective value from the elapsed time.

use crate::policy::DecayPolicy;
use chrono::{DateTime, Utc};
use govern_core::Verdict;

/// `confidence * exp(-rate_per_hour * hours)`, clamped to [0, 1].
/// Negative elapsed time (clock skew) counts as zero.
pub fn decayed_confidence(confidence: f64, elapsed: chrono::Duration, rate_per_hour: f64) -> f64 {
    let hours = (elapsed.num_milliseconds().max(0) as f64) / 3_600_000.0;
    let rate = if rate_per_hour.is_finite() {
        rate_per_hour.max(0.0)
    } else {
        0.0
    };
    (confidence * (-rate * hours).exp()).clamp(0.0, 1.0)
}

/// Effective confidence of a verdict at `now`
pub fn effective_confidence(verdict: &Verdict, now: DateTime<Utc>, decay: Option<&DecayPolicy>) -> f64 {
    match decay {
        Some(decay) => decayed_confidence(
            verdict.confidence,
            now - verdict.issued_at,
            decay.rate_per_hour,
        ),
        None => verdict.confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use govern_core::{Disposition, GovernanceLevel, VerdictOrigin};

    #[test]
    fn test_no_elapsed_time_no_decay() {
        assert_eq!(decayed_confidence(0.9, Duration::zero(), 0.5), 0.9);
        assert_eq!(decayed_confidence(0.9, Duration::hours(-3), 0.5), 0.9);
    }

    #[test]
    fn test_decay_is_monotone() {
        let mut previous = 1.0;
        for hours in 0..48 {
            let value = decayed_confidence(1.0, Duration::hours(hours), 0.1);
            assert!(value <= previous, "decay increased at hour {}", hours);
            assert!((0.0..=1.0).contains(&value));
            previous = value;
        }
        assert!(previous < 0.01);
    }

    #[test]
    fn test_half_life() {
        let rate = std::f64::consts::LN_2; // half per hour
        let value = decayed_confidence(0.8, Duration::hours(1), rate);
        assert!((value - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_effective_confidence_leaves_verdict_untouched() {
        let issued = Utc::now() - Duration::hours(2);
        let verdict = Verdict::issued_at(
            "r1",
            Disposition::Approved,
            0.9,
            GovernanceLevel::Low,
            VerdictOrigin::Remote,
            "ok",
            issued,
        );

        let decay = DecayPolicy { rate_per_hour: 0.1 };
        let effective = effective_confidence(&verdict, Utc::now(), Some(&decay));
        assert!(effective < 0.9);
        assert_eq!(verdict.confidence, 0.9);

        assert_eq!(effective_confidence(&verdict, Utc::now(), None), 0.9);
    }
}
