//! Segment classification from R, F and M scores
//!
//! Two independent label schemes are derived from the same composite score: a coarse
//! value tier and a descriptive lifecycle segment. Both are kept on every customer.
//! Each scheme is an ordered band table; the first band containing the score wins.

use std::fmt;
use std::ops::RangeInclusive;

/// Coarse three-way tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueTier {
    Low,
    Mid,
    High,
}

impl ValueTier {
    pub const ALL: [ValueTier; 3] = [ValueTier::Low, ValueTier::Mid, ValueTier::High];

    pub fn label(&self) -> &'static str {
        match self {
            ValueTier::Low => "Low Value",
            ValueTier::Mid => "Mid Value",
            ValueTier::High => "High Value",
        }
    }

    /// Tier for a composite score
    pub fn from_score(score: u8) -> Self {
        first_band(VALUE_TIER_BANDS, score).unwrap_or(ValueTier::Low)
    }
}

impl fmt::Display for ValueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Descriptive lifecycle segment, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleSegment {
    VipLoyal,
    PotentialLoyal,
    AtRisk,
    CantLose,
    Lost,
    /// Score outside every band; cannot happen for scores built from 1..=4 parts
    Unassigned,
}

impl LifecycleSegment {
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleSegment::VipLoyal => "VIP/Loyal",
            LifecycleSegment::PotentialLoyal => "Potential Loyal",
            LifecycleSegment::AtRisk => "At Risk",
            LifecycleSegment::CantLose => "Can't Lose",
            LifecycleSegment::Lost => "Lost",
            LifecycleSegment::Unassigned => "Unassigned",
        }
    }

    /// Segment for a composite score
    pub fn from_score(score: u8) -> Self {
        first_band(LIFECYCLE_BANDS, score).unwrap_or(LifecycleSegment::Unassigned)
    }
}

impl fmt::Display for LifecycleSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const VALUE_TIER_BANDS: &[(RangeInclusive<u8>, ValueTier)] = &[
    (9..=u8::MAX, ValueTier::High),
    (5..=8, ValueTier::Mid),
    (0..=4, ValueTier::Low),
];

const LIFECYCLE_BANDS: &[(RangeInclusive<u8>, LifecycleSegment)] = &[
    (9..=u8::MAX, LifecycleSegment::VipLoyal),
    (6..=8, LifecycleSegment::PotentialLoyal),
    (5..=5, LifecycleSegment::AtRisk),
    (4..=4, LifecycleSegment::CantLose),
    (3..=3, LifecycleSegment::Lost),
];

fn first_band<L: Copy>(bands: &[(RangeInclusive<u8>, L)], score: u8) -> Option<L> {
    bands
        .iter()
        .find(|(band, _)| band.contains(&score))
        .map(|(_, label)| *label)
}

/// Ordinal R, F and M scores, each in 1..=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RfmScores {
    pub r: u8,
    pub f: u8,
    pub m: u8,
}

impl RfmScores {
    /// `R + F + M`, in 3..=12
    pub fn composite(&self) -> u8 {
        self.r + self.f + self.m
    }

    /// Digits of R, F and M concatenated, e.g. "432"
    pub fn code(&self) -> String {
        format!("{}{}{}", self.r, self.f, self.m)
    }
}

/// Everything the classifier derives from one set of scores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub segment_code: String,
    pub rfm_score: u8,
    pub value_tier: ValueTier,
    pub lifecycle: LifecycleSegment,
}

pub fn classify(scores: RfmScores) -> Classification {
    let rfm_score = scores.composite();
    Classification {
        segment_code: scores.code(),
        rfm_score,
        value_tier: ValueTier::from_score(rfm_score),
        lifecycle: LifecycleSegment::from_score(rfm_score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_tier_bands() {
        assert_eq!(ValueTier::from_score(3), ValueTier::Low);
        assert_eq!(ValueTier::from_score(4), ValueTier::Low);
        assert_eq!(ValueTier::from_score(5), ValueTier::Mid);
        assert_eq!(ValueTier::from_score(8), ValueTier::Mid);
        assert_eq!(ValueTier::from_score(9), ValueTier::High);
        assert_eq!(ValueTier::from_score(12), ValueTier::High);
    }

    #[test]
    fn test_lifecycle_bands() {
        assert_eq!(LifecycleSegment::from_score(12), LifecycleSegment::VipLoyal);
        assert_eq!(LifecycleSegment::from_score(9), LifecycleSegment::VipLoyal);
        assert_eq!(LifecycleSegment::from_score(8), LifecycleSegment::PotentialLoyal);
        assert_eq!(LifecycleSegment::from_score(6), LifecycleSegment::PotentialLoyal);
        assert_eq!(LifecycleSegment::from_score(5), LifecycleSegment::AtRisk);
        assert_eq!(LifecycleSegment::from_score(4), LifecycleSegment::CantLose);
        assert_eq!(LifecycleSegment::from_score(3), LifecycleSegment::Lost);
        assert_eq!(LifecycleSegment::from_score(2), LifecycleSegment::Unassigned);
    }

    #[test]
    fn test_every_reachable_score_is_labelled() {
        for r in 1..=4 {
            for f in 1..=4 {
                for m in 1..=4 {
                    let class = classify(RfmScores { r, f, m });
                    assert!((3..=12).contains(&class.rfm_score));
                    assert_ne!(class.lifecycle, LifecycleSegment::Unassigned);
                }
            }
        }
    }

    #[test]
    fn test_classify_builds_code_and_score() {
        let class = classify(RfmScores { r: 4, f: 3, m: 2 });
        assert_eq!(class.segment_code, "432");
        assert_eq!(class.rfm_score, 9);
        assert_eq!(class.value_tier, ValueTier::High);
        assert_eq!(class.lifecycle, LifecycleSegment::VipLoyal);
    }

    #[test]
    fn test_schemes_are_independent() {
        // Mid Value spans three lifecycle segments
        let labels: Vec<_> = (5..=8)
            .map(|score| (ValueTier::from_score(score), LifecycleSegment::from_score(score)))
            .collect();
        assert!(labels.iter().all(|(tier, _)| *tier == ValueTier::Mid));
        assert_eq!(labels[0].1, LifecycleSegment::AtRisk);
        assert_eq!(labels[1].1, LifecycleSegment::PotentialLoyal);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ValueTier::Mid.to_string(), "Mid Value");
        assert_eq!(LifecycleSegment::CantLose.to_string(), "Can't Lose");
        assert_eq!(LifecycleSegment::VipLoyal.label(), "VIP/Loyal");
    }
}
