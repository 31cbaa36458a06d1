//! Scoring and classification rules.
//!
//! Everything here is a pure function of the configured thresholds and
//! weights, so the decision math can be tested without any service.

use super::{ComparisonError, CompareResult};
use crate::config::DecisionConfig;
use crate::semantic::{Analysis, Relationship};
use crate::types::Decision;

/// Thresholds and fusion weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    same_threshold: f32,
    addon_min_threshold: f32,
    same_tolerance: f32,
    embedding_weight: f32,
    analysis_weight: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            same_threshold: 0.85,
            addon_min_threshold: 0.60,
            same_tolerance: 0.05,
            embedding_weight: 0.6,
            analysis_weight: 0.4,
        }
    }
}

impl DecisionPolicy {
    /// Build from validated settings.
    pub fn from_config(config: &DecisionConfig) -> CompareResult<Self> {
        Self {
            same_threshold: config.same_threshold,
            addon_min_threshold: config.addon_min_threshold,
            same_tolerance: config.same_tolerance,
            embedding_weight: config.embedding_weight,
            analysis_weight: config.analysis_weight,
        }
        .validated()
    }

    /// Replace thresholds (per-request override); weights stay.
    pub fn with_thresholds(
        self,
        same_threshold: Option<f32>,
        addon_min_threshold: Option<f32>,
    ) -> CompareResult<Self> {
        Self {
            same_threshold: same_threshold.unwrap_or(self.same_threshold),
            addon_min_threshold: addon_min_threshold.unwrap_or(self.addon_min_threshold),
            ..self
        }
        .validated()
    }

    fn validated(self) -> CompareResult<Self> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ComparisonError::InvalidPolicy(format!(
                    "{name} must be within [0, 1], got {v}"
                )))
            }
        };
        unit("same_threshold", self.same_threshold)?;
        unit("addon_min_threshold", self.addon_min_threshold)?;
        unit("same_tolerance", self.same_tolerance)?;
        unit("embedding_weight", self.embedding_weight)?;
        unit("analysis_weight", self.analysis_weight)?;

        if self.addon_min_threshold > self.same_threshold {
            return Err(ComparisonError::InvalidPolicy(format!(
                "addon_min_threshold ({}) must not exceed same_threshold ({})",
                self.addon_min_threshold, self.same_threshold
            )));
        }
        let sum = self.embedding_weight + self.analysis_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ComparisonError::InvalidPolicy(format!(
                "embedding_weight + analysis_weight must equal 1.0, got {sum}"
            )));
        }
        Ok(self)
    }

    pub fn same_threshold(&self) -> f32 {
        self.same_threshold
    }

    pub fn addon_min_threshold(&self) -> f32 {
        self.addon_min_threshold
    }

    /// Categorical relationship to a number, plus match bonuses, capped at 1.0.
    pub fn analysis_similarity(&self, analysis: &Analysis) -> f32 {
        let base: f32 = match analysis.relationship {
            Relationship::Identical => 1.0,
            Relationship::Expanded => 0.75,
            Relationship::Similar => 0.60,
            Relationship::Related => 0.45,
            Relationship::Different | Relationship::Unknown => 0.20,
        };
        let mut score = base;
        if analysis.business_rule_match {
            score += 0.15;
        }
        if analysis.behavior_match {
            score += 0.10;
        }
        score.min(1.0)
    }

    /// Weighted blend of the two signals.
    pub fn fuse(&self, embedding_similarity: f32, analysis_similarity: f32) -> f32 {
        self.embedding_weight * embedding_similarity + self.analysis_weight * analysis_similarity
    }

    /// SAME, then ADD-ON (range rule, then high-similarity coverage override), else NEW.
    pub fn classify(&self, fused: f32, embedding_similarity: f32, analysis: &Analysis) -> Decision {
        let adds_coverage = !analysis.coverage_expansion.is_empty();

        if fused >= self.same_threshold
            && embedding_similarity >= self.same_threshold - self.same_tolerance
            && analysis.business_rule_match
            && analysis.behavior_match
            && analysis.relationship == Relationship::Identical
        {
            return Decision::Same;
        }

        if fused >= self.addon_min_threshold
            && fused < self.same_threshold
            && analysis.business_rule_match
            && (analysis.relationship == Relationship::Expanded || adds_coverage)
        {
            return Decision::AddOn;
        }

        if fused >= self.same_threshold && analysis.business_rule_match && adds_coverage {
            return Decision::AddOn;
        }

        Decision::New
    }

    /// Fused score plus an agreement bonus and match bonuses, capped at 1.0.
    pub fn confidence(
        &self,
        fused: f32,
        embedding_similarity: f32,
        analysis_similarity: f32,
        analysis: &Analysis,
    ) -> f32 {
        let agreement = 1.0 - (embedding_similarity - analysis_similarity).abs();
        let mut confidence = fused + (agreement * 0.1).min(0.1);
        if analysis.business_rule_match {
            confidence += 0.05;
        }
        if analysis.behavior_match {
            confidence += 0.05;
        }
        confidence.min(1.0)
    }

    /// Templated rationale used when no phrased explanation is available.
    pub fn fallback_rationale(
        &self,
        decision: Decision,
        fused: f32,
        embedding_similarity: f32,
        analysis_similarity: f32,
        analysis: &Analysis,
    ) -> String {
        let mut text = format!(
            "Decision: {decision} (fused {:.1}%, embedding {:.1}%, analysis {:.1}%)",
            fused * 100.0,
            embedding_similarity * 100.0,
            analysis_similarity * 100.0
        );
        if !analysis.reasoning.is_empty() {
            text.push_str(". ");
            text.push_str(&analysis.reasoning);
        }
        text
    }
}
