//! Bounded, append-only pattern history
//!
//! Shared by every analysis in a process. Patterns are recorded once and never
//! mutated; when capacity is reached the oldest are evicted.

use crate::analyzer::pattern::TheaterPattern;
use crate::isolation_forest::pattern_features;
use std::collections::VecDeque;
use std::sync::RwLock;

/// Similarity above which two patterns are "the same kind of case"
const SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Debug)]
pub struct PatternHistory {
    patterns: RwLock<VecDeque<TheaterPattern>>,
    capacity: usize,
}

impl PatternHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            patterns: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<TheaterPattern>> {
        match self.patterns.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append patterns in one write, keeping the most recent `capacity`
    pub fn record_all(&self, patterns: &[TheaterPattern]) {
        if patterns.is_empty() {
            return;
        }
        let mut history = match self.patterns.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for pattern in patterns {
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(pattern.clone());
        }
    }

    /// Copy of the recorded patterns, oldest first
    pub fn snapshot(&self) -> Vec<TheaterPattern> {
        self.read().iter().cloned().collect()
    }

    /// Feature vectors of all recorded patterns
    pub fn feature_matrix(&self) -> Vec<Vec<f64>> {
        self.read().iter().map(pattern_features).collect()
    }

    /// Prior patterns of the same type with similar severity and confidence
    pub fn similar(&self, query: &TheaterPattern) -> Vec<TheaterPattern> {
        self.read()
            .iter()
            .filter(|p| similarity(p, query) > SIMILARITY_THRESHOLD)
            .cloned()
            .collect()
    }
}

/// 0 for different pattern types, otherwise `1 - mean(|Δseverity|, |Δconfidence|)`
pub fn similarity(a: &TheaterPattern, b: &TheaterPattern) -> f64 {
    if a.pattern_type != b.pattern_type {
        return 0.0;
    }
    let severity = (a.severity.weight() - b.severity.weight()).abs();
    let confidence = (a.confidence - b.confidence).abs();
    1.0 - (severity + confidence) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::pattern::PatternType;
    use crate::detectors::Severity;

    fn pattern(t: PatternType, severity: Severity, confidence: f64) -> TheaterPattern {
        TheaterPattern::new(t, severity, confidence, "src")
    }

    #[test]
    fn test_keeps_most_recent() {
        let history = PatternHistory::new(3);
        let batch: Vec<TheaterPattern> = (0..5)
            .map(|i| pattern(PatternType::MetricGaming, Severity::High, i as f64 / 10.0))
            .collect();
        history.record_all(&batch);
        let kept = history.snapshot();
        assert_eq!(kept.len(), 3);
        assert!((kept[0].confidence - 0.2).abs() < 1e-12);
        assert!((kept[2].confidence - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_similar_requires_same_type() {
        let history = PatternHistory::new(10);
        history.record_all(&[
            pattern(PatternType::MetricGaming, Severity::High, 0.9),
            pattern(PatternType::PerformanceTheater, Severity::High, 0.9),
            pattern(PatternType::MetricGaming, Severity::Low, 0.1),
        ]);
        let similar = history.similar(&pattern(PatternType::MetricGaming, Severity::High, 0.85));
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].pattern_type, PatternType::MetricGaming);
    }

    #[test]
    fn test_feature_matrix_shape() {
        let history = PatternHistory::new(10);
        history.record_all(&[pattern(PatternType::Anomaly, Severity::Medium, 0.7)]);
        let matrix = history.feature_matrix();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].len(), 5);
    }
}
