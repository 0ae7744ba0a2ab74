//! Pattern Analysis
//!
//! Read-only statistics over the pattern history of one tool: success rate,
//! average duration, error frequency, and parameter suggestions mined from
//! the most frequent successful calls.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskloop_core::ToolParams;

use super::patterns::PatternHistory;
use crate::error::ToolErrorKind;

/// Parameters that succeeded before, with their empirical success rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSuggestion {
    pub parameters: ToolParams,
    /// successes / attempts among patterns with exactly these parameters
    pub confidence: f64,
    pub successes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub tool_name: String,
    pub total_calls: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    /// Most frequent first
    pub error_frequency: Vec<(ToolErrorKind, usize)>,
    /// Highest confidence first
    pub suggestions: Vec<ParameterSuggestion>,
}

#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    min_success_rate: f64,
    max_suggestions: usize,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl PatternAnalyzer {
    pub fn new(min_success_rate: f64) -> Self {
        Self {
            min_success_rate,
            max_suggestions: 3,
        }
    }

    pub fn analyze(
        &self,
        history: &PatternHistory,
        tool_name: &str,
        now: DateTime<Utc>,
    ) -> PatternAnalysis {
        let patterns = history.for_tool(tool_name, now);
        let total = patterns.len();
        let successes = patterns.iter().filter(|p| p.outcome.success).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64
        };
        let average_duration_ms = if total == 0 {
            0.0
        } else {
            patterns.iter().map(|p| p.outcome.duration_ms as f64).sum::<f64>() / total as f64
        };

        let mut errors: HashMap<ToolErrorKind, usize> = HashMap::new();
        for p in patterns.iter().filter(|p| !p.outcome.success) {
            *errors.entry(p.error_type.unwrap_or(ToolErrorKind::Unknown)).or_default() += 1;
        }
        let mut error_frequency: Vec<_> = errors.into_iter().collect();
        error_frequency.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        // (attempts, successes) per distinct parameter set
        let mut by_params: HashMap<&ToolParams, (usize, usize)> = HashMap::new();
        for p in &patterns {
            let entry = by_params.entry(&p.parameters).or_default();
            entry.0 += 1;
            if p.outcome.success {
                entry.1 += 1;
            }
        }

        let mut frequent: Vec<(&ToolParams, usize, usize)> = by_params
            .into_iter()
            .filter(|(_, (_, ok))| *ok > 0)
            .map(|(params, (attempts, ok))| (params, attempts, ok))
            .collect();
        frequent.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));
        frequent.truncate(self.max_suggestions);

        let mut suggestions: Vec<ParameterSuggestion> = frequent
            .into_iter()
            .map(|(params, attempts, ok)| ParameterSuggestion {
                parameters: params.clone(),
                confidence: ok as f64 / attempts as f64,
                successes: ok,
            })
            .filter(|s| s.confidence > self.min_success_rate)
            .collect();
        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.successes.cmp(&a.successes))
        });

        PatternAnalysis {
            tool_name: tool_name.to_string(),
            total_calls: total,
            success_rate,
            average_duration_ms,
            error_frequency,
            suggestions,
        }
    }
}
