//! Semantic validation of a loaded configuration.
//!
//! Syntax errors are caught by the loader; this pass checks that the values
//! describe a runnable harvest (profiles present, tier table well-formed,
//! budgets sane) and flags suspicious-but-legal settings as warnings.

use gleaner_common::ScrollMode;

use crate::schema::GleanerConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "collector.tiers".
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate a configuration for running a harvest.
#[must_use]
pub fn validate(cfg: &GleanerConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if cfg.session.profile_ids.is_empty() {
        result.push(
            Severity::Error,
            "session.profile_ids",
            "no browser profiles configured; at least one is required to acquire a session",
        );
    }

    if cfg.run.session_count == 0 {
        result.push(
            Severity::Error,
            "run.session_count",
            "session_count must be at least 1",
        );
    } else if cfg.run.session_count > cfg.session.profile_ids.len()
        && !cfg.session.profile_ids.is_empty()
    {
        result.push(
            Severity::Info,
            "run.session_count",
            format!(
                "session_count {} exceeds the {} configured profiles and will be clamped",
                cfg.run.session_count,
                cfg.session.profile_ids.len()
            ),
        );
    }

    let valid_targets = cfg.resolved_targets().len();
    if valid_targets == 0 {
        result.push(
            Severity::Error,
            "targets",
            "no valid targets; each entry needs a user, a keyword, or both",
        );
    }
    for (i, entry) in cfg.targets.iter().enumerate() {
        if entry.to_target().is_none() {
            result.push(
                Severity::Warning,
                &format!("targets[{i}]"),
                "entry has neither user nor keyword and will be skipped",
            );
        }
    }

    validate_tiers(cfg, &mut result);

    if cfg.collector.checkpoint_interval == 0 {
        result.push(
            Severity::Error,
            "collector.checkpoint_interval",
            "checkpoint_interval must be at least 1",
        );
    }
    if cfg.collector.base_scroll_distance <= 0 {
        result.push(
            Severity::Error,
            "collector.base_scroll_distance",
            "base scroll distance must be positive",
        );
    }
    if cfg.collector.max_scroll_attempts == 0 {
        result.push(
            Severity::Warning,
            "collector.max_scroll_attempts",
            "a zero attempt budget terminates every target immediately",
        );
    }

    if cfg.session.start_retries == 0 {
        result.push(
            Severity::Warning,
            "session.start_retries",
            "no retries: a single launcher hiccup will fail the session",
        );
    }

    result
}

fn validate_tiers(cfg: &GleanerConfig, result: &mut ValidationResult) {
    let tiers = &cfg.collector.tiers;
    if tiers.is_empty() {
        result.push(
            Severity::Error,
            "collector.tiers",
            "tier table is empty; at least a normal tier is required",
        );
        return;
    }

    if tiers[0].min_stagnant_rounds != 0 {
        result.push(
            Severity::Error,
            "collector.tiers",
            "the first tier must apply from 0 stagnant rounds",
        );
    }

    for pair in tiers.windows(2) {
        if pair[0].min_stagnant_rounds >= pair[1].min_stagnant_rounds {
            result.push(
                Severity::Error,
                "collector.tiers",
                "tiers must be sorted by strictly increasing min_stagnant_rounds",
            );
            break;
        }
    }

    for (i, tier) in tiers.iter().enumerate() {
        if tier.mode == ScrollMode::Refresh {
            if i != tiers.len() - 1 {
                result.push(
                    Severity::Error,
                    "collector.tiers",
                    "the refresh tier must be the last row",
                );
            }
            continue;
        }
        if tier.distance_multiplier <= 0.0 || tier.wait_multiplier <= 0.0 {
            result.push(
                Severity::Error,
                "collector.tiers",
                format!("tier {i}: multipliers must be positive for non-refresh modes"),
            );
        }
    }
}
