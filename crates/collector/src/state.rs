//! Scroll loop state and the stagnation escalation ladder.

use std::time::Duration;

use gleaner_common::{ScrollMode, ScrollTier};

/// What the next round of the loop should do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPlan {
    pub mode: ScrollMode,
    /// Scroll distance in pixels. Zero for refresh rounds.
    pub distance: i64,
    /// Settle time after the action.
    pub wait: Duration,
}

/// Per-target loop state: attempt budget, stagnation streak, refresh budget.
///
/// Stagnant rounds select a tier; a round that yields new records drops the
/// state back to the first tier. A refresh resets the streak without
/// touching the counters already accumulated.
#[derive(Debug)]
pub struct ScrollState {
    tiers: Vec<ScrollTier>,
    pub attempts: u32,
    pub stagnant_rounds: u32,
    pub refreshes_used: u32,
}

impl ScrollState {
    #[must_use]
    pub fn new(tiers: Vec<ScrollTier>) -> Self {
        Self {
            tiers,
            attempts: 0,
            stagnant_rounds: 0,
            refreshes_used: 0,
        }
    }

    /// The highest tier whose threshold the current streak meets.
    #[must_use]
    pub fn current_tier(&self) -> ScrollTier {
        self.tiers
            .iter()
            .rev()
            .find(|t| self.stagnant_rounds >= t.min_stagnant_rounds)
            .or_else(|| self.tiers.first())
            .copied()
            .unwrap_or(ScrollTier {
                min_stagnant_rounds: 0,
                mode: ScrollMode::Normal,
                distance_multiplier: 1.0,
                wait_multiplier: 1.0,
            })
    }

    /// Plan the next round from the current tier and base parameters.
    #[must_use]
    pub fn plan(&self, base_distance: i64, base_wait: Duration) -> ScrollPlan {
        let tier = self.current_tier();
        if tier.mode == ScrollMode::Refresh {
            return ScrollPlan {
                mode: ScrollMode::Refresh,
                distance: 0,
                wait: base_wait,
            };
        }
        ScrollPlan {
            mode: tier.mode,
            distance: tier.scaled_distance(base_distance),
            wait: tier.scaled_wait(base_wait),
        }
    }

    /// A round produced new records.
    pub fn record_progress(&mut self) {
        self.stagnant_rounds = 0;
    }

    /// A round produced nothing new.
    pub fn record_stagnant(&mut self) {
        self.stagnant_rounds += 1;
    }

    /// A refresh was performed; the streak restarts at the first tier.
    pub fn record_refresh(&mut self) {
        self.refreshes_used += 1;
        self.stagnant_rounds = 0;
    }
}
