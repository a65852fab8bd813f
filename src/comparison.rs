use serde::{Deserialize, Serialize};
use std::fmt;

/// A labelled overall score, e.g. one saved run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRun {
    pub label: String,
    pub score: u32,
}

impl ScoredRun {
    pub fn new(label: impl Into<String>, score: u32) -> Self {
        Self { label: label.into(), score }
    }
}

/// Best-versus-worst summary across two or more runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunComparison {
    pub best: ScoredRun,
    pub worst: ScoredRun,
    /// floor((best - worst) / worst * 100); 0 when the worst score is 0.
    pub spread_percent: u32,
}

impl RunComparison {
    /// `None` with fewer than two runs. Ties keep the earliest run.
    pub fn compare(runs: &[ScoredRun]) -> Option<Self> {
        if runs.len() < 2 {
            return None;
        }

        let mut best = &runs[0];
        let mut worst = &runs[0];
        for run in &runs[1..] {
            if run.score > best.score {
                best = run;
            }
            if run.score < worst.score {
                worst = run;
            }
        }

        let spread_percent = if worst.score > 0 {
            (best.score - worst.score) * 100 / worst.score
        } else {
            0
        };

        Some(Self {
            best: best.clone(),
            worst: worst.clone(),
            spread_percent,
        })
    }
}

impl fmt::Display for RunComparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} is {}% better than {}",
            self.best.label, self.spread_percent, self.worst.label
        )
    }
}
