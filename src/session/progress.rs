//! Stage budgets and progress derivation.
//!
//! Progress is never tracked independently: it is recomputed from the
//! transcript, the stage, the current disorder and the oracle's stage limits.

use crate::error::{OracleError, OracleResult};
use crate::oracle::StageLimits;
use crate::storage::{Session, Stage};

/// Disorder key used while the session has no positive classification.
pub const DEFAULT_DISORDER_KEY: i64 = 1;

/// Resolve the key used to index stage tables and sent as `idDisorder`.
///
/// Both the unclassified sentinel and the "no disorder" label map to
/// [`DEFAULT_DISORDER_KEY`].
pub fn disorder_key(current_disorder: i64) -> i64 {
    if current_disorder > 0 {
        current_disorder
    } else {
        DEFAULT_DISORDER_KEY
    }
}

/// Cumulative question budgets for one disorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBudget {
    /// Questions in stage 1.
    pub first: u32,
    /// Questions in stages 1 and 2.
    pub second: u32,
    /// Questions in stages 1 to 3.
    pub third: u32,
}

impl StageBudget {
    /// Resolve the budgets for `current_disorder`.
    pub fn resolve(limits: &StageLimits, current_disorder: i64) -> OracleResult<Self> {
        let key = disorder_key(current_disorder);
        let lookup = |table: &std::collections::BTreeMap<i64, u32>, name: &str| {
            table
                .get(&key)
                .copied()
                .ok_or_else(|| OracleError::InvalidResponse {
                    message: format!("{} has no entry for disorder {}", name, key),
                })
        };

        let first = limits.first_stage_limit;
        let second = first + lookup(&limits.second_stage_limit, "secondStageLimit")?;
        let third = second + lookup(&limits.third_stage_limit, "thirdStageLimit")?;

        Ok(Self {
            first,
            second,
            third,
        })
    }

    /// Cumulative budget that bounds progress in `stage`.
    pub fn for_stage(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Screening => self.first,
            Stage::DisorderFocus => self.second,
            Stage::DisorderDepth | Stage::SymptomConfirmation => self.third,
        }
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Progress for the given question count, stage and budget.
pub fn progress_for(asked: u32, stage: Stage, budget: &StageBudget) -> f64 {
    let total = budget.for_stage(stage);
    if total == 0 {
        return 0.0;
    }
    let asked = asked.min(total);
    let raw = f64::from(asked) * 25.0 * f64::from(stage.number()) / f64::from(total);
    round1(raw).clamp(0.0, 100.0)
}

/// Derive the progress of `session` from its stored state.
pub fn compute(session: &Session, limits: &StageLimits) -> OracleResult<f64> {
    if session.finished {
        return Ok(100.0);
    }
    let budget = StageBudget::resolve(limits, session.current_disorder)?;
    Ok(progress_for(session.question_count(), session.stage, &budget))
}
