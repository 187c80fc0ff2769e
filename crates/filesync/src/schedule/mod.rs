//! Cron schedule evaluation: when should the next sync pass start?
//!
//! A [`ScheduleSet`] is parsed once at startup from the configured cron
//! expressions. Multiple rules are combined with union semantics: the set
//! fires at the earliest upcoming occurrence of any rule. All evaluation is
//! done in UTC.

mod expr;

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Wait used when no rule yields a future occurrence.
pub const DEFAULT_FALLBACK_WAIT: Duration = Duration::from_secs(12 * 60 * 60);

/// Smallest wait the scheduler will ever sleep for.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(60);

/// Errors raised while parsing a schedule. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The expression does not have a recognisable cron shape.
    #[error("invalid cron expression `{expr}`: {reason}")]
    Syntax { expr: String, reason: String },

    /// The `cron` crate rejected the normalised expression.
    #[error("invalid cron expression `{expr}`: {source}")]
    Parse {
        expr: String,
        #[source]
        source: cron::error::Error,
    },
}

#[derive(Debug, Clone)]
struct Rule {
    expr: String,
    schedule: cron::Schedule,
}

/// An immutable set of parsed cron rules.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSet {
    rules: Vec<Rule>,
}

impl ScheduleSet {
    /// Parse every expression in `exprs`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] for the first expression that does not parse.
    pub fn parse<I, S>(exprs: I) -> Result<Self, ScheduleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = exprs
            .into_iter()
            .map(|e| parse_rule(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The expressions as written in configuration.
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.expr.as_str())
    }

    /// Earliest occurrence of any rule strictly after `now`.
    ///
    /// Returns `None` when no rule fires again (e.g. every rule is pinned to a
    /// past year) or the set is empty.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.rules
            .iter()
            .filter_map(|r| r.schedule.after(&now).next())
            .min()
    }
}

fn parse_rule(expr: &str) -> Result<Rule, ScheduleError> {
    let normalised = expr::normalise(expr).map_err(|reason| ScheduleError::Syntax {
        expr: expr.to_owned(),
        reason,
    })?;
    let schedule =
        cron::Schedule::from_str(&normalised).map_err(|source| ScheduleError::Parse {
            expr: expr.to_owned(),
            source,
        })?;
    Ok(Rule {
        expr: expr.to_owned(),
        schedule,
    })
}

/// Turn the next occurrence into a sleep duration.
///
/// - `None` → `fallback`.
/// - A zero or negative gap (clock skew, occurrence already elapsed) →
///   `min_delay`, so the scheduler neither busy-loops nor oversleeps.
pub fn compute_delay(
    next: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    fallback: Duration,
    min_delay: Duration,
) -> Duration {
    let Some(next) = next else {
        return fallback;
    };
    match (next - now).to_std() {
        Ok(delay) if !delay.is_zero() => delay,
        _ => min_delay,
    }
}
