//! Normalisation of user-facing cron syntax into the dialect understood by the
//! [`cron`] crate.
//!
//! The `cron` crate expects a leading seconds field and numbers weekdays
//! `1`–`7` starting at Sunday. Operators write classic 5-field expressions
//! with weekdays `0`–`7` (`0` and `7` both Sunday), so every expression is
//! rewritten before parsing:
//!
//! ```text
//! "*/15 * * * 1-5"   →   "0 */15 * * * 2,3,4,5,6"
//! ```

/// Position of the day-of-week field once the seconds field is present.
const DOW_INDEX: usize = 5;

/// Rewrite `expr` into a 6- or 7-field expression for [`cron::Schedule`].
///
/// Returns a human-readable reason on failure; the caller attaches the
/// original expression.
pub(crate) fn normalise(expr: &str) -> Result<String, String> {
    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_owned).collect();
    match fields.len() {
        5 => fields.insert(0, "0".into()),
        6 | 7 => {}
        n => return Err(format!("expected 5, 6 or 7 fields, got {n}")),
    }
    fields[DOW_INDEX] = translate_day_of_week(&fields[DOW_INDEX])?;
    Ok(fields.join(" "))
}

/// Translate a standard day-of-week field into `cron` crate numbering.
///
/// Named days (`MON`, `SUN-SAT`), `*` and `?` pass through untouched. `*/n`
/// also passes through since shifting every value by one keeps the stride
/// anchored on Sunday. Numeric items are expanded into explicit lists.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    let mut out = Vec::new();
    for item in field.split(',') {
        if item.is_empty() {
            return Err(format!("day-of-week `{field}` has an empty list item"));
        }
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step `{step}`"))?;
                if step == 0 {
                    return Err("day-of-week step must be positive".into());
                }
                (base, Some(step))
            }
            None => (item, None),
        };

        if base == "*" || base == "?" || base.chars().any(|c| c.is_ascii_alphabetic()) {
            out.push(item.to_owned());
            continue;
        }

        let (lo, hi) = match base.split_once('-') {
            Some((lo, hi)) => (parse_weekday(lo)?, parse_weekday(hi)?),
            // `n/step` runs to the end of the week.
            None if step.is_some() => (parse_weekday(base)?, 6),
            None => {
                let day = parse_weekday(base)?;
                (day, day)
            }
        };
        if lo > hi {
            return Err(format!("day-of-week range `{base}` is reversed"));
        }
        for day in (lo..=hi).step_by(step.unwrap_or(1)) {
            out.push(to_crate_weekday(day).to_string());
        }
    }
    Ok(out.join(","))
}

fn parse_weekday(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if n <= 7 => Ok(n),
        _ => Err(format!("day-of-week value `{s}` is not in 0-7")),
    }
}

/// `0`/`7` (Sunday) → `1`, Monday `1` → `2`, …, Saturday `6` → `7`.
fn to_crate_weekday(day: u32) -> u32 {
    if day == 7 {
        1
    } else {
        day + 1
    }
}
