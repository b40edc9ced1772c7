use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::milestone::EntrustmentLevel;
use crate::models::{
    Assessment, LevelShare, MonthlyTrend, ProgramMetrics, ProgramPerformance, Timeframe, Trainee,
    TraineeBreakdown,
};

pub const DEFAULT_MONTHS: i64 = 6;

/// Lookback window ending today; a month is counted as 30 days.
pub fn timeframe(months: i64) -> Result<Timeframe, ValidationError> {
    timeframe_ending(Utc::now().date_naive(), months)
}

pub fn timeframe_ending(end_date: NaiveDate, months: i64) -> Result<Timeframe, ValidationError> {
    if months < 1 {
        return Err(ValidationError::InvalidMonths(months));
    }

    let start_date = months
        .checked_mul(30)
        .and_then(Duration::try_days)
        .and_then(|lookback| end_date.checked_sub_signed(lookback))
        .ok_or(ValidationError::InvalidMonths(months))?;

    Ok(Timeframe {
        months,
        start_date,
        end_date,
    })
}

pub fn program_performance(
    trainees: &[Trainee],
    period_assessments: &[Assessment],
    all_assessments: &[Assessment],
    timeframe: Timeframe,
) -> ProgramPerformance {
    let roster: HashSet<Uuid> = trainees.iter().map(|trainee| trainee.id).collect();
    let period: Vec<&Assessment> = period_assessments
        .iter()
        .filter(|assessment| roster.contains(&assessment.trainee_id))
        .collect();
    let lifetime: Vec<&Assessment> = all_assessments
        .iter()
        .filter(|assessment| roster.contains(&assessment.trainee_id))
        .collect();

    let period_levels: Vec<EntrustmentLevel> = levels(&period).collect();
    let active: HashSet<Uuid> = period.iter().map(|assessment| assessment.trainee_id).collect();

    let metrics = ProgramMetrics {
        total_trainees: trainees.len(),
        active_trainees: active.len(),
        assessments_in_period: period.len(),
        total_lifetime_assessments: lifetime.len(),
        average_competency_level: round_to(mean(&period_levels), 2),
        completion_rate: if trainees.is_empty() {
            0.0
        } else {
            round_to(active.len() as f64 / trainees.len() as f64 * 100.0, 1)
        },
    };

    let trainee_breakdown = trainees
        .iter()
        .map(|trainee| trainee_breakdown(trainee, &period, &lifetime))
        .collect();

    ProgramPerformance {
        timeframe,
        metrics,
        trainee_breakdown,
        competency_distribution: level_distribution(&period_levels),
        recent_trends: monthly_trends(&period),
    }
}

fn trainee_breakdown(
    trainee: &Trainee,
    period: &[&Assessment],
    lifetime: &[&Assessment],
) -> TraineeBreakdown {
    let in_period: Vec<&Assessment> = period
        .iter()
        .copied()
        .filter(|assessment| assessment.trainee_id == trainee.id)
        .collect();
    let all: Vec<&Assessment> = lifetime
        .iter()
        .copied()
        .filter(|assessment| assessment.trainee_id == trainee.id)
        .collect();
    let lifetime_levels: Vec<EntrustmentLevel> = levels(&all).collect();

    TraineeBreakdown {
        id: trainee.id,
        name: trainee.name.clone(),
        department: trainee.department.clone(),
        assessments_in_period: in_period.len(),
        total_assessments: all.len(),
        average_competency_level: round_to(mean(&lifetime_levels), 2),
        is_active: !in_period.is_empty(),
        last_assessment_date: in_period.iter().map(|assessment| assessment.shift_date).max(),
    }
}

pub fn level_distribution(levels: &[EntrustmentLevel]) -> Vec<LevelShare> {
    let mut counts: BTreeMap<EntrustmentLevel, usize> = BTreeMap::new();
    for level in levels {
        *counts.entry(*level).or_insert(0) += 1;
    }

    let total = levels.len();
    counts
        .into_iter()
        .map(|(level, count)| LevelShare {
            level,
            count,
            percentage: round_to(count as f64 / total as f64 * 100.0, 1),
        })
        .collect()
}

pub fn monthly_trends(assessments: &[&Assessment]) -> Vec<MonthlyTrend> {
    let mut months: BTreeMap<String, (usize, Vec<EntrustmentLevel>)> = BTreeMap::new();

    for assessment in assessments {
        let entry = months
            .entry(assessment.shift_date.format("%Y-%m").to_string())
            .or_insert_with(|| (0, Vec::new()));
        entry.0 += 1;
        entry
            .1
            .extend(assessment.assessment_epas.iter().map(|epa| epa.entrustment_level));
    }

    months
        .into_iter()
        .map(|(month, (assessments, levels))| MonthlyTrend {
            month,
            assessments,
            average_level: round_to(mean(&levels), 2),
        })
        .collect()
}

fn levels<'a>(assessments: &'a [&'a Assessment]) -> impl Iterator<Item = EntrustmentLevel> + 'a {
    assessments
        .iter()
        .flat_map(|assessment| assessment.assessment_epas.iter())
        .map(|epa| epa.entrustment_level)
}

fn mean(levels: &[EntrustmentLevel]) -> f64 {
    if levels.is_empty() {
        return 0.0;
    }
    levels.iter().map(|level| f64::from(level.value())).sum::<f64>() / levels.len() as f64
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
