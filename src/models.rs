use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::milestone::EntrustmentLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCompetency {
    pub id: Uuid,
    pub title: String,
    pub core_competency_title: String,
}

/// One row of the many-to-many EPA to sub-competency relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpaLink {
    pub epa_id: Uuid,
    pub sub_competency_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentEpa {
    pub epa_id: Uuid,
    pub entrustment_level: EntrustmentLevel,
    #[serde(default)]
    pub what_went_well: String,
    #[serde(default)]
    pub what_could_improve: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub trainee_id: Uuid,
    pub shift_date: NaiveDate,
    #[serde(default)]
    pub assessment_epas: Vec<AssessmentEpa>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyGridRow {
    pub sub_competency_id: Uuid,
    pub sub_competency_title: String,
    pub core_competency_title: String,
    pub average_rating: f64,
    pub total_assessments: usize,
    pub milestone_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trainee {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub program_id: Uuid,
}

/// Inclusive shift-date window; an open end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ValidationError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ValidationError::InvertedRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }

    pub fn describe(&self) -> String {
        match (self.start, self.end) {
            (None, None) => "all dates".to_string(),
            (Some(start), None) => format!("since {start}"),
            (None, Some(end)) => format!("through {end}"),
            (Some(start), Some(end)) => format!("{start} to {end}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeframe {
    pub months: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramMetrics {
    pub total_trainees: usize,
    pub active_trainees: usize,
    pub assessments_in_period: usize,
    pub total_lifetime_assessments: usize,
    pub average_competency_level: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraineeBreakdown {
    pub id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub assessments_in_period: usize,
    pub total_assessments: usize,
    pub average_competency_level: f64,
    pub is_active: bool,
    pub last_assessment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelShare {
    pub level: EntrustmentLevel,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    pub month: String,
    pub assessments: usize,
    pub average_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramPerformance {
    pub timeframe: Timeframe,
    pub metrics: ProgramMetrics,
    pub trainee_breakdown: Vec<TraineeBreakdown>,
    pub competency_distribution: Vec<LevelShare>,
    pub recent_trends: Vec<MonthlyTrend>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = DateRange::new(Some(date(2026, 1, 1)), Some(date(2026, 1, 31))).unwrap();
        assert!(range.contains(date(2026, 1, 1)));
        assert!(range.contains(date(2026, 1, 31)));
        assert!(!range.contains(date(2026, 2, 1)));
        assert!(!range.contains(date(2025, 12, 31)));
    }

    #[test]
    fn open_range_accepts_everything() {
        let range = DateRange::unbounded();
        assert!(range.contains(date(1999, 6, 15)));
        assert_eq!(range.describe(), "all dates");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::new(Some(date(2026, 3, 1)), Some(date(2026, 2, 1))).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvertedRange {
                start: date(2026, 3, 1),
                end: date(2026, 2, 1)
            }
        );
    }
}
