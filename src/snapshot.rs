//! Offline input: a program taxonomy and its assessments captured as JSON.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::{Assessment, EpaLink, SubCompetency};
use crate::taxonomy::EpaSubCompetencyMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub sub_competencies: Vec<SubCompetency>,
    #[serde(default)]
    pub epa_links: Vec<EpaLink>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
}

impl Snapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid snapshot {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn epa_map(&self) -> EpaSubCompetencyMap {
        EpaSubCompetencyMap::from_links(&self.epa_links)
    }

    /// The trainee whose grid to build. Without an explicit choice the
    /// snapshot must not mix trainees.
    pub fn trainee_scope(&self, trainee: Option<Uuid>) -> Result<Option<Uuid>, ValidationError> {
        if trainee.is_some() {
            return Ok(trainee);
        }

        let trainees: HashSet<Uuid> = self
            .assessments
            .iter()
            .map(|assessment| assessment.trainee_id)
            .collect();
        if trainees.len() > 1 {
            return Err(ValidationError::MultipleTrainees(trainees.len()));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::compute_competency_grid;

    const SAMPLE: &str = r#"{
        "sub_competencies": [
            {"id": "0b3c8c8e-6f7e-4b61-9c62-1d1f5c0a0001", "title": "History", "core_competency_title": "Patient Care"},
            {"id": "0b3c8c8e-6f7e-4b61-9c62-1d1f5c0a0002", "title": "Comm", "core_competency_title": "Interpersonal and Communication Skills"}
        ],
        "epa_links": [
            {"epa_id": "7f0e1d2c-0000-4000-8000-00000000e001", "sub_competency_id": "0b3c8c8e-6f7e-4b61-9c62-1d1f5c0a0001"}
        ],
        "assessments": [
            {
                "id": "a0000000-0000-4000-8000-000000000001",
                "trainee_id": "c0000000-0000-4000-8000-000000000001",
                "shift_date": "2026-02-14",
                "assessment_epas": [
                    {"epa_id": "7f0e1d2c-0000-4000-8000-00000000e001", "entrustment_level": 3, "what_went_well": "Focused history"},
                    {"epa_id": "7f0e1d2c-0000-4000-8000-00000000e001", "entrustment_level": 5}
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_and_feeds_the_grid() {
        let snapshot = Snapshot::parse(SAMPLE).unwrap();
        assert_eq!(snapshot.assessments[0].assessment_epas[0].what_went_well, "Focused history");
        assert!(snapshot.assessments[0].assessment_epas[1].what_could_improve.is_empty());

        let rows = compute_competency_grid(
            &snapshot.sub_competencies,
            &snapshot.epa_map(),
            &snapshot.assessments,
        );
        assert_eq!(rows[0].sub_competency_title, "Comm");
        assert_eq!(rows[1].total_assessments, 2);
        assert_eq!(rows[1].milestone_level, 4.0);
    }

    #[test]
    fn rejects_out_of_range_entrustment() {
        let broken = SAMPLE.replace("\"entrustment_level\": 5", "\"entrustment_level\": 7");
        let err = Snapshot::parse(&broken).unwrap_err();
        assert!(err.to_string().contains("outside 1..=5"));
    }

    #[test]
    fn mixed_trainees_need_an_explicit_choice() {
        let mut snapshot = Snapshot::parse(SAMPLE).unwrap();
        let first = snapshot.assessments[0].trainee_id;
        assert_eq!(snapshot.trainee_scope(None), Ok(None));

        let mut other = snapshot.assessments[0].clone();
        other.id = Uuid::new_v4();
        other.trainee_id = Uuid::new_v4();
        snapshot.assessments.push(other);

        assert_eq!(
            snapshot.trainee_scope(None),
            Err(ValidationError::MultipleTrainees(2))
        );
        assert_eq!(snapshot.trainee_scope(Some(first)), Ok(Some(first)));
    }

    #[test]
    fn links_and_assessments_are_optional() {
        let snapshot = Snapshot::parse(r#"{"sub_competencies": []}"#).unwrap();
        assert!(snapshot.epa_map().is_empty());
        assert!(snapshot.assessments.is_empty());
    }
}
