use std::collections::HashMap;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::milestone::milestone_level;
use crate::models::{Assessment, CompetencyGridRow, DateRange, SubCompetency};
use crate::taxonomy::EpaSubCompetencyMap;

/// Builds one row per sub-competency from a trainee's assessments.
///
/// Every sub-competency appears exactly once, in (core competency, title)
/// order, whether or not anything was observed for it. Observations whose EPA
/// has no mapping, or whose mapping points at a sub-competency outside
/// `sub_competencies`, are dropped.
pub fn compute_competency_grid(
    sub_competencies: &[SubCompetency],
    epa_map: &EpaSubCompetencyMap,
    assessments: &[Assessment],
) -> Vec<CompetencyGridRow> {
    let mut buckets: HashMap<Uuid, Vec<u8>> = sub_competencies
        .iter()
        .map(|sub_competency| (sub_competency.id, Vec::new()))
        .collect();

    let mut unmapped = 0usize;
    let mut stale = 0usize;

    for assessment in assessments {
        for observation in &assessment.assessment_epas {
            let Some(targets) = epa_map.sub_competencies_for(&observation.epa_id) else {
                debug!(
                    assessment_id = %assessment.id,
                    epa_id = %observation.epa_id,
                    "EPA has no sub-competency mapping, skipping observation"
                );
                unmapped += 1;
                continue;
            };

            for sub_competency_id in targets {
                match buckets.get_mut(sub_competency_id) {
                    Some(levels) => levels.push(observation.entrustment_level.value()),
                    None => {
                        trace!(
                            epa_id = %observation.epa_id,
                            sub_competency_id = %sub_competency_id,
                            "mapping references a sub-competency outside the program"
                        );
                        stale += 1;
                    }
                }
            }
        }
    }

    let mut rows = Vec::with_capacity(sub_competencies.len());
    for sub_competency in sub_competencies {
        let Some(levels) = buckets.remove(&sub_competency.id) else {
            continue;
        };
        rows.push(grid_row(sub_competency, &levels));
    }

    rows.sort_by(|a, b| {
        a.core_competency_title
            .cmp(&b.core_competency_title)
            .then_with(|| a.sub_competency_title.cmp(&b.sub_competency_title))
    });

    debug!(
        rows = rows.len(),
        assessments = assessments.len(),
        unmapped,
        stale,
        "computed competency grid"
    );

    rows
}

fn grid_row(sub_competency: &SubCompetency, levels: &[u8]) -> CompetencyGridRow {
    let total_assessments = levels.len();
    let average_rating = if total_assessments == 0 {
        0.0
    } else {
        levels.iter().map(|&level| f64::from(level)).sum::<f64>() / total_assessments as f64
    };

    CompetencyGridRow {
        sub_competency_id: sub_competency.id,
        sub_competency_title: sub_competency.title.clone(),
        core_competency_title: sub_competency.core_competency_title.clone(),
        average_rating,
        total_assessments,
        milestone_level: if total_assessments == 0 {
            0.0
        } else {
            milestone_level(average_rating)
        },
    }
}

/// Keeps assessments for the given trainee (all trainees when `None`) whose
/// shift date falls in `range`.
pub fn filter_assessments(
    assessments: &[Assessment],
    trainee_id: Option<Uuid>,
    range: &DateRange,
) -> Vec<Assessment> {
    assessments
        .iter()
        .filter(|assessment| trainee_id.map_or(true, |id| assessment.trainee_id == id))
        .filter(|assessment| range.contains(assessment.shift_date))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreCompetencyGroup<'a> {
    pub core_competency_title: &'a str,
    pub rows: Vec<&'a CompetencyGridRow>,
}

/// Splits an ordered grid into runs sharing a core competency.
pub fn group_by_core_competency(rows: &[CompetencyGridRow]) -> Vec<CoreCompetencyGroup<'_>> {
    let mut groups: Vec<CoreCompetencyGroup<'_>> = Vec::new();

    for row in rows {
        let starts_group = groups
            .last()
            .map_or(true, |group| group.core_competency_title != row.core_competency_title);

        if starts_group {
            groups.push(CoreCompetencyGroup {
                core_competency_title: &row.core_competency_title,
                rows: vec![row],
            });
        } else if let Some(group) = groups.last_mut() {
            group.rows.push(row);
        }
    }

    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCoverage {
    pub sub_competencies: usize,
    pub assessed: usize,
    pub observations: usize,
}

impl GridCoverage {
    pub fn of(rows: &[CompetencyGridRow]) -> Self {
        Self {
            sub_competencies: rows.len(),
            assessed: rows.iter().filter(|row| row.total_assessments > 0).count(),
            observations: rows.iter().map(|row| row.total_assessments).sum(),
        }
    }

    pub fn unassessed(&self) -> usize {
        self.sub_competencies - self.assessed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milestone::EntrustmentLevel;
    use crate::models::{AssessmentEpa, EpaLink};
    use chrono::NaiveDate;

    fn sub_competency(title: &str, core: &str) -> SubCompetency {
        SubCompetency {
            id: Uuid::new_v4(),
            title: title.to_string(),
            core_competency_title: core.to_string(),
        }
    }

    fn link(epa_id: Uuid, sub_competency_id: Uuid) -> EpaLink {
        EpaLink {
            epa_id,
            sub_competency_id,
        }
    }

    fn observation(epa_id: Uuid, level: i32) -> AssessmentEpa {
        AssessmentEpa {
            epa_id,
            entrustment_level: EntrustmentLevel::try_from(level).unwrap(),
            what_went_well: String::new(),
            what_could_improve: String::new(),
        }
    }

    fn assessment_on(trainee_id: Uuid, day: u32, observations: Vec<AssessmentEpa>) -> Assessment {
        Assessment {
            id: Uuid::new_v4(),
            trainee_id,
            shift_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            assessment_epas: observations,
        }
    }

    fn assessment(observations: Vec<AssessmentEpa>) -> Assessment {
        assessment_on(Uuid::new_v4(), 1, observations)
    }

    #[test]
    fn averages_repeated_observations_and_orders_by_category() {
        let history = sub_competency("History", "Patient Care");
        let comm = sub_competency("Comm", "Interpersonal and Communication Skills");
        let epa = Uuid::new_v4();
        let map = EpaSubCompetencyMap::from_links(&[link(epa, history.id)]);
        let assessments = vec![assessment(vec![observation(epa, 3), observation(epa, 5)])];

        let rows = compute_competency_grid(&[history.clone(), comm.clone()], &map, &assessments);

        assert_eq!(rows.len(), 2);
        // "Interpersonal..." sorts before "Patient Care".
        assert_eq!(rows[0].sub_competency_id, comm.id);
        assert_eq!(rows[0].total_assessments, 0);
        assert_eq!(rows[0].average_rating, 0.0);
        assert_eq!(rows[0].milestone_level, 0.0);
        assert_eq!(rows[1].sub_competency_id, history.id);
        assert_eq!(rows[1].total_assessments, 2);
        assert!((rows[1].average_rating - 4.0).abs() < 1e-9);
        assert_eq!(rows[1].milestone_level, 4.0);
    }

    #[test]
    fn ties_within_a_category_sort_by_title() {
        let b = sub_competency("Procedures", "Patient Care");
        let a = sub_competency("Emergency Stabilization", "Patient Care");
        let c = sub_competency("Clinical Reasoning", "Medical Knowledge");
        let rows = compute_competency_grid(
            &[b.clone(), c.clone(), a.clone()],
            &EpaSubCompetencyMap::default(),
            &[],
        );

        let ids: Vec<Uuid> = rows.iter().map(|row| row.sub_competency_id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
    }

    #[test]
    fn ordering_is_case_sensitive() {
        let lower = sub_competency("airway", "Patient Care");
        let upper = sub_competency("Triage", "Patient Care");
        let rows = compute_competency_grid(
            &[lower.clone(), upper.clone()],
            &EpaSubCompetencyMap::default(),
            &[],
        );
        assert_eq!(rows[0].sub_competency_id, upper.id);
        assert_eq!(rows[1].sub_competency_id, lower.id);
    }

    #[test]
    fn every_sub_competency_gets_a_row_without_data() {
        let subs: Vec<SubCompetency> = (0..6)
            .map(|i| sub_competency(&format!("Sub {i}"), "Systems-Based Practice"))
            .collect();
        let rows = compute_competency_grid(&subs, &EpaSubCompetencyMap::default(), &[]);

        assert_eq!(rows.len(), subs.len());
        for row in &rows {
            assert_eq!(row.total_assessments, 0);
            assert_eq!(row.average_rating, 0.0);
            assert_eq!(row.milestone_level, 0.0);
        }
    }

    #[test]
    fn empty_taxonomy_yields_empty_grid() {
        let epa = Uuid::new_v4();
        let map = EpaSubCompetencyMap::from_links(&[link(epa, Uuid::new_v4())]);
        let rows = compute_competency_grid(&[], &map, &[assessment(vec![observation(epa, 4)])]);
        assert!(rows.is_empty());
    }

    #[test]
    fn shared_epa_fans_out_to_every_mapped_row() {
        let pc = sub_competency("Procedures", "Patient Care");
        let mk = sub_competency("Pharmacology", "Medical Knowledge");
        let epa = Uuid::new_v4();
        let map = EpaSubCompetencyMap::from_links(&[link(epa, pc.id), link(epa, mk.id)]);
        let assessments = vec![assessment(vec![observation(epa, 2)])];

        let rows = compute_competency_grid(&[pc, mk], &map, &assessments);

        for row in &rows {
            assert_eq!(row.total_assessments, 1);
            assert_eq!(row.average_rating, 2.0);
            assert_eq!(row.milestone_level, 2.0);
        }
    }

    #[test]
    fn unmapped_epa_contributes_nothing() {
        let pc = sub_competency("Procedures", "Patient Care");
        let mapped = Uuid::new_v4();
        let map = EpaSubCompetencyMap::from_links(&[link(mapped, pc.id)]);
        let assessments = vec![assessment(vec![
            observation(mapped, 3),
            observation(Uuid::new_v4(), 1),
        ])];

        let rows = compute_competency_grid(&[pc], &map, &assessments);
        assert_eq!(rows[0].total_assessments, 1);
        assert_eq!(rows[0].average_rating, 3.0);
    }

    #[test]
    fn stale_mapping_is_dropped() {
        let pc = sub_competency("Procedures", "Patient Care");
        let epa = Uuid::new_v4();
        let deleted = Uuid::new_v4();
        let map = EpaSubCompetencyMap::from_links(&[link(epa, deleted), link(epa, pc.id)]);
        let assessments = vec![assessment(vec![observation(epa, 5)])];

        let rows = compute_competency_grid(&[pc.clone()], &map, &assessments);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sub_competency_id, pc.id);
        assert_eq!(rows[0].total_assessments, 1);
    }

    #[test]
    fn fractional_average_rounds_up_to_half_step() {
        let pc = sub_competency("Procedures", "Patient Care");
        let epa = Uuid::new_v4();
        let map = EpaSubCompetencyMap::from_links(&[link(epa, pc.id)]);
        let assessments = vec![
            assessment(vec![observation(epa, 3)]),
            assessment(vec![observation(epa, 3)]),
            assessment(vec![observation(epa, 4)]),
        ];

        let rows = compute_competency_grid(&[pc], &map, &assessments);
        assert_eq!(rows[0].total_assessments, 3);
        assert!((rows[0].average_rating - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(rows[0].milestone_level, 3.5);
    }

    #[test]
    fn duplicate_sub_competency_is_emitted_once() {
        let pc = sub_competency("Procedures", "Patient Care");
        let rows = compute_competency_grid(
            &[pc.clone(), pc.clone()],
            &EpaSubCompetencyMap::default(),
            &[],
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn filter_applies_trainee_and_date_window() {
        let trainee = Uuid::new_v4();
        let other = Uuid::new_v4();
        let assessments = vec![
            assessment_on(trainee, 1, vec![]),
            assessment_on(trainee, 15, vec![]),
            assessment_on(other, 15, vec![]),
        ];
        let range = DateRange::new(NaiveDate::from_ymd_opt(2026, 3, 10), None).unwrap();

        let kept = filter_assessments(&assessments, Some(trainee), &range);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, assessments[1].id);

        let everyone = filter_assessments(&assessments, None, &DateRange::unbounded());
        assert_eq!(everyone.len(), 3);
    }

    #[test]
    fn groups_follow_grid_order() {
        let subs = vec![
            sub_competency("Procedures", "Patient Care"),
            sub_competency("Pharmacology", "Medical Knowledge"),
            sub_competency("History", "Patient Care"),
        ];
        let rows = compute_competency_grid(&subs, &EpaSubCompetencyMap::default(), &[]);
        let groups = group_by_core_competency(&rows);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].core_competency_title, "Medical Knowledge");
        assert_eq!(groups[1].rows.len(), 2);
        assert_eq!(groups[1].rows[0].sub_competency_title, "History");
    }

    #[test]
    fn coverage_counts_assessed_rows() {
        let pc = sub_competency("Procedures", "Patient Care");
        let mk = sub_competency("Pharmacology", "Medical Knowledge");
        let epa = Uuid::new_v4();
        let map = EpaSubCompetencyMap::from_links(&[link(epa, pc.id)]);
        let assessments = vec![assessment(vec![observation(epa, 4), observation(epa, 2)])];

        let coverage = GridCoverage::of(&compute_competency_grid(&[pc, mk], &map, &assessments));
        assert_eq!(coverage.sub_competencies, 2);
        assert_eq!(coverage.assessed, 1);
        assert_eq!(coverage.unassessed(), 1);
        assert_eq!(coverage.observations, 2);
    }
}
