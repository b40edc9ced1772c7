use std::fmt::Write;

use crate::grid::{group_by_core_competency, GridCoverage};
use crate::milestone::MilestoneLabel;
use crate::models::{Assessment, CompetencyGridRow, DateRange, ProgramPerformance, Trainee};

pub fn describe_row(row: &CompetencyGridRow) -> String {
    if row.total_assessments == 0 {
        return format!("{}: No data", row.sub_competency_title);
    }
    format!(
        "{}: milestone {} (avg {:.2} across {} ratings)",
        row.sub_competency_title,
        MilestoneLabel::for_level(row.milestone_level),
        row.average_rating,
        row.total_assessments
    )
}

pub fn build_trainee_report(
    trainee: &Trainee,
    range: &DateRange,
    rows: &[CompetencyGridRow],
    assessments: &[Assessment],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Competency Report: {}", trainee.name);
    let _ = writeln!(
        output,
        "Generated for {} (assessments {})",
        trainee.email,
        range.describe()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Coverage");

    if rows.is_empty() {
        let _ = writeln!(output, "No sub-competencies configured for this program.");
        return output;
    }

    let coverage = GridCoverage::of(rows);
    let _ = writeln!(
        output,
        "- {} of {} sub-competencies assessed ({} ratings, {} not yet assessed)",
        coverage.assessed,
        coverage.sub_competencies,
        coverage.observations,
        coverage.unassessed()
    );

    for group in group_by_core_competency(rows) {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", group.core_competency_title);
        for row in group.rows {
            let _ = writeln!(output, "- {}", describe_row(row));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Milestone Scale");
    let scale: Vec<String> = MilestoneLabel::scale().iter().map(|label| label.to_string()).collect();
    let _ = writeln!(output, "{}", scale.join(" | "));

    let mut notes: Vec<(&Assessment, &str, &str)> = assessments
        .iter()
        .flat_map(|assessment| {
            assessment.assessment_epas.iter().filter_map(move |epa| {
                if epa.what_went_well.is_empty() && epa.what_could_improve.is_empty() {
                    None
                } else {
                    Some((
                        assessment,
                        epa.what_went_well.as_str(),
                        epa.what_could_improve.as_str(),
                    ))
                }
            })
        })
        .collect();
    notes.sort_by(|a, b| b.0.shift_date.cmp(&a.0.shift_date));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Feedback");

    if notes.is_empty() {
        let _ = writeln!(output, "No written feedback in this window.");
    } else {
        for (assessment, went_well, could_improve) in notes.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: went well: {}; could improve: {}",
                assessment.shift_date,
                or_dash(went_well),
                or_dash(could_improve)
            );
        }
    }

    output
}

pub fn build_program_report(program: &str, performance: &ProgramPerformance, limit: usize) -> String {
    let mut output = String::new();
    let metrics = &performance.metrics;

    let _ = writeln!(output, "# Program Performance: {program}");
    let _ = writeln!(
        output,
        "Last {} months ({} to {})",
        performance.timeframe.months, performance.timeframe.start_date, performance.timeframe.end_date
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Metrics");
    let _ = writeln!(
        output,
        "- {} of {} trainees active ({:.1}%)",
        metrics.active_trainees, metrics.total_trainees, metrics.completion_rate
    );
    let _ = writeln!(
        output,
        "- {} assessments in period, {} lifetime",
        metrics.assessments_in_period, metrics.total_lifetime_assessments
    );
    let _ = writeln!(
        output,
        "- Average entrustment level {:.2}",
        metrics.average_competency_level
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Entrustment Distribution");

    if performance.competency_distribution.is_empty() {
        let _ = writeln!(output, "No ratings recorded for this window.");
    } else {
        for share in &performance.competency_distribution {
            let _ = writeln!(
                output,
                "- Level {} ({}): {} ratings ({:.1}%)",
                share.level,
                share.level.description(),
                share.count,
                share.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Trend");

    if performance.recent_trends.is_empty() {
        let _ = writeln!(output, "No assessments recorded for this window.");
    } else {
        for trend in &performance.recent_trends {
            let _ = writeln!(
                output,
                "- {}: {} assessments (avg level {:.2})",
                trend.month, trend.assessments, trend.average_level
            );
        }
    }

    let mut trainees: Vec<_> = performance.trainee_breakdown.iter().collect();
    trainees.sort_by(|a, b| b.assessments_in_period.cmp(&a.assessments_in_period));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trainees");

    if trainees.is_empty() {
        let _ = writeln!(output, "No trainees enrolled in this program.");
    } else {
        for trainee in trainees.iter().take(limit) {
            let last_seen = trainee
                .last_assessment_date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "never".to_string());
            let _ = writeln!(
                output,
                "- {}: {} in period, {} lifetime, avg {:.2}, last assessed {}",
                trainee.name,
                trainee.assessments_in_period,
                trainee.total_assessments,
                trainee.average_competency_level,
                last_seen
            );
        }
    }

    output
}

fn or_dash(text: &str) -> &str {
    if text.is_empty() {
        "-"
    } else {
        text
    }
}
