use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::milestone::EntrustmentLevel;
use crate::models::{Assessment, AssessmentEpa, DateRange, EpaLink, SubCompetency, Trainee};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const PROGRAM_ID: Uuid = Uuid::from_u128(0x6f1c2a10_0000_4000_8000_000000000001);

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO shiftnotes.programs (id, name, abbreviation, specialty)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, specialty = EXCLUDED.specialty
        "#,
    )
    .bind(PROGRAM_ID)
    .bind("Emergency Medicine Residency")
    .bind("EM")
    .bind("Emergency Medicine")
    .execute(pool)
    .await?;

    let core_competencies = vec![
        (Uuid::from_u128(0x6f1c2a10_0000_4000_8000_0000000000c1), "PC", "Patient Care"),
        (Uuid::from_u128(0x6f1c2a10_0000_4000_8000_0000000000c2), "MK", "Medical Knowledge"),
        (
            Uuid::from_u128(0x6f1c2a10_0000_4000_8000_0000000000c3),
            "ICS",
            "Interpersonal and Communication Skills",
        ),
    ];

    for (id, code, title) in &core_competencies {
        sqlx::query(
            r#"
            INSERT INTO shiftnotes.core_competencies (id, program_id, code, title)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(id)
        .bind(PROGRAM_ID)
        .bind(code)
        .bind(title)
        .execute(pool)
        .await?;
    }

    let sub_competencies = vec![
        (0x5c1, 0, "PC1", "Emergency Stabilization"),
        (0x5c2, 0, "PC2", "Performance of Focused History and Physical Exam"),
        (0x5c3, 1, "MK1", "Scientific Knowledge"),
        (0x5c4, 2, "ICS1", "Patient- and Family-Centered Communication"),
    ];

    for (suffix, core, code, title) in &sub_competencies {
        sqlx::query(
            r#"
            INSERT INTO shiftnotes.sub_competencies (id, program_id, core_competency_id, code, title)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(seed_id(*suffix))
        .bind(PROGRAM_ID)
        .bind(core_competencies[*core].0)
        .bind(code)
        .bind(title)
        .execute(pool)
        .await?;
    }

    let epas = vec![
        (0xe01, "EPA-EM-01", "Recognize and initiate resuscitation of the unstable patient"),
        (0xe02, "EPA-EM-02", "Gather a focused history and perform a physical exam"),
        (0xe03, "EPA-EM-03", "Communicate a discharge plan to patient and family"),
    ];

    for (suffix, code, title) in &epas {
        sqlx::query(
            r#"
            INSERT INTO shiftnotes.epas (id, program_id, code, title)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(seed_id(*suffix))
        .bind(PROGRAM_ID)
        .bind(code)
        .bind(title)
        .execute(pool)
        .await?;
    }

    let links = vec![
        (0x5c1, 0xe01),
        (0x5c3, 0xe01),
        (0x5c2, 0xe02),
        (0x5c4, 0xe03),
        (0x5c2, 0xe03),
    ];

    for (sub_competency, epa) in links {
        sqlx::query(
            r#"
            INSERT INTO shiftnotes.sub_competency_epas (sub_competency_id, epa_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(seed_id(sub_competency))
        .bind(seed_id(epa))
        .execute(pool)
        .await?;
    }

    let users = vec![
        ("Dr. Morgan Reyes", "morgan.reyes@shiftnotes.org", "faculty", None),
        ("Avery Lee", "avery.lee@shiftnotes.org", "trainee", Some("PGY-1")),
        ("Jules Moreno", "jules.moreno@shiftnotes.org", "trainee", Some("PGY-2")),
    ];

    for (name, email, role, department) in users {
        sqlx::query(
            r#"
            INSERT INTO shiftnotes.users (id, name, email, role, department, program_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, role = EXCLUDED.role, department = EXCLUDED.department
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(role)
        .bind(department)
        .bind(PROGRAM_ID)
        .execute(pool)
        .await?;
    }

    let observations = vec![
        ("seed-001", "avery.lee@shiftnotes.org", (2026, 1, 12), 0xe01, 2, "Called for help early", "Start fluids sooner"),
        ("seed-001", "avery.lee@shiftnotes.org", (2026, 1, 12), 0xe02, 3, "Organized history", ""),
        ("seed-002", "avery.lee@shiftnotes.org", (2026, 2, 3), 0xe02, 4, "Targeted exam", "Document pertinent negatives"),
        ("seed-003", "jules.moreno@shiftnotes.org", (2026, 1, 28), 0xe01, 4, "Led the resuscitation", ""),
        ("seed-003", "jules.moreno@shiftnotes.org", (2026, 1, 28), 0xe03, 5, "Clear return precautions", ""),
    ];

    for (source_key, email, (y, m, d), epa, level, went_well, could_improve) in observations {
        let shift_date = NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?;
        let trainee_id = user_id(pool, email).await?;
        let evaluator_id = user_id(pool, "morgan.reyes@shiftnotes.org").await?;
        let assessment_id = upsert_assessment(pool, trainee_id, evaluator_id, shift_date, source_key).await?;
        insert_observation(pool, assessment_id, seed_id(epa), level, went_well, could_improve).await?;
    }

    Ok(())
}

fn seed_id(suffix: u128) -> Uuid {
    Uuid::from_u128(0x6f1c2a10_0000_4000_8000_000000000000 | suffix)
}

async fn user_id(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM shiftnotes.users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow!("no user with email {email}"))?;
    Ok(row.get("id"))
}

async fn upsert_assessment(
    pool: &PgPool,
    trainee_id: Uuid,
    evaluator_id: Uuid,
    shift_date: NaiveDate,
    source_key: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO shiftnotes.assessments
        (id, trainee_id, evaluator_id, shift_date, status, source_key)
        VALUES ($1, $2, $3, $4, 'submitted', $5)
        ON CONFLICT (source_key) DO UPDATE SET source_key = EXCLUDED.source_key
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(trainee_id)
    .bind(evaluator_id)
    .bind(shift_date)
    .bind(source_key)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn insert_observation(
    pool: &PgPool,
    assessment_id: Uuid,
    epa_id: Uuid,
    entrustment_level: i32,
    what_went_well: &str,
    what_could_improve: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO shiftnotes.assessment_epas
        (id, assessment_id, epa_id, entrustment_level, what_went_well, what_could_improve)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (assessment_id, epa_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(assessment_id)
    .bind(epa_id)
    .bind(entrustment_level)
    .bind(what_went_well)
    .bind(what_could_improve)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_trainee(pool: &PgPool, email: &str) -> anyhow::Result<Trainee> {
    let row = sqlx::query(
        r#"
        SELECT id, name, email, department, program_id
        FROM shiftnotes.users
        WHERE email = $1 AND role = 'trainee'
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| anyhow!("no trainee with email {email}"))?;

    let program_id: Option<Uuid> = row.get("program_id");
    Ok(Trainee {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        department: row.get("department"),
        program_id: program_id.with_context(|| format!("trainee {email} is not enrolled in a program"))?,
    })
}

pub async fn fetch_program_id(pool: &PgPool, abbreviation: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM shiftnotes.programs WHERE abbreviation = $1")
        .bind(abbreviation)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow!("no program with abbreviation {abbreviation}"))?;
    Ok(row.get("id"))
}

pub async fn fetch_program_trainees(pool: &PgPool, program_id: Uuid) -> anyhow::Result<Vec<Trainee>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, email, department
        FROM shiftnotes.users
        WHERE program_id = $1 AND role = 'trainee'
        ORDER BY name
        "#,
    )
    .bind(program_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Trainee {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            department: row.get("department"),
            program_id,
        })
        .collect())
}

pub async fn fetch_sub_competencies(
    pool: &PgPool,
    program_id: Uuid,
) -> anyhow::Result<Vec<SubCompetency>> {
    let rows = sqlx::query(
        r#"
        SELECT sc.id, sc.title, cc.title AS core_competency_title
        FROM shiftnotes.sub_competencies sc
        JOIN shiftnotes.core_competencies cc ON cc.id = sc.core_competency_id
        WHERE sc.program_id = $1
        "#,
    )
    .bind(program_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SubCompetency {
            id: row.get("id"),
            title: row.get("title"),
            core_competency_title: row.get("core_competency_title"),
        })
        .collect())
}

pub async fn fetch_epa_links(pool: &PgPool, program_id: Uuid) -> anyhow::Result<Vec<EpaLink>> {
    let rows = sqlx::query(
        r#"
        SELECT sce.epa_id, sce.sub_competency_id
        FROM shiftnotes.sub_competency_epas sce
        JOIN shiftnotes.sub_competencies sc ON sc.id = sce.sub_competency_id
        WHERE sc.program_id = $1
        "#,
    )
    .bind(program_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| EpaLink {
            epa_id: row.get("epa_id"),
            sub_competency_id: row.get("sub_competency_id"),
        })
        .collect())
}

/// Assessments for the given trainees within `range`, each with its EPA
/// observations, ordered by shift date.
pub async fn fetch_assessments(
    pool: &PgPool,
    trainee_ids: &[Uuid],
    range: &DateRange,
) -> anyhow::Result<Vec<Assessment>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.trainee_id, a.shift_date,
               ae.epa_id, ae.entrustment_level, ae.what_went_well, ae.what_could_improve
        FROM shiftnotes.assessments a
        LEFT JOIN shiftnotes.assessment_epas ae ON ae.assessment_id = a.id
        WHERE a.trainee_id = ANY($1)
          AND ($2::date IS NULL OR a.shift_date >= $2)
          AND ($3::date IS NULL OR a.shift_date <= $3)
        ORDER BY a.shift_date, a.id
        "#,
    )
    .bind(trainee_ids)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await?;

    let mut assessments: Vec<Assessment> = Vec::new();

    for row in rows {
        let id: Uuid = row.get("id");
        if assessments.last().map(|a| a.id) != Some(id) {
            assessments.push(Assessment {
                id,
                trainee_id: row.get("trainee_id"),
                shift_date: row.get("shift_date"),
                assessment_epas: Vec::new(),
            });
        }

        let epa_id: Option<Uuid> = row.get("epa_id");
        let Some(epa_id) = epa_id else {
            continue;
        };
        let level: i32 = row.get("entrustment_level");
        let observation = AssessmentEpa {
            epa_id,
            entrustment_level: EntrustmentLevel::try_from(level)
                .with_context(|| format!("assessment {id} has a corrupt rating"))?,
            what_went_well: row.get("what_went_well"),
            what_could_improve: row.get("what_could_improve"),
        };

        if let Some(current) = assessments.last_mut() {
            current.assessment_epas.push(observation);
        }
    }

    debug!(count = assessments.len(), range = %range.describe(), "fetched assessments");
    Ok(assessments)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        trainee_email: String,
        evaluator_email: String,
        shift_date: NaiveDate,
        epa_code: String,
        entrustment_level: i32,
        #[serde(default)]
        what_went_well: String,
        #[serde(default)]
        what_could_improve: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let line = index + 2;
        let level = EntrustmentLevel::try_from(row.entrustment_level)
            .with_context(|| format!("line {line}"))?;

        let trainee = fetch_trainee(pool, &row.trainee_email)
            .await
            .with_context(|| format!("line {line}"))?;
        let evaluator_id = user_id(pool, &row.evaluator_email)
            .await
            .with_context(|| format!("line {line}"))?;

        let epa_id: Uuid = sqlx::query(
            "SELECT id FROM shiftnotes.epas WHERE program_id = $1 AND code = $2",
        )
        .bind(trainee.program_id)
        .bind(&row.epa_code)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow!("line {line}: unknown EPA code {}", row.epa_code))?
        .get("id");

        let source_key = row
            .source_key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let assessment_id =
            upsert_assessment(pool, trainee.id, evaluator_id, row.shift_date, &source_key).await?;

        if insert_observation(
            pool,
            assessment_id,
            epa_id,
            level.into(),
            &row.what_went_well,
            &row.what_could_improve,
        )
        .await?
        {
            inserted += 1;
        }
    }

    info!(inserted, path = %csv_path.display(), "imported assessment observations");
    Ok(inserted)
}
