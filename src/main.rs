use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

mod db;
mod error;
mod grid;
mod milestone;
mod models;
mod performance;
mod report;
mod snapshot;
mod taxonomy;

use models::{CompetencyGridRow, DateRange};
use snapshot::Snapshot;
use taxonomy::EpaSubCompetencyMap;

#[derive(Parser)]
#[command(name = "shiftnotes-competency")]
#[command(about = "Competency grids and program performance for ShiftNotes EPA assessments", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "SHIFTNOTES_LOG", global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo program with trainees and assessments
    Seed,
    /// Import EPA observations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute a trainee's competency grid
    #[command(group(
        ArgGroup::new("source")
            .args(["email", "snapshot"])
            .required(true)
            .multiple(false)
    ))]
    Grid {
        #[arg(long)]
        email: Option<String>,
        /// Read taxonomy and assessments from a JSON snapshot instead of Postgres
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Trainee to grade; required when the snapshot holds several
        #[arg(long, requires = "snapshot")]
        trainee: Option<Uuid>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Summarize program performance over a lookback window
    Performance {
        /// Program abbreviation, e.g. EM
        #[arg(long)]
        program: String,
        #[arg(long, default_value_t = performance::DEFAULT_MONTHS)]
        months: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Write a markdown competency report for a trainee
    Report {
        #[arg(long)]
        email: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(cli.database_url.as_deref()).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(cli.database_url.as_deref()).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect(cli.database_url.as_deref()).await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} observations from {}.", csv.display());
        }
        Commands::Grid {
            email,
            snapshot,
            trainee,
            from,
            to,
            json,
        } => {
            let range = DateRange::new(from, to)?;
            let rows = match (snapshot, email) {
                (Some(path), _) => {
                    let snapshot = Snapshot::load(&path)?;
                    let trainee = snapshot.trainee_scope(trainee)?;
                    let assessments = grid::filter_assessments(&snapshot.assessments, trainee, &range);
                    grid::compute_competency_grid(
                        &snapshot.sub_competencies,
                        &snapshot.epa_map(),
                        &assessments,
                    )
                }
                (None, Some(email)) => {
                    let pool = connect(cli.database_url.as_deref()).await?;
                    trainee_grid(&pool, &email, &range).await?.1
                }
                (None, None) => anyhow::bail!("either --email or --snapshot is required"),
            };
            print_grid(&rows, json)?;
        }
        Commands::Performance {
            program,
            months,
            limit,
            json,
        } => {
            let timeframe = performance::timeframe(months)?;
            let pool = connect(cli.database_url.as_deref()).await?;
            let program_id = db::fetch_program_id(&pool, &program).await?;
            let trainees = db::fetch_program_trainees(&pool, program_id).await?;
            let trainee_ids: Vec<Uuid> = trainees.iter().map(|trainee| trainee.id).collect();

            let period = DateRange::new(Some(timeframe.start_date), Some(timeframe.end_date))?;
            let period_assessments = db::fetch_assessments(&pool, &trainee_ids, &period).await?;
            let all_assessments =
                db::fetch_assessments(&pool, &trainee_ids, &DateRange::unbounded()).await?;

            let summary = performance::program_performance(
                &trainees,
                &period_assessments,
                &all_assessments,
                timeframe,
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", report::build_program_report(&program, &summary, limit));
            }
        }
        Commands::Report {
            email,
            from,
            to,
            out,
        } => {
            let range = DateRange::new(from, to)?;
            let pool = connect(cli.database_url.as_deref()).await?;
            let (trainee, rows, assessments) = trainee_grid(&pool, &email, &range).await?;
            let report = report::build_trainee_report(&trainee, &range, &rows, &assessments);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn connect(database_url: Option<&str>) -> anyhow::Result<PgPool> {
    let database_url =
        database_url.context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn trainee_grid(
    pool: &PgPool,
    email: &str,
    range: &DateRange,
) -> anyhow::Result<(models::Trainee, Vec<CompetencyGridRow>, Vec<models::Assessment>)> {
    let trainee = db::fetch_trainee(pool, email).await?;
    let trainee_ids = [trainee.id];
    let (sub_competencies, links, assessments) = tokio::try_join!(
        db::fetch_sub_competencies(pool, trainee.program_id),
        db::fetch_epa_links(pool, trainee.program_id),
        db::fetch_assessments(pool, &trainee_ids, range),
    )?;

    if sub_competencies.is_empty() {
        info!(program_id = %trainee.program_id, "program has no sub-competencies configured");
    }

    let epa_map = EpaSubCompetencyMap::from_links(&links);
    info!(
        trainee = %trainee.email,
        sub_competencies = sub_competencies.len(),
        mapped_epas = epa_map.epa_count(),
        assessments = assessments.len(),
        "loaded competency inputs"
    );
    let rows = grid::compute_competency_grid(&sub_competencies, &epa_map, &assessments);
    Ok((trainee, rows, assessments))
}

fn print_grid(rows: &[CompetencyGridRow], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No sub-competencies configured for this program.");
        return Ok(());
    }

    for group in grid::group_by_core_competency(rows) {
        println!("{}", group.core_competency_title);
        for row in group.rows {
            println!("- {}", report::describe_row(row));
        }
    }
    Ok(())
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
