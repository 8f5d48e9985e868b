use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use taxlots::cli::{Cli, Commands};
use taxlots::config::{Config, LogFormat};
use taxlots::store::{ExecutionStore, MatchStore};
use taxlots::{
    init_db, AppError, CsvImporter, OwnerId, Portfolio, RealizedSummary, ReconcileOptions,
    Reconciler, Repository,
};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().map_err(AppError::from)?;
    init_tracing(config.log_format);

    let pool = init_db(&config.database_path)
        .await
        .map_err(AppError::from)
        .context("failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));

    match cli.command {
        Commands::Import {
            owner,
            file,
            portfolio,
        } => {
            let bytes = std::fs::read(&file)
                .map_err(AppError::from)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let executions =
                CsvImporter::parse(&OwnerId::new(owner), &Portfolio::new(portfolio), &bytes)
                    .map_err(AppError::from)?;
            let inserted = repo
                .insert_executions(&executions)
                .await
                .map_err(AppError::from)?;
            tracing::info!(
                rows = executions.len(),
                inserted,
                skipped = executions.len() - inserted,
                "import complete"
            );
        }
        Commands::Match { owner } => {
            let reconciler = Reconciler::new(repo, ReconcileOptions::from(&config));
            let created = match owner {
                Some(owner) => reconciler.match_owner(&OwnerId::new(owner)).await,
                None => reconciler.match_all().await,
            }
            .map_err(AppError::from)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&RealizedSummary::from_matches(&created))?
            );
        }
        Commands::Reset { owner } => {
            let reconciler = Reconciler::new(repo, ReconcileOptions::from(&config));
            let report = reconciler
                .reset_matched_state(&OwnerId::new(owner))
                .await
                .map_err(AppError::from)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Report { owner, from, to } => {
            if let (Some(from), Some(to)) = (from, to) {
                if from > to {
                    let reason = format!("--from {from} is after --to {to}");
                    return Err(AppError::BadRequest(reason).into());
                }
            }
            let matches: Vec<_> = repo
                .matches_for_owner(&OwnerId::new(owner))
                .await
                .map_err(AppError::from)?
                .into_iter()
                .filter(|m| {
                    let disposed = m.disposed_at.date();
                    from.map(|f| disposed >= f).unwrap_or(true)
                        && to.map(|t| disposed <= t).unwrap_or(true)
                })
                .collect();
            let summary = RealizedSummary::from_matches(&matches);
            let body = serde_json::json!({ "matches": matches, "summary": summary });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
