use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use affilink::cli::{Cli, Commands};
use affilink::config::{StaticConfig, get_config, update_config};
use affilink::storage::StorageFactory;
use affilink::system::{ScheduledJobs, init_logging, prepare_startup, run_scheduled_jobs};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // config-gen 不需要加载配置和日志
    if let Commands::ConfigGen { output_path } = &cli.command {
        let sample = StaticConfig::generate_sample_config();
        match output_path {
            Some(path) => {
                std::fs::write(path, sample)
                    .with_context(|| format!("Failed to write {}", path))?;
                println!("Sample configuration written to {}", path);
            }
            None => print!("{}", sample),
        }
        return Ok(());
    }

    update_config(StaticConfig::load_from(&cli.config));
    let config = get_config();
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::ConfigGen { .. } => {}
        Commands::Migrate => {
            // 创建存储时自动执行迁移
            StorageFactory::create(&config.database)
                .await
                .context("Migration failed")?;
            info!("Migrations applied");
        }
        Commands::Cleanup => {
            let ctx = prepare_startup(&config).await?;
            let report = ctx.retention.run_cleanup().await?;
            println!(
                "Deleted {} expired cookies and {} click events",
                report.cookies_deleted, report.clicks_deleted
            );
        }
        Commands::PayoutBatch { start, end, method } => {
            let ctx = prepare_startup(&config).await?;
            let report = ctx
                .payouts
                .generate_period_payouts(start, end, &method)
                .await?;
            for payout in &report.created {
                println!(
                    "{}  {}  {} {}  ({} conversions)",
                    payout.id,
                    payout.referrer_id,
                    payout.amount,
                    payout.currency,
                    payout.conversion_count
                );
            }
            println!(
                "{} payouts created, {} skipped, {} failed",
                report.created.len(),
                report.skipped,
                report.failed
            );
        }
        Commands::Tier { referrer_id } => {
            let ctx = prepare_startup(&config).await?;
            let tier = ctx.commission.get_tier(&referrer_id).await?;
            println!("{}", serde_json::to_string_pretty(&tier)?);
        }
        Commands::RunJobs { interval } => {
            let ctx = prepare_startup(&config).await?;
            let interval = interval.unwrap_or(config.payout.jobs_interval_secs);
            let jobs = ScheduledJobs::from_context(&ctx, &config.payout);
            tokio::select! {
                _ = run_scheduled_jobs(jobs, interval) => {}
                _ = tokio::signal::ctrl_c() => info!("Shutting down scheduled jobs"),
            }
        }
    }

    Ok(())
}
