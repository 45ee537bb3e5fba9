use anyhow::Result;
use clap::Parser;

use logroute_core::config::LogrouteConfig;
use logroute_daemon::cli::DaemonCli;
use logroute_daemon::logging;
use logroute_daemon::orchestrator::{self, Orchestrator};
use logroute_engine::sink::list_quarantined;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 (파일 -> 환경변수 -> CLI)
    let mut config = LogrouteConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(dir) = cli.pipeline_dir {
        config.router.pipeline_dir = dir.display().to_string();
    }

    // 로깅 초기화
    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "logroute-daemon starting");

    if cli.list_quarantine {
        let entries = list_quarantined(std::path::Path::new(&config.buffer.storage_path))
            .await
            .map_err(|e| anyhow::anyhow!("failed to list quarantine: {}", e))?;
        for meta in &entries {
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                meta.quarantined_at.to_rfc3339(),
                meta.output,
                meta.chunk_id,
                meta.records,
                meta.attempts,
                meta.reason
            );
        }
        tracing::info!(chunks = entries.len(), "quarantine listed");
        return Ok(());
    }

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        let engine = orchestrator::build_engine(&config).await?;
        tracing::info!(
            labels = engine.graph().label_count(),
            "configuration and label definitions are valid"
        );
        return Ok(());
    }

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run(cli.stdin).await
}
