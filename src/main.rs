use clap::Parser;
use leadpulse::adapters::{AirtableClient, PosthogClient};
use leadpulse::config::toml_config::DEFAULT_CONFIG_FILE;
use leadpulse::core::analyzer::render_proposals;
use leadpulse::core::collector::render_summary;
use leadpulse::domain::model::{DailyReport, ProposalSet};
use leadpulse::domain::ports::{CrmSource, Storage};
use leadpulse::utils::error::PulseError;
use leadpulse::utils::{logger, validation::Validate};
use leadpulse::{
    AnalyzerPipeline, AppConfig, CliConfig, CollectorPipeline, Command, EtlEngine, Launcher,
    LocalStorage, Result,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI arguments: {:?}", cli);

    match run(&cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(
                "❌ {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let code = e.severity().exit_code();
            if code > 0 {
                std::process::exit(code);
            }
        }
    }
}

/// Returns the process exit code.
async fn run(cli: &CliConfig) -> Result<i32> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e);
    }

    match &cli.command {
        Command::Launch { .. } => {
            // The server child runs elsewhere, so hand it the file we found here.
            let config_path = cli.config.clone().or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });
            let launcher = Launcher::new(&config, config_path.as_deref());
            let mut stdout = std::io::stdout();
            launcher.run(&mut stdout).await
        }
        Command::Serve { .. } => {
            leadpulse::server::serve(&config).await?;
            Ok(0)
        }
        Command::Collect { monitor } => {
            collect(&config, *monitor).await?;
            Ok(0)
        }
        Command::Analyze { monitor } => {
            analyze(&config, *monitor).await?;
            Ok(0)
        }
    }
}

async fn collect(config: &AppConfig, monitor: bool) -> Result<()> {
    let crm: Option<Arc<dyn CrmSource>> = if config.airtable.is_enabled() {
        Some(Arc::new(AirtableClient::new(&config.airtable)?))
    } else {
        tracing::warn!("⚠️  No Airtable token configured, skipping CRM data");
        None
    };

    let storage = LocalStorage::new(&config.reports.data_dir);
    let pipeline = CollectorPipeline::new(
        storage.clone(),
        Arc::new(PosthogClient::new(&config.posthog)?),
        crm,
    )
    .with_period_days(config.reports.period_days)
    .with_page_limit(config.posthog.page_limit)
    .with_report_file(config.reports.report_file.clone());

    let output_path = EtlEngine::new_with_monitoring(pipeline, monitor).run().await?;

    let report: DailyReport =
        serde_json::from_slice(&storage.read_file(&config.reports.report_file).await?)?;
    println!("{}", render_summary(&report));
    println!("✅ Report saved to: {}", output_path);
    Ok(())
}

async fn analyze(config: &AppConfig, monitor: bool) -> Result<()> {
    let storage = LocalStorage::new(&config.reports.data_dir);
    let write_csv = config
        .reports
        .output_formats
        .iter()
        .any(|format| format.eq_ignore_ascii_case("csv"));

    let pipeline = AnalyzerPipeline::new(storage.clone())
        .with_files(
            config.reports.report_file.clone(),
            config.reports.proposals_file.clone(),
        )
        .with_csv(write_csv);

    let output_path = EtlEngine::new_with_monitoring(pipeline, monitor)
        .run()
        .await
        .map_err(|e| match e {
            PulseError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                PulseError::processing(format!(
                    "no report found in {}; run `leadpulse collect` first",
                    config.reports.data_dir
                ))
            }
            other => other,
        })?;

    let set: ProposalSet =
        serde_json::from_slice(&storage.read_file(&config.reports.proposals_file).await?)?;
    println!("{}", render_proposals(&set, &config.assistant.business_name));
    println!("✅ Proposals saved to: {}", output_path);
    Ok(())
}
