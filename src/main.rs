use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use trand::utils::{logger, validation::Validate};
use trand::{app, core::schedule, CliConfig, ReportEngine, Settings, TrandError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build the HTTP client")
}

fn report_failure(context: &str, e: &TrandError) {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
}

#[tokio::main]
async fn main() {
    // .env 不存在時忽略
    let dotenv = dotenvy::dotenv();
    let config = CliConfig::parse();

    if config.json_logs {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting trand CLI");
    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    let settings = match Settings::load(config.config.as_deref()).and_then(|s| {
        s.validate()?;
        Ok(s)
    }) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if config.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let client = match http_client() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(3);
        }
    };

    let pipeline = app::build_pipeline(&settings, &client);
    let engine = ReportEngine::new_with_monitoring(pipeline, config.monitor);

    if config.dry_run {
        match engine.preview().await {
            Ok(prompt) => {
                println!("{}", prompt);
                return;
            }
            Err(e) => {
                report_failure("Dry run failed", &e);
                std::process::exit(e.exit_code().max(1));
            }
        }
    }

    if config.once {
        match engine.run().await {
            Ok(recorded) => {
                tracing::info!("✅ Report sent successfully!");
                println!("✅ Report sent, run recorded in {}/{}", settings.logging.dir, recorded);
            }
            Err(e) => {
                report_failure("Report run failed", &e);
                let exit_code = e.exit_code();
                if exit_code > 0 {
                    std::process::exit(exit_code);
                }
            }
        }
        return;
    }

    // validate() 已確認時間格式
    let times = match settings.notification_times() {
        Ok(times) => times,
        Err(e) => {
            report_failure("Invalid notification times", &e);
            std::process::exit(1);
        }
    };
    if let Err(e) = schedule::run_scheduled(&times, || engine.run()).await {
        report_failure("Scheduler stopped", &e);
        std::process::exit(e.exit_code().max(1));
    }
}
