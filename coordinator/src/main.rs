//! Deploy Coordinator - Entry Point
//!
//! Triggers an init action on a set of remote environments, verifies their
//! health and reports a per-environment summary.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use colored::Colorize;
use deploy_coordinator::app::options::AppOptions;
use deploy_coordinator::app::run::run;
use deploy_coordinator::config::settings::ConfigFile;
use deploy_coordinator::deploy::fsm::EnvironmentStatus;
use deploy_coordinator::filesys::file::File;
use deploy_coordinator::logs::{init_logging, LogOptions};
use deploy_coordinator::models::job::{JobResult, OverallStatus};
use deploy_coordinator::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("{}", e),
        }
        return ExitCode::SUCCESS;
    }

    let options = match AppOptions::from_cli_args(&cli_args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    // Read the environment configuration
    let config = match File::new(&options.config_path).read_json::<ConfigFile>().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Unable to read configuration {}: {}",
                options.config_path.display(),
                e
            );
            return ExitCode::from(2);
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: options
            .log_level
            .clone()
            .unwrap_or_else(|| config.deployment_settings.log_level.clone()),
        log_dir: options.log_dir.clone(),
        json_format: options.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    info!("Running deploy coordinator with options: {:?}", options);
    match run(&config, &options, await_shutdown_signal()).await {
        Ok(result) => {
            print_summary(&result);
            if result.overall_status == OverallStatus::AllSucceeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("Deployment rejected: {e}");
            ExitCode::from(2)
        }
    }
}

fn print_summary(result: &JobResult) {
    println!();
    println!("{} {}", "Job".bold(), result.job_id);
    for r in &result.results {
        let status = match r.status {
            EnvironmentStatus::Succeeded => "succeeded".green(),
            EnvironmentStatus::Failed => "failed".red(),
            EnvironmentStatus::Cancelled => "cancelled".yellow(),
            other => format!("{:?}", other).as_str().normal(),
        };
        let health = match r.health_check_passed {
            Some(true) => "healthy",
            Some(false) => "unhealthy",
            None => "-",
        };
        println!(
            "  {:<24} {:<10} attempts={} health={} {}",
            r.environment_id,
            status,
            r.attempts,
            health,
            r.last_error.as_deref().unwrap_or("")
        );
    }

    let overall = match result.overall_status {
        OverallStatus::AllSucceeded => "all_succeeded".green().bold(),
        OverallStatus::PartialSuccess => "partial_success".yellow().bold(),
        OverallStatus::AllFailed => "all_failed".red().bold(),
    };
    println!(
        "{} {} ({}/{} succeeded)",
        "Overall:".bold(),
        overall,
        result.succeeded(),
        result.results.len()
    );
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Ctrl+C received, shutting down...");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
