//! vmcanvas - Entry Point
//!
//! Serves the machine canvas API and deploys machine nodes as cloud VMs.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use vmcanvas::app::options::AppOptions;
use vmcanvas::app::run::run;
use vmcanvas::deploy::process::TokioProcessRunner;
use vmcanvas::logs::{init_logging, LogOptions};
use vmcanvas::storage::layout::StorageLayout;
use vmcanvas::storage::settings::Settings;
use vmcanvas::utils::{check_tools, version_info};

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
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
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    let layout = match cli_args.get("data-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file; a missing file means defaults
    let settings_file = layout.settings_file();
    let settings_missing = !settings_file.exists().await;
    let mut settings = if settings_missing {
        Settings::default()
    } else {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {e}");
                std::process::exit(1);
            }
        }
    };
    if let Some(host) = cli_args.get("host") {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli_args.get("port") {
        match port.parse() {
            Ok(port) => settings.server.port = port,
            Err(_) => {
                eprintln!("Invalid --port value: {port}");
                std::process::exit(1);
            }
        }
    }

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        let healthy = run_diagnostic(&settings).await;
        std::process::exit(if healthy { 0 } else { 1 });
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };
    if settings_missing {
        warn!(
            "No settings file at {}, using defaults",
            settings_file.path().display()
        );
    }

    // Run the server
    let options = AppOptions::from_settings(&settings, layout);

    info!("Running vmcanvas {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run vmcanvas: {e}");
        std::process::exit(1);
    }
}

/// Check the external tools deployments depend on. Returns `true` when all
/// of them can be started.
async fn run_diagnostic(settings: &Settings) -> bool {
    let runner = TokioProcessRunner::new(Some(Duration::from_secs(10)));
    let programs = [
        (settings.provisioner.terraform_program.as_str(), "-version"),
        (settings.provisioner.keygen_program.as_str(), "-h"),
        (settings.bootstrap.ssh_program.as_str(), "-V"),
        (settings.bootstrap.scp_program.as_str(), "-h"),
    ];

    let checks = check_tools(&runner, &programs).await;
    for check in &checks {
        let mark = if check.available { "ok" } else { "MISSING" };
        println!("{:<12} {:<8} {}", check.program, mark, check.detail);
    }
    checks.iter().all(|c| c.available)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    warn!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
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
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
