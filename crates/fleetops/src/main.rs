use fleetops::{
    cleanup::cleanup,
    config::{FleetConfig, slug},
    ea::{Status, result_line, run_ea},
    logging::{LogGuard, init_logging, init_stderr_logging},
    nightly::nightly,
    server::prefs_report,
    settings::{load_config, resolve_config_source},
    sync::sync_searches,
};
mod cli;

fn print_version() {
    println!("{}", env!("CARGO_PKG_VERSION"));
}

fn usage_error(e: String) -> ! {
    eprintln!("fleetops: {e}");
    std::process::exit(2);
}

fn load(flag: Option<String>) -> Result<FleetConfig, String> {
    let source = resolve_config_source(flag);
    load_config(&source).map_err(|e| format!("{} ({})", e, e.code()))
}

/// Falls back to stderr-only logging when the log dir is not writable.
fn start_logging(cfg: &FleetConfig, command: &str) -> LogGuard {
    match init_logging(&cfg.paths.log_dir, command) {
        Ok(guard) => guard,
        Err(e) => {
            let guard = init_stderr_logging();
            tracing::warn!(
                log_dir = %cfg.paths.log_dir.display(),
                error = %e,
                "file logging unavailable; logging to stderr only"
            );
            guard
        }
    }
}

fn load_or_exit(flag: Option<String>, command: &str) -> (FleetConfig, LogGuard) {
    match load(flag) {
        Ok(cfg) => {
            let guard = start_logging(&cfg, command);
            (cfg, guard)
        }
        Err(e) => {
            eprintln!("fleetops: {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    // Guards live inside each arm so logs are flushed before a non-zero exit.
    let code = match command {
        Some("version") | Some("--version") | Some("-V") => {
            print_version();
            0
        }
        Some("help") | Some("--help") | Some("-h") | None => {
            cli::print_help();
            0
        }
        Some("ea") => {
            let parsed = cli::parse_ea_cli(&args[2..]).unwrap_or_else(|e| usage_error(e));
            // The agent records whatever is printed; every path ends in a result line and exit 0.
            let cfg = match load(parsed.config.clone()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    let _log = init_stderr_logging();
                    tracing::error!(error = %e, "config unavailable");
                    println!("{}", result_line(Status::UnknownVersion));
                    return Ok(());
                }
            };
            let _log = start_logging(&cfg, &format!("ea-{}", slug(&parsed.app)));
            let Some(app) = cfg.app(&parsed.app) else {
                tracing::warn!(app = %parsed.app, "no [[apps]] entry for app");
                println!("{}", result_line(Status::UnknownVersion));
                return Ok(());
            };
            let status = match run_ea(app, parsed.latest.as_deref(), &cfg.paths.status_dir).await {
                Ok((evaluation, _)) => evaluation.status,
                Err(e) => {
                    tracing::error!(app = %app.name, code = e.code(), error = %e, "check failed");
                    Status::UnknownVersion
                }
            };
            println!("{}", result_line(status));
            0
        }
        Some("cleanup") => {
            let parsed = cli::parse_run_cli(&args[2..], true).unwrap_or_else(|e| usage_error(e));
            let (cfg, _log) = load_or_exit(parsed.config, "cleanup");
            let out = cleanup(&cfg.cleanup, parsed.dry_run);
            println!("{}", serde_json::to_string_pretty(&out)?);
            i32::from(!out.ok)
        }
        Some("nightly") => {
            let parsed = cli::parse_run_cli(&args[2..], false).unwrap_or_else(|e| usage_error(e));
            let (cfg, _log) = load_or_exit(parsed.config, "nightly");
            let out = nightly(&cfg).await;
            println!("{}", serde_json::to_string_pretty(&out)?);
            i32::from(!out.ok)
        }
        Some("sync-searches") => {
            let parsed = cli::parse_run_cli(&args[2..], true).unwrap_or_else(|e| usage_error(e));
            let (cfg, _log) = load_or_exit(parsed.config, "sync-searches");
            let out = sync_searches(&cfg, parsed.dry_run).await;
            println!("{}", serde_json::to_string_pretty(&out)?);
            i32::from(!out.ok)
        }
        Some("prefs") => {
            let parsed = cli::parse_prefs_cli(&args[2..]).unwrap_or_else(|e| usage_error(e));
            let (cfg, _log) = load_or_exit(parsed.config, "prefs");
            let out = prefs_report(&cfg.server.prefs_path, &parsed.update);
            println!("{}", serde_json::to_string_pretty(&out)?);
            i32::from(!out.ok)
        }
        Some(other) => usage_error(format!(
            "unknown command `{other}`; use ea|cleanup|nightly|sync-searches|prefs"
        )),
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
