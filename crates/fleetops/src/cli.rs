use fleetops::server::PrefsUpdate;

pub(crate) fn print_help() {
    println!(
        "Usage:\n  fleetops help\n  fleetops version\n  fleetops ea <app> [--latest <version>] [--config <path>]\n  fleetops cleanup [--dry-run] [--config <path>]\n  fleetops nightly [--config <path>]\n  fleetops sync-searches [--dry-run] [--config <path>]\n  fleetops prefs [--url <url>] [--client-id <id>] [--client-secret <secret>] [--config <path>]\n\nNotes:\n  - `ea` prints `<result>STATUS</result>` for the management agent and always exits 0.\n  - Other commands print a JSON report; exit 1 when it carries ok=false.\n  - `prefs` without flags shows what is stored (the secret is never printed).\n  - Config via env:\n      FLEETOPS_CONFIG=<path>\n      RUST_LOG=<filter> (default: info)\n\nExamples:\n  fleetops ea Firefox --latest 128.0.3\n  fleetops cleanup --dry-run\n  fleetops sync-searches --dry-run\n  fleetops prefs --url https://example.jamfcloud.com --client-id abc --client-secret xyz\n"
    );
}

fn flag_value(args: &[String], i: usize, flag: &str) -> Result<String, String> {
    let v = args
        .get(i + 1)
        .ok_or_else(|| format!("{flag} requires a value"))?;
    if v.starts_with("--") {
        return Err(format!("{flag} requires a value"));
    }
    Ok(v.clone())
}

#[derive(Debug, Clone)]
pub(crate) struct EaCli {
    pub(crate) app: String,
    pub(crate) latest: Option<String>,
    pub(crate) config: Option<String>,
}

pub(crate) fn parse_ea_cli(args: &[String]) -> Result<EaCli, String> {
    let mut app: Option<String> = None;
    let mut latest: Option<String> = None;
    let mut config: Option<String> = None;

    let mut i = 0usize;
    while i < args.len() {
        let a = &args[i];
        match a.as_str() {
            "--latest" => {
                latest = Some(flag_value(args, i, "--latest")?);
                i += 2;
            }
            "--config" => {
                config = Some(flag_value(args, i, "--config")?);
                i += 2;
            }
            _ if !a.starts_with("--") && app.is_none() => {
                app = Some(a.clone());
                i += 1;
            }
            _ => return Err(format!("unknown argument: {a}")),
        }
    }

    let app = app
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| "ea requires an app name".to_string())?;
    Ok(EaCli {
        app,
        latest,
        config,
    })
}

/// Shared shape of `cleanup`, `nightly` and `sync-searches`.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunCli {
    pub(crate) dry_run: bool,
    pub(crate) config: Option<String>,
}

pub(crate) fn parse_run_cli(args: &[String], allow_dry_run: bool) -> Result<RunCli, String> {
    let mut out = RunCli::default();
    let mut i = 0usize;
    while i < args.len() {
        let a = &args[i];
        match a.as_str() {
            "--dry-run" if allow_dry_run => {
                out.dry_run = true;
                i += 1;
            }
            "--config" => {
                out.config = Some(flag_value(args, i, "--config")?);
                i += 2;
            }
            _ => return Err(format!("unknown argument: {a}")),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PrefsCli {
    pub(crate) update: PrefsUpdate,
    pub(crate) config: Option<String>,
}

pub(crate) fn parse_prefs_cli(args: &[String]) -> Result<PrefsCli, String> {
    let mut out = PrefsCli::default();
    let mut i = 0usize;
    while i < args.len() {
        let a = &args[i];
        match a.as_str() {
            "--url" => {
                out.update.url = Some(flag_value(args, i, "--url")?);
                i += 2;
            }
            "--client-id" => {
                out.update.client_id = Some(flag_value(args, i, "--client-id")?);
                i += 2;
            }
            "--client-secret" => {
                out.update.client_secret = Some(flag_value(args, i, "--client-secret")?);
                i += 2;
            }
            "--config" => {
                out.config = Some(flag_value(args, i, "--config")?);
                i += 2;
            }
            _ => return Err(format!("unknown argument: {a}")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ea_takes_app_and_optional_flags() {
        let p = parse_ea_cli(&args(&["Google Chrome", "--latest", "128.0", "--config", "/tmp/f.toml"]))
            .expect("parse");
        assert_eq!(p.app, "Google Chrome");
        assert_eq!(p.latest.as_deref(), Some("128.0"));
        assert_eq!(p.config.as_deref(), Some("/tmp/f.toml"));

        assert!(parse_ea_cli(&args(&[])).is_err());
        assert!(parse_ea_cli(&args(&["Firefox", "--latest"])).is_err());
        assert!(parse_ea_cli(&args(&["Firefox", "Zoom"])).is_err());
    }

    #[test]
    fn dry_run_only_where_allowed() {
        assert!(parse_run_cli(&args(&["--dry-run"]), true).expect("parse").dry_run);
        let err = parse_run_cli(&args(&["--dry-run"]), false).expect_err("nightly has no dry-run");
        assert!(err.contains("unknown argument"));
        assert!(parse_run_cli(&args(&["--config", "--dry-run"]), true).is_err());
    }

    #[test]
    fn prefs_collects_partial_updates() {
        let p = parse_prefs_cli(&args(&["--url", "https://x.example.com"])).expect("parse");
        assert_eq!(p.update.url.as_deref(), Some("https://x.example.com"));
        assert!(p.update.client_id.is_none());
        assert!(parse_prefs_cli(&args(&[])).expect("parse").update.is_empty());
    }
}
