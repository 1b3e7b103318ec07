use fleetops::api::{CleanupOutput, NightlyOutput, PrefsOutput};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_fleetops")
}

fn run(args: &[&str], config: &Path) -> Output {
    Command::new(bin())
        .args(args)
        .arg("--config")
        .arg(config)
        .env_remove("FLEETOPS_CONFIG")
        .env("RUST_LOG", "debug")
        .output()
        .expect("run fleetops")
}

fn write_bundle(root: &Path, name: &str, version: &str) -> PathBuf {
    let bundle = root.join(format!("{name}.app"));
    std::fs::create_dir_all(bundle.join("Contents")).expect("mkdir bundle");
    let mut dict = plist::Dictionary::new();
    dict.insert(
        "CFBundleShortVersionString".to_string(),
        plist::Value::String(version.to_string()),
    );
    plist::Value::Dictionary(dict)
        .to_file_binary(bundle.join("Contents/Info.plist"))
        .expect("write Info.plist");
    bundle
}

struct Env {
    dir: tempfile::TempDir,
    config: PathBuf,
}

impl Env {
    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }
}

fn setup() -> Env {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let apps = root.join("Applications");
    write_bundle(&apps, "Firefox", "127.0.2");
    write_bundle(&apps, "Zoom", "6.1.0");
    let config = root.join("fleetops.toml");
    let body = format!(
        r#"
[paths]
status_dir = "{root}/status"
log_dir = "{root}/logs"
validated_apps_file = "{root}/validated_apps.txt"

[autopkg]
binary = "{root}/no-such-autopkg"
recipe_list = "{root}/recipe_list.txt"
recipe_dirs = ["{root}/RecipeOverrides"]

[cleanup]
directories = ["{root}/Cache"]

[server]
prefs_path = "{root}/com.github.autopkg.plist"

[[apps]]
name = "Firefox"
latest_version = "128.0.3"
source = {{ kind = "bundle", paths = ["{root}/Applications/Firefox.app"] }}

[[apps]]
name = "Zoom"
latest_version = "%version%"
source = {{ kind = "bundle", paths = ["{root}/Applications/Zoom*.app"] }}

[[apps]]
name = "Slack"
latest_version = "4.39.0"
source = {{ kind = "bundle", paths = ["{root}/Applications/Slack.app"] }}
"#,
        root = root.display()
    );
    std::fs::write(&config, body).expect("write config");
    Env { dir, config }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

#[test]
fn ea_reports_and_records_outdated_install() {
    let env = setup();
    let out = run(&["ea", "Firefox"], &env.config);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout(&out), "<result>Needs update</result>");

    let status_file = env.path("status/Firefox-128.0.3.json");
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&status_file).expect("status file"))
            .expect("status json");
    assert_eq!(record["installed_version"], "127.0.2");
    assert_eq!(record["install_trigger"], "install-firefox");
    assert!(env.path("logs/ea-firefox.log").is_file());

    let out = run(&["ea", "Firefox", "--latest", "127.0.2"], &env.config);
    assert_eq!(stdout(&out), "<result>Up to date</result>");
    assert!(!status_file.exists(), "status file should be cleared once up to date");
}

#[test]
fn ea_edge_cases_still_exit_zero() {
    let env = setup();
    let cases = [
        (vec!["ea", "Zoom"], "<result>Unknown version</result>"),
        (vec!["ea", "Slack"], "<result>Not installed</result>"),
        (vec!["ea", "NoSuchApp"], "<result>Unknown version</result>"),
    ];
    for (args, expected) in cases {
        let out = run(&args, &env.config);
        assert_eq!(out.status.code(), Some(0), "args={args:?}");
        assert_eq!(stdout(&out), expected, "args={args:?}");
    }
    let leftovers = std::fs::read_dir(env.path("status"))
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn cleanup_dry_run_prints_report() {
    let env = setup();
    std::fs::create_dir_all(env.path("Cache/com.github.x.Firefox")).expect("mkdir cache");
    std::fs::write(env.path("Cache/com.github.x.Firefox/Firefox.pkg"), b"pkg").expect("write pkg");

    let out = run(&["cleanup", "--dry-run"], &env.config);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let parsed: CleanupOutput = serde_json::from_slice(&out.stdout).expect("parse CleanupOutput");
    assert!(parsed.ok);
    assert!(parsed.dry_run);
    assert_eq!(parsed.scanned, 1);
    assert!(parsed.removed.is_empty());
    let log = std::fs::read_to_string(env.path("logs/cleanup.log")).unwrap_or_default();
    assert!(!log.is_empty(), "cleanup log should receive events");
}

#[test]
fn nightly_without_tool_exits_one() {
    let env = setup();
    let out = run(&["nightly"], &env.config);
    assert_eq!(out.status.code(), Some(1));
    let parsed: NightlyOutput = serde_json::from_slice(&out.stdout).expect("parse NightlyOutput");
    assert_eq!(
        parsed.error.expect("error").code,
        "nightly.precondition_failed"
    );
}

#[test]
fn sync_with_missing_recipe_dir_exits_one() {
    let env = setup();
    let out = run(&["sync-searches", "--dry-run"], &env.config);
    assert_eq!(out.status.code(), Some(1));
    let parsed: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(parsed["error"]["code"], "sync.recipe_dir_missing");
}

#[test]
fn prefs_round_trip_through_cli() {
    let env = setup();
    let out = run(&["prefs"], &env.config);
    assert_eq!(out.status.code(), Some(1));

    let out = run(
        &[
            "prefs",
            "--url",
            "https://example.jamfcloud.com/",
            "--client-id",
            "fleet",
            "--client-secret",
            "hunter2",
        ],
        &env.config,
    );
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert!(!stdout(&out).contains("hunter2"));
    let parsed: PrefsOutput = serde_json::from_slice(&out.stdout).expect("parse PrefsOutput");
    assert!(parsed.written);
    assert_eq!(parsed.url.as_deref(), Some("https://example.jamfcloud.com"));
    assert!(parsed.client_id_set && parsed.client_secret_set);
}

#[test]
fn usage_errors_exit_two() {
    let env = setup();
    for args in [
        vec!["ea"],
        vec!["cleanup", "--typo"],
        vec!["nightly", "--dry-run"],
        vec!["bogus"],
    ] {
        let out = run(&args, &env.config);
        assert_eq!(out.status.code(), Some(2), "args={args:?}");
        assert!(
            String::from_utf8_lossy(&out.stderr).starts_with("fleetops: "),
            "args={args:?}"
        );
    }
}

#[test]
fn explicit_missing_config_is_an_error() {
    let env = setup();
    let out = run(&["cleanup"], &env.path("absent.toml"));
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("config.not_found"));
}

#[test]
fn help_and_version() {
    let out = Command::new(bin()).arg("help").output().expect("help");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("sync-searches"));
    let out = Command::new(bin()).arg("version").output().expect("version");
    assert_eq!(stdout(&out), env!("CARGO_PKG_VERSION"));
}
