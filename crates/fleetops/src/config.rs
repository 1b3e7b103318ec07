use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub autopkg: AutopkgConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub apps: Vec<AppConfig>,
}

impl FleetConfig {
    pub fn app(&self, name: &str) -> Option<&AppConfig> {
        self.apps
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_validated_apps_file")]
    pub validated_apps_file: PathBuf,
}

fn default_status_dir() -> PathBuf {
    PathBuf::from("/Library/Application Support/fleetops/status")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/Library/Logs/fleetops")
}

fn default_validated_apps_file() -> PathBuf {
    PathBuf::from("/Library/Application Support/fleetops/validated_apps.txt")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            status_dir: default_status_dir(),
            log_dir: default_log_dir(),
            validated_apps_file: default_validated_apps_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutopkgConfig {
    #[serde(default = "default_autopkg_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_recipe_list")]
    pub recipe_list: PathBuf,
    /// Directories scanned for recipes/overrides by `sync-searches`.
    #[serde(default = "default_recipe_dirs")]
    pub recipe_dirs: Vec<PathBuf>,
    #[serde(default = "default_repo_update_timeout_secs")]
    pub repo_update_timeout_secs: u64,
    #[serde(default = "default_trust_timeout_secs")]
    pub trust_timeout_secs: u64,
    #[serde(default = "default_recipe_timeout_secs")]
    pub recipe_timeout_secs: u64,
    #[serde(default = "default_run_args")]
    pub run_args: Vec<String>,
    #[serde(default = "default_noise_patterns")]
    pub noise_patterns: Vec<String>,
    #[serde(default = "default_error_patterns")]
    pub error_patterns: Vec<String>,
}

fn default_autopkg_binary() -> PathBuf {
    PathBuf::from("/usr/local/bin/autopkg")
}

fn default_recipe_list() -> PathBuf {
    PathBuf::from("/Library/Application Support/fleetops/recipe_list.txt")
}

fn default_recipe_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/Library/AutoPkg/RecipeOverrides")]
}

fn default_repo_update_timeout_secs() -> u64 {
    600
}

fn default_trust_timeout_secs() -> u64 {
    120
}

fn default_recipe_timeout_secs() -> u64 {
    1800
}

fn default_run_args() -> Vec<String> {
    vec!["run".to_string(), "-v".to_string()]
}

fn default_noise_patterns() -> Vec<String> {
    vec![
        r"^\s*$".to_string(),
        r"^Processing .*\.\.\.$".to_string(),
        r"^\s*\{'Input'".to_string(),
        r"^\s*\{'Output'".to_string(),
    ]
}

fn default_error_patterns() -> Vec<String> {
    vec![
        r"(?i)\berror\b".to_string(),
        r"(?i)\bfailed\b".to_string(),
        r"^Traceback".to_string(),
    ]
}

impl Default for AutopkgConfig {
    fn default() -> Self {
        Self {
            binary: default_autopkg_binary(),
            recipe_list: default_recipe_list(),
            recipe_dirs: default_recipe_dirs(),
            repo_update_timeout_secs: default_repo_update_timeout_secs(),
            trust_timeout_secs: default_trust_timeout_secs(),
            recipe_timeout_secs: default_recipe_timeout_secs(),
            run_args: default_run_args(),
            noise_patterns: default_noise_patterns(),
            error_patterns: default_error_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default = "default_network_host")]
    pub host: String,
    #[serde(default = "default_network_port")]
    pub port: u16,
    #[serde(default = "default_network_attempts")]
    pub attempts: u32,
    #[serde(default = "default_network_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_network_host() -> String {
    "github.com".to_string()
}

fn default_network_port() -> u16 {
    443
}

fn default_network_attempts() -> u32 {
    10
}

fn default_network_interval_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_network_host(),
            port: default_network_port(),
            attempts: default_network_attempts(),
            interval_secs: default_network_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_directories")]
    pub directories: Vec<PathBuf>,
    #[serde(default = "default_cleanup_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
    /// Newest packages kept per containing directory regardless of age.
    #[serde(default = "default_keep_newest")]
    pub keep_newest: usize,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_cleanup_directories() -> Vec<PathBuf> {
    vec![PathBuf::from("/Library/AutoPkg/Cache")]
}

fn default_cleanup_extensions() -> Vec<String> {
    vec!["pkg".to_string(), "dmg".to_string(), "zip".to_string()]
}

fn default_max_age_days() -> u64 {
    30
}

fn default_keep_newest() -> usize {
    1
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            directories: default_cleanup_directories(),
            extensions: default_cleanup_extensions(),
            max_age_days: default_max_age_days(),
            keep_newest: default_keep_newest(),
            exclude_globs: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_prefs_path")]
    pub prefs_path: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ea_name_template")]
    pub ea_name_template: String,
    #[serde(default = "default_search_name_template")]
    pub search_name_template: String,
    #[serde(default = "default_ea_script_template")]
    pub ea_script_template: String,
}

fn default_prefs_path() -> PathBuf {
    PathBuf::from("/Library/Preferences/com.github.autopkg.plist")
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_ea_name_template() -> String {
    "%APP% Update Status".to_string()
}

fn default_search_name_template() -> String {
    "%APP% Needs Update".to_string()
}

fn default_ea_script_template() -> String {
    "#!/bin/sh\nexec /usr/local/bin/fleetops ea \"%APP%\"\n".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            prefs_path: default_prefs_path(),
            request_timeout_secs: default_request_timeout_secs(),
            ea_name_template: default_ea_name_template(),
            search_name_template: default_search_name_template(),
            ea_script_template: default_ea_script_template(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub name: String,
    /// Usually a `%version%` token filled in when the packaging tool renders the config.
    pub latest_version: Option<String>,
    pub install_trigger: Option<String>,
    pub source: AppSource,
}

impl AppConfig {
    pub fn install_trigger(&self) -> String {
        self.install_trigger
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("install-{}", slug(&self.name)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppSource {
    Bundle {
        paths: Vec<String>,
        #[serde(default = "default_bundle_key")]
        key: String,
    },
    Command {
        paths: Vec<String>,
        #[serde(default = "default_version_args")]
        args: Vec<String>,
        #[serde(default = "default_version_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_bundle_key() -> String {
    "CFBundleShortVersionString".to_string()
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

fn default_version_timeout_secs() -> u64 {
    10
}

pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
