//! Keeps per-app Extension Attributes and "needs update" searches on the
//! server in line with the recipes present on disk.

use crate::api::{ApiError, ResourceKind, SyncAction, SyncItem, SyncOutput};
use crate::config::{FleetConfig, ServerConfig};
use crate::ea::Status;
use crate::server::xml::{
    AdvancedSearch, Criteria, Criterion, DisplayFields, ExtensionAttribute, INPUT_TYPE_SCRIPT,
    InputType,
};
use crate::server::{JamfClient, Resource, read_prefs};
use crate::template::render_app;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const RECIPE_SUFFIXES: [&str; 3] = [".recipe", ".recipe.plist", ".recipe.yaml"];
const VIEW_AS: &str = "Standard Web Page";
const COMPUTER_NAME_FIELD: &str = "Computer Name";

/// App name a recipe file belongs to: `Firefox-pkg.recipe.yaml` -> `Firefox`.
pub fn recipe_app_name(file_name: &str) -> Option<String> {
    if !RECIPE_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
        return None;
    }
    let stem = file_name.split('.').next().unwrap_or_default();
    let stem = match stem.rsplit_once('-') {
        Some((head, tail))
            if !head.is_empty()
                && !tail.is_empty()
                && tail.chars().all(|c| c.is_ascii_lowercase()) =>
        {
            head
        }
        _ => stem,
    };
    let stem = stem.trim();
    (!stem.is_empty()).then(|| stem.to_string())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Discovered {
    pub recipes: usize,
    pub apps: BTreeSet<String>,
}

pub fn discover_recipes(dirs: &[PathBuf]) -> Result<Discovered, ApiError> {
    let mut found = Discovered::default();
    for dir in dirs {
        if !dir.is_dir() {
            return Err(ApiError::new(
                "sync.recipe_dir_missing",
                format!("recipe directory not found: {}", dir.display()),
            ));
        }
        let walker = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable recipe path");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if let Some(app) = recipe_app_name(&name) {
                found.recipes += 1;
                found.apps.insert(app);
            }
        }
    }
    Ok(found)
}

fn normalized(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Splits recipe apps into those with an `[[apps]]` entry (returned under
/// the configured name) and those without.
pub fn validate_apps(recipe_apps: &BTreeSet<String>, cfg: &FleetConfig) -> (Vec<String>, Vec<String>) {
    let known: BTreeMap<String, &str> = cfg
        .apps
        .iter()
        .map(|a| (normalized(&a.name), a.name.as_str()))
        .collect();
    let mut validated = BTreeSet::new();
    let mut skipped = vec![];
    for app in recipe_apps {
        match known.get(&normalized(app)) {
            Some(name) => {
                validated.insert((*name).to_string());
            }
            None => skipped.push(app.clone()),
        }
    }
    (validated.into_iter().collect(), skipped)
}

pub fn write_validated(path: &Path, apps: &[String]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut body = apps.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(path, body)
}

pub fn desired_ea(server: &ServerConfig, app: &str) -> ExtensionAttribute {
    ExtensionAttribute {
        id: None,
        name: render_app(&server.ea_name_template, app),
        enabled: true,
        description: format!("Update status of {app}, computed on the client by fleetops."),
        data_type: "String".to_string(),
        input_type: InputType {
            kind: INPUT_TYPE_SCRIPT.to_string(),
            platform: "Mac".to_string(),
            script: render_app(&server.ea_script_template, app),
        },
        inventory_display: "Extension Attributes".to_string(),
    }
}

pub fn desired_search(server: &ServerConfig, app: &str, ea_name: &str) -> AdvancedSearch {
    AdvancedSearch {
        id: None,
        name: render_app(&server.search_name_template, app),
        view_as: VIEW_AS.to_string(),
        criteria: Criteria::new(vec![Criterion {
            name: ea_name.to_string(),
            priority: 0,
            and_or: "and".to_string(),
            search_type: "is".to_string(),
            value: Status::NeedsUpdate.label().to_string(),
            opening_paren: false,
            closing_paren: false,
        }]),
        display_fields: DisplayFields::new(&[COMPUTER_NAME_FIELD, ea_name]),
    }
}

/// Scripts compare with line endings normalized and outer whitespace
/// dropped; the XML reader trims text content on the way in.
fn script_body(s: &str) -> String {
    s.replace("\r\n", "\n").trim().to_string()
}

pub fn plan_ea(existing: Option<&ExtensionAttribute>, desired: &ExtensionAttribute) -> SyncAction {
    match existing {
        None => SyncAction::Create,
        Some(e)
            if e.enabled == desired.enabled
                && e.input_type.kind == desired.input_type.kind
                && script_body(&e.input_type.script) == script_body(&desired.input_type.script) =>
        {
            SyncAction::Unchanged
        }
        Some(_) => SyncAction::Update,
    }
}

fn criteria_key(c: &Criteria) -> Vec<(&str, &str, &str, &str)> {
    c.criterion
        .iter()
        .map(|c| {
            (
                c.name.as_str(),
                c.and_or.as_str(),
                c.search_type.as_str(),
                c.value.as_str(),
            )
        })
        .collect()
}

pub fn plan_search(existing: Option<&AdvancedSearch>, desired: &AdvancedSearch) -> SyncAction {
    match existing {
        None => SyncAction::Create,
        Some(e) if criteria_key(&e.criteria) == criteria_key(&desired.criteria) => {
            SyncAction::Unchanged
        }
        Some(_) => SyncAction::Update,
    }
}

async fn sync_resource<R: Resource>(
    client: &JamfClient,
    kind: ResourceKind,
    app: &str,
    desired: &R,
    plan: fn(Option<&R>, &R) -> SyncAction,
    dry_run: bool,
) -> SyncItem {
    let mut item = SyncItem {
        app: app.to_string(),
        resource: kind,
        name: desired.name().to_string(),
        action: None,
        applied: false,
        error: None,
    };
    let existing = match client.find_by_name::<R>(desired.name()).await {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(app, name = %item.name, code = e.code(), error = %e, "lookup failed");
            item.error = Some(e.to_string());
            return item;
        }
    };
    let action = plan(existing.as_ref(), desired);
    item.action = Some(action);
    if dry_run || action == SyncAction::Unchanged {
        return item;
    }

    let applied = match (action, existing.as_ref().and_then(|e| e.id())) {
        (SyncAction::Create, _) => client.create(desired).await.map(|id| {
            tracing::info!(app, name = %item.name, id, "created");
        }),
        (SyncAction::Update, Some(id)) => client.update(id, desired).await.map(|()| {
            tracing::info!(app, name = %item.name, id, "updated");
        }),
        (SyncAction::Update, None) => {
            item.error = Some("server record has no id; cannot update".to_string());
            return item;
        }
        (SyncAction::Unchanged, _) => Ok(()),
    };
    match applied {
        Ok(()) => item.applied = true,
        Err(e) => {
            tracing::warn!(app, name = %item.name, code = e.code(), error = %e, "apply failed");
            item.error = Some(e.to_string());
        }
    }
    item
}

/// EA first: the search criterion refers to it by name.
async fn sync_app(client: &JamfClient, server: &ServerConfig, app: &str, dry_run: bool) -> Vec<SyncItem> {
    let ea = desired_ea(server, app);
    let ea_item = sync_resource(client, ResourceKind::ExtensionAttribute, app, &ea, plan_ea, dry_run).await;
    let search = desired_search(server, app, &ea.name);
    if ea_item.error.is_some() {
        let skipped = SyncItem {
            app: app.to_string(),
            resource: ResourceKind::AdvancedSearch,
            name: search.name,
            action: None,
            applied: false,
            error: Some("skipped: extension attribute sync failed".to_string()),
        };
        return vec![ea_item, skipped];
    }
    let search_item = sync_resource(
        client,
        ResourceKind::AdvancedSearch,
        app,
        &search,
        plan_search,
        dry_run,
    )
    .await;
    vec![ea_item, search_item]
}

fn abort(mut out: SyncOutput, error: ApiError) -> SyncOutput {
    tracing::error!(code = %error.code, "{}", error.message);
    out.ok = false;
    out.error = Some(error);
    out
}

pub async fn sync_searches(cfg: &FleetConfig, dry_run: bool) -> SyncOutput {
    let mut out = SyncOutput {
        ok: true,
        error: None,
        dry_run,
        recipes_found: 0,
        validated: vec![],
        skipped: vec![],
        items: vec![],
    };

    let discovered = match discover_recipes(&cfg.autopkg.recipe_dirs) {
        Ok(d) => d,
        Err(e) => return abort(out, e),
    };
    out.recipes_found = discovered.recipes;
    let (validated, skipped) = validate_apps(&discovered.apps, cfg);
    for app in &skipped {
        tracing::warn!(app = %app, "recipe has no [[apps]] entry; not synchronized");
    }
    out.validated = validated;
    out.skipped = skipped;

    let validated_file = &cfg.paths.validated_apps_file;
    if let Err(e) = write_validated(validated_file, &out.validated) {
        let message = format!("failed to write {}: {e}", validated_file.display());
        return abort(out, ApiError::new("sync.write_failed", message));
    }
    tracing::info!(
        recipes = out.recipes_found,
        validated = out.validated.len(),
        skipped = out.skipped.len(),
        "recipes scanned"
    );
    if out.validated.is_empty() {
        return out;
    }

    let prefs = match read_prefs(&cfg.server.prefs_path) {
        Ok(p) => p,
        Err(e) => return abort(out, ApiError::new(e.code(), e.to_string())),
    };
    let timeout = Duration::from_secs(cfg.server.request_timeout_secs.max(1));
    let mut client = match JamfClient::new(&prefs.url, timeout) {
        Ok(c) => c,
        Err(e) => return abort(out, ApiError::new(e.code(), e.to_string())),
    };
    if let Err(e) = client.authenticate(&prefs.client_id, &prefs.client_secret).await {
        return abort(out, ApiError::new(e.code(), e.to_string()));
    }

    let apps = out.validated.clone();
    for app in &apps {
        let items = sync_app(&client, &cfg.server, app, dry_run).await;
        out.items.extend(items);
    }

    let failed = out.items.iter().filter(|i| i.error.is_some()).count();
    tracing::info!(items = out.items.len(), failed, dry_run, "search sync finished");
    out
}
