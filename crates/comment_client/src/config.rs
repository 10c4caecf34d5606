use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::ContainerId;

use crate::{
    guards::DEFAULT_POST_INTERVAL_SECS,
    pagination::DEFAULT_RECENT_LIMIT,
    store::StoreEndpoint,
    target::TargetResolver,
};

pub const SETTINGS_FILE: &str = "comments.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub comments_db: String,
    pub comments_version: String,
    /// Page the permalinks of new comments point into.
    pub page_url: String,
    pub target_map: Option<PathBuf>,
    pub post_interval_secs: i64,
    pub recent_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".into(),
            comments_db: "comments".into(),
            comments_version: "v1".into(),
            page_url: "http://127.0.0.1/docs/".into(),
            target_map: None,
            post_interval_secs: DEFAULT_POST_INTERVAL_SECS,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

impl Settings {
    pub fn endpoint(&self) -> anyhow::Result<StoreEndpoint> {
        StoreEndpoint::new(&self.base_url, &self.comments_db, &self.comments_version)
    }

    pub fn load_targets(&self) -> anyhow::Result<TargetResolver> {
        match &self.target_map {
            Some(path) => TargetResolver::from_path(path),
            None => Ok(TargetResolver::default()),
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply_overrides(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    if let Ok(v) = std::env::var("COMMENTS_BASE_URL") {
        settings.base_url = v;
    }
    apply_overrides(&mut settings, |key| {
        std::env::var(format!("APP__{}", key.to_ascii_uppercase())).ok()
    });

    settings
}

fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("base_url") {
        settings.base_url = v;
    }
    if let Some(v) = lookup("comments_db") {
        settings.comments_db = v;
    }
    if let Some(v) = lookup("comments_version") {
        settings.comments_version = v;
    }
    if let Some(v) = lookup("page_url") {
        settings.page_url = v;
    }
    if let Some(v) = lookup("target_map") {
        settings.target_map = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("post_interval_seconds") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.post_interval_secs = parsed;
        }
    }
    if let Some(v) = lookup("recent_limit") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.recent_limit = parsed.max(1);
        }
    }
}

/// Immutable inputs handed to the engine at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub targets: TargetResolver,
    /// Subscription flags preloaded with the page, per container.
    pub subscriptions: HashMap<ContainerId, bool>,
    pub post_interval_secs: i64,
    pub recent_limit: u32,
    pub page_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(TargetResolver::default())
    }
}

impl EngineConfig {
    pub fn new(targets: TargetResolver) -> Self {
        let defaults = Settings::default();
        Self {
            targets,
            subscriptions: HashMap::new(),
            post_interval_secs: defaults.post_interval_secs,
            recent_limit: defaults.recent_limit,
            page_url: defaults.page_url,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let targets = settings
            .load_targets()
            .context("failed to load comment targets")?;
        Ok(Self {
            targets,
            subscriptions: HashMap::new(),
            post_interval_secs: settings.post_interval_secs,
            recent_limit: settings.recent_limit,
            page_url: settings.page_url.clone(),
        })
    }

    pub fn with_subscriptions(mut self, subscriptions: HashMap<ContainerId, bool>) -> Self {
        self.subscriptions = subscriptions;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("comments_settings_{suffix}.toml"));
        fs::write(
            &path,
            "comments_db = \"docs_comments\"\npost_interval_seconds = \"30\"\nrecent_limit = \"0\"\n",
        )
        .expect("write settings");

        let settings = load_settings_from(&path);
        assert_eq!(settings.comments_db, "docs_comments");
        assert_eq!(settings.post_interval_secs, 30);
        assert_eq!(settings.recent_limit, 1);
        assert_eq!(settings.comments_version, "v1");

        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn missing_file_yields_defaults_and_valid_endpoint() {
        let settings = load_settings_from(Path::new("/nonexistent/comments.toml"));
        let endpoint = settings.endpoint().expect("endpoint");
        assert!(endpoint.as_str().ends_with(&format!(
            "/{}/{}",
            settings.comments_db, settings.comments_version
        )));
    }
}
