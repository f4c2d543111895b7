// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use lookup_core::{FieldConfig, FormSettings, LookupForm, MAX_PAGE_SIZE};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "lookup";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT: &str = "5s";
const DEFAULT_DEBOUNCE: &str = "300ms";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub search: Search,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            catalog: Catalog::default(),
            search: Search::default(),
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Search {
    pub debounce: Option<String>,
    /// Applied to every `[[fields]]` entry that omits `page_size`.
    pub default_page_size: Option<i64>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("LOOKUP_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set LOOKUP_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        let mut value: toml::Value = toml::from_str(raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put settings under [catalog], [search], and [[fields]]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        apply_default_page_size(&mut value);

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let base_url = self.base_url();
        let parsed = Url::parse(base_url).with_context(|| {
            format!(
                "catalog.base_url in {} is not a valid URL: {base_url:?}",
                path.display()
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "catalog.base_url in {} must use http or https, got {:?}",
                path.display(),
                parsed.scheme()
            );
        }

        if self.timeout()? <= Duration::ZERO {
            bail!(
                "catalog.timeout in {} must be positive, got {}",
                path.display(),
                self.catalog.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT)
            );
        }
        self.debounce()?;

        if let Some(size) = self.search.default_page_size
            && !(1..=i64::from(MAX_PAGE_SIZE)).contains(&size)
        {
            bail!(
                "search.default_page_size in {} must be between 1 and {MAX_PAGE_SIZE}, got {size}",
                path.display()
            );
        }

        self.build_form().with_context(|| {
            format!(
                "invalid [[fields]] in {}; check ids, required_gates and reset_targets",
                path.display()
            )
        })?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.catalog
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.catalog.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn debounce(&self) -> Result<Duration> {
        parse_duration(self.search.debounce.as_deref().unwrap_or(DEFAULT_DEBOUNCE))
    }

    pub fn settings(&self) -> Result<FormSettings> {
        Ok(FormSettings {
            debounce: self.debounce()?,
        })
    }

    pub fn build_form(&self) -> Result<LookupForm> {
        let form = LookupForm::new(self.fields.clone(), self.settings()?)?;
        Ok(form)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            r#"# lookup config
# Place this file at: {}

version = 1

[catalog]
base_url = "{DEFAULT_BASE_URL}"
timeout = "{DEFAULT_TIMEOUT}"

[search]
debounce = "{DEFAULT_DEBOUNCE}"
default_page_size = 20

# Choosing a hospital enables the service field; changing it clears the
# service, which in turn clears the office.
[[fields]]
id = "hospital"
label = "Hospital"
endpoint = "hospitales/search"
gate_param = "hospital_id"
reset_targets = ["service"]

[[fields]]
id = "service"
label = "Service"
endpoint = "servicios/search"
gate_param = "servicio_id"
required_gates = ["hospital"]
reset_targets = ["office"]
required_message = "Select a hospital first."

[[fields]]
id = "office"
label = "Office"
endpoint = "oficinas/search"
min_chars = 2
required_gates = ["service"]
allow_empty_option = true
empty_option_label = "No office"
empty_value = "none"
"#,
            path.display(),
        )
    }
}

fn apply_default_page_size(value: &mut toml::Value) {
    let Some(size) = value
        .get("search")
        .and_then(|search| search.get("default_page_size"))
        .and_then(toml::Value::as_integer)
    else {
        return;
    };
    let Some(fields) = value.get_mut("fields").and_then(toml::Value::as_array_mut) else {
        return;
    };
    for table in fields.iter_mut().filter_map(toml::Value::as_table_mut) {
        if !table.contains_key("page_size") {
            table.insert("page_size".to_owned(), toml::Value::Integer(size));
        }
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 300ms or 5s)")
}
