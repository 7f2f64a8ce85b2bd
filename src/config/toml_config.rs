use crate::utils::error::{PulseError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_path, validate_positive_number,
    validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "leadpulse.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bootstrap: BootstrapConfig,
    pub server: ServerConfig,
    pub posthog: PosthogConfig,
    pub airtable: AirtableConfig,
    pub assistant: AssistantConfig,
    pub reports: ReportsConfig,
}

/// How `leadpulse launch` prepares the project before starting the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub project_dir: String,
    /// Isolated runtime environment, relative to `project_dir`.
    pub env_dir: String,
    /// Best-effort; failure is logged and ignored.
    pub create_env: Vec<String>,
    /// Dependency manifest that must exist before `install` runs.
    pub manifest: String,
    /// Empty to skip dependency installation.
    pub install: Vec<String>,
    pub env_file: String,
    /// Empty to run this binary's `serve` subcommand.
    pub server: Vec<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            project_dir: ".".to_string(),
            env_dir: "venv".to_string(),
            create_env: vec![
                "python3".to_string(),
                "-m".to_string(),
                "venv".to_string(),
                "venv".to_string(),
            ],
            manifest: "requirements.txt".to_string(),
            install: vec![
                "pip".to_string(),
                "install".to_string(),
                "-q".to_string(),
                "-r".to_string(),
                "requirements.txt".to_string(),
            ],
            env_file: ".env".to_string(),
            server: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dashboard_path: String,
    pub cache_ttl_seconds: u64,
    /// Events fetched per dashboard refresh.
    pub pageview_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
            dashboard_path: "dashboard.html".to_string(),
            cache_ttl_seconds: 300,
            pageview_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PosthogConfig {
    pub host: String,
    pub project: String,
    pub api_key: String,
    /// Events per page when the collector walks a whole period.
    pub page_limit: u32,
    pub timeout_seconds: u64,
}

impl Default for PosthogConfig {
    fn default() -> Self {
        Self {
            host: "https://us.posthog.com".to_string(),
            project: "259946".to_string(),
            api_key: String::new(),
            page_limit: 1000,
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AirtableConfig {
    pub base_url: String,
    pub token: String,
    /// Read when `token` is empty.
    pub token_file: Option<String>,
    pub base: String,
    pub table: String,
    pub page_size: u32,
    pub timeout_seconds: u64,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.airtable.com".to_string(),
            token: String::new(),
            token_file: None,
            base: "appHT9Re4l53GO16t".to_string(),
            table: "tbl4P7tqdonXv5vcY".to_string(),
            page_size: 100,
            timeout_seconds: 30,
        }
    }
}

impl AirtableConfig {
    pub fn is_enabled(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub business_name: String,
    pub business_description: String,
    pub ollama_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub relay_url: String,
    pub relay_timeout_seconds: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            business_name: "Connected Montreal".to_string(),
            business_description: "a bachelor party planning business in Montreal and Austin TX"
                .to_string(),
            ollama_url: "http://localhost:11434/api/chat".to_string(),
            model: "gemma3:4b".to_string(),
            timeout_seconds: 10,
            relay_url: "http://localhost:9999/api/chat".to_string(),
            relay_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub data_dir: String,
    pub period_days: u32,
    pub report_file: String,
    pub proposals_file: String,
    /// Proposal output formats: `json` and/or `csv`.
    pub output_formats: Vec<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            period_days: 7,
            report_file: "daily-report.json".to_string(),
            proposals_file: "proposals.json".to_string(),
            output_formats: vec!["json".to_string()],
        }
    }
}

/// Expands a leading `~` in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl AppConfig {
    /// Loads `path`, or `leadpulse.toml` if it exists, or the defaults;
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.resolve_token_file()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PulseError::IoError)?;
        tracing::debug!("Loaded config from {}", path.as_ref().display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| PulseError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value. Unset variables become
    /// empty strings, so an unset secret reads as "not configured".
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| PulseError::config(format!("placeholder pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!("Environment variable {} is not set", var_name);
                String::new()
            })
        });

        Ok(result.to_string())
    }

    /// Environment variables win over the file for secrets and the port.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = non_empty("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value '{}'", port),
            }
        }
        if let Some(key) = non_empty("POSTHOG_API_KEY") {
            self.posthog.api_key = key;
        }
        if let Some(project) = non_empty("POSTHOG_PROJECT") {
            self.posthog.project = project;
        }
        if let Some(token) = non_empty("AIRTABLE_TOKEN") {
            self.airtable.token = token;
        }
        if let Some(base) = non_empty("AIRTABLE_BASE") {
            self.airtable.base = base;
        }
        if let Some(table) = non_empty("AIRTABLE_TABLE") {
            self.airtable.table = table;
        }
    }

    fn resolve_token_file(&mut self) -> Result<()> {
        if self.airtable.is_enabled() {
            return Ok(());
        }
        if let Some(file) = &self.airtable.token_file {
            let path = expand_path(file);
            if path.exists() {
                self.airtable.token = std::fs::read_to_string(&path)?.trim().to_string();
                tracing::debug!("Read Airtable token from {}", path.display());
            } else {
                tracing::warn!("Airtable token file {} does not exist", path.display());
            }
        }
        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validate_path("bootstrap.project_dir", &self.bootstrap.project_dir)?;
        validate_path("bootstrap.env_dir", &self.bootstrap.env_dir)?;
        validate_path("bootstrap.env_file", &self.bootstrap.env_file)?;
        if !self.bootstrap.install.is_empty() {
            validate_path("bootstrap.manifest", &self.bootstrap.manifest)?;
        }

        validate_non_empty_string("server.host", &self.server.host)?;
        validate_path("server.dashboard_path", &self.server.dashboard_path)?;
        validate_positive_number("server.pageview_limit", u64::from(self.server.pageview_limit), 1)?;

        validate_url("posthog.host", &self.posthog.host)?;
        validate_non_empty_string("posthog.project", &self.posthog.project)?;
        validate_positive_number("posthog.page_limit", u64::from(self.posthog.page_limit), 1)?;

        validate_url("airtable.base_url", &self.airtable.base_url)?;
        validate_range("airtable.page_size", self.airtable.page_size, 1, 100)?;

        validate_url("assistant.ollama_url", &self.assistant.ollama_url)?;
        validate_url("assistant.relay_url", &self.assistant.relay_url)?;
        validate_non_empty_string("assistant.model", &self.assistant.model)?;

        validate_path("reports.data_dir", &self.reports.data_dir)?;
        validate_positive_number("reports.period_days", u64::from(self.reports.period_days), 1)?;
        validate_one_of("reports.output_formats", &self.reports.output_formats, &["json", "csv"])?;

        Ok(())
    }
}
