use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PubscopeError, Result};

/// Root application configuration, loaded from `~/.config/pubscope/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub institution: InstitutionConfig,
    pub registry: RegistryConfig,
    pub matcher: MatcherConfig,
    pub harvest: HarvestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstitutionConfig {
    /// Matched case-insensitively against author affiliations.
    pub name: String,
    /// Line-delimited file of institution-affiliated ORCIDs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    /// Harvest source whose candidates skip the eligibility gate.
    pub exempt_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub crossref_url: String,
    pub datacite_url: String,
    /// DOI prefixes resolved against DataCite; everything else goes to Crossref.
    pub datacite_prefixes: Vec<String>,
    pub max_attempts: u32,
    pub workers_per_registry: usize,
    pub timeout_secs: u64,
    pub min_interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold: u8,
    /// Pairs scoring within this many points below the threshold are audited.
    pub audit_margin: u8,
    /// DOI prefixes kept out of the preprint side, such as the institution's
    /// own repository records.
    pub excluded_preprint_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossref_affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacite_query: Option<String>,
    pub biorxiv_url: String,
    pub biorxiv_days: u32,
    pub arxiv_url: String,
    pub arxiv_page_size: u32,
    pub openalex_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openalex_institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departmental_url: Option<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("pubscope");
        Self {
            path: data_dir.join("pubscope.db").to_string_lossy().to_string(),
        }
    }
}

impl Default for InstitutionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            identity_file: None,
            exempt_source: "departmental".to_string(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            crossref_url: "https://api.crossref.org".to_string(),
            datacite_url: "https://api.datacite.org".to_string(),
            datacite_prefixes: vec![
                "10.25378".to_string(),
                "10.48550".to_string(),
                "10.5281".to_string(),
                "10.6084".to_string(),
            ],
            max_attempts: 3,
            workers_per_registry: 4,
            timeout_secs: 20,
            min_interval_ms: 100,
            polite_email: None,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 90,
            audit_margin: 10,
            excluded_preprint_prefixes: vec!["10.25378/janelia.".to_string()],
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            crossref_affiliation: None,
            datacite_query: None,
            biorxiv_url: "https://api.biorxiv.org".to_string(),
            biorxiv_days: 7,
            arxiv_url: "http://export.arxiv.org/api/query".to_string(),
            arxiv_page_size: 100,
            openalex_url: "https://api.openalex.org".to_string(),
            openalex_institution: None,
            departmental_url: None,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/pubscope/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PUBSCOPE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("pubscope")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Checks the settings a sync run cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.institution.name.trim().is_empty() {
            return Err(PubscopeError::ConfigError(
                "institution.name must be set".to_string(),
            ));
        }
        if self.store.path.trim().is_empty() {
            return Err(PubscopeError::ConfigError("store.path must be set".to_string()));
        }
        if self.registry.max_attempts == 0 {
            return Err(PubscopeError::ConfigError(
                "registry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.registry.workers_per_registry == 0 {
            return Err(PubscopeError::ConfigError(
                "registry.workers_per_registry must be at least 1".to_string(),
            ));
        }
        if self.matcher.threshold > 100 {
            return Err(PubscopeError::ConfigError(
                "matcher.threshold must be within 0..=100".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.store.path)
    }
}
