//! Suite configuration and manifest discovery.

use crate::manifest::GroupManifest;
use crate::validator::FalsyGating;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding [`SuiteConfig::endpoint`].
pub const ENDPOINT_ENV: &str = "GQLSCENARIO_ENDPOINT";

/// Configuration of one scenario group run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// GraphQL endpoint used by the HTTP environment.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Skip the remaining steps after the first failure.
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub falsy_gating: FalsyGating,
    #[serde(default)]
    pub session: SessionConfig,
    /// Send a `{ __typename }` probe while connecting.
    #[serde(default)]
    pub probe_on_connect: bool,
}

/// How a session credential is attached to HTTP requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_header")]
    pub header: String,
    /// Header value; `{{ itemId }}`, `{{ data }}` and `{{ data.<path> }}`
    /// are substituted from the session.
    #[serde(default = "default_session_template")]
    pub template: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_session_header() -> String {
    "Authorization".to_string()
}

fn default_session_template() -> String {
    "Bearer {{ itemId }}".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            header: default_session_header(),
            template: default_session_template(),
        }
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            headers: HashMap::new(),
            timeout: default_timeout(),
            fail_fast: false,
            falsy_gating: FalsyGating::default(),
            session: SessionConfig::default(),
            probe_on_connect: false,
        }
    }
}

impl SuiteConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .context(format!(
                "Failed to read config file: {}",
                path.display()
            ))?;
        Self::from_yaml(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Let `GQLSCENARIO_ENDPOINT` override the configured endpoint.
    pub fn apply_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            debug!("Using endpoint from {}: {}", ENDPOINT_ENV, endpoint);
            self.endpoint = Some(endpoint);
        }
        self
    }

    /// Parse and return the endpoint URL.
    pub fn endpoint_url(&self) -> Result<url::Url> {
        let endpoint = self.endpoint.as_deref().context(format!(
            "No GraphQL endpoint configured (set `endpoint` or {ENDPOINT_ENV})"
        ))?;
        url::Url::parse(endpoint)
            .context(format!("Invalid endpoint: {endpoint}"))
    }
}

/// Finds and loads YAML group manifests.
#[derive(Debug)]
pub struct ManifestLoader {
    pub paths: Vec<PathBuf>,
}

impl ManifestLoader {
    pub fn new() -> Self {
        Self {
            paths: vec![PathBuf::from("tests/scenarios")],
        }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn load_manifest<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<GroupManifest> {
        let path = path.as_ref();
        info!("Loading scenario group from {}", path.display());

        let content = fs::read_to_string(path)
            .context(format!("Failed to read manifest: {}", path.display()))?;
        let manifest = GroupManifest::from_yaml(&content)
            .context(format!("Failed to parse YAML from {}", path.display()))?;

        debug!("Loaded scenario group: {}", manifest.name);
        Ok(manifest)
    }

    /// Load every manifest in `dir`, skipping files that fail to parse.
    pub fn load_manifests_from_dir<P: AsRef<Path>>(
        &self,
        dir: P,
    ) -> Result<Vec<GroupManifest>> {
        let dir = dir.as_ref();
        info!("Loading scenario groups from directory: {}", dir.display());

        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .context(format!("Failed to read directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_manifest_file(path))
            .collect();
        entries.sort();

        let mut manifests = Vec::new();
        for path in entries {
            match self.load_manifest(&path) {
                Ok(manifest) => manifests.push(manifest),
                Err(err) => {
                    debug!(
                        "Failed to load manifest from {}: {:#}",
                        path.display(),
                        err
                    );
                }
            }
        }

        info!(
            "Loaded {} scenario group(s) from {}",
            manifests.len(),
            dir.display()
        );
        Ok(manifests)
    }

    pub fn load_all(&self) -> Result<Vec<GroupManifest>> {
        let mut all = Vec::new();

        for path in &self.paths {
            if path.is_dir() {
                match self.load_manifests_from_dir(path) {
                    Ok(mut manifests) => all.append(&mut manifests),
                    Err(err) => {
                        debug!(
                            "Failed to load manifests from {}: {:#}",
                            path.display(),
                            err
                        );
                    }
                }
            }
        }

        info!("Loaded {} scenario group(s) in total", all.len());
        Ok(all)
    }
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_manifest_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}
