//! Configuration types for the worker, its storage, and the proxy host.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Cache namespace configuration.
///
/// Both cache names are derived from a shared prefix and a version tag, so a
/// release only has to bump `version` for activation to purge the old caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix shared by every cache this application owns.
    pub prefix: String,
    /// Version tag embedded in the current cache names.
    pub version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "glimpse-media-".to_string(),
            version: "v5.7".to_string(),
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Name of the static cache for the current version.
    #[must_use]
    pub fn static_name(&self) -> String {
        format!("{}static-{}", self.prefix, self.version)
    }

    /// Name of the dynamic cache for the current version.
    #[must_use]
    pub fn dynamic_name(&self) -> String {
        format!("{}dynamic-{}", self.prefix, self.version)
    }

    /// Returns true if the named cache belongs to this application.
    #[must_use]
    pub fn owns(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    /// Returns true if the named cache is one of the two current caches.
    #[must_use]
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name() || name == self.dynamic_name()
    }
}

/// Request classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Theme providers; each gets `/<provider>/` and `/<provider>/index.html` routes.
    pub providers: Vec<String>,
    /// Path segment identifying generated media data.
    pub data_segment: String,
    /// Extensions treated as live JSON data under the data segment.
    pub json_extensions: Vec<String>,
    /// Extensions treated as artwork under the data segment.
    pub image_extensions: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            providers: vec!["plex".to_string(), "jellyfin".to_string(), "emby".to_string()],
            data_segment: "/data/".to_string(),
            json_extensions: vec![".json".to_string()],
            image_extensions: vec![
                ".jpg".to_string(),
                ".jpeg".to_string(),
                ".png".to_string(),
                ".webp".to_string(),
            ],
        }
    }
}

impl RouteConfig {
    /// Sets the provider list.
    #[must_use]
    pub fn with_providers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.providers = providers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the data directory segment.
    #[must_use]
    pub fn with_data_segment(mut self, segment: impl Into<String>) -> Self {
        self.data_segment = segment.into();
        self
    }

    /// Returns every themed route literal: the root, `/index.html`, and the
    /// per-provider routes with and without a trailing `index.html`.
    #[must_use]
    pub fn themed_paths(&self) -> Vec<String> {
        let mut paths = vec!["/".to_string(), "/index.html".to_string()];
        for provider in &self.providers {
            let provider = provider.trim_matches('/');
            if provider.is_empty() {
                continue;
            }
            paths.push(format!("/{provider}/"));
            paths.push(format!("/{provider}/index.html"));
        }
        paths
    }
}

/// Assets fetched during install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecacheConfig {
    /// Paths stored in the static cache at install time.
    pub assets: Vec<String>,
    /// Path under which the offline fallback page is cached.
    pub offline_page: String,
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            assets: vec!["/manifest.json".to_string(), "/test.html".to_string()],
            offline_page: "/offline.html".to_string(),
        }
    }
}

impl PrecacheConfig {
    /// Sets the manifest asset list.
    #[must_use]
    pub fn with_assets<I, P>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }
}

/// Everything the service worker itself needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cache naming.
    pub cache: CacheConfig,
    /// Request classification.
    pub routes: RouteConfig,
    /// Install-time precache.
    pub precache: PrecacheConfig,
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cache configuration.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the route configuration.
    #[must_use]
    pub fn with_routes(mut self, routes: RouteConfig) -> Self {
        self.routes = routes;
        self
    }

    /// Replaces the precache configuration.
    #[must_use]
    pub fn with_precache(mut self, precache: PrecacheConfig) -> Self {
        self.precache = precache;
        self
    }
}

/// Which cache storage backend the host uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Caches live in memory and vanish with the process.
    Memory,
    /// Caches are persisted under a directory.
    #[default]
    Disk,
}

/// Cache storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selection.
    pub backend: StorageBackend,
    /// Directory for the disk backend. Defaults to [`StorageConfig::default_dir`].
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Returns the directory where disk caches are stored.
    ///
    /// Uses `STATE_DIRECTORY` (set by systemd when `StateDirectory=` is configured),
    /// falling back to `$XDG_DATA_HOME/glimpse-sw` for interactive use.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        if let Ok(state_dir) = std::env::var("STATE_DIRECTORY") {
            PathBuf::from(state_dir).join("caches")
        } else {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("glimpse-sw")
                .join("caches")
        }
    }

    /// Returns the configured directory or the default one.
    #[must_use]
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(Self::default_dir)
    }
}

/// Proxy host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Origin of the media viewer's web server.
    pub upstream: String,
    /// Origin pages use to reach the proxy. Defaults to `http://<host>:<port>`.
    pub public_origin: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            upstream: "http://127.0.0.1:8080".to_string(),
            public_origin: None,
        }
    }
}

impl ProxyConfig {
    /// Returns the origin the worker treats as its own.
    #[must_use]
    pub fn origin(&self) -> String {
        self.public_origin
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker settings.
    pub worker: WorkerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Proxy settings.
    pub proxy: ProxyConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glimpse-sw")
            .join("config.toml")
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml(text: &str) -> crate::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration from `path`, or from the default location when
    /// `path` is `None`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                log::info!("Loaded config from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_cache_names() {
        let config = CacheConfig::default();
        assert_eq!(config.static_name(), "glimpse-media-static-v5.7");
        assert_eq!(config.dynamic_name(), "glimpse-media-dynamic-v5.7");
    }

    #[test]
    fn cache_ownership() {
        let config = CacheConfig::new().with_version("v2");
        assert!(config.owns("glimpse-media-static-v1"));
        assert!(!config.owns("other-app-cache"));
        assert!(config.is_current("glimpse-media-dynamic-v2"));
        assert!(!config.is_current("glimpse-media-dynamic-v1"));
    }

    #[test]
    fn themed_paths_cover_every_provider() {
        let paths = RouteConfig::default().themed_paths();
        assert_eq!(
            paths,
            vec![
                "/",
                "/index.html",
                "/plex/",
                "/plex/index.html",
                "/jellyfin/",
                "/jellyfin/index.html",
                "/emby/",
                "/emby/index.html",
            ]
        );
    }

    #[test]
    fn themed_paths_normalize_slashes() {
        let routes = RouteConfig::default().with_providers(["/kodi/", ""]);
        assert_eq!(
            routes.themed_paths(),
            vec!["/", "/index.html", "/kodi/", "/kodi/index.html"]
        );
    }

    #[test]
    fn builder_pattern() {
        let config = WorkerConfig::new()
            .with_cache(CacheConfig::new().with_prefix("test-").with_version("v9"))
            .with_precache(PrecacheConfig::default().with_assets(["/a.css"]));

        assert_eq!(config.cache.static_name(), "test-static-v9");
        assert_eq!(config.precache.assets, vec!["/a.css"]);
        assert_eq!(config.precache.offline_page, "/offline.html");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [worker.cache]
            version = "v6.0"

            [proxy]
            port = 9000
            upstream = "http://media:3000"

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.worker.cache.version, "v6.0");
        assert_eq!(config.worker.cache.prefix, "glimpse-media-");
        assert_eq!(config.proxy.port, 9000);
        assert_eq!(config.proxy.host, "127.0.0.1");
        assert_eq!(config.proxy.origin(), "http://127.0.0.1:9000");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.worker.routes, RouteConfig::default());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = AppConfig::from_toml("[proxy]\nport = \"nope\"").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[proxy]\npublic_origin = \"https://media.example\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.proxy.origin(), "https://media.example");
    }

    #[test]
    fn storage_dir_override() {
        let config = StorageConfig {
            backend: StorageBackend::Disk,
            dir: Some(PathBuf::from("/tmp/glimpse")),
        };
        assert_eq!(config.resolved_dir(), PathBuf::from("/tmp/glimpse"));
    }
}
