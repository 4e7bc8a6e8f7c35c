//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

/// Keyward configuration
///
/// A loaded config is treated as an immutable snapshot; runtime mutation
/// happens only through [`Scope::update_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Served domains, ordered. The first entry is the primary/system
    /// domain used for self-authentication contexts.
    pub domains: Vec<String>,

    /// Allow clear-text (user:secret) authentication
    pub clear_auth: bool,
    /// Allow stateless MAC authentication
    pub mac_auth: bool,
    /// Allow master-key MAC authentication
    pub master_auth: bool,
    /// Allow master-key auto-registration. Gates registration of the
    /// auto-reg endpoint at the transport layer; no core path consults
    /// it directly.
    pub master_auto_reg: bool,
    /// Act as a full authentication service for other services. Gates
    /// registration of the service-facing endpoints at the transport
    /// layer; no core path consults it directly.
    pub auth_service: bool,

    /// Generated clear-text password length, characters
    pub password_len: usize,
    /// Generated HMAC key size, bits
    pub key_bits: u32,

    /// Default steady-state master key count for user identities.
    /// The rotation path allows up to twice this while old and new
    /// keys coexist.
    pub def_user_ms_max: u32,
    /// Default steady-state master key count for service identities
    pub def_service_ms_max: u32,
    /// Default derived key count for user identities
    pub def_user_ds_max: u32,
    /// Default derived key count for service identities
    pub def_service_ds_max: u32,

    pub cache: CacheConfig,
}

/// User profile cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached profiles
    pub capacity: usize,
    /// Absolute per-entry time to live, seconds
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            clear_auth: false,
            mac_auth: false,
            master_auth: false,
            master_auto_reg: false,
            auth_service: false,
            password_len: 16,
            key_bits: 256,
            def_user_ms_max: 2,
            def_service_ms_max: 8,
            def_user_ds_max: 100,
            def_service_ds_max: 1000,
            cache: CacheConfig {
                capacity: 10240,
                ttl_secs: 600,
            },
        }
    }
}

impl AuthConfig {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KEYWARD_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("keyward")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: AuthConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(AuthConfig::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.password_len < 8 {
            return Err(anyhow!("password_len must be at least 8"));
        }
        if self.key_bits < 128 || self.key_bits % 8 != 0 {
            return Err(anyhow!("key_bits must be a multiple of 8, at least 128"));
        }
        if self.cache.capacity == 0 {
            return Err(anyhow!("cache.capacity must be non-zero"));
        }
        Ok(())
    }

    /// The primary (system) domain, when configured
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }

    /// Whether a domain is served locally
    pub fn is_local_domain(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d == domain)
    }

    /// Effective master-key quota for an identity class
    pub fn default_ms_max(&self, is_service: bool) -> u32 {
        if is_service {
            self.def_service_ms_max
        } else {
            self.def_user_ms_max
        }
    }

    /// Effective derived-key quota for an identity class
    pub fn default_ds_max(&self, is_service: bool) -> u32 {
        if is_service {
            self.def_service_ds_max
        } else {
            self.def_user_ds_max
        }
    }
}

/// The service's own identity, established at bootstrap
#[derive(Debug, Clone)]
pub struct SystemIdentity {
    pub local_id: Uuid,
    pub global_id: String,
}

/// Narrow mutable runtime state shared by components.
///
/// Holds the active config snapshot and the system identity; everything
/// else is passed explicitly at construction. Reads take a cheap clone so
/// no lock is held across await points.
#[derive(Debug)]
pub struct Scope {
    config: RwLock<AuthConfig>,
    system: RwLock<Option<SystemIdentity>>,
}

impl Scope {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: RwLock::new(config),
            system: RwLock::new(None),
        }
    }

    /// Current configuration snapshot
    pub fn config(&self) -> AuthConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Apply a runtime configuration change (the `setup` management call)
    pub fn update_config(&self, apply: impl FnOnce(&mut AuthConfig)) {
        let mut cfg = self.config.write().expect("config lock poisoned");
        apply(&mut cfg);
    }

    pub fn set_system(&self, identity: SystemIdentity) {
        *self.system.write().expect("system lock poisoned") = Some(identity);
    }

    pub fn system(&self) -> Option<SystemIdentity> {
        self.system.read().expect("system lock poisoned").clone()
    }
}
