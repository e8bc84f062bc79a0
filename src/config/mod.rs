//! Configuration Management
//!
//! Named connection profiles, so a connection does not have to be spelled out on
//! every invocation.
//!
//! # Configuration Locations
//! - Local: `.dbquery/config.json` (per project, team-shareable)
//! - Global: `<config_dir>/dbquery/profiles.json` (per user)
//!
//! # Resolution Precedence
//! 1. Explicit connection parameters (highest priority, handled by the caller)
//! 2. Local profiles
//! 3. Global profiles
//!
//! Passwords can be kept out of the files with `password_env`, naming an
//! environment variable that holds the password.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{Credentials, Family};
use crate::error::{DbQueryError, Result};

/// Profile file contents
///
/// ```json
/// {
///   "profiles": {
///     "reporting": { "family": "postgres", "host": "db.internal", "username": "ro", "password_env": "REPORTING_PW" }
///   },
///   "default": "reporting"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRegistry {
    #[serde(default)]
    pub profiles: BTreeMap<String, StoredProfile>,

    /// Profile used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// One stored connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub family: Family,
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Stored in plain text; prefer `password_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
}

impl StoredProfile {
    /// Resolve `password_env` and build credentials
    pub fn resolve(&self) -> Result<Credentials> {
        let password = match &self.password_env {
            Some(env_var) => std::env::var(env_var).map_err(|_| {
                DbQueryError::configuration(format!(
                    "Environment variable {env_var} not found for password"
                ))
            })?,
            None => self.password.clone().unwrap_or_default(),
        };

        let mut builder = Credentials::builder(self.family, self.host.clone())
            .username(self.username.clone().unwrap_or_default())
            .password(password);
        if let Some(port) = self.port {
            builder = builder.port(port.to_string());
        }
        if let Some(database) = &self.database {
            builder = builder.database(database.clone());
        }
        if let Some(properties) = &self.properties {
            builder = builder.properties(properties.clone());
        }
        builder.build()
    }
}

impl fmt::Debug for StoredProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredProfile")
            .field("family", &self.family)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("password_env", &self.password_env)
            .field("database", &self.database)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Where to save a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// `.dbquery/config.json` in the current directory
    Local,
    /// `<config_dir>/dbquery/profiles.json`
    Global,
}

/// Get path to the local profile file
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        DbQueryError::configuration(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".dbquery").join("config.json"))
}

/// Get path to the global profile file
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| DbQueryError::configuration("Could not determine user config directory"))?;

    Ok(config_dir.join("dbquery").join("profiles.json"))
}

/// Load a profile file; a missing file is an empty registry
pub fn load_registry(path: &Path) -> Result<ProfileRegistry> {
    if !path.exists() {
        return Ok(ProfileRegistry::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        DbQueryError::configuration(format!("Could not read config file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        DbQueryError::configuration(format!("Invalid config file format in {}: {e}", path.display()))
    })
}

/// Write a profile file, creating its directory
pub fn save_registry(path: &Path, registry: &ProfileRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DbQueryError::configuration(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| DbQueryError::configuration(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| DbQueryError::configuration(format!("Could not write config file: {e}")))
}

/// Overlay `local` on `global`: same-named profiles and the default pointer come
/// from `local` when it has them
#[must_use]
pub fn merge(global: ProfileRegistry, local: ProfileRegistry) -> ProfileRegistry {
    let mut merged = global;
    merged.profiles.extend(local.profiles);
    if local.default.is_some() {
        merged.default = local.default;
    }
    merged
}

/// Load global and local profiles with local taking precedence
pub fn load_profiles() -> Result<ProfileRegistry> {
    let global = load_registry(&global_config_path()?)?;
    let local = load_registry(&local_config_path()?)?;
    Ok(merge(global, local))
}

/// Look up a profile by name, or the default profile when `name` is `None`
pub fn find_profile<'a>(registry: &'a ProfileRegistry, name: Option<&str>) -> Result<&'a StoredProfile> {
    let available = || registry.profiles.keys().cloned().collect::<Vec<_>>().join(", ");

    let name = match name {
        Some(name) => name,
        None => registry.default.as_deref().ok_or_else(|| {
            DbQueryError::configuration(format!(
                "No default profile set. Available profiles: [{}]. Name one with --profile.",
                available()
            ))
        })?,
    };

    registry.profiles.get(name).ok_or_else(|| {
        DbQueryError::configuration(format!(
            "Profile '{name}' not found. Available profiles: [{}]",
            available()
        ))
    })
}

/// Resolve a named (or the default) profile into credentials
pub fn resolve_profile(name: Option<&str>) -> Result<Credentials> {
    let registry = load_profiles()?;
    find_profile(&registry, name)?.resolve()
}

/// Save a profile; the first profile in a file becomes its default
pub fn save_profile(name: &str, profile: StoredProfile, location: ConfigLocation) -> Result<PathBuf> {
    let path = match location {
        ConfigLocation::Local => local_config_path()?,
        ConfigLocation::Global => global_config_path()?,
    };
    save_profile_to(&path, name, profile)?;
    Ok(path)
}

/// Save a profile into a specific file
pub fn save_profile_to(path: &Path, name: &str, profile: StoredProfile) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DbQueryError::configuration("Profile name cannot be empty"));
    }

    let mut registry = load_registry(path)?;
    if registry.profiles.is_empty() {
        registry.default = Some(name.to_string());
    }
    registry.profiles.insert(name.to_string(), profile);

    save_registry(path, &registry)?;
    tracing::info!(profile = name, path = %path.display(), "saved profile");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn profile(family: Family, host: &str) -> StoredProfile {
        StoredProfile {
            family,
            host: host.to_string(),
            port: None,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            password_env: None,
            database: None,
            properties: None,
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dbquery-config-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_registry_serialization() {
        let mut registry = ProfileRegistry::default();
        registry.profiles.insert("dev".to_string(), profile(Family::Postgres, "localhost"));
        registry.default = Some("dev".to_string());

        let json = serde_json::to_string(&registry).unwrap();
        assert!(json.contains(r#""family":"postgres""#));
        assert!(!json.contains("password_env"));

        let back: ProfileRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, registry);
    }

    #[test]
    fn test_resolve_direct_password() {
        let creds = profile(Family::MySql, "h").resolve().unwrap();
        assert_eq!(creds.family(), Family::MySql);
        assert_eq!(creds.password(), "pass");
    }

    #[test]
    fn test_resolve_env_var() {
        std::env::set_var("DBQUERY_TEST_PASSWORD", "secret");

        let mut stored = profile(Family::Postgres, "localhost");
        stored.password = None;
        stored.password_env = Some("DBQUERY_TEST_PASSWORD".to_string());
        assert_eq!(stored.resolve().unwrap().password(), "secret");

        std::env::remove_var("DBQUERY_TEST_PASSWORD");
    }

    #[test]
    fn test_resolve_missing_env_var() {
        let mut stored = profile(Family::Postgres, "localhost");
        stored.password_env = Some("DBQUERY_NONEXISTENT_VAR".to_string());

        let err = stored.resolve().unwrap_err();
        assert!(err.message().contains("Environment variable DBQUERY_NONEXISTENT_VAR not found"));
    }

    #[test]
    fn test_resolve_applies_credential_rules() {
        let mut stored = profile(Family::Oracle, "ora");
        stored.username = None;
        assert!(matches!(stored.resolve().unwrap_err(), DbQueryError::Configuration(_)));

        let mut anonymous = profile(Family::MongoDb, "mongo");
        anonymous.username = None;
        anonymous.password = None;
        assert!(anonymous.resolve().is_ok());
    }

    #[test]
    fn test_merge_local_overrides_global() {
        let mut global = ProfileRegistry::default();
        global.profiles.insert("shared".to_string(), profile(Family::Postgres, "global-host"));
        global.profiles.insert("global-only".to_string(), profile(Family::Oracle, "ora"));
        global.default = Some("global-only".to_string());

        let mut local = ProfileRegistry::default();
        local.profiles.insert("shared".to_string(), profile(Family::MySql, "local-host"));
        local.default = Some("shared".to_string());

        let merged = merge(global, local);
        assert_eq!(merged.profiles.len(), 2);
        assert_eq!(merged.profiles["shared"].family, Family::MySql);
        assert_eq!(merged.profiles["shared"].host, "local-host");
        assert_eq!(merged.default.as_deref(), Some("shared"));
    }

    #[test]
    fn test_merge_keeps_global_default_when_local_has_none() {
        let mut global = ProfileRegistry::default();
        global.default = Some("g".to_string());
        let merged = merge(global, ProfileRegistry::default());
        assert_eq!(merged.default.as_deref(), Some("g"));
    }

    #[test]
    fn test_find_profile() {
        let mut registry = ProfileRegistry::default();
        registry.profiles.insert("a".to_string(), profile(Family::MySql, "h"));

        assert!(find_profile(&registry, Some("a")).is_ok());

        let err = find_profile(&registry, Some("b")).unwrap_err();
        assert!(err.message().contains("Profile 'b' not found"));
        assert!(err.message().contains('a'));

        let err = find_profile(&registry, None).unwrap_err();
        assert!(err.message().contains("No default profile"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("profiles.json");

        save_profile_to(&path, "first", profile(Family::MySql, "h1")).unwrap();
        save_profile_to(&path, "second", profile(Family::MongoDb, "h2")).unwrap();

        let registry = load_registry(&path).unwrap();
        assert_eq!(registry.profiles.len(), 2);
        assert_eq!(registry.default.as_deref(), Some("first"));
        assert_eq!(registry.profiles["second"].family, Family::MongoDb);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let registry = load_registry(Path::new("/nonexistent/dbquery/profiles.json")).unwrap();
        assert_eq!(registry, ProfileRegistry::default());
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = scratch_dir("invalid");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_registry(&path).unwrap_err();
        assert!(matches!(err, DbQueryError::Configuration(_)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_debug_hides_password() {
        let debug = format!("{:?}", profile(Family::MySql, "h"));
        assert!(!debug.contains("pass\""));
        assert!(debug.contains("***"));
    }
}
