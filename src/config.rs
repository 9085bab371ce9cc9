//! Configuration document: YAML merged key by key over built-in defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

/// Always exported to Oracle tools; 19c's installer refuses newer EL releases otherwise.
pub const CV_ASSUME_DISTID: &str = "OEL7.8";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub oracle: OracleSettings,
    pub database: DatabaseSettings,
    pub google_drive: DriveSettings,
    /// NETCA response-file overrides.
    pub network: BTreeMap<String, serde_yaml::Value>,
    pub paths: PathSettings,
    pub web: WebSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub oracle_base: String,
    pub oracle_home: String,
    pub oracle_sid: String,
    pub inventory_location: String,
    pub grid_home: String,
    pub os_user: String,
    /// Unrecognised keys, handed to the response-file templates.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            oracle_base: "/u01/app/oracle".to_string(),
            oracle_home: "/u01/app/oracle/product/19.3.0/dbhome_1".to_string(),
            oracle_sid: "GDCPROD".to_string(),
            inventory_location: "/u01/app/oraInventory".to_string(),
            grid_home: "/u01/app/19.3.0/grid".to_string(),
            os_user: "oracle".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub db_name: String,
    pub sid: String,
    pub pdb_name: String,
    pub sys_password: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            db_name: "GDCPROD".to_string(),
            sid: "GDCPROD".to_string(),
            pdb_name: "GDCPDB".to_string(),
            sys_password: "Oracle123".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    pub file_id: String,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            file_id: "1Mi7B2HneMBIyxJ01tnA-ThQ9hr2CAsns".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub scripts_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("/opt/oradba/scripts"),
            log_dir: PathBuf::from("/var/log/oracledba"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub host: String,
    pub port: u16,
    /// Idle session lifetime in seconds.
    pub session_timeout: u64,
    pub state_dir: PathBuf,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            session_timeout: 3600,
            state_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/root"))
                .join(".oracledba"),
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if the path does not exist and `ConfigParse`
    /// if it is not a valid YAML mapping.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            return Err(Error::ConfigMissing(path.to_path_buf()));
        }

        let text = fs::read_to_string(path)?;
        let config = Self::from_yaml(&text).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::debug!(path = %path.display(), "configuration loaded");

        Ok(config)
    }

    /// Parse a YAML document; an empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML for this layout
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    #[must_use]
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.paths.log_dir = dir;
        self
    }

    #[must_use]
    pub fn with_scripts_dir(mut self, dir: PathBuf) -> Self {
        self.paths.scripts_dir = dir;
        self
    }

    /// Override the database name; the SID follows it.
    #[must_use]
    pub fn with_db_name(mut self, name: &str) -> Self {
        self.database.db_name = name.to_string();
        self.database.sid = name.to_string();
        self
    }

    #[must_use]
    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        self.web.state_dir = dir;
        self
    }

    #[must_use]
    pub fn oracle_home(&self) -> &Path {
        Path::new(&self.oracle.oracle_home)
    }

    /// Absolute path of a binary under `$ORACLE_HOME/bin`.
    #[must_use]
    pub fn oracle_bin(&self, name: &str) -> String {
        format!("{}/bin/{name}", self.oracle.oracle_home)
    }

    #[must_use]
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.paths.log_dir.join(format!("{name}.log"))
    }

    /// Environment every Oracle tool is launched with.
    #[must_use]
    pub fn oracle_env(&self) -> Vec<(String, String)> {
        let path = env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());
        vec![
            ("ORACLE_BASE".to_string(), self.oracle.oracle_base.clone()),
            ("ORACLE_HOME".to_string(), self.oracle.oracle_home.clone()),
            ("ORACLE_SID".to_string(), self.database.sid.clone()),
            (
                "PATH".to_string(),
                format!("{}/bin:{path}", self.oracle.oracle_home),
            ),
            ("CV_ASSUME_DISTID".to_string(), CV_ASSUME_DISTID.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_none_returns_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.database.pdb_name, "GDCPDB");
    }

    #[test]
    fn test_single_key_overrides_only_that_key() {
        let config = Config::from_yaml("database:\n  sid: TESTDB\n").unwrap();
        let mut expected = Config::default();
        expected.database.sid = "TESTDB".to_string();
        assert_eq!(config, expected);
        assert_eq!(config.database.pdb_name, "GDCPDB");
    }

    #[test]
    fn test_unknown_top_level_groups_are_ignored() {
        let config = Config::from_yaml("monitoring:\n  enabled: true\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_extra_keys_are_kept_for_templates() {
        let config = Config::from_yaml("database:\n  charset: WE8MSWIN1252\n").unwrap();
        assert_eq!(
            config.database.extra.get("charset"),
            Some(&serde_yaml::Value::String("WE8MSWIN1252".to_string()))
        );
        assert_eq!(config.database.db_name, "GDCPROD");
    }

    #[test]
    fn test_empty_document_is_defaults() {
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/oradba.yml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(_)));
    }

    #[test]
    fn test_invalid_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "oracle: [unterminated").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_oracle_env() {
        let config = Config::default().with_db_name("TESTDB");
        let env = config.oracle_env();
        assert!(env.contains(&("ORACLE_SID".to_string(), "TESTDB".to_string())));
        assert!(env.contains(&("CV_ASSUME_DISTID".to_string(), "OEL7.8".to_string())));
        let path = env.iter().find(|(k, _)| k == "PATH").unwrap();
        assert!(path.1.starts_with("/u01/app/oracle/product/19.3.0/dbhome_1/bin:"));
    }
}
