//! Silent-install response files for `runInstaller`, `dbca` and `netca`.

use crate::{
    config::Config,
    error::{Error, Result},
};
use minijinja::{Environment, UndefinedBehavior};
use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

const DB_INSTALL_RSP: &str = include_str!("templates/db_install.rsp");
const DBCA_RSP: &str = include_str!("templates/dbca.rsp");
const NETCA_RSP: &str = include_str!("templates/netca.rsp");

pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    DbInstall,
    Dbca,
    Netca,
}

impl Template {
    pub const ALL: [Self; 3] = [Self::DbInstall, Self::Dbca, Self::Netca];

    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::DbInstall => DB_INSTALL_RSP,
            Self::Dbca => DBCA_RSP,
            Self::Netca => NETCA_RSP,
        }
    }

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::DbInstall => "db_install.rsp",
            Self::Dbca => "dbca.rsp",
            Self::Netca => "netca.rsp",
        }
    }

    /// Template parameter and the response-file key it lands in.
    #[must_use]
    pub const fn fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::DbInstall => &[
                ("install_option", "oracle.install.option"),
                ("inventory_location", "INVENTORY_LOCATION"),
                ("oracle_group", "UNIX_GROUP_NAME"),
                ("oracle_home", "ORACLE_HOME"),
                ("oracle_base", "ORACLE_BASE"),
                ("edition", "oracle.install.db.InstallEdition"),
                ("dba_group", "oracle.install.db.OSDBA_GROUP"),
                ("oper_group", "oracle.install.db.OSOPER_GROUP"),
                ("backupdba_group", "oracle.install.db.OSBACKUPDBA_GROUP"),
                ("dgdba_group", "oracle.install.db.OSDGDBA_GROUP"),
                ("kmdba_group", "oracle.install.db.OSKMDBA_GROUP"),
                ("racdba_group", "oracle.install.db.OSRACDBA_GROUP"),
            ],
            Self::Dbca => &[
                ("db_name", "gdbName"),
                ("sid", "sid"),
                ("db_type", "databaseConfigType"),
                ("template", "templateName"),
                ("storage_type", "storageType"),
                ("data_file_dest", "datafileDestination"),
                ("fra_dest", "recoveryAreaDestination"),
                ("fra_size", "recoveryAreaSize"),
                ("total_memory", "totalMemory"),
                ("memory_percentage", "memoryPercentage"),
                ("charset", "characterSet"),
                ("ncharset", "nationalCharacterSet"),
                ("listener", "listeners"),
                ("variables", "variables"),
                ("init_params", "initParams"),
                ("sample_schema", "sampleSchema"),
                ("is_cdb", "createAsContainerDatabase"),
                ("pdb_count", "numberOfPDBs"),
                ("pdb_name", "pdbName"),
                ("pdb_admin_pwd", "pdbAdminPassword"),
                ("sys_password", "sysPassword"),
                ("system_password", "systemPassword"),
                ("auto_memory_mgmt", "automaticMemoryManagement"),
            ],
            Self::Netca => &[
                ("responsefile_version", "RESPONSEFILE_VERSION"),
                ("create_type", "CREATE_TYPE"),
                ("install_type", "INSTALL_TYPE"),
                ("listener_number", "LISTENER_NUMBER"),
                ("listener_names", "LISTENER_NAMES"),
                ("listener_protocols", "LISTENER_PROTOCOLS"),
                ("listener_start", "LISTENER_START"),
                ("naming_methods", "NAMING_METHODS"),
                ("nsn_names", "NSN_NAMES"),
                ("nsn_service", "NSN_SERVICE"),
                ("nsn_protocols", "NSN_PROTOCOLS"),
            ],
        }
    }

    /// Built-in parameter values.
    #[must_use]
    pub fn defaults(self) -> Params {
        let pairs: &[(&str, &str)] = match self {
            Self::DbInstall => &[
                ("install_option", "INSTALL_DB_SWONLY"),
                ("inventory_location", "/u01/app/oraInventory"),
                ("oracle_group", "oinstall"),
                ("oracle_home", "/u01/app/oracle/product/19.3.0/dbhome_1"),
                ("oracle_base", "/u01/app/oracle"),
                ("edition", "EE"),
                ("dba_group", "dba"),
                ("oper_group", "oper"),
                ("backupdba_group", "backupdba"),
                ("dgdba_group", "dgdba"),
                ("kmdba_group", "kmdba"),
                ("racdba_group", "racdba"),
            ],
            Self::Dbca => &[
                ("db_name", "ORCL"),
                ("sid", "ORCL"),
                ("db_type", "MULTIPURPOSE"),
                ("template", "General_Purpose.dbc"),
                ("storage_type", "FS"),
                ("data_file_dest", "/u01/app/oracle/oradata"),
                ("fra_dest", "/u01/app/oracle/fast_recovery_area"),
                ("fra_size", "10240"),
                ("total_memory", "2048"),
                ("memory_percentage", "40"),
                ("charset", "AL32UTF8"),
                ("ncharset", "AL16UTF16"),
                ("listener", "LISTENER"),
                (
                    "variables",
                    "ORACLE_BASE_HOME={ORACLE_BASE}/homes/OraDB19Home1,\
                     DB_UNIQUE_NAME={DB_UNIQUE_NAME},ORACLE_HOME={ORACLE_HOME},PDB_NAME=,\
                     DB_NAME={DB_NAME},ORACLE_BASE={ORACLE_BASE},SID={SID}",
                ),
                (
                    "init_params",
                    "undo_tablespace=UNDOTBS1,sga_target=1536MB,db_block_size=8192BYTES,\
                     pga_aggregate_target=512MB,nls_language=AMERICAN,\
                     dispatchers=(PROTOCOL=TCP) (SERVICE={SID}XDB),diagnostic_dest={ORACLE_BASE},\
                     control_files=(\"{ORACLE_BASE}/oradata/{DB_UNIQUE_NAME}/control01.ctl\",\
                     \"{ORACLE_BASE}/oradata/{DB_UNIQUE_NAME}/control02.ctl\"),\
                     audit_file_dest={ORACLE_BASE}/admin/{DB_UNIQUE_NAME}/adump,processes=320,\
                     audit_trail=db,db_name={DB_NAME},open_cursors=300,compatible=19.0.0,\
                     db_recovery_file_dest_size=10240MB,\
                     db_recovery_file_dest={ORACLE_BASE}/fast_recovery_area/{DB_UNIQUE_NAME},\
                     remote_login_passwordfile=EXCLUSIVE",
                ),
                ("sample_schema", "false"),
                ("is_cdb", "true"),
                ("pdb_count", "1"),
                ("pdb_name", "ORCLPDB"),
                ("pdb_admin_pwd", "Oracle123"),
                ("sys_password", "Oracle123"),
                ("system_password", "Oracle123"),
                ("auto_memory_mgmt", "true"),
            ],
            Self::Netca => &[
                ("responsefile_version", "19.0"),
                ("create_type", "LISTENER"),
                ("install_type", "typical"),
                ("listener_number", "1"),
                ("listener_names", "{\"LISTENER\"}"),
                ("listener_protocols", "{\"TCP;1521\"}"),
                ("listener_start", "LISTENER"),
                ("naming_methods", "{\"TNSNAMES\",\"ONAMES\",\"HOSTNAME\"}"),
                ("nsn_names", "{\"EXTPROC_CONNECTION_DATA\"}"),
                ("nsn_service", "{\"PLSExtProc\"}"),
                ("nsn_protocols", "{\"TCP;HOSTNAME;1521\"}"),
            ],
        };

        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    /// Configuration group whose values override the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the group cannot be serialised
    pub fn config_params(self, config: &Config) -> Result<Params> {
        let value = match self {
            Self::DbInstall => serde_yaml::to_value(&config.oracle)?,
            Self::Dbca => serde_yaml::to_value(&config.database)?,
            Self::Netca => serde_yaml::to_value(&config.network)?,
        };
        Ok(scalars(&value))
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DbInstall => "db-install",
            Self::Dbca => "dbca",
            Self::Netca => "netca",
        })
    }
}

impl FromStr for Template {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "db-install" => Ok(Self::DbInstall),
            "dbca" => Ok(Self::Dbca),
            "netca" => Ok(Self::Netca),
            _ => Err(Error::invalid(
                "template",
                s,
                "expected db-install, dbca or netca",
            )),
        }
    }
}

/// Flatten the scalar entries of a YAML mapping into strings.
fn scalars(value: &serde_yaml::Value) -> Params {
    let Some(mapping) = value.as_mapping() else {
        return Params::new();
    };

    mapping
        .iter()
        .filter_map(|(key, value)| {
            let key = key.as_str()?;
            let value = match value {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((key.to_string(), value))
        })
        .collect()
}

/// Render `template` from its defaults overlaid with `overrides`.
///
/// # Errors
///
/// Returns a template error if rendering fails
pub fn render(template: Template, overrides: &Params) -> Result<String> {
    let mut params = template.defaults();
    params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    Ok(env.render_str(template.source(), &params)?)
}

/// Render `template` with the matching configuration group applied.
///
/// # Errors
///
/// Returns a template error if rendering fails
pub fn render_for(template: Template, config: &Config) -> Result<String> {
    render(template, &template.config_params(config)?)
}

/// Render `template` into `path`.
///
/// # Errors
///
/// Returns an error if rendering or writing fails
pub fn write(template: Template, config: &Config, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_for(template, config)?)?;
    tracing::info!(template = %template, path = %path.display(), "response file written");
    Ok(path.to_path_buf())
}

/// Write `db_install.rsp`, `dbca.rsp` and `netca.rsp` into `out_dir`.
///
/// # Errors
///
/// Returns an error if any file cannot be rendered or written
pub fn generate_all(config: &Config, out_dir: &Path) -> Result<Vec<PathBuf>> {
    Template::ALL
        .iter()
        .map(|template| write(*template, config, &out_dir.join(template.file_name())))
        .collect()
}

/// Read `key=value` pairs back out of a response file.
///
/// Comments and `[section]` headers are skipped and one pair of surrounding
/// double quotes is removed from values. Those quotes belong to the file
/// format (`netca.rsp` quotes several fields), so a parameter value that is
/// itself wrapped in quotes does not survive a render and parse.
#[must_use]
pub fn parse_response_file(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('['))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}
