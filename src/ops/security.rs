//! Accounts, profiles, auditing and transparent data encryption.

use super::{Context, Outcome};
use crate::{
    error::Result,
    runner::SuccessCheck,
    sqlplus::SqlTable,
    validation,
};

/// Accounts Oracle maintains itself; never listed.
pub const SYSTEM_ACCOUNTS: [&str; 5] = ["SYS", "SYSTEM", "DBSNMP", "SYSMAN", "OUTLN"];

pub const DEFAULT_TABLESPACE: &str = "USERS";
pub const DEFAULT_PROFILE: &str = "DEFAULT";

#[must_use]
pub fn audit_sql(enable: bool) -> &'static str {
    if enable {
        "ALTER SYSTEM SET AUDIT_TRAIL=DB,EXTENDED SCOPE=SPFILE;
AUDIT CREATE SESSION;
AUDIT ALTER SYSTEM;
AUDIT CREATE USER;
AUDIT DROP USER;
AUDIT ALTER USER;
AUDIT GRANT ANY PRIVILEGE;
AUDIT SYSTEM GRANT;"
    } else {
        "ALTER SYSTEM SET AUDIT_TRAIL=NONE SCOPE=SPFILE;
NOAUDIT ALL;"
    }
}

/// The trail parameter only takes effect after a restart.
///
/// # Errors
///
/// Returns `ToolFailed` on SQL errors
pub fn audit(ctx: &Context, enable: bool) -> Result<Outcome> {
    let captured = ctx.sql().exit_on_error().execute(audit_sql(enable))?;
    let summary = if enable {
        "Auditing enabled (restart required for AUDIT_TRAIL)"
    } else {
        "Auditing disabled (restart required for AUDIT_TRAIL)"
    };
    Ok(Outcome::new(summary).with_output(captured.output))
}

/// Last seven days, newest first.
///
/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn audit_trail(ctx: &Context) -> Result<SqlTable> {
    ctx.sql().table(
        "SELECT * FROM (SELECT username, action_name, obj_name, \
         TO_CHAR(timestamp, 'YYYY-MM-DD HH24:MI:SS') AS event_time, returncode \
         FROM dba_audit_trail WHERE timestamp > SYSDATE - 7 \
         ORDER BY timestamp DESC) WHERE ROWNUM <= 50;",
    )
}

/// Keystore under `<oracle_base>/admin/wallet`, opened, with a master key.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad password and `ToolFailed` if the wallet
/// directory or any statement fails
pub fn enable_tde(ctx: &Context, keystore_password: &str) -> Result<Outcome> {
    let password = validation::password(keystore_password)?;
    let wallet = format!("{}/admin/wallet", ctx.config.oracle.oracle_base);

    let mkdir = ctx.as_oracle("mkdir").args(["-p", wallet.as_str()]);
    let captured = ctx.exec.capture(&mkdir)?;
    SuccessCheck::ExitCode.require(captured, "mkdir", None)?;

    let sql = format!(
        "ADMINISTER KEY MANAGEMENT CREATE KEYSTORE '{wallet}' IDENTIFIED BY \"{password}\";
ADMINISTER KEY MANAGEMENT SET KEYSTORE OPEN IDENTIFIED BY \"{password}\" CONTAINER=ALL;
ADMINISTER KEY MANAGEMENT SET KEY IDENTIFIED BY \"{password}\" WITH BACKUP CONTAINER=ALL;"
    );
    ctx.sql().exit_on_error().execute(&sql)?;
    Ok(Outcome::new(format!("TDE keystore created in {wallet}")))
}

#[must_use]
pub fn create_user_sql(name: &str, password: &str, tablespace: &str, profile: &str) -> String {
    format!(
        "CREATE USER {name} IDENTIFIED BY \"{password}\"
  DEFAULT TABLESPACE {tablespace}
  TEMPORARY TABLESPACE TEMP
  QUOTA UNLIMITED ON {tablespace}
  PROFILE {profile};
GRANT CONNECT, RESOURCE TO {name};"
    )
}

/// # Errors
///
/// Returns `InvalidInput` for any malformed argument and `ToolFailed` on SQL
/// errors
pub fn create_user(
    ctx: &Context,
    name: &str,
    password: &str,
    tablespace: &str,
    profile: &str,
) -> Result<Outcome> {
    let name = validation::identifier("user", name)?;
    let password = validation::password(password)?;
    let tablespace = validation::identifier("tablespace", tablespace)?;
    let profile = validation::identifier("profile", profile)?;
    ctx.sql()
        .exit_on_error()
        .execute(&create_user_sql(name, password, tablespace, profile))?;
    tracing::info!(user = name, "user created");
    Ok(Outcome::new(format!("User {name} created")))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name and `ToolFailed` on SQL errors
pub fn drop_user(ctx: &Context, name: &str) -> Result<Outcome> {
    let name = validation::identifier("user", name)?;
    ctx.sql()
        .exit_on_error()
        .execute(&format!("DROP USER {name} CASCADE;"))?;
    Ok(Outcome::new(format!("User {name} dropped")))
}

/// Non-system accounts, at most fifty.
///
/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn list_users(ctx: &Context) -> Result<SqlTable> {
    let excluded = SYSTEM_ACCOUNTS
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ");
    ctx.sql().table(&format!(
        "SELECT username, account_status, default_tablespace, profile, \
         TO_CHAR(created, 'YYYY-MM-DD') AS created FROM dba_users \
         WHERE username NOT IN ({excluded}) AND ROWNUM <= 50 ORDER BY username;"
    ))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name and `ToolFailed` on SQL errors
pub fn lock_user(ctx: &Context, name: &str) -> Result<Outcome> {
    let name = validation::identifier("user", name)?;
    ctx.sql()
        .exit_on_error()
        .execute(&format!("ALTER USER {name} ACCOUNT LOCK;"))?;
    Ok(Outcome::new(format!("User {name} locked")))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name and `ToolFailed` on SQL errors
pub fn unlock_user(ctx: &Context, name: &str) -> Result<Outcome> {
    let name = validation::identifier("user", name)?;
    ctx.sql()
        .exit_on_error()
        .execute(&format!("ALTER USER {name} ACCOUNT UNLOCK;"))?;
    Ok(Outcome::new(format!("User {name} unlocked")))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad privilege or user and `ToolFailed` on
/// SQL errors
pub fn grant(ctx: &Context, privilege: &str, user: &str) -> Result<Outcome> {
    let privilege = validation::privilege(privilege)?;
    let user = validation::identifier("user", user)?;
    ctx.sql()
        .exit_on_error()
        .execute(&format!("GRANT {privilege} TO {user};"))?;
    Ok(Outcome::new(format!("Granted {privilege} to {user}")))
}

#[must_use]
pub fn create_profile_sql(name: &str) -> String {
    format!(
        "CREATE PROFILE {name} LIMIT
  SESSIONS_PER_USER 5
  FAILED_LOGIN_ATTEMPTS 3
  PASSWORD_LOCK_TIME 1/24
  PASSWORD_LIFE_TIME 90
  PASSWORD_GRACE_TIME 7
  PASSWORD_REUSE_TIME 365
  PASSWORD_REUSE_MAX 12;"
    )
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name and `ToolFailed` on SQL errors
pub fn create_profile(ctx: &Context, name: &str) -> Result<Outcome> {
    let name = validation::identifier("profile", name)?;
    ctx.sql().exit_on_error().execute(&create_profile_sql(name))?;
    Ok(Outcome::new(format!("Profile {name} created")))
}
