//! Web panel accounts stored in `gui_users.json`.
//!
//! Passwords are PBKDF2-HMAC-SHA256 with a per-user random salt. Records
//! written before salting existed hold a bare SHA-256 digest; they still log
//! in but must change their password.

use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use ring::pbkdf2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    fmt::{self, Write as _},
    fs,
    io::Write as _,
    num::NonZeroU32,
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Owner read/write only: the file holds password hashes.
const USERS_FILE_MODE: u32 = 0o600;

pub const USERS_FILE: &str = "gui_users.json";
pub const DEFAULT_ADMIN: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const MIN_PASSWORD_LEN: usize = 8;

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 32;
const HASH_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub role: Role,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default)]
    pub must_change_password: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<String>,
}

impl UserRecord {
    fn new(username: &str, role: Role, password: &str) -> Self {
        let salt = new_salt();
        Self {
            username: username.to_string(),
            role,
            password_hash: hash_password(password, &salt),
            salt: Some(salt),
            must_change_password: true,
            created_at: now(),
            password_changed_at: None,
        }
    }

    fn verify(&self, password: &str) -> bool {
        match &self.salt {
            Some(salt) => verify_password(password, &self.password_hash, salt),
            None => legacy_hash(password) == self.password_hash,
        }
    }
}

/// Why a password change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    MissingFields,
    Mismatch,
    TooShort,
    IncorrectCurrent,
}

impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingFields => "Please fill in all password fields",
            Self::Mismatch => "Passwords do not match",
            Self::TooShort => "Password must be at least 8 characters long",
            Self::IncorrectCurrent => "Current password incorrect",
        })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn iterations() -> NonZeroU32 {
    NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN)
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    text.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        })
        .collect()
}

/// 32 random bytes, hex-encoded.
#[must_use]
pub fn new_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    rand::rng().fill(&mut bytes);
    to_hex(&bytes)
}

/// PBKDF2 digest of `password`; the hex salt text is the salt input.
#[must_use]
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations(),
        salt.as_bytes(),
        password.as_bytes(),
        &mut out,
    );
    to_hex(&out)
}

#[must_use]
pub fn verify_password(password: &str, hash: &str, salt: &str) -> bool {
    let Some(expected) = from_hex(hash) else {
        return false;
    };
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations(),
        salt.as_bytes(),
        password.as_bytes(),
        &expected,
    )
    .is_ok()
}

/// Unsalted SHA-256, only accepted for old records.
#[must_use]
pub fn legacy_hash(password: &str) -> String {
    to_hex(&Sha256::digest(password.as_bytes()))
}

/// Check the change-password form against the rules, in order.
///
/// # Errors
///
/// Returns the first rule that fails
pub fn check_new_password(
    current: &str,
    new: &str,
    confirm: &str,
) -> std::result::Result<(), PasswordRule> {
    if current.is_empty() || new.is_empty() || confirm.is_empty() {
        return Err(PasswordRule::MissingFields);
    }
    if new != confirm {
        return Err(PasswordRule::Mismatch);
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordRule::TooShort);
    }
    Ok(())
}

type Users = BTreeMap<String, UserRecord>;

/// Accounts file, re-read on every access and rewritten atomically.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CredentialStore {
    /// Open the store in `state_dir`, seeding the default admin account.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created or read
    pub fn open(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir)?;
        let store = Self {
            path: state_dir.join(USERS_FILE),
            lock: Mutex::new(()),
        };
        if !store.path.exists() {
            let mut users = Users::new();
            users.insert(
                DEFAULT_ADMIN.to_string(),
                UserRecord::new(DEFAULT_ADMIN, Role::Admin, DEFAULT_ADMIN_PASSWORD),
            );
            store.save(&users)?;
            tracing::warn!(
                path = %store.path.display(),
                "created default admin account, password change required"
            );
        }
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Users> {
        Ok(serde_json::from_str(&fs::read_to_string(&self.path)?)?)
    }

    fn save(&self, users: &Users) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(USERS_FILE_MODE)
            .open(&tmp)?;
        // `mode` only applies on creation; a leftover temp file keeps its bits.
        file.set_permissions(fs::Permissions::from_mode(USERS_FILE_MODE))?;
        file.write_all(serde_json::to_string_pretty(users)?.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read
    pub fn get(&self, username: &str) -> Result<Option<UserRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(username))
    }

    /// The account if `password` matches. Legacy records come back with
    /// `must_change_password` set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let Some(mut user) = self.get(username)? else {
            return Ok(None);
        };
        if !user.verify(password) {
            return Ok(None);
        }
        if user.salt.is_none() {
            user.must_change_password = true;
        }
        Ok(Some(user))
    }

    /// Replace the password after checking the rules and the current one.
    ///
    /// # Errors
    ///
    /// The outer error is a storage failure; the inner one names the rule
    /// that refused the change
    pub fn change_password(
        &self,
        username: &str,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<std::result::Result<(), PasswordRule>> {
        if let Err(rule) = check_new_password(current, new, confirm) {
            return Ok(Err(rule));
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut users = self.load()?;
        let Some(user) = users.get_mut(username) else {
            return Ok(Err(PasswordRule::IncorrectCurrent));
        };
        if !user.verify(current) {
            return Ok(Err(PasswordRule::IncorrectCurrent));
        }

        let salt = new_salt();
        user.password_hash = hash_password(new, &salt);
        user.salt = Some(salt);
        user.must_change_password = false;
        user.password_changed_at = Some(now());
        self.save(&users)?;
        tracing::info!(user = username, "password changed");
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_hash_roundtrip_and_salt_shape() {
        let salt = new_salt();
        assert_eq!(salt.len(), 64);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        let hash = hash_password("Secret123", &salt);
        assert_eq!(hash.len(), 64);
        assert!(verify_password("Secret123", &hash, &salt));
        assert!(!verify_password("secret123", &hash, &salt));
        assert!(!verify_password("Secret123", "not-hex", &salt));
    }

    #[test]
    fn test_legacy_hash_is_sha256_hex() {
        assert_eq!(
            legacy_hash("admin123"),
            "240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9"
        );
    }

    #[test]
    fn test_default_admin_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path()).unwrap();
        assert!(store.path().ends_with(USERS_FILE));

        let admin = store.authenticate("admin", "admin123").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.must_change_password);
        assert!(store.authenticate("admin", "wrong").unwrap().is_none());
        assert!(store.authenticate("nobody", "admin123").unwrap().is_none());

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(!text.contains("admin123"));
    }

    #[test]
    fn test_users_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(USERS_FILE).with_extension("json.tmp");
        fs::write(&stale, "{}").unwrap();
        fs::set_permissions(&stale, fs::Permissions::from_mode(0o644)).unwrap();

        let store = CredentialStore::open(dir.path()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, USERS_FILE_MODE);

        store
            .change_password("admin", "admin123", "NewSecret1", "NewSecret1")
            .unwrap()
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, USERS_FILE_MODE);
    }

    #[test]
    fn test_reopen_keeps_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path()).unwrap();
        store
            .change_password("admin", "admin123", "NewSecret1", "NewSecret1")
            .unwrap()
            .unwrap();
        let reopened = CredentialStore::open(dir.path()).unwrap();
        assert!(reopened.authenticate("admin", "NewSecret1").unwrap().is_some());
    }

    #[test]
    fn test_change_password_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path()).unwrap();
        let change = |current: &str, new: &str, confirm: &str| {
            store
                .change_password("admin", current, new, confirm)
                .unwrap()
                .err()
                .map(|rule| rule.to_string())
        };

        assert_eq!(
            change("admin123", "", "").as_deref(),
            Some("Please fill in all password fields")
        );
        assert_eq!(
            change("admin123", "LongEnough1", "LongEnough2").as_deref(),
            Some("Passwords do not match")
        );
        assert_eq!(
            change("admin123", "short", "short").as_deref(),
            Some("Password must be at least 8 characters long")
        );
        assert_eq!(
            change("wrong", "LongEnough1", "LongEnough1").as_deref(),
            Some("Current password incorrect")
        );
        assert_eq!(change("admin123", "LongEnough1", "LongEnough1"), None);

        let admin = store.get("admin").unwrap().unwrap();
        assert!(!admin.must_change_password);
        assert!(admin.password_changed_at.is_some());
        assert!(store.authenticate("admin", "admin123").unwrap().is_none());
    }

    #[test]
    fn test_legacy_record_forces_change() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = format!(
            r#"{{"ops": {{"username": "ops", "role": "user", "password_hash": "{}", "must_change_password": false}}}}"#,
            legacy_hash("opspass1")
        );
        fs::write(dir.path().join(USERS_FILE), legacy).unwrap();

        let store = CredentialStore::open(dir.path()).unwrap();
        let ops = store.authenticate("ops", "opspass1").unwrap().unwrap();
        assert_eq!(ops.role, Role::User);
        assert!(ops.must_change_password);

        store
            .change_password("ops", "opspass1", "Upgraded99", "Upgraded99")
            .unwrap()
            .unwrap();
        let upgraded = store.get("ops").unwrap().unwrap();
        assert!(upgraded.salt.is_some());
        assert!(store.authenticate("ops", "Upgraded99").unwrap().is_some());
    }
}
