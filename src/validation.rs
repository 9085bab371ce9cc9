//! Format checks applied to caller input before it is interpolated into
//! SQL, RMAN or shell text.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

type Pattern = LazyLock<Result<Regex, regex::Error>>;

/// A pattern that failed to compile matches nothing.
fn matches(pattern: &Pattern, value: &str) -> bool {
    pattern.as_ref().is_ok_and(|re| re.is_match(value))
}

static IDENTIFIER: Pattern = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{0,29}$"));
static PDB_NAME: Pattern = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]{0,29}$"));
static SIZE: Pattern = LazyLock::new(|| Regex::new(r"^[0-9]{1,7}[KMG]?$"));
static RMAN_TAG: Pattern = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,30}$"));
static HOSTNAME: Pattern = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,62})(\.[A-Za-z0-9]([A-Za-z0-9-]{0,62}))*$")
});
static ABSOLUTE_PATH: Pattern = LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9._/+-]*$"));
static DISK_PATH: Pattern = LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9._/+*-]*$"));
static PRIVILEGE: Pattern = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z_]*( [A-Z_]+)*(, ?[A-Z][A-Z_]*( [A-Z_]+)*)*$"));
static NFS_CLIENT: Pattern = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.*/:-]+$"));

const IDENTIFIER_RULE: &str = "must match ^[A-Z][A-Z0-9_]{0,29}$";

/// Upper-case Oracle identifier: SID, user, tablespace, diskgroup, profile.
///
/// # Errors
///
/// Returns `InvalidInput` unless `value` matches `^[A-Z][A-Z0-9_]{0,29}$`
pub fn identifier<'a>(kind: &'static str, value: &'a str) -> Result<&'a str> {
    if matches(&IDENTIFIER, value) {
        Ok(value)
    } else {
        Err(Error::invalid(kind, value, IDENTIFIER_RULE))
    }
}

/// Pluggable database name; `$` and `#` are allowed after the first letter.
///
/// # Errors
///
/// Returns `InvalidInput` unless `value` matches `^[A-Za-z][A-Za-z0-9_$#]{0,29}$`
pub fn pdb_name(value: &str) -> Result<&str> {
    if matches(&PDB_NAME, value) {
        Ok(value)
    } else {
        Err(Error::invalid(
            "PDB name",
            value,
            "must match ^[A-Za-z][A-Za-z0-9_$#]{0,29}$",
        ))
    }
}

/// Password placed inside a double-quoted `IDENTIFIED BY` clause.
///
/// # Errors
///
/// Returns `InvalidInput` for empty, over-long, or quote/whitespace-bearing values
pub fn password(value: &str) -> Result<&str> {
    let length = value.chars().count();
    if (1..=30).contains(&length)
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '"' || c == '\'')
    {
        Ok(value)
    } else {
        Err(Error::invalid(
            "password",
            "********",
            "1-30 characters without quotes or whitespace",
        ))
    }
}

/// Storage size such as `500M` or `10G`.
///
/// # Errors
///
/// Returns `InvalidInput` unless `value` matches `^[0-9]+[KMG]?$`
pub fn size(value: &str) -> Result<&str> {
    if matches(&SIZE, value) {
        Ok(value)
    } else {
        Err(Error::invalid("size", value, "digits with optional K, M or G"))
    }
}

/// # Errors
///
/// Returns `InvalidInput` for anything but 1-30 letters, digits or `_`
pub fn rman_tag(value: &str) -> Result<&str> {
    if matches(&RMAN_TAG, value) {
        Ok(value)
    } else {
        Err(Error::invalid("RMAN tag", value, "1-30 letters, digits or _"))
    }
}

/// # Errors
///
/// Returns `InvalidInput` unless `value` is a DNS host name or IPv4 address
pub fn hostname(value: &str) -> Result<&str> {
    if value.len() <= 253 && matches(&HOSTNAME, value) {
        Ok(value)
    } else {
        Err(Error::invalid("host name", value, "must be a DNS name"))
    }
}

/// # Errors
///
/// Returns `InvalidInput` unless `value` is absolute and free of shell syntax
pub fn absolute_path(value: &str) -> Result<&str> {
    if matches(&ABSOLUTE_PATH, value) && !value.contains("..") {
        Ok(value)
    } else {
        Err(Error::invalid(
            "path",
            value,
            "absolute, using letters, digits and ._/+-",
        ))
    }
}

/// ASM disk path or discovery string; `*` is allowed.
///
/// # Errors
///
/// Returns `InvalidInput` for relative paths or shell syntax
pub fn disk_path(value: &str) -> Result<&str> {
    if matches(&DISK_PATH, value) && !value.contains("..") {
        Ok(value)
    } else {
        Err(Error::invalid("disk path", value, "absolute, using letters, digits and ._/+-*"))
    }
}

/// System privilege or role list, e.g. `CREATE SESSION, CREATE TABLE`.
///
/// # Errors
///
/// Returns `InvalidInput` for anything but upper-case words separated by spaces and commas
pub fn privilege(value: &str) -> Result<&str> {
    if matches(&PRIVILEGE, value) {
        Ok(value)
    } else {
        Err(Error::invalid(
            "privilege",
            value,
            "upper-case words separated by spaces and commas",
        ))
    }
}

/// `TABLE` or `SCHEMA.TABLE`, each part an identifier.
///
/// # Errors
///
/// Returns `InvalidInput` if any part is not an identifier
pub fn table_name(value: &str) -> Result<&str> {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|part| matches(&IDENTIFIER, part)) {
        Ok(value)
    } else {
        Err(Error::invalid("table", value, "[SCHEMA.]TABLE in upper case"))
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS`.
///
/// # Errors
///
/// Returns `InvalidInput` when the text is not a valid timestamp
pub fn timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S")
        .map_err(|_| Error::invalid("timestamp", value, "expected YYYY-MM-DD HH:MM:SS"))
}

/// Lab number between 01 and 15; `7` is accepted as `07`.
///
/// # Errors
///
/// Returns `InvalidInput` outside that range
pub fn lab_number(value: &str) -> Result<u8> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|n| (1..=15).contains(n))
        .ok_or_else(|| Error::invalid("lab", value, "must be between 01 and 15"))
}

/// NFS client: host, network, or `*`.
///
/// # Errors
///
/// Returns `InvalidInput` for characters outside `[A-Za-z0-9.*/:-]`
pub fn nfs_client(value: &str) -> Result<&str> {
    if matches(&NFS_CLIENT, value) {
        Ok(value)
    } else {
        Err(Error::invalid("NFS client", value, "host, network or *"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identifier() {
        for ok in ["GDCPROD", "A", "USERS_01", "TESTDB"] {
            assert!(identifier("SID", ok).is_ok(), "{ok}");
        }
        for bad in ["", "gdcprod", "1DB", "_X", "DB;DROP", "DB NAME", "A234567890123456789012345678901"] {
            assert!(identifier("SID", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_pdb_name() {
        assert!(pdb_name("GDCPDB").is_ok());
        assert!(pdb_name("pdb$seed#2").is_ok());
        assert!(pdb_name("2PDB").is_err());
        assert!(pdb_name("PDB'; DROP").is_err());
    }

    #[test]
    fn test_password() {
        assert!(password("Oracle123").is_ok());
        assert!(password("").is_err());
        assert!(password("has space").is_err());
        assert!(password("quo\"te").is_err());
        assert!(password(&"x".repeat(31)).is_err());
    }

    #[test]
    fn test_misc_formats() {
        assert!(size("500M").is_ok());
        assert!(size("10G").is_ok());
        assert!(size("1T").is_err());
        assert!(rman_tag("full_20240101_120000").is_ok());
        assert!(rman_tag("bad tag").is_err());
        assert!(hostname("db01.example.com").is_ok());
        assert!(hostname("192.168.56.10").is_ok());
        assert!(hostname("host;reboot").is_err());
        assert!(absolute_path("/u01/nfs_share").is_ok());
        assert!(absolute_path("relative/path").is_err());
        assert!(absolute_path("/u01/../etc").is_err());
        assert!(disk_path("/dev/oracleasm/disks/*").is_ok());
        assert!(privilege("CREATE SESSION, CREATE TABLE").is_ok());
        assert!(privilege("DBA").is_ok());
        assert!(privilege("DBA TO PUBLIC;").is_err());
        assert!(table_name("HR.EMPLOYEES").is_ok());
        assert!(table_name("A.B.C").is_err());
        assert!(nfs_client("192.168.56.0/24").is_ok());
        assert!(nfs_client("*(rw)").is_err());
    }

    #[test]
    fn test_timestamp() {
        let ts = timestamp("2024-03-01 10:30:00").unwrap();
        assert_eq!(ts.to_string(), "2024-03-01 10:30:00");
        assert!(timestamp("2024-03-01").is_err());
        assert!(timestamp("yesterday").is_err());
    }

    #[test]
    fn test_lab_number() {
        assert_eq!(lab_number("07").unwrap(), 7);
        assert_eq!(lab_number("15").unwrap(), 15);
        assert!(lab_number("00").is_err());
        assert!(lab_number("16").is_err());
        assert!(lab_number("x").is_err());
    }

    proptest! {
        #[test]
        fn prop_identifier_accepts_exactly_the_pattern(name in "\\PC{0,40}") {
            let expected = !name.is_empty()
                && name.len() <= 30
                && name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
            prop_assert_eq!(identifier("name", &name).is_ok(), expected);
        }

        #[test]
        fn prop_valid_identifiers_accepted(name in "[A-Z][A-Z0-9_]{0,29}") {
            prop_assert!(identifier("name", &name).is_ok());
            prop_assert!(pdb_name(&name).is_ok());
        }

        #[test]
        fn prop_pdb_name_rejects_metacharacters(
            prefix in "[A-Za-z][A-Za-z0-9]{0,5}",
            bad in "[;'\" ()|&`<>\\-]",
        ) {
            let name = format!("{prefix}{bad}");
            prop_assert!(pdb_name(&name).is_err());
        }
    }
}
