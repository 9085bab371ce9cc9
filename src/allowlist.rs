//! Gate for the browser terminal: only known Oracle tools and a handful of
//! read-only system commands get through.

use std::fmt;

pub const ALLOWED_PREFIXES: &[&str] = &[
    "oradba ",
    "sqlplus ",
    "lsnrctl ",
    "rman ",
    "asmcmd ",
    "srvctl ",
    "crsctl ",
    "dbca ",
    "emctl ",
    "expdp ",
    "impdp ",
    "adrci ",
    "opatch ",
    "datapatch ",
];

/// Whole commands allowed verbatim, pipes and `$` included.
pub const ALLOWED_EXACT: &[&str] = &[
    "id oracle",
    "hostname",
    "uname -a",
    "df -h",
    "free -h",
    "uptime",
    "nproc",
    "cat /etc/os-release",
    "cat /etc/oratab",
    "ps aux | grep ora_",
    "ps aux | grep tnslsnr",
    "echo $ORACLE_HOME",
    "echo $ORACLE_SID",
    "echo $ORACLE_BASE",
    "ls $ORACLE_HOME",
    "ls /u01/app/oracle/oradata",
];

pub const DANGEROUS: &[&str] = &[";", "&&", "||", "$(", "`", ">", "<", "\n", "\r"];

pub const SAFE_STARTS: &[&str] = &[
    "cat /etc/",
    "ls /u01/",
    "ls /home/oracle",
    "tail ",
    "head ",
    "grep ",
];

/// Accepted command and how it is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Re-run this program with the remaining words as arguments.
    CliPassthrough,
    /// Hand to `bash -c` as the Oracle user.
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    Metacharacters,
    NotAllowed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "No command provided",
            Self::Metacharacters => {
                "Shell metacharacters (;, &&, ||, |, $(), `, >, <) are not allowed in commands."
            }
            Self::NotAllowed => {
                "Command not allowed. Allowed: oradba, sqlplus, lsnrctl, rman, asmcmd, srvctl, \
                 crsctl, dbca, expdp, impdp, opatch, and basic system commands."
            }
        })
    }
}

impl std::error::Error for Rejection {}

/// Decide whether `command` may run.
///
/// Only the empty string counts as no command; blank input falls through to
/// `NotAllowed`. Exact matches are compared after trimming and may contain a
/// pipe; every other command is refused if it contains `|` or any of
/// [`DANGEROUS`], and must then start with an allowed prefix or a safe
/// read-only command.
///
/// # Errors
///
/// Returns the [`Rejection`] explaining why the command was refused
pub fn check(command: &str) -> Result<Verdict, Rejection> {
    if command.is_empty() {
        return Err(Rejection::Empty);
    }

    let is_exact = ALLOWED_EXACT.contains(&command.trim());

    if !is_exact && (command.contains('|') || DANGEROUS.iter().any(|d| command.contains(d))) {
        return Err(Rejection::Metacharacters);
    }

    let allowed = ALLOWED_PREFIXES.iter().any(|p| command.starts_with(p))
        || is_exact
        || SAFE_STARTS.iter().any(|s| command.starts_with(s));

    if !allowed {
        return Err(Rejection::NotAllowed);
    }

    if command.starts_with("oradba ") {
        Ok(Verdict::CliPassthrough)
    } else {
        Ok(Verdict::Shell)
    }
}

/// Shell line run for an accepted [`Verdict::Shell`] command.
#[must_use]
pub fn shell_line(command: &str) -> String {
    format!("source ~/.bash_profile 2>/dev/null; export CV_ASSUME_DISTID=OEL7.8; {command}")
}
