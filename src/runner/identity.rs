use super::Invocation;

/// True when the process runs with an effective uid of 0.
#[must_use]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Quote one word for a POSIX shell.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Argument vector actually executed for `invocation`.
///
/// When running as root and the invocation targets another account, the
/// command is re-entered through `su - <user> -c`. The login shell drops the
/// caller's environment, so overrides and the working directory travel inside
/// the script. Returns the argv and whether it was wrapped.
#[must_use]
pub fn effective_argv(invocation: &Invocation, running_as_root: bool) -> (Vec<String>, bool) {
    match invocation.user.as_deref() {
        Some(user) if running_as_root && user != "root" => {
            let mut script = String::new();
            for (key, value) in &invocation.env {
                script.push_str(&format!("export {key}={}; ", shell_quote(value)));
            }
            if let Some(cwd) = &invocation.cwd {
                script.push_str(&format!("cd {} && ", shell_quote(&cwd.to_string_lossy())));
            }
            script.push_str("exec ");
            script.push_str(
                &invocation
                    .argv()
                    .iter()
                    .map(|word| shell_quote(word))
                    .collect::<Vec<_>>()
                    .join(" "),
            );

            (
                vec![
                    "su".to_string(),
                    "-".to_string(),
                    user.to_string(),
                    "-c".to_string(),
                    script,
                ],
                true,
            )
        }
        _ => (invocation.argv(), false),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("a; rm -rf /"), "'a; rm -rf /'");
    }

    #[test]
    fn test_no_wrap_without_root() {
        let inv = Invocation::new("lsnrctl").arg("status").as_user("oracle");
        let (argv, wrapped) = effective_argv(&inv, false);
        assert!(!wrapped);
        assert_eq!(argv, ["lsnrctl", "status"]);
    }

    #[test]
    fn test_no_wrap_for_root_target() {
        let inv = Invocation::new("exportfs").arg("-ra").as_user("root");
        let (argv, wrapped) = effective_argv(&inv, true);
        assert!(!wrapped);
        assert_eq!(argv, ["exportfs", "-ra"]);
    }

    #[test]
    fn test_wrap_for_oracle() {
        let inv = Invocation::new("./runInstaller")
            .args(["-silent", "-responseFile", "/tmp/db install.rsp"])
            .env("CV_ASSUME_DISTID", "OEL7.8")
            .current_dir("/u01/app/oracle/product/19.3.0/dbhome_1")
            .as_user("oracle");
        let (argv, wrapped) = effective_argv(&inv, true);
        assert!(wrapped);
        assert_eq!(argv.len(), 5);
        assert_eq!(argv.get(..4).unwrap(), ["su", "-", "oracle", "-c"]);
        assert_eq!(
            argv.get(4).unwrap(),
            "export CV_ASSUME_DISTID='OEL7.8'; \
             cd '/u01/app/oracle/product/19.3.0/dbhome_1' && \
             exec './runInstaller' '-silent' '-responseFile' '/tmp/db install.rsp'"
        );
    }
}
