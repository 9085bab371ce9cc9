//! Host pre-flight checks for an Oracle 19c installation.
//!
//! Facts are gathered once, then evaluated by pure functions so that every
//! verdict can be tested from canned command output.

use crate::{
    error::Result,
    runner::{Executor, Invocation},
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt, fs,
    net::ToSocketAddrs,
    os::unix::fs::PermissionsExt,
    path::Path,
};

pub const MIN_RAM_GB: f64 = 8.0;
pub const MIN_SWAP_GB: f64 = 8.0;
pub const MIN_ROOT_FREE_GB: f64 = 50.0;
pub const MIN_TMP_FREE_GB: f64 = 2.0;

pub const SUPPORTED_DISTROS: [&str; 4] = ["rocky", "centos", "rhel", "ol"];
pub const SUPPORTED_MAJORS: [&str; 2] = ["8", "9"];

pub const REQUIRED_PACKAGES: [&str; 25] = [
    "bc",
    "binutils",
    "compat-openssl10",
    "elfutils-libelf",
    "glibc",
    "glibc-devel",
    "ksh",
    "libaio",
    "libaio-devel",
    "libXrender",
    "libX11",
    "libXau",
    "libXi",
    "libXtst",
    "libgcc",
    "libnsl",
    "libstdc++",
    "libxcb",
    "make",
    "policycoreutils",
    "policycoreutils-python-utils",
    "smartmontools",
    "sysstat",
    "unixODBC",
    "unixODBC-devel",
];

/// Values with a space are tuples that must match exactly; the rest are
/// numeric minimums.
pub const KERNEL_PARAMS: [(&str, &str); 12] = [
    ("fs.file-max", "6815744"),
    ("kernel.sem", "250 32000 100 128"),
    ("kernel.shmmni", "4096"),
    ("kernel.shmall", "1073741824"),
    ("kernel.shmmax", "4398046511104"),
    ("kernel.panic_on_oops", "1"),
    ("net.core.rmem_default", "262144"),
    ("net.core.rmem_max", "4194304"),
    ("net.core.wmem_default", "262144"),
    ("net.core.wmem_max", "1048576"),
    ("fs.aio-max-nr", "1048576"),
    ("net.ipv4.ip_local_port_range", "9000 65500"),
];

const KB_PER_GB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
    pub pretty_name: String,
}

impl OsRelease {
    #[must_use]
    pub fn major(&self) -> &str {
        self.version_id.split('.').next().unwrap_or_default()
    }
}

/// `KEY=value` lines of `/etc/os-release`, quotes removed.
#[must_use]
pub fn parse_os_release(text: &str) -> OsRelease {
    let mut release = OsRelease::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        match key.trim() {
            "ID" => release.id = value.to_lowercase(),
            "VERSION_ID" => release.version_id = value,
            "PRETTY_NAME" => release.pretty_name = value,
            _ => {}
        }
    }
    release
}

/// `(MemTotal, SwapTotal)` in kB.
#[must_use]
pub fn parse_meminfo(text: &str) -> (u64, u64) {
    let field = |name: &str| {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse().ok())
            .unwrap_or(0)
    };
    (field("MemTotal"), field("SwapTotal"))
}

/// Available kB per mount point from `df -Pk`.
#[must_use]
pub fn parse_df(text: &str) -> BTreeMap<String, u64> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let available = fields.get(3)?.parse().ok()?;
            let mount = fields.get(5..)?.join(" ");
            (!mount.is_empty()).then_some((mount, available))
        })
        .collect()
}

/// `sysctl -n` output with runs of whitespace collapsed.
#[must_use]
pub fn parse_sysctl(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when `hostname` is a name on any non-comment line.
#[must_use]
pub fn hosts_contains(hosts: &str, hostname: &str) -> bool {
    hosts
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .any(|line| line.split_whitespace().skip(1).any(|name| name == hostname))
}

/// Whether `current` satisfies `required`.
#[must_use]
pub fn kernel_param_ok(required: &str, current: &str) -> bool {
    if required.contains(' ') {
        parse_sysctl(current) == required
    } else {
        match (current.trim().parse::<u64>(), required.parse::<u64>()) {
            (Ok(current), Ok(required)) => current >= required,
            _ => false,
        }
    }
}

/// Everything the checks look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostFacts {
    pub os: Option<OsRelease>,
    pub kernel_release: String,
    pub mem_total_kb: u64,
    pub swap_total_kb: u64,
    pub root_free_kb: Option<u64>,
    pub tmp_free_kb: Option<u64>,
    pub cpus: usize,
    pub packages: Vec<(String, bool)>,
    pub kernel_params: Vec<(String, Option<String>)>,
    pub hostname: String,
    pub hosts_file: Option<String>,
    pub dns_resolves: bool,
    pub u01_exists: bool,
    pub selinux: Option<String>,
    pub firewalld_active: bool,
}

fn read(path: &str) -> Option<String> {
    fs::read_to_string(path).ok()
}

fn probe(exec: &dyn Executor, invocation: &Invocation) -> Option<String> {
    match exec.capture(invocation) {
        Ok(captured) if captured.success() => Some(captured.output),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(program = %invocation.tool(), error = %err, "probe failed");
            None
        }
    }
}

/// Collect host facts from `/proc`, `/etc` and a handful of commands.
///
/// A probe that cannot run is recorded as absent rather than failing.
#[must_use]
pub fn gather(exec: &dyn Executor) -> HostFacts {
    let (mem_total_kb, swap_total_kb) = read("/proc/meminfo")
        .map(|text| parse_meminfo(&text))
        .unwrap_or_default();
    let df = probe(exec, &Invocation::new("df").args(["-Pk", "/", "/tmp"]))
        .map(|text| parse_df(&text))
        .unwrap_or_default();

    let packages = REQUIRED_PACKAGES
        .iter()
        .map(|pkg| {
            let installed = probe(exec, &Invocation::new("rpm").args(["-q", *pkg])).is_some();
            ((*pkg).to_string(), installed)
        })
        .collect();
    let kernel_params = KERNEL_PARAMS
        .iter()
        .map(|(name, _)| {
            let value = probe(exec, &Invocation::new("sysctl").args(["-n", *name]))
                .map(|text| parse_sysctl(&text));
            ((*name).to_string(), value)
        })
        .collect();

    let hostname = super::detect::hostname();
    let dns_resolves = (hostname.as_str(), 0)
        .to_socket_addrs()
        .is_ok_and(|mut addrs| addrs.next().is_some());
    let firewalld = probe(exec, &Invocation::new("systemctl").args(["is-active", "firewalld"]));

    HostFacts {
        os: read("/etc/os-release").map(|text| parse_os_release(&text)),
        kernel_release: read("/proc/sys/kernel/osrelease")
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
        mem_total_kb,
        swap_total_kb,
        root_free_kb: df.get("/").copied(),
        tmp_free_kb: df.get("/tmp").copied(),
        cpus: std::thread::available_parallelism().map_or(1, usize::from),
        packages,
        kernel_params,
        hostname,
        hosts_file: read("/etc/hosts"),
        dns_resolves,
        u01_exists: Path::new("/u01").is_dir(),
        selinux: probe(exec, &Invocation::new("getenforce")).map(|text| text.trim().to_string()),
        firewalld_active: firewalld.is_some_and(|text| text.trim() == "active"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Os,
    Hardware,
    Packages,
    Kernel,
    Network,
    Filesystem,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Os => "OS",
            Self::Hardware => "HARDWARE",
            Self::Packages => "PACKAGES",
            Self::Kernel => "KERNEL",
            Self::Network => "NETWORK",
            Self::Filesystem => "FILESYSTEM",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub category: Category,
    pub passed: bool,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrecheckReport {
    pub checks: Vec<CheckResult>,
    pub missing_packages: Vec<String>,
    /// `(parameter, required value)` pairs that need adjusting.
    pub kernel_fixes: Vec<(String, String)>,
    pub selinux_enforcing: bool,
    pub u01_missing: bool,
}

impl PrecheckReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    #[must_use]
    pub fn get(&self, category: Category) -> Option<&CheckResult> {
        self.checks.iter().find(|check| check.category == category)
    }

    /// One line per detail, grouped under each category verdict.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for check in &self.checks {
            let status = if check.passed { "✓ PASS" } else { "✗ FAIL" };
            lines.push(format!("{:<12} {status}", check.category.to_string()));
            lines.extend(check.details.iter().map(|detail| format!("    {detail}")));
        }
        lines
    }
}

#[allow(clippy::cast_precision_loss)]
fn gb(kb: u64) -> f64 {
    kb as f64 / KB_PER_GB
}

fn check_os(facts: &HostFacts) -> CheckResult {
    let mut details = Vec::new();
    let passed = match &facts.os {
        None => {
            details.push("✗ /etc/os-release not found".to_string());
            false
        }
        Some(os) if SUPPORTED_DISTROS.contains(&os.id.as_str()) => {
            details.push(format!("✓ Distribution: {}", os.id.to_uppercase()));
            if SUPPORTED_MAJORS.contains(&os.major()) {
                details.push(format!("✓ Version: {}", os.version_id));
            } else {
                details.push(format!(
                    "⚠ Version {} might not be officially supported",
                    os.version_id
                ));
            }
            true
        }
        Some(os) => {
            details.push(format!("✗ Unsupported distribution: {}", os.id));
            false
        }
    };
    if !facts.kernel_release.is_empty() {
        details.push(format!("✓ Kernel: {}", facts.kernel_release));
    }
    CheckResult {
        category: Category::Os,
        passed,
        details,
    }
}

fn minimum(label: &str, have_gb: f64, min_gb: f64, suffix: &str) -> (bool, String) {
    let ok = have_gb >= min_gb;
    let mark = if ok { "✓" } else { "✗" };
    (ok, format!("{mark} {label}: {have_gb:.1} GB{suffix} (min: {min_gb} GB)"))
}

fn check_hardware(facts: &HostFacts) -> CheckResult {
    let mut checks = vec![
        minimum("RAM", gb(facts.mem_total_kb), MIN_RAM_GB, ""),
        minimum("SWAP", gb(facts.swap_total_kb), MIN_SWAP_GB, ""),
        minimum(
            "Disk",
            gb(facts.root_free_kb.unwrap_or(0)),
            MIN_ROOT_FREE_GB,
            " free",
        ),
    ];
    if let Some(tmp) = facts.tmp_free_kb {
        checks.push(minimum("/tmp", gb(tmp), MIN_TMP_FREE_GB, " free"));
    }
    let passed = checks.iter().all(|(ok, _)| *ok);
    let mut details: Vec<String> = checks.into_iter().map(|(_, line)| line).collect();
    details.push(format!("✓ CPUs: {}", facts.cpus));
    CheckResult {
        category: Category::Hardware,
        passed,
        details,
    }
}

fn check_packages(facts: &HostFacts, missing: &[String]) -> CheckResult {
    let total = facts.packages.len();
    let mut details = vec![format!("✓ Installed: {}/{total}", total - missing.len())];
    if !missing.is_empty() {
        let shown: Vec<&str> = missing.iter().take(5).map(String::as_str).collect();
        details.push(format!("✗ Missing: {}", shown.join(", ")));
        if missing.len() > 5 {
            details.push(format!("  ... and {} more", missing.len() - 5));
        }
    }
    CheckResult {
        category: Category::Packages,
        passed: missing.is_empty(),
        details,
    }
}

fn check_kernel(facts: &HostFacts, fixes: &[(String, String)]) -> CheckResult {
    let total = KERNEL_PARAMS.len();
    let mut details = vec![format!("✓ Correct: {}/{total}", total - fixes.len())];
    if !fixes.is_empty() {
        details.push(format!("✗ Need adjustment: {}", fixes.len()));
        for (name, required) in fixes.iter().take(3) {
            let current = facts
                .kernel_params
                .iter()
                .find(|(param, _)| param == name)
                .and_then(|(_, value)| value.clone())
                .unwrap_or_else(|| "not set".to_string());
            details.push(format!("  • {name}: {current} (expected: {required})"));
        }
    }
    CheckResult {
        category: Category::Kernel,
        passed: fixes.is_empty(),
        details,
    }
}

fn check_network(facts: &HostFacts) -> CheckResult {
    let mut details = vec![format!("✓ Hostname: {}", facts.hostname)];
    let in_hosts = facts
        .hosts_file
        .as_deref()
        .is_some_and(|hosts| hosts_contains(hosts, &facts.hostname));
    details.push(if in_hosts {
        "✓ Hostname in /etc/hosts".to_string()
    } else {
        "✗ Hostname not in /etc/hosts".to_string()
    });
    details.push(if facts.dns_resolves {
        "✓ DNS resolution working".to_string()
    } else {
        "⚠ DNS resolution failed".to_string()
    });
    CheckResult {
        category: Category::Network,
        passed: in_hosts,
        details,
    }
}

fn check_filesystem(facts: &HostFacts) -> CheckResult {
    let mut details = vec![if facts.u01_exists {
        "✓ /u01 directory exists".to_string()
    } else {
        "⚠ /u01 directory does not exist (will be created)".to_string()
    }];
    let passed = match facts.selinux.as_deref() {
        Some(mode @ ("Permissive" | "Disabled")) => {
            details.push(format!("✓ SELinux: {mode}"));
            true
        }
        Some(mode) => {
            details.push(format!(
                "✗ SELinux: {mode} (should be Permissive or Disabled)"
            ));
            false
        }
        None => true,
    };
    details.push(if facts.firewalld_active {
        "⚠ Firewall is active (port 1521 must be open)".to_string()
    } else {
        "✓ Firewall is inactive".to_string()
    });
    CheckResult {
        category: Category::Filesystem,
        passed,
        details,
    }
}

/// Judge the gathered facts; overall success needs every category.
#[must_use]
pub fn evaluate(facts: &HostFacts) -> PrecheckReport {
    let missing_packages: Vec<String> = facts
        .packages
        .iter()
        .filter(|(_, installed)| !installed)
        .map(|(name, _)| name.clone())
        .collect();
    let kernel_fixes: Vec<(String, String)> = KERNEL_PARAMS
        .iter()
        .filter(|(name, required)| {
            let current = facts
                .kernel_params
                .iter()
                .find(|(param, _)| param == *name)
                .and_then(|(_, value)| value.as_deref());
            !current.is_some_and(|value| kernel_param_ok(required, value))
        })
        .map(|(name, required)| ((*name).to_string(), (*required).to_string()))
        .collect();

    PrecheckReport {
        checks: vec![
            check_os(facts),
            check_hardware(facts),
            check_packages(facts, &missing_packages),
            check_kernel(facts, &kernel_fixes),
            check_network(facts),
            check_filesystem(facts),
        ],
        selinux_enforcing: facts.selinux.as_deref() == Some("Enforcing"),
        u01_missing: !facts.u01_exists,
        missing_packages,
        kernel_fixes,
    }
}

/// Shell script that repairs what `report` found wrong.
#[must_use]
pub fn fix_script(report: &PrecheckReport) -> String {
    let mut script = String::from(
        "#!/bin/bash\n\
         # Fixes for Oracle 19c pre-installation issues\n\
         \n\
         set -e\n\
         \n\
         echo \"Fixing Oracle 19c pre-installation issues...\"\n",
    );
    if !report.missing_packages.is_empty() {
        script.push_str(&format!(
            "\necho \"Installing missing packages...\"\ndnf install -y {}\n",
            report.missing_packages.join(" ")
        ));
    }
    if !report.kernel_fixes.is_empty() {
        script.push_str("\ncat >> /etc/sysctl.conf << 'EOF'\n");
        for (name, value) in &report.kernel_fixes {
            script.push_str(&format!("{name} = {value}\n"));
        }
        script.push_str("EOF\n\nsysctl -p\n");
    }
    if report.selinux_enforcing {
        script.push_str(
            "\nsed -i 's/^SELINUX=enforcing/SELINUX=permissive/' /etc/selinux/config\nsetenforce 0\n",
        );
    }
    if report.u01_missing {
        script.push_str("\nmkdir -p /u01\nchmod 755 /u01\n");
    }
    script.push_str("\necho \"✓ Fixes applied\"\n");
    script
}

/// Write [`fix_script`] to `path` as an executable file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be written
pub fn write_fix_script(report: &PrecheckReport, path: &Path) -> Result<()> {
    fs::write(path, fix_script(report))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    const GB: u64 = 1024 * 1024;

    fn healthy() -> HostFacts {
        HostFacts {
            os: Some(parse_os_release("ID=\"rocky\"\nVERSION_ID=\"8.9\"\n")),
            kernel_release: "4.18.0-513.el8.x86_64".to_string(),
            mem_total_kb: 16 * GB,
            swap_total_kb: 8 * GB,
            root_free_kb: Some(100 * GB),
            tmp_free_kb: Some(10 * GB),
            cpus: 4,
            packages: REQUIRED_PACKAGES
                .iter()
                .map(|p| ((*p).to_string(), true))
                .collect(),
            kernel_params: KERNEL_PARAMS
                .iter()
                .map(|(n, v)| ((*n).to_string(), Some((*v).to_string())))
                .collect(),
            hostname: "db1".to_string(),
            hosts_file: Some("127.0.0.1 localhost\n192.168.56.10 db1.lab.local db1\n".to_string()),
            dns_resolves: true,
            u01_exists: true,
            selinux: Some("Permissive".to_string()),
            firewalld_active: false,
        }
    }

    #[test]
    fn test_parse_os_release() {
        let os = parse_os_release(
            "NAME=\"Oracle Linux Server\"\nVERSION_ID=\"9.3\"\nID=\"ol\"\nPRETTY_NAME=\"Oracle Linux Server 9.3\"\n",
        );
        assert_eq!(os.id, "ol");
        assert_eq!(os.major(), "9");
        assert_eq!(os.pretty_name, "Oracle Linux Server 9.3");
    }

    #[test]
    fn test_parse_meminfo() {
        let (mem, swap) = parse_meminfo(
            "MemTotal:       16318480 kB\nMemFree:         1234 kB\nSwapTotal:       8388604 kB\n",
        );
        assert_eq!(mem, 16_318_480);
        assert_eq!(swap, 8_388_604);
    }

    #[test]
    fn test_parse_df() {
        let df = parse_df(
            "Filesystem     1024-blocks     Used Available Capacity Mounted on\n\
             /dev/sda2        104806400 12345678  92460722      12% /\n\
             tmpfs              8159240        0   8159240       0% /tmp\n",
        );
        assert_eq!(df.get("/"), Some(&92_460_722));
        assert_eq!(df.get("/tmp"), Some(&8_159_240));
    }

    #[test]
    fn test_kernel_param_ok() {
        assert!(kernel_param_ok("6815744", "6815744"));
        assert!(kernel_param_ok("6815744", "9223372036854775807"));
        assert!(!kernel_param_ok("4096", "2048"));
        assert!(kernel_param_ok("9000 65500", "9000\t65500\n"));
        assert!(!kernel_param_ok("9000 65500", "32768\t60999"));
        assert!(!kernel_param_ok("250 32000 100 128", "32000 1024000000 500 32000"));
    }

    #[test]
    fn test_hosts_contains() {
        assert!(hosts_contains("192.168.1.5 db1.lab db1 # primary\n", "db1"));
        assert!(!hosts_contains("# 192.168.1.5 db1\n", "db1"));
        assert!(!hosts_contains("192.168.1.5 db10\n", "db1"));
    }

    #[test]
    fn test_healthy_host_passes() {
        let report = evaluate(&healthy());
        assert!(report.passed(), "{:#?}", report.render());
        assert_eq!(report.checks.len(), 6);
        assert!(report.missing_packages.is_empty());
    }

    #[test]
    fn test_small_host_fails_hardware_only() {
        let mut facts = healthy();
        facts.mem_total_kb = 4 * GB;
        facts.swap_total_kb = 2 * GB;
        let report = evaluate(&facts);
        assert!(!report.passed());
        assert!(!report.get(Category::Hardware).unwrap().passed);
        assert!(report.get(Category::Os).unwrap().passed);
        assert!(report
            .get(Category::Hardware)
            .unwrap()
            .details
            .iter()
            .any(|d| d.starts_with("✗ RAM: 4.0 GB")));
    }

    #[test]
    fn test_unsupported_version_warns_only() {
        let mut facts = healthy();
        facts.os = Some(parse_os_release("ID=rhel\nVERSION_ID=\"7.9\"\n"));
        let os = evaluate(&facts).get(Category::Os).cloned().unwrap();
        assert!(os.passed);
        assert!(os.details.iter().any(|d| d.starts_with('⚠')));

        facts.os = Some(parse_os_release("ID=ubuntu\nVERSION_ID=\"22.04\"\n"));
        assert!(!evaluate(&facts).get(Category::Os).unwrap().passed);
    }

    #[test]
    fn test_fix_script_covers_findings() {
        let mut facts = healthy();
        for (name, installed) in &mut facts.packages {
            if name == "ksh" || name == "libnsl" {
                *installed = false;
            }
        }
        for (name, value) in &mut facts.kernel_params {
            if name == "kernel.shmmni" {
                *value = Some("1024".to_string());
            }
        }
        facts.selinux = Some("Enforcing".to_string());
        facts.u01_exists = false;

        let report = evaluate(&facts);
        assert!(!report.passed());
        let script = fix_script(&report);
        assert!(script.contains("dnf install -y ksh libnsl\n"));
        assert!(script.contains("kernel.shmmni = 4096\n"));
        assert!(!script.contains("fs.file-max"));
        assert!(script.contains("setenforce 0"));
        assert!(script.contains("mkdir -p /u01"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix-precheck-issues.sh");
        write_fix_script(&report, &path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_gather_uses_executor() {
        use crate::ops::testing::RecordingExecutor;
        let exec = RecordingExecutor::default()
            .respond("rpm -q ksh", 1, "package ksh is not installed")
            .respond("sysctl -n kernel.sem", 0, "250\t32000\t100\t128\n")
            .respond("getenforce", 0, "Enforcing\n");
        let facts = gather(&exec);
        assert_eq!(facts.packages.len(), 25);
        assert!(facts.packages.iter().any(|(p, ok)| p == "ksh" && !ok));
        assert!(facts
            .kernel_params
            .iter()
            .any(|(p, v)| p == "kernel.sem" && v.as_deref() == Some("250 32000 100 128")));
        assert_eq!(facts.selinux.as_deref(), Some("Enforcing"));
    }
}
