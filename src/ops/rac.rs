//! Real Application Clusters: setup, node addition and clusterware state.

use super::{Context, Outcome, detect, labs};
use crate::{
    error::{Error, Result},
    runner::SuccessCheck,
    validation,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const SETUP_LAB: u8 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub name: String,
    pub number: Option<u32>,
    pub status: String,
}

/// What the cluster page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterView {
    pub clustered: bool,
    pub nodes: Vec<Node>,
}

fn grid_bin(ctx: &Context, name: &str) -> PathBuf {
    Path::new(&ctx.config.oracle.grid_home).join("bin").join(name)
}

/// # Errors
///
/// Returns `InvalidInput` for bad host names and the lab's failure otherwise
pub fn setup(ctx: &Context, nodes: &[String], vips: &[String]) -> Result<Outcome> {
    for host in nodes.iter().chain(vips) {
        validation::hostname(host)?;
    }
    labs::run_lab(
        ctx,
        SETUP_LAB,
        &[("RAC_NODES", nodes.join(",")), ("RAC_VIPS", vips.join(","))],
    )
}

/// Extend the grid home to a new node.
///
/// # Errors
///
/// Returns `Precondition` if `addnode.sh` is absent, `InvalidInput` for bad
/// host names and `ToolFailed` if the script fails
pub fn add_node(ctx: &Context, host: &str, vip: &str) -> Result<Outcome> {
    let host = validation::hostname(host)?;
    let vip = validation::hostname(vip)?;
    let script = Path::new(&ctx.config.oracle.grid_home)
        .join("addnode")
        .join("addnode.sh");
    if !script.is_file() {
        return Err(Error::Precondition(format!(
            "{} not found; Grid Infrastructure is not installed",
            script.display()
        )));
    }
    let invocation = ctx
        .as_oracle(&script.to_string_lossy())
        .args([
            "-silent".to_string(),
            format!("CLUSTER_NEW_NODES={{{host}}}"),
            format!("CLUSTER_NEW_VIRTUAL_HOSTNAMES={{{vip}}}"),
        ]);
    let captured = ctx.logged(&invocation, "addnode", SuccessCheck::ExitCode)?;
    Ok(Outcome::new(format!("Node {host} added to the cluster")).with_output(captured.output))
}

/// # Errors
///
/// Returns `BinaryNotFound` without clusterware and `ToolFailed` if either
/// command fails
pub fn status(ctx: &Context) -> Result<Outcome> {
    let crsctl = ctx
        .as_oracle(&grid_bin(ctx, "crsctl").to_string_lossy())
        .args(["stat", "res", "-t"]);
    let resources = SuccessCheck::ExitCode.require(ctx.exec.capture(&crsctl)?, "crsctl", None)?;

    let srvctl = ctx
        .oracle_tool("srvctl")
        .args(["status", "database", "-d", ctx.config.database.db_name.as_str()]);
    let database = SuccessCheck::ExitCode.require(ctx.exec.capture(&srvctl)?, "srvctl", None)?;

    Ok(Outcome::new("Cluster status").with_output(format!(
        "{}\n{}",
        resources.output.trim_end(),
        database.output
    )))
}

/// Parse `olsnodes -n -s` output: `name number status`.
#[must_use]
pub fn parse_olsnodes(output: &str) -> Vec<Node> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            Some(Node {
                name: name.to_string(),
                number: fields.next().and_then(|n| n.parse().ok()),
                status: fields.next().unwrap_or("Unknown").to_string(),
            })
        })
        .collect()
}

/// Cluster members, or this host alone when clusterware is absent.
///
/// # Errors
///
/// Returns `ToolFailed` if `olsnodes` exists but fails
pub fn nodes(ctx: &Context) -> Result<ClusterView> {
    let olsnodes = grid_bin(ctx, "olsnodes");
    if !olsnodes.is_file() {
        return Ok(ClusterView {
            clustered: false,
            nodes: vec![Node {
                name: detect::hostname(),
                number: None,
                status: "single instance".to_string(),
            }],
        });
    }
    let invocation = ctx
        .as_oracle(&olsnodes.to_string_lossy())
        .args(["-n", "-s"]);
    let captured = SuccessCheck::ExitCode.require(ctx.exec.capture(&invocation)?, "olsnodes", None)?;
    Ok(ClusterView {
        clustered: true,
        nodes: parse_olsnodes(&captured.output),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::ops::testing::{RecordingExecutor, context};
    use std::{fs, sync::Arc};

    #[test]
    fn test_add_node_requires_grid() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let mut ctx = context(&exec, dir.path());
        ctx.config.oracle.grid_home = dir.path().join("grid").to_string_lossy().into_owned();
        let err = add_node(&ctx, "rac3", "rac3-vip").unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_add_node_argv() {
        let dir = tempfile::tempdir().unwrap();
        let grid = dir.path().join("grid");
        fs::create_dir_all(grid.join("addnode")).unwrap();
        fs::write(grid.join("addnode/addnode.sh"), "#!/bin/sh\n").unwrap();

        let exec = Arc::new(RecordingExecutor::default());
        let mut ctx = context(&exec, dir.path());
        ctx.config.oracle.grid_home = grid.to_string_lossy().into_owned();
        add_node(&ctx, "rac3", "rac3-vip").unwrap();

        let calls = exec.calls();
        let call = calls.first().unwrap();
        assert_eq!(
            call.args,
            ["-silent", "CLUSTER_NEW_NODES={rac3}", "CLUSTER_NEW_VIRTUAL_HOSTNAMES={rac3-vip}"]
        );
        assert_eq!(call.user.as_deref(), Some("oracle"));
    }

    #[test]
    fn test_parse_olsnodes() {
        let nodes = parse_olsnodes("rac1\t1\tActive\nrac2\t2\tInactive\n\n");
        assert_eq!(nodes.len(), 2);
        let second = nodes.last().unwrap();
        assert_eq!(second.name, "rac2");
        assert_eq!(second.number, Some(2));
        assert_eq!(second.status, "Inactive");
    }

    #[test]
    fn test_nodes_single_instance() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let mut ctx = context(&exec, dir.path());
        ctx.config.oracle.grid_home = dir.path().join("nogrid").to_string_lossy().into_owned();
        let view = nodes(&ctx).unwrap();
        assert!(!view.clustered);
        assert_eq!(view.nodes.first().unwrap().status, "single instance");
        assert!(exec.calls().is_empty());
    }
}
