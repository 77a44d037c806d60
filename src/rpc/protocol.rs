//! Payloads of the daemon commands
use crate::db::BuildRecord;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPkg {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyReply {
    pub pkgs: Vec<ReadyPkg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveParams {
    pub repository: String,
    /// `<repo>/<name>`
    pub pkg: String,
    pub version: String,
    pub packages: Vec<PathBuf>,
    #[serde(default)]
    pub logs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveReply {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceParams {
    /// `<repo>/<name>`
    pub pkg: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReply {
    /// base64 encoded gzipped tarball
    pub srcball: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpParams {
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpReply {
    pub pkgs: Vec<PkgDump>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkgDump {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(
        rename = "version-built",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version_built: Option<String>,
    #[serde(
        rename = "version-upstream",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version_upstream: Option<String>,
    pub status: Vec<String>,
    pub makedeps: Vec<String>,
    pub checkdeps: Vec<String>,
    pub binaries: Vec<BinaryDump>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryDump {
    pub name: String,
    pub desc: String,
    pub groups: Vec<String>,
    pub deps: Vec<String>,
}

pub const STAT_RECENT_BUILDS: &str = "recent-builds";

fn default_count() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsParams {
    pub stat: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReply {
    pub builds: Vec<BuildRecord>,
}
