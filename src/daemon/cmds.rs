use super::Services;
use crate::{
    graph::{Package, PackageGraph},
    rpc::{protocol::*, Message},
    types::{ArchitectError, DependencySpec},
};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

/// Everything the daemon answers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Ready,
    Receive,
    Source,
    Refresh,
    Dump,
    Stats,
    DaemonStop,
}

const COMMANDS: &[(&str, Command)] = &[
    ("ready", Command::Ready),
    ("receive", Command::Receive),
    ("source", Command::Source),
    ("refresh", Command::Refresh),
    ("dump", Command::Dump),
    ("stats", Command::Stats),
    ("daemon-stop", Command::DaemonStop),
];

impl Command {
    pub fn from_name(name: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, cmd)| *cmd)
    }

    pub fn name(self) -> &'static str {
        COMMANDS
            .iter()
            .find(|(_, cmd)| *cmd == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }

    pub async fn run(
        self,
        ctx: &mut Services,
        graph: &mut PackageGraph,
        msg: Message,
    ) -> Result<Value> {
        let reply = match self {
            Command::Ready => serde_json::to_value(ready(graph))?,
            Command::Receive => serde_json::to_value(receive(ctx, graph, params(msg)?)?)?,
            Command::Source => serde_json::to_value(source(graph, params(msg)?)?)?,
            Command::Refresh => {
                graph.refresh().await?;
                json!({})
            }
            Command::Dump => serde_json::to_value(dump(graph, params(msg)?)?)?,
            Command::Stats => serde_json::to_value(stats(ctx, params(msg)?)?)?,
            Command::DaemonStop => {
                ctx.stopped = true;
                json!({})
            }
        };
        Ok(reply)
    }
}

fn params<T: DeserializeOwned>(msg: Message) -> Result<T> {
    serde_json::from_value(Value::Object(msg)).context("Invalid request parameters")
}

fn version_of(pkg: &Package) -> String {
    pkg.source()
        .and_then(|s| s.version.as_ref())
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn ready(graph: &PackageGraph) -> ReadyReply {
    let pkgs = graph
        .ready_for_build()
        .into_iter()
        .map(|p| ReadyPkg {
            id: p.id().to_owned(),
            version: version_of(p),
        })
        .collect();
    ReadyReply { pkgs }
}

fn receive(ctx: &Services, graph: &PackageGraph, req: ReceiveParams) -> Result<ReceiveReply> {
    let repo = graph
        .repository(&req.repository)
        .ok_or_else(|| ArchitectError::UnknownRepository(req.repository.clone()))?;

    // Each stage stands on its own, a failure doesn't undo the ones before it
    repo.add_build(&req.packages)
        .context("Failed to add packages")?;
    let id = ctx
        .store
        .insert_build(graph.arch(), &req.pkg, &req.version)
        .context("Failed DB insert")?;
    copy_logs(&ctx.config.build_logs, &req.pkg, &req.version, &id, &req.logs)
        .context("Failed to copy logs")?;

    Ok(ReceiveReply { id })
}

/// Logs of a build go to `<root>/<pkg with / as ->-<version>-<id>`
pub fn copy_logs(
    root: &Path,
    pkg: &str,
    version: &str,
    id: &str,
    logs: &[PathBuf],
) -> Result<PathBuf> {
    let log_dir = root.join(format!("{}-{}-{}", pkg.replace('/', "-"), version, id));
    fs::create_dir_all(root)?;
    fs::create_dir(&log_dir)
        .with_context(|| format!("Failed to create {}", log_dir.display()))?;
    for log in logs {
        let name = log
            .file_name()
            .with_context(|| format!("Bad log path {}", log.display()))?;
        fs::copy(log, log_dir.join(name))
            .with_context(|| format!("Failed to copy {}", log.display()))?;
    }
    Ok(log_dir)
}

fn source(graph: &PackageGraph, req: SourceParams) -> Result<SourceReply> {
    let (repo_name, name) = req.pkg.split_once('/').unwrap_or((req.pkg.as_str(), ""));
    let repo = graph
        .repository(repo_name)
        .ok_or_else(|| ArchitectError::UnknownRepository(repo_name.to_owned()))?;
    let ball = repo.sourceball(name, &req.version)?;
    Ok(SourceReply {
        srcball: STANDARD.encode(ball),
    })
}

fn dump(graph: &PackageGraph, req: DumpParams) -> Result<DumpReply> {
    let re = Regex::new(&req.pattern).context("Invalid pattern")?;
    let pkgs = graph
        .packages()
        .filter(|p| re.is_match(p.id()))
        .filter_map(dump_pkg)
        .collect();
    Ok(DumpReply { pkgs })
}

fn dep_names(deps: &HashSet<DependencySpec>) -> Vec<String> {
    let mut names: Vec<String> = deps.iter().map(|d| d.name.clone()).collect();
    names.sort();
    names.dedup();
    names
}

fn dump_pkg(pkg: &Package) -> Option<PkgDump> {
    let spkg = pkg.source().or_else(|| pkg.current_build())?;
    let mut status = vec![pkg.status().to_string()];
    let mut version_upstream = None;
    if pkg.source_outdated() {
        status.push("source-outdated".to_string());
        version_upstream = pkg.upstream_version().map(ToString::to_string);
    }

    Some(PkgDump {
        id: spkg.id(),
        name: spkg.name.clone(),
        version: if pkg.excluded() || pkg.removed() {
            None
        } else {
            spkg.version.as_ref().map(ToString::to_string)
        },
        version_built: pkg
            .current_build()
            .and_then(|b| b.version.as_ref())
            .map(ToString::to_string),
        version_upstream,
        status,
        makedeps: dep_names(&spkg.makedepends),
        checkdeps: dep_names(&spkg.checkdepends),
        binaries: spkg
            .binaries
            .values()
            .map(|b| BinaryDump {
                name: b.name.clone(),
                desc: b.description.clone(),
                groups: b.groups.iter().cloned().collect(),
                deps: dep_names(&b.depends),
            })
            .collect(),
    })
}

fn stats(ctx: &Services, req: StatsParams) -> Result<StatsReply> {
    if req.stat != STAT_RECENT_BUILDS {
        bail!("unknown stat '{}'", req.stat);
    }
    Ok(StatsReply {
        builds: ctx.store.recent_builds(req.count, req.all)?,
    })
}
