mod receive;
use receive::stage;

use crate::{
    daemon::Command,
    db::BuildRecord,
    info,
    rpc::{self, protocol::*, Message},
    success,
    types::config::{Config, DaemonCmd, StatsCmd, SubCmd},
};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use console::style;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{
    io::{self, Write},
    time::Duration,
};

/// Talks to the daemon on behalf of one CLI invocation
pub struct Client<'a> {
    config: &'a Config,
    arch: String,
    timeout: Duration,
}

impl<'a> Client<'a> {
    pub fn new(config: &'a Config, arch: Option<&str>) -> Result<Self> {
        let arch = match arch {
            Some(arch) => arch.to_owned(),
            None => config
                .architectures
                .first()
                .cloned()
                .ok_or_else(|| anyhow!("No architecture configured"))?,
        };
        Ok(Client {
            config,
            arch,
            timeout: rpc::REPLY_TIMEOUT,
        })
    }

    /// Send a command, turning an `error` reply into an `Err`
    pub async fn send(&self, cmd: Command, params: Value) -> Result<Message> {
        let mut msg = match params {
            Value::Object(map) => map,
            _ => Message::new(),
        };
        msg.insert("architecture".into(), Value::from(self.arch.as_str()));
        msg.insert("command".into(), Value::from(cmd.name()));

        let reply = rpc::request(&self.config.rpc_addr, &Value::Object(msg), self.timeout).await?;
        if let Some(err) = reply.get("error") {
            let msg = err.as_str().map(str::to_owned).unwrap_or_else(|| err.to_string());
            bail!(msg);
        }
        Ok(reply)
    }

    pub async fn call<T: DeserializeOwned>(&self, cmd: Command, params: Value) -> Result<T> {
        let reply = self.send(cmd, params).await?;
        serde_json::from_value(Value::Object(reply))
            .with_context(|| format!("Unexpected reply to {}", cmd.name()))
    }

    pub async fn execute(&self, subcmd: &SubCmd) -> Result<()> {
        match subcmd {
            SubCmd::Ready(args) => {
                let reply: ReadyReply = self.call(Command::Ready, json!({})).await?;
                if args.json {
                    return print_json(&reply);
                }
                for pkg in reply.pkgs {
                    println!("{} {}", pkg.id, pkg.version);
                }
            }
            SubCmd::Receive(args) => {
                let dir = tempfile::Builder::new()
                    .prefix("architect-receive")
                    .tempdir()?;
                let staged = stage(io::stdin().lock(), dir.path(), &self.config.keyring)?;
                info!(
                    "Submitting {} package(s) and {} log(s)",
                    staged.packages.len(),
                    staged.logs.len()
                );
                let params = ReceiveParams {
                    repository: args.repository.clone(),
                    pkg: format!("{}/{}", args.repository, args.source),
                    version: args.version.clone(),
                    packages: staged.packages,
                    logs: staged.logs,
                };
                // The staging directory must outlive the request
                let reply: ReceiveReply = self
                    .call(Command::Receive, serde_json::to_value(&params)?)
                    .await?;
                success!("Build {} recorded for {}", reply.id, style(&params.pkg).bold());
            }
            SubCmd::Source(args) => {
                let params = SourceParams {
                    pkg: args.package.clone(),
                    version: args.version.clone(),
                };
                let reply: SourceReply = self
                    .call(Command::Source, serde_json::to_value(&params)?)
                    .await?;
                let ball = STANDARD
                    .decode(reply.srcball)
                    .context("Bad source bundle encoding")?;
                let mut stdout = io::stdout().lock();
                stdout.write_all(&ball)?;
                stdout.flush()?;
            }
            SubCmd::Refresh => {
                self.send(Command::Refresh, json!({})).await?;
                success!("Packages for {} refreshed", self.arch);
            }
            SubCmd::Dump(args) => {
                let reply: DumpReply = self
                    .call(Command::Dump, json!({ "pattern": args.pattern }))
                    .await?;
                if args.json {
                    return print_json(&reply);
                }
                print!("{}", format_dump(&reply.pkgs));
            }
            SubCmd::Stats(StatsCmd::RecentBuilds(args)) => {
                let params = StatsParams {
                    stat: STAT_RECENT_BUILDS.to_string(),
                    count: args.count,
                    all: args.all,
                };
                let reply: StatsReply = self
                    .call(Command::Stats, serde_json::to_value(&params)?)
                    .await?;
                if args.json {
                    return print_json(&reply);
                }
                print!("{}", format_builds(&reply.builds));
            }
            SubCmd::Daemon(DaemonCmd::Stop) => {
                self.send(Command::DaemonStop, json!({})).await?;
                success!("Daemon stopped");
            }
            SubCmd::Daemon(DaemonCmd::Start) => bail!("The daemon is not started through a client"),
        }
        Ok(())
    }
}

fn print_json<T: Serialize>(reply: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(reply)?);
    Ok(())
}

fn format_builds(builds: &[BuildRecord]) -> String {
    builds
        .iter()
        .map(|b| format!("{} {}\n", b.pkg, b.version))
        .collect()
}

fn format_dump(pkgs: &[PkgDump]) -> String {
    if pkgs.is_empty() {
        return "No matching package found\n".to_string();
    }
    pkgs.iter()
        .map(format_pkg)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_pkg(pkg: &PkgDump) -> String {
    let mut out = format!("{}:\n", pkg.id);
    out.push_str(&format!("  Name:               {}\n", pkg.name));
    if let Some(v) = &pkg.version_upstream {
        out.push_str(&format!("  Upstream Version:   {}\n", v));
    }
    if let Some(v) = &pkg.version {
        out.push_str(&format!("  Current Version:    {}\n", v));
    }
    if let Some(v) = &pkg.version_built {
        out.push_str(&format!("  Built Version:      {}\n", v));
    }
    out.push_str(&format!("  Status:             {}\n", pkg.status.join(",")));
    if !pkg.makedeps.is_empty() {
        out.push_str(&format!("  Make Dependencies:  {}\n", pkg.makedeps.join(", ")));
    }
    if !pkg.checkdeps.is_empty() {
        out.push_str(&format!("  Check Dependencies: {}\n", pkg.checkdeps.join(", ")));
    }
    if !pkg.binaries.is_empty() {
        out.push_str("  Binaries:\n");
        let bins: Vec<String> = pkg.binaries.iter().map(format_binary).collect();
        out.push_str(&bins.join("\n"));
    }
    out
}

fn format_binary(bin: &BinaryDump) -> String {
    let mut out = format!("    Name:             {}\n", bin.name);
    out.push_str(&format!("    Description:      {}\n", bin.desc));
    if !bin.groups.is_empty() {
        out.push_str(&format!("    Groups:           {}\n", bin.groups.join(", ")));
    }
    if !bin.deps.is_empty() {
        out.push_str(&format!("    Dependencies:     {}\n", bin.deps.join(", ")));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    fn config(addr: &str) -> Config {
        toml::from_str(&format!(
            r#"
architectures = ["x86_64", "aarch64"]
rpc-addr = "{addr}"
build-logs = "/tmp/logs"
"#
        ))
        .unwrap()
    }

    #[test]
    fn dump_layout() {
        let pkgs = vec![
            PkgDump {
                id: "core/gcc".to_string(),
                name: "gcc".to_string(),
                version: Some("11.1.0-2".to_string()),
                version_built: Some("11.1.0-1".to_string()),
                version_upstream: Some("11.2.0-1".to_string()),
                status: vec!["out-of-date".to_string(), "source-outdated".to_string()],
                makedeps: vec!["binutils".to_string()],
                checkdeps: vec![],
                binaries: vec![
                    BinaryDump {
                        name: "gcc".to_string(),
                        desc: "The GNU Compiler Collection".to_string(),
                        groups: vec!["base-devel".to_string()],
                        deps: vec!["binutils".to_string(), "gcc-libs".to_string()],
                    },
                    BinaryDump {
                        name: "gcc-libs".to_string(),
                        desc: "Runtime libraries".to_string(),
                        groups: vec![],
                        deps: vec![],
                    },
                ],
            },
            PkgDump {
                id: "core/gone".to_string(),
                name: "gone".to_string(),
                version: None,
                version_built: Some("1-1".to_string()),
                version_upstream: None,
                status: vec!["removed".to_string()],
                makedeps: vec![],
                checkdeps: vec![],
                binaries: vec![],
            },
        ];
        let expected = "core/gcc:
  Name:               gcc
  Upstream Version:   11.2.0-1
  Current Version:    11.1.0-2
  Built Version:      11.1.0-1
  Status:             out-of-date,source-outdated
  Make Dependencies:  binutils
  Binaries:
    Name:             gcc
    Description:      The GNU Compiler Collection
    Groups:           base-devel
    Dependencies:     binutils, gcc-libs

    Name:             gcc-libs
    Description:      Runtime libraries

core/gone:
  Name:               gone
  Built Version:      1-1
  Status:             removed
";
        assert_eq!(format_dump(&pkgs), expected);
        assert_eq!(format_dump(&[]), "No matching package found\n");
    }

    #[tokio::test]
    async fn error_reply_is_err() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let config = config(&addr);
        let client = Client::new(&config, None).unwrap();
        assert_eq!(client.arch, "x86_64");

        let server = async {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = tokio::io::BufReader::new(reader);
            let line = rpc::read_line(&mut reader).await.unwrap().unwrap();
            let msg = rpc::parse_message(&line).unwrap();
            assert_eq!(msg["architecture"], "x86_64");
            assert_eq!(msg["command"], "dump");
            assert_eq!(msg["pattern"], "(");
            rpc::write_message(&mut writer, &json!({ "error": "Invalid pattern" }))
                .await
                .unwrap();
        };
        let (_, reply) = tokio::join!(server, client.send(Command::Dump, json!({ "pattern": "(" })));
        assert_eq!(reply.unwrap_err().to_string(), "Invalid pattern");
    }

    #[tokio::test]
    async fn timeout_is_err() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let config = config(&addr);
        let mut client = Client::new(&config, Some("aarch64")).unwrap();
        client.timeout = Duration::from_millis(50);

        let server = async {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(stream);
        };
        let (_, reply) = tokio::join!(server, client.send(Command::Ready, json!({})));
        assert_eq!(reply.unwrap_err().to_string(), "Receive Timeout");
    }
}
