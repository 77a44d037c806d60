mod cmds;
pub use cmds::Command;

use crate::{
    db::BuildStore,
    graph::PackageGraph,
    info,
    rpc::{self, Message},
    success,
    types::config::Config,
    utils::lock,
    warn,
};

use anyhow::{Context, Result};
use console::style;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::{io::BufReader, net::TcpListener};

/// What command handlers share besides the graph
pub struct Services {
    pub config: Config,
    pub store: BuildStore,
    pub stopped: bool,
}

/// Holds one package graph per architecture and answers requests one at a time
pub struct Daemon {
    graphs: BTreeMap<String, PackageGraph>,
    services: Services,
}

fn error_reply(msg: &str) -> Value {
    json!({ "error": msg })
}

impl Daemon {
    /// Load every architecture. Any failure here means the daemon can't start.
    pub fn new(config: Config) -> Result<Self> {
        let mut graphs = BTreeMap::new();
        for arch in &config.architectures {
            let graph = PackageGraph::load(arch, &config)?;
            for (repo, count) in graph.summary() {
                info!("{}/{}: {} packages", arch, style(repo).bold(), count);
            }
            graphs.insert(arch.clone(), graph);
        }
        let store = BuildStore::open(&config.build_db())?;

        Ok(Daemon {
            graphs,
            services: Services {
                config,
                store,
                stopped: false,
            },
        })
    }

    pub fn stopped(&self) -> bool {
        self.services.stopped
    }

    pub async fn handle_raw(&mut self, line: &[u8]) -> Value {
        match rpc::parse_message(line) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => error_reply(&format!("malformed request: {}", e)),
        }
    }

    /// Dispatch one request. There is always exactly one reply.
    pub async fn handle(&mut self, msg: Message) -> Value {
        // Present but not a string is as good as unknown
        let arch = match msg.get("architecture") {
            Some(arch) => arch.as_str().unwrap_or_default().to_owned(),
            None => return error_reply("no arch specified"),
        };
        let graph = match self.graphs.get_mut(&arch) {
            Some(graph) => graph,
            None => return error_reply("unsupported architecture"),
        };
        let cmd = match msg.get("command") {
            Some(name) => match name.as_str().and_then(Command::from_name) {
                Some(cmd) => cmd,
                None => return error_reply("unknown command"),
            },
            None => return error_reply("no command specified"),
        };

        info!("Cmd: {} ({})", cmd.name(), arch);
        match cmd.run(&mut self.services, graph, msg).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} failed: {:#}", cmd.name(), e);
                error_reply(&format!("{:#}", e))
            }
        }
    }

    /// Accept, read, dispatch, reply; until asked to stop
    pub async fn serve(&mut self, listener: TcpListener) -> Result<()> {
        while !self.stopped() {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let line = match rpc::read_line(&mut reader).await {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to read request from {}: {:#}", peer, e);
                    continue;
                }
            };

            let reply = self.handle_raw(&line).await;
            if let Err(e) = rpc::write_message(&mut writer, &reply).await {
                warn!("Failed to reply to {}: {:#}", peer, e);
            }
        }
        Ok(())
    }
}

/// `architect daemon start`
pub async fn run(config: Config) -> Result<()> {
    let cache_dir = config.cache_dir.clone();
    lock::lock(&cache_dir)?;

    let res = async {
        let addr = config.rpc_addr.clone();
        let mut daemon = Daemon::new(config)?;
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to listen on {}", addr))?;
        success!("Listening on {}", addr);
        daemon.serve(listener).await
    }
    .await;

    lock::unlock(&cache_dir)?;
    res
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        rpc::{protocol::*, request, REPLY_TIMEOUT},
        testutil::{git, git_commit_all, make_pkg, make_srcdir},
    };
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::{
        fs,
        path::{Path, PathBuf},
    };

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("src")).unwrap();
            fs::create_dir_all(dir.path().join("staging")).unwrap();
            make_srcdir(&dir.path().join("src"), "foo", "1.0", "1");
            Fixture { dir }
        }

        fn path(&self, sub: &str) -> PathBuf {
            self.dir.path().join(sub)
        }

        fn config(&self) -> Config {
            let root = self.dir.path().display();
            let config: Config = toml::from_str(&format!(
                r#"
architectures = ["x86_64", "aarch64"]
cache-dir = "{root}/cache"
build-logs = "{root}/logs"

[[repos]]
name = "core"
dst = "{root}/dst"
src = [{{ source-dir = "{root}/src" }}]
"#
            ))
            .unwrap();
            config.check_sanity().unwrap();
            config
        }

        fn daemon(&self) -> Daemon {
            Daemon::new(self.config()).unwrap()
        }

        fn db_path(&self) -> PathBuf {
            self.path("dst/os/x86_64/core.db.tar.gz")
        }
    }

    fn req(value: Value) -> Message {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn ready_ids(reply: Value) -> Vec<String> {
        let reply: ReadyReply = serde_json::from_value(reply).unwrap();
        reply.pkgs.into_iter().map(|p| p.id).collect()
    }

    fn receive_req(pkg: &Path, log: &Path) -> Message {
        req(json!({
            "architecture": "x86_64",
            "command": "receive",
            "repository": "core",
            "pkg": "core/foo",
            "version": "1.0-1",
            "packages": [pkg],
            "logs": [log],
        }))
    }

    #[tokio::test]
    async fn dispatch_errors() {
        let fixture = Fixture::new();
        let mut daemon = fixture.daemon();

        let reply = daemon.handle(req(json!({ "command": "ready" }))).await;
        assert_eq!(reply, json!({ "error": "no arch specified" }));
        let reply = daemon
            .handle(req(json!({ "architecture": "mips", "command": "ready" })))
            .await;
        assert_eq!(reply, json!({ "error": "unsupported architecture" }));
        let reply = daemon.handle(req(json!({ "architecture": "x86_64" }))).await;
        assert_eq!(reply, json!({ "error": "no command specified" }));
        let reply = daemon.handle_raw(b"not json\n").await;
        assert!(reply["error"].as_str().unwrap().starts_with("malformed request"));
        let reply = daemon
            .handle(req(json!({ "architecture": 64, "command": "ready" })))
            .await;
        assert_eq!(reply, json!({ "error": "unsupported architecture" }));
        let reply = daemon
            .handle(req(json!({ "architecture": "x86_64", "command": ["ready"] })))
            .await;
        assert_eq!(reply, json!({ "error": "unknown command" }));

        let before = ready_ids(
            daemon
                .handle(req(json!({ "architecture": "x86_64", "command": "ready" })))
                .await,
        );
        let reply = daemon
            .handle(req(json!({ "architecture": "x86_64", "command": "build" })))
            .await;
        assert_eq!(reply, json!({ "error": "unknown command" }));
        let after = ready_ids(
            daemon
                .handle(req(json!({ "architecture": "x86_64", "command": "ready" })))
                .await,
        );
        assert_eq!(before, after);
        assert_eq!(after, vec!["core/foo"]);
        assert!(!daemon.stopped());
    }

    #[tokio::test]
    async fn build_lifecycle() {
        let fixture = Fixture::new();
        let mut daemon = fixture.daemon();
        let ready = req(json!({ "architecture": "x86_64", "command": "ready" }));

        let reply: ReadyReply =
            serde_json::from_value(daemon.handle(ready.clone()).await).unwrap();
        assert_eq!(
            reply.pkgs,
            vec![ReadyPkg {
                id: "core/foo".to_string(),
                version: "1.0-1".to_string()
            }]
        );

        let pkg = make_pkg(&fixture.path("staging"), "foo", "foo", "1.0-1");
        let log = fixture.path("staging/build.log");
        fs::write(&log, "build ok\n").unwrap();
        let reply = daemon.handle(receive_req(&pkg, &log)).await;
        let id = reply["id"].as_str().expect("receive failed").to_owned();
        assert!(fixture
            .path(&format!("logs/core-foo-1.0-1-{}/build.log", id))
            .is_file());

        // Only visible after a refresh
        assert_eq!(ready_ids(daemon.handle(ready.clone()).await), vec!["core/foo"]);
        let reply = daemon
            .handle(req(json!({ "architecture": "x86_64", "command": "refresh" })))
            .await;
        assert_eq!(reply, json!({}));
        assert!(ready_ids(daemon.handle(ready.clone()).await).is_empty());
        // Other architectures are separate graphs
        let reply = daemon
            .handle(req(json!({ "architecture": "aarch64", "command": "ready" })))
            .await;
        assert_eq!(ready_ids(reply), vec!["core/foo"]);

        let reply = daemon
            .handle(req(json!({
                "architecture": "x86_64",
                "command": "dump",
                "pattern": "^core/f",
            })))
            .await;
        let dump: DumpReply = serde_json::from_value(reply).unwrap();
        assert_eq!(dump.pkgs.len(), 1);
        let foo = &dump.pkgs[0];
        assert_eq!(foo.status, vec!["up-to-date"]);
        assert_eq!(foo.version.as_deref(), Some("1.0-1"));
        assert_eq!(foo.version_built.as_deref(), Some("1.0-1"));
        assert_eq!(foo.makedeps, vec!["make"]);
        assert_eq!(foo.binaries[0].name, "foo");

        // Same artifact again is rejected as a whole
        let db_before = fs::read(fixture.db_path()).unwrap();
        let reply = daemon.handle(receive_req(&pkg, &log)).await;
        let err = reply["error"].as_str().unwrap();
        assert!(err.starts_with("Failed to add packages"), "{}", err);
        assert!(err.contains("already exists"), "{}", err);
        assert_eq!(fs::read(fixture.db_path()).unwrap(), db_before);

        let reply = daemon
            .handle(req(json!({
                "architecture": "x86_64",
                "command": "stats",
                "stat": "recent-builds",
            })))
            .await;
        let stats: StatsReply = serde_json::from_value(reply).unwrap();
        assert_eq!(stats.builds.len(), 1);
        assert_eq!(stats.builds[0].id, id);
        assert_eq!(stats.builds[0].pkg, "core/foo");

        let reply = daemon
            .handle(req(json!({
                "architecture": "x86_64",
                "command": "stats",
                "stat": "popular",
            })))
            .await;
        assert!(reply.get("error").is_some());
    }

    #[tokio::test]
    async fn receive_into_unknown_repository() {
        let fixture = Fixture::new();
        let mut daemon = fixture.daemon();
        let pkg = make_pkg(&fixture.path("staging"), "foo", "foo", "1.0-1");
        let mut msg = receive_req(&pkg, &fixture.path("staging/none.log"));
        msg.insert("repository".into(), json!("extra"));
        let reply = daemon.handle(msg).await;
        assert_eq!(reply, json!({ "error": "unknown repository 'extra'" }));
        assert!(!fixture.db_path().exists());
    }

    #[tokio::test]
    async fn fetch_source() {
        let fixture = Fixture::new();
        let mut daemon = fixture.daemon();
        let source = |pkg: &str, version: &str| {
            req(json!({
                "architecture": "x86_64",
                "command": "source",
                "pkg": pkg,
                "version": version,
            }))
        };

        let reply = daemon.handle(source("core/foo", "1.0-1")).await;
        let ball: SourceReply = serde_json::from_value(reply).unwrap();
        assert!(!STANDARD.decode(&ball.srcball).unwrap().is_empty());

        let reply = daemon.handle(source("extra/foo", "1.0-1")).await;
        assert_eq!(reply, json!({ "error": "unknown repository 'extra'" }));
        let reply = daemon.handle(source("core/bar", "1.0-1")).await;
        assert_eq!(reply, json!({ "error": "unknown package 'bar'" }));
        let reply = daemon.handle(source("core/foo", "2.0-1")).await;
        assert_eq!(reply, json!({ "error": "not found" }));
    }

    #[tokio::test]
    async fn serve_until_stopped() {
        let fixture = Fixture::new();
        let mut daemon = fixture.daemon();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = async {
            let reply = request(
                &addr,
                &json!({ "architecture": "x86_64", "command": "ready" }),
                REPLY_TIMEOUT,
            )
            .await
            .unwrap();
            assert_eq!(ready_ids(Value::Object(reply)), vec!["core/foo"]);
            request(
                &addr,
                &json!({ "architecture": "x86_64", "command": "daemon-stop" }),
                REPLY_TIMEOUT,
            )
            .await
            .unwrap()
        };
        let (served, stop_reply) = tokio::join!(daemon.serve(listener), client);
        served.unwrap();
        assert!(stop_reply.is_empty());
        assert!(daemon.stopped());
    }

    #[tokio::test]
    async fn undecodable_request_gets_reply() {
        use tokio::{io::AsyncWriteExt, net::TcpStream};

        let fixture = Fixture::new();
        let mut daemon = fixture.daemon();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = async {
            let stream = TcpStream::connect(&addr).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            writer
                .write_all(b"{\"architecture\": \"\xff\"}\n")
                .await
                .unwrap();
            let line = rpc::read_line(&mut BufReader::new(reader))
                .await
                .unwrap()
                .unwrap();
            let reply = rpc::parse_message(&line).unwrap();
            request(
                &addr,
                &json!({ "architecture": "x86_64", "command": "daemon-stop" }),
                REPLY_TIMEOUT,
            )
            .await
            .unwrap();
            reply
        };
        let (served, reply) = tokio::join!(daemon.serve(listener), client);
        served.unwrap();
        let err = reply["error"].as_str().unwrap();
        assert!(err.starts_with("malformed request"), "{}", err);
    }

    #[tokio::test]
    async fn git_backed_repository() {
        let fixture = Fixture::new();
        let origin = fixture.path("src");
        git(&origin, &["init", "-q"]);
        git_commit_all(&origin, "add foo");
        let root = fixture.dir.path().display();
        let config: Config = toml::from_str(&format!(
            r#"
architectures = ["x86_64"]
cache-dir = "{root}/cache"
build-logs = "{root}/logs"

[[repos]]
name = "core"
dst = "{root}/dst"
src = [{{ source-git = "{root}/src" }}]
"#
        ))
        .unwrap();
        let mut daemon = Daemon::new(config).unwrap();
        let ready = req(json!({ "architecture": "x86_64", "command": "ready" }));
        let refresh = req(json!({ "architecture": "x86_64", "command": "refresh" }));

        // Nothing until the first refresh clones
        assert!(ready_ids(daemon.handle(ready.clone()).await).is_empty());
        assert_eq!(daemon.handle(refresh.clone()).await, json!({}));
        assert_eq!(ready_ids(daemon.handle(ready.clone()).await), vec!["core/foo"]);

        make_srcdir(&origin, "bar", "1.0", "1");
        git_commit_all(&origin, "add bar");
        assert_eq!(daemon.handle(refresh.clone()).await, json!({}));
        assert_eq!(
            ready_ids(daemon.handle(ready.clone()).await),
            vec!["core/bar", "core/foo"]
        );

        let pkg = make_pkg(&fixture.path("staging"), "foo", "foo", "1.0-1");
        let log = fixture.path("staging/build.log");
        fs::write(&log, "build ok\n").unwrap();
        assert!(daemon.handle(receive_req(&pkg, &log)).await.get("id").is_some());
        assert_eq!(daemon.handle(refresh.clone()).await, json!({}));
        assert_eq!(ready_ids(daemon.handle(ready.clone()).await), vec!["core/bar"]);

        fs::remove_dir_all(&origin).unwrap();
        let reply = daemon.handle(refresh).await;
        assert!(reply["error"].as_str().unwrap().contains("git exited with"));
        assert_eq!(ready_ids(daemon.handle(ready).await), vec!["core/bar"]);
    }
}
