//! Replays a scripted robot conversation through a session client.
//!
//! Run with: cargo run -p replay-demo -- demos/replay/scripts/calibrate.jsonl [config.json]
//!
//! Each script line is one JSON step. Responses are printed to stdout as
//! JSON lines; logs go to stderr (set `RUST_LOG` to adjust).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use robot_client::{
    SessionClient,
    core::{Action, ClientConfig, ProtocolFile, ResponseStore, RobotTarget, StaticQuery},
};
use robot_client_transport::{MemoryChannel, MemoryOpener, Notification};
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ROBOT: &str = "replay";
const ROBOT_IP: &str = "127.0.0.1";
const ROBOT_PORT: u16 = 31950;

/// One line of a replay script.
#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    /// Session the robot reports on the next connect.
    Snapshot { session: Value },
    /// Protocol file the UI has selected.
    ProtocolFile { name: String, is_binary: bool },
    /// Tip racks still awaiting confirmation.
    Tipracks { unconfirmed: usize },
    /// Make a remote call path reject.
    Fail { path: String, message: String },
    Action { action: Action },
    Notify(Notification),
    /// Robot drops the connection.
    Close,
    Wait { ms: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(script) = args.next().map(PathBuf::from) else {
        bail!("usage: replay-demo <script.jsonl> [config.json]");
    };
    let config = match args.next() {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            ClientConfig::from_json(&raw).with_context(|| format!("parsing config {path}"))?
        }
        None => ClientConfig::default(),
    };
    let steps = read_script(&script)?;

    let robot = RobotTarget::new(ROBOT, ROBOT_IP, ROBOT_PORT);
    let channel = MemoryChannel::new();
    let opener = Arc::new(MemoryOpener::new());
    opener.register(robot.endpoint(), Arc::clone(&channel));
    let query = Arc::new(StaticQuery::new());
    let store = Arc::new(ResponseStore::new(config.response_history));

    let client = SessionClient::new(
        config,
        opener,
        Arc::new(vec![robot]),
        query.clone(),
        store.clone(),
    );
    tracing::info!(client = %client.id(), steps = steps.len(), "replaying {}", script.display());

    let mut responses = store.history_plus_stream();
    let printer = tokio::spawn(async move {
        while let Some(response) = responses.next().await {
            match serde_json::to_string(&response) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("unprintable response: {e}"),
            }
        }
    });

    for step in steps {
        match step {
            Step::Snapshot { session } => channel.set_session_snapshot(Some(session)),
            Step::ProtocolFile { name, is_binary } => {
                query.set_protocol_file(ProtocolFile { name, is_binary });
            }
            Step::Tipracks { unconfirmed } => query.set_unconfirmed_tipracks(unconfirmed),
            Step::Fail { path, message } => match fail_path(&path) {
                Some(path) => channel.fail(path, message),
                None => tracing::warn!(%path, "unknown remote call path"),
            },
            Step::Action { action } => client.handle(action).await,
            Step::Notify(notification) => channel.notify(notification),
            Step::Close => channel.drop_connection(),
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        tokio::task::yield_now().await;
    }

    client.shutdown().await;
    // let the printer drain what is already buffered
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}

fn read_script(path: &Path) -> Result<Vec<Step>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with("//"))
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("{}:{}", path.display(), n + 1))
        })
        .collect()
}

/// Remote call paths a script may fail, as static strings.
fn fail_path(path: &str) -> Option<&'static str> {
    const PATHS: &[&str] = &[
        "session_manager.create",
        "calibration_manager.move_to_front",
        "calibration_manager.home",
        "calibration_manager.update_container_offset",
        "calibration_manager.pick_up_tip",
        "calibration_manager.drop_tip",
        "calibration_manager.move_to",
        "calibration_manager.tip_probe",
        "calibration_manager.return_tip",
        "calibration_manager.jog",
        "session_manager.session.run",
        "session_manager.session.pause",
        "session_manager.session.resume",
        "session_manager.session.stop",
        "session_manager.session.refresh",
    ];
    PATHS.iter().copied().find(|p| *p == path)
}
