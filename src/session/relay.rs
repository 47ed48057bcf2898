//! Sidecar relay driver
//!
//! Runs one external protocol worker process per endpoint. The worker owns
//! the game wire protocol and authentication; it emits one JSON object per
//! line on stdout for every skin observation it decodes, and exits when its
//! connection ends. The relay forwards each observation onto the durable
//! publish path and maps the worker's exit status to a session outcome.

use super::{ObservationSink, SessionContext, SessionDriver, SessionOutcome};
use crate::queue::QueuedSkin;
use crate::skin::{clean_player_name, SkinJson};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Worker process configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Worker executable
    pub worker: String,
    /// Fixed arguments passed to every worker invocation
    pub args: Vec<String>,
    /// Cooldown requested for the endpoint when a worker fails
    pub failure_cooldown: Duration,
    /// Directory holding persisted identity tokens, handed to the worker
    pub token_dir: String,
}

/// One observation line as emitted by the worker
#[derive(Debug, Deserialize)]
struct WorkerObservation {
    username: String,
    xuid: String,
    skin: SkinJson,
}

/// Session driver that delegates the wire protocol to a worker process
pub struct RelayDriver<S> {
    sink: Arc<S>,
    config: RelayConfig,
}

impl<S: ObservationSink> RelayDriver<S> {
    pub fn new(sink: Arc<S>, config: RelayConfig) -> Self {
        Self { sink, config }
    }
}

#[async_trait]
impl<S: ObservationSink + 'static> SessionDriver for RelayDriver<S> {
    async fn run(&self, ctx: SessionContext) -> SessionOutcome {
        info!(
            endpoint = %ctx.endpoint,
            identity = %ctx.identity.name,
            "starting session worker"
        );

        let child = Command::new(&self.config.worker)
            .args(&self.config.args)
            .env("SKINFLEET_IDENTITY", &ctx.identity.name)
            .env("SKINFLEET_ENDPOINT", ctx.endpoint.to_string())
            .env("SKINFLEET_SERVER", &ctx.server_label)
            .env("SKINFLEET_TOKEN_DIR", &self.config.token_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(error) => {
                error!(%error, worker = %self.config.worker, "failed to start session worker");
                return SessionOutcome::Failed {
                    cooldown: Some(self.config.failure_cooldown),
                };
            }
        };

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<WorkerObservation>(&line) {
                            Ok(observation) => {
                                let queued = QueuedSkin::now(
                                    clean_player_name(&observation.username),
                                    observation.xuid,
                                    observation.skin,
                                    ctx.server_label.clone(),
                                );
                                if self.sink.publish_skin(&queued).await.is_err() {
                                    // Queue is closed; the process is shutting
                                    // down, stop relaying and the worker.
                                    let _ = child.start_kill();
                                    break;
                                }
                            }
                            Err(error) => {
                                warn!(%error, endpoint = %ctx.endpoint, "dropping malformed worker line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        warn!(%error, endpoint = %ctx.endpoint, "worker stdout read failed");
                        break;
                    }
                }
            }
        }

        match child.wait().await {
            Ok(status) if status.success() => {
                debug!(endpoint = %ctx.endpoint, "session worker finished");
                SessionOutcome::Finished
            }
            Ok(status) => {
                warn!(endpoint = %ctx.endpoint, %status, "session worker failed");
                SessionOutcome::Failed {
                    cooldown: Some(self.config.failure_cooldown),
                }
            }
            Err(error) => {
                error!(%error, endpoint = %ctx.endpoint, "failed to reap session worker");
                SessionOutcome::Failed {
                    cooldown: Some(self.config.failure_cooldown),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::Endpoint;
    use crate::identity::Identity;
    use crate::queue::QueueError;
    use std::io::Write;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<QueuedSkin>>,
    }

    #[async_trait]
    impl ObservationSink for RecordingSink {
        async fn publish_skin(&self, skin: &QueuedSkin) -> Result<(), QueueError> {
            self.published.lock().await.push(skin.clone());
            Ok(())
        }
    }

    fn ctx() -> SessionContext {
        SessionContext {
            identity: Identity::new("alpha"),
            endpoint: Endpoint::new("127.0.0.1".parse().unwrap(), 19132),
            server_label: "play.example.net 127.0.0.1".to_string(),
        }
    }

    fn config(worker: &str, args: Vec<String>) -> RelayConfig {
        RelayConfig {
            worker: worker.to_string(),
            args,
            failure_cooldown: Duration::from_secs(300),
            token_dir: "tokens".to_string(),
        }
    }

    fn observation_line(username: &str) -> String {
        serde_json::json!({
            "username": username,
            "xuid": "2535405",
            "skin": SkinJson::default(),
        })
        .to_string()
    }

    #[tokio::test]
    async fn relays_worker_observations_to_the_sink() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", observation_line("§aSteve")).unwrap();
        writeln!(file, "{}", observation_line("Alex")).unwrap();
        file.flush().unwrap();

        let sink = Arc::new(RecordingSink::default());
        let driver = RelayDriver::new(
            sink.clone(),
            config("cat", vec![file.path().to_string_lossy().into_owned()]),
        );

        let outcome = driver.run(ctx()).await;
        assert_eq!(outcome, SessionOutcome::Finished);

        let published = sink.published.lock().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].username, "Steve");
        assert_eq!(published[0].server_address, "play.example.net 127.0.0.1");
        assert_eq!(published[1].username, "Alex");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, "{}", observation_line("Steve")).unwrap();
        file.flush().unwrap();

        let sink = Arc::new(RecordingSink::default());
        let driver = RelayDriver::new(
            sink.clone(),
            config("cat", vec![file.path().to_string_lossy().into_owned()]),
        );

        assert_eq!(driver.run(ctx()).await, SessionOutcome::Finished);
        assert_eq!(sink.published.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failing_worker_requests_a_cooldown() {
        let sink = Arc::new(RecordingSink::default());
        let driver = RelayDriver::new(sink, config("false", vec![]));

        let outcome = driver.run(ctx()).await;
        assert_eq!(
            outcome,
            SessionOutcome::Failed {
                cooldown: Some(Duration::from_secs(300))
            }
        );
    }

    #[tokio::test]
    async fn missing_worker_binary_requests_a_cooldown() {
        let sink = Arc::new(RecordingSink::default());
        let driver = RelayDriver::new(sink, config("/nonexistent/skinfleet-worker", vec![]));

        let outcome = driver.run(ctx()).await;
        assert!(matches!(outcome, SessionOutcome::Failed { cooldown: Some(_) }));
    }
}
