//! On-demand Telegram commands.
//!
//! Runs as its own task on the side of the monitoring tick. Everything here
//! works on independently probed, read-only snapshots and never touches the
//! tick timeline's stores.

use crate::{
    probe::NodePair,
    telegram::TelegramClient,
};
use beacon_client::BeaconClient;
use std::{
    path::PathBuf,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
    warn,
};

/// Server-side long-poll window for `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

const LOG_TAIL_LINES: usize = 100;

pub struct CommandListener {
    telegram: TelegramClient,
    primary: NodePair,
    fallback: NodePair,
    monitored: Vec<u64>,
    log_file: Option<PathBuf>,
}

impl CommandListener {
    pub fn new(
        telegram: TelegramClient,
        primary: NodePair,
        fallback: NodePair,
        monitored: Vec<u64>,
        log_file: Option<PathBuf>,
    ) -> Self {
        Self {
            telegram,
            primary,
            fallback,
            monitored,
            log_file,
        }
    }

    /// Long-poll for commands until cancelled. Only messages from the
    /// configured chat are honored.
    pub async fn run(self, cancel: CancellationToken) {
        let mut offset: Option<i64> = None;

        loop {
            let updates = tokio::select! {
                () = cancel.cancelled() => {
                    info!("command listener stopped");
                    return;
                }
                result = self.telegram.get_updates(offset, POLL_TIMEOUT_SECS) => match result {
                    Ok(updates) => updates,
                    Err(err) => {
                        warn!(error = %err, "failed to poll for commands");
                        tokio::select! {
                            () = cancel.cancelled() => return,
                            () = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                        }
                    }
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                if message.chat.id.to_string() != self.telegram.chat_id() {
                    continue;
                }
                let Some(text) = message.text else {
                    continue;
                };

                match text.trim() {
                    command if command.starts_with("/status") => self.handle_status().await,
                    command if command.starts_with("/logs") => self.handle_logs().await,
                    _ => {}
                }
            }
        }
    }

    async fn handle_status(&self) {
        let primary = self.primary.probe().await;
        let fallback = self.fallback.probe().await;

        let validators_line = match self.primary.beacon() {
            Some(beacon) => match validator_summary(beacon, &self.monitored).await {
                Some((active, total)) => format!("{active}/{total} validators are active."),
                None => "Could not fetch validator status.".to_string(),
            },
            None => "Could not fetch validator status.".to_string(),
        };

        let report = format!(
            "*On-Demand Status Report*\n\nValidators: {validators_line}\nPrimary Node: *{}*\nFallback Node: *{}*",
            primary.status.describe(),
            fallback.status.describe()
        );
        self.reply(&report).await;
    }

    async fn handle_logs(&self) {
        let Some(path) = &self.log_file else {
            self.reply("Log file is not configured.").await;
            return;
        };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let tail = tail_lines(&contents, LOG_TAIL_LINES);
                let body = if tail.is_empty() {
                    "Log file empty.".to_string()
                } else {
                    // Backticks inside the fence would break the formatting.
                    tail.replace('`', "'")
                };
                self.reply(&format!("```\n{body}\n```")).await;
            }
            Err(err) => self.reply(&format!("Error reading logs: {err}")).await,
        }
    }

    async fn reply(&self, text: &str) {
        if let Err(err) = self.telegram.send_message(text).await {
            error!(error = %err, "failed to send command reply");
        }
    }
}

async fn validator_summary(beacon: &BeaconClient, monitored: &[u64]) -> Option<(usize, usize)> {
    match beacon.validators(monitored).await {
        Ok(infos) => {
            let active = infos
                .iter()
                .filter(|info| info.status.contains("active"))
                .count();
            Some((active, infos.len()))
        }
        Err(err) => {
            error!(error = %err, "failed to fetch validator summary");
            None
        }
    }
}

fn tail_lines(contents: &str, count: usize) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{
            method,
            path,
        },
    };

    #[test]
    fn tail_keeps_only_the_last_lines() {
        let contents = (1..=150).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&contents, 100);
        assert!(tail.starts_with("51\n"));
        assert!(tail.ends_with("\n150"));
        assert_eq!(tail.lines().count(), 100);
    }

    #[test]
    fn tail_of_short_input_is_the_whole_input() {
        assert_eq!(tail_lines("a\nb", 100), "a\nb");
        assert_eq!(tail_lines("", 100), "");
    }

    #[tokio::test]
    async fn summary_counts_active_validators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/validators"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": "7", "status": "active_ongoing", "validator": {} },
                    { "index": "8", "status": "active_exiting", "validator": {} },
                    { "index": "9", "status": "exited_unslashed", "validator": {} }
                ]
            })))
            .mount(&server)
            .await;
        let beacon = BeaconClient::new(server.uri().parse().unwrap()).unwrap();

        let summary = validator_summary(&beacon, &[7, 8, 9]).await;
        assert_eq!(summary, Some((2, 3)));
    }

    async fn listener_with(server: &MockServer, log_file: Option<PathBuf>) -> CommandListener {
        let telegram =
            TelegramClient::with_base_url(server.uri().parse().unwrap(), "4242".to_string())
                .unwrap();
        let unconfigured = |role| NodePair::new(role, None, None).unwrap();
        CommandListener::new(
            telegram,
            unconfigured(crate::probe::NodeRole::Primary),
            unconfigured(crate::probe::NodeRole::Fallback),
            vec![7],
            log_file,
        )
    }

    #[tokio::test]
    async fn status_report_covers_both_pairs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sendMessage"))
            .and(wiremock::matchers::body_string_contains("On-Demand Status Report"))
            .and(wiremock::matchers::body_string_contains("Not Configured"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let listener = listener_with(&server, None).await;
        listener.handle_status().await;

        server.verify().await;
    }

    #[tokio::test]
    async fn logs_reply_is_the_file_tail() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let contents = (1..=150)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(file.path(), contents).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sendMessage"))
            .and(wiremock::matchers::body_string_contains("line 150"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let listener = listener_with(&server, Some(file.path().to_path_buf())).await;
        listener.handle_logs().await;

        server.verify().await;
    }

    #[tokio::test]
    async fn logs_without_a_configured_file_say_so() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sendMessage"))
            .and(wiremock::matchers::body_string_contains("not configured"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let listener = listener_with(&server, None).await;
        listener.handle_logs().await;

        server.verify().await;
    }

    #[tokio::test]
    async fn summary_is_none_on_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let beacon = BeaconClient::new(server.uri().parse().unwrap()).unwrap();

        assert_eq!(validator_summary(&beacon, &[7]).await, None);
    }
}
