//! Fixed transport sequence for each action

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use gattmaster_proto::{
    AUTH_RESPONSE_PROMPT, Action, ActionTag, CommandTable, Entry, HexError, Transport,
    TransportError, WriteMode, decode_hex, encode_hex, render_ascii,
};
use tokio::io::AsyncBufRead;
use tracing::{debug, warn};

use crate::console::Console;
use crate::listener::{ListenSummary, NotificationListener};
use crate::services::ServicesDump;

/// Everything one invocation needs: its table rows and the operator's answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionParams {
    pub action: Action,
    pub entries: BTreeMap<ActionTag, Entry>,
    pub answers: Vec<String>,
}

impl ActionParams {
    pub fn new(action: Action, table: Option<&CommandTable>, answers: Vec<String>) -> Self {
        let entries = action
            .spec()
            .required
            .iter()
            .filter_map(|tag| table.and_then(|t| t.get(*tag)).map(|e| (*tag, e.clone())))
            .collect();
        Self {
            action,
            entries,
            answers,
        }
    }

    fn entry(&self, tag: ActionTag) -> Result<&Entry, ActionError> {
        self.entries.get(&tag).ok_or(ActionError::MissingEntry(tag))
    }

    fn answer(&self, index: usize) -> Result<&str, ActionError> {
        self.answers
            .get(index)
            .map(|a| a.trim())
            .ok_or(ActionError::MissingAnswer(index))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ActionError {
    #[error("{action}: {op} {service_id}:{characteristic_id} failed: {source}")]
    Transport {
        action: Action,
        op: &'static str,
        service_id: String,
        characteristic_id: String,
        #[source]
        source: TransportError,
    },
    #[error("{action}: {source}")]
    InvalidHex {
        action: Action,
        #[source]
        source: HexError,
    },
    #[error("no {0} row in the commands file")]
    MissingEntry(ActionTag),
    #[error("missing answer #{0}")]
    MissingAnswer(usize),
    #[error("operator input closed")]
    InputClosed,
    #[error("console: {0}")]
    Console(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Listened(ListenSummary),
    /// Disconnect was answered with something other than `y`
    Declined,
    Disconnected,
}

pub struct Executor<'a, T, R, W> {
    transport: &'a mut T,
    console: &'a mut Console<R, W>,
    services: Option<&'a ServicesDump>,
    listen_window: Duration,
}

impl<'a, T, R, W> Executor<'a, T, R, W>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(
        transport: &'a mut T,
        console: &'a mut Console<R, W>,
        services: Option<&'a ServicesDump>,
        listen_window: Duration,
    ) -> Self {
        Self {
            transport,
            console,
            services,
            listen_window,
        }
    }

    pub async fn execute(&mut self, params: &ActionParams) -> Result<Outcome, ActionError> {
        debug!(action = %params.action, answers = params.answers.len(), "executing");
        match params.action {
            Action::Open => self.write_entry(params.action, params.entry(ActionTag::Open)?).await,
            Action::Close => self.write_entry(params.action, params.entry(ActionTag::Close)?).await,
            Action::Read => {
                let service_id = params.answer(0)?;
                let characteristic_id = params.answer(1)?;
                self.check_known(service_id, characteristic_id);
                self.read(params.action, service_id, characteristic_id).await?;
                Ok(Outcome::Done)
            }
            Action::Write => {
                let service_id = params.answer(0)?;
                let characteristic_id = params.answer(1)?;
                let payload_hex = params.answer(2)?;
                self.check_known(service_id, characteristic_id);
                self.write(
                    params.action,
                    service_id,
                    characteristic_id,
                    payload_hex,
                    WriteMode::WithoutResponse,
                )
                .await?;
                Ok(Outcome::Done)
            }
            Action::Authentication => self.authenticate(params).await,
            Action::Sync => self.sync(params).await,
            Action::Disconnect => self.disconnect(params).await,
        }
    }

    async fn write_entry(&mut self, action: Action, entry: &Entry) -> Result<Outcome, ActionError> {
        let payload_hex = entry.payload_hex.as_deref().unwrap_or("");
        self.write(
            action,
            &entry.service_id,
            &entry.characteristic_id,
            payload_hex,
            entry.write_mode,
        )
        .await?;
        Ok(Outcome::Done)
    }

    /// challenge read -> operator response -> response write
    async fn authenticate(&mut self, params: &ActionParams) -> Result<Outcome, ActionError> {
        let challenge = params.entry(ActionTag::GetChallenge)?;
        let respond = params.entry(ActionTag::SendResponse)?;

        let value = self
            .read(params.action, &challenge.service_id, &challenge.characteristic_id)
            .await?;
        self.console
            .say(format!("The authentication-challenge is: {}", encode_hex(&value)))?;

        let response = self
            .console
            .ask(AUTH_RESPONSE_PROMPT)
            .await?
            .ok_or(ActionError::InputClosed)?;

        self.write(
            params.action,
            &respond.service_id,
            &respond.characteristic_id,
            response.trim(),
            respond.write_mode,
        )
        .await?;
        self.console
            .say(format!("Sent the authentication-response: {}", response.trim()))?;
        Ok(Outcome::Done)
    }

    /// subscribe -> write -> bounded listen
    async fn sync(&mut self, params: &ActionParams) -> Result<Outcome, ActionError> {
        let subscribe = params.entry(ActionTag::SyncSubscribe)?;
        let sync_write = params.entry(ActionTag::SyncWrite)?;

        // open the stream first so nothing pushed in reply to the write is missed
        let stream = self
            .transport
            .notifications()
            .await
            .map_err(|source| ActionError::Transport {
                action: params.action,
                op: "notifications",
                service_id: subscribe.service_id.clone(),
                characteristic_id: subscribe.characteristic_id.clone(),
                source,
            })?;

        let confirmation = self
            .transport
            .subscribe(&subscribe.service_id, &subscribe.characteristic_id)
            .await
            .map_err(|source| ActionError::Transport {
                action: params.action,
                op: "subscribe",
                service_id: subscribe.service_id.clone(),
                characteristic_id: subscribe.characteristic_id.clone(),
                source,
            })?;
        self.console
            .say(format!(">> Subscribe: {}", subscribe.service_id))?;
        self.console.say(format!(
            "   {}:{} confirmed subscription state: {}",
            confirmation.service_id, confirmation.characteristic_id, confirmation.enabled
        ))?;

        self.write_entry(params.action, sync_write).await?;

        self.console.say("Starting listening for notifications.")?;
        let listener =
            NotificationListener::arm(self.transport.peripheral_id(), self.listen_window);
        let console = &mut *self.console;
        let mut failed = None;
        let summary = listener
            .listen(stream, |n| {
                if failed.is_some() {
                    return;
                }
                let line = format!(
                    "<< Notify: {} : {} : {} ({})",
                    n.service_id,
                    n.characteristic_id,
                    encode_hex(&n.value),
                    render_ascii(&n.value)
                );
                if let Err(e) = console.say(line) {
                    failed = Some(e);
                }
            })
            .await;

        if let Some(e) = failed {
            return Err(e.into());
        }
        Ok(Outcome::Listened(summary))
    }

    async fn disconnect(&mut self, params: &ActionParams) -> Result<Outcome, ActionError> {
        if !params.answer(0)?.eq_ignore_ascii_case("y") {
            return Ok(Outcome::Declined);
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
        Ok(Outcome::Disconnected)
    }

    async fn read(
        &mut self,
        action: Action,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Vec<u8>, ActionError> {
        let value = self
            .transport
            .read(service_id, characteristic_id)
            .await
            .map_err(|source| ActionError::Transport {
                action,
                op: "read",
                service_id: service_id.to_string(),
                characteristic_id: characteristic_id.to_string(),
                source,
            })?;

        self.console.say(format!(
            "<< Read:   : {} ({})",
            encode_hex(&value),
            render_ascii(&value)
        ))?;
        Ok(value)
    }

    async fn write(
        &mut self,
        action: Action,
        service_id: &str,
        characteristic_id: &str,
        payload_hex: &str,
        mode: WriteMode,
    ) -> Result<(), ActionError> {
        let value =
            decode_hex(payload_hex).map_err(|source| ActionError::InvalidHex { action, source })?;

        self.transport
            .write(service_id, characteristic_id, &value, mode)
            .await
            .map_err(|source| ActionError::Transport {
                action,
                op: "write",
                service_id: service_id.to_string(),
                characteristic_id: characteristic_id.to_string(),
                source,
            })?;

        self.console.say(format!(
            ">> Write:  : {} ({})",
            encode_hex(&value),
            render_ascii(&value)
        ))?;
        if mode == WriteMode::WithResponse {
            self.console.say("This was a write command with response.")?;
        }
        Ok(())
    }

    fn check_known(&self, service_id: &str, characteristic_id: &str) {
        if let Some(services) = self.services {
            if !services.contains(service_id, characteristic_id) {
                warn!(%service_id, %characteristic_id, "address is not in the services dump");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenState;
    use crate::mock::{Call, MockTransport};
    use gattmaster_proto::{Notification, compile};

    const TABLE: &str = "\
Open          | 1800 (desc) | 2a00 | 01
Close         | 1800        | 2a00 | 00
GetChallenge  | fff0        | fff1 |
SendResponse  | fff0        | fff2 |
SyncSubscribe | fff0        | fff3 |
SyncWrite     | fff0        | fff4 | a1b2
";

    async fn run(
        transport: &mut MockTransport,
        input: &'static str,
        action: Action,
        answers: &[&str],
    ) -> (Result<Outcome, ActionError>, String) {
        run_with(transport, None, input, action, answers).await
    }

    async fn run_with(
        transport: &mut MockTransport,
        services: Option<&ServicesDump>,
        input: &'static str,
        action: Action,
        answers: &[&str],
    ) -> (Result<Outcome, ActionError>, String) {
        let table = compile(TABLE).table;
        let params = ActionParams::new(
            action,
            Some(&table),
            answers.iter().map(|a| a.to_string()).collect(),
        );
        let mut console = Console::new(input.as_bytes(), Vec::new());
        let result = Executor::new(transport, &mut console, services, Duration::from_millis(4000))
            .execute(&params)
            .await;
        (result, String::from_utf8(console.into_output()).unwrap())
    }

    #[tokio::test]
    async fn open_writes_the_table_payload_once() {
        let mut transport = MockTransport::new();
        let (result, output) = run(&mut transport, "", Action::Open, &[]).await;

        assert!(matches!(result, Ok(Outcome::Done)));
        assert_eq!(
            transport.calls,
            vec![Call::Write {
                service_id: "1800".to_string(),
                characteristic_id: "2a00".to_string(),
                value: vec![0x01],
                mode: WriteMode::WithResponse,
            }]
        );
        assert!(output.contains(">> Write:  : 01"));
        assert!(output.contains("This was a write command with response."));
    }

    #[tokio::test]
    async fn write_is_unacknowledged() {
        let mut transport = MockTransport::new();
        let (result, output) =
            run(&mut transport, "", Action::Write, &["1801", "2a05", "deadbeef"]).await;

        assert!(matches!(result, Ok(Outcome::Done)));
        assert_eq!(
            transport.calls,
            vec![Call::Write {
                service_id: "1801".to_string(),
                characteristic_id: "2a05".to_string(),
                value: vec![0xde, 0xad, 0xbe, 0xef],
                mode: WriteMode::WithoutResponse,
            }]
        );
        assert!(!output.contains("with response"));
    }

    #[tokio::test]
    async fn write_rejects_bad_hex_before_the_transport() {
        let mut transport = MockTransport::new();
        let (result, _) = run(&mut transport, "", Action::Write, &["1801", "2a05", "xyz"]).await;

        assert!(matches!(result, Err(ActionError::InvalidHex { .. })));
        assert!(transport.calls.is_empty());
    }

    #[tokio::test]
    async fn read_prints_hex_and_ascii() {
        let mut transport = MockTransport::new();
        transport.reads.push_back(Ok(b"Lock\x01".to_vec()));
        let (result, output) = run(&mut transport, "", Action::Read, &["1800", "2a00"]).await;

        assert!(matches!(result, Ok(Outcome::Done)));
        assert!(output.contains("<< Read:   : 4c6f636b01 (Lock.)"));
    }

    #[tokio::test]
    async fn address_missing_from_the_dump_still_reaches_the_transport() {
        let dump = ServicesDump::from_json(
            r#"[{ "uuid": "1800", "characteristics": [{ "uuid": "2a00" }] }]"#,
        )
        .unwrap();
        assert!(!dump.contains("fff0", "fff9"));

        let mut transport = MockTransport::new();
        transport.reads.push_back(Ok(vec![0x2a]));
        let (result, output) =
            run_with(&mut transport, Some(&dump), "", Action::Read, &["fff0", "fff9"]).await;

        assert!(matches!(result, Ok(Outcome::Done)));
        assert_eq!(
            transport.calls,
            vec![Call::Read {
                service_id: "fff0".to_string(),
                characteristic_id: "fff9".to_string(),
            }]
        );
        assert!(output.contains("<< Read:   : 2a (*)"));
    }

    #[tokio::test]
    async fn authentication_reads_asks_then_writes() {
        let mut transport = MockTransport::new();
        transport.reads.push_back(Ok(vec![0xca, 0xfe]));
        let (result, output) = run(&mut transport, "beef\n", Action::Authentication, &[]).await;

        assert!(matches!(result, Ok(Outcome::Done)));
        assert_eq!(
            transport.calls,
            vec![
                Call::Read {
                    service_id: "fff0".to_string(),
                    characteristic_id: "fff1".to_string(),
                },
                Call::Write {
                    service_id: "fff0".to_string(),
                    characteristic_id: "fff2".to_string(),
                    value: vec![0xbe, 0xef],
                    mode: WriteMode::WithResponse,
                },
            ]
        );
        let challenge = output.find("The authentication-challenge is: cafe").unwrap();
        let prompt = output.find(AUTH_RESPONSE_PROMPT).unwrap();
        assert!(challenge < prompt);
    }

    #[tokio::test]
    async fn authentication_read_failure_aborts_before_the_prompt() {
        let mut transport = MockTransport::new();
        transport
            .reads
            .push_back(Err(TransportError::Ble("att error 0x0e".to_string())));
        let (result, output) = run(&mut transport, "beef\n", Action::Authentication, &[]).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("read fff0:fff1"));
        assert!(err.to_string().contains("att error 0x0e"));
        assert!(!output.contains(AUTH_RESPONSE_PROMPT));
        assert_eq!(transport.calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_subscribes_writes_then_listens() {
        let mut transport = MockTransport::new();
        let notify = |value: &[u8]| Notification {
            peripheral_id: "ecfe7e123456".to_string(),
            service_id: "fff0".to_string(),
            characteristic_id: "fff3".to_string(),
            value: value.to_vec(),
        };
        transport.notifications = vec![notify(b"AB"), notify(b"AB"), notify(b"CD")];

        let (result, output) = run(&mut transport, "", Action::Sync, &[]).await;

        let Ok(Outcome::Listened(summary)) = result else {
            panic!("unexpected {result:?}");
        };
        assert_eq!(summary.state, ListenState::Expired);
        assert_eq!(summary.reported, 2);
        assert_eq!(
            transport.calls,
            vec![
                Call::Notifications,
                Call::Subscribe {
                    service_id: "fff0".to_string(),
                    characteristic_id: "fff3".to_string(),
                },
                Call::Write {
                    service_id: "fff0".to_string(),
                    characteristic_id: "fff4".to_string(),
                    value: vec![0xa1, 0xb2],
                    mode: WriteMode::WithResponse,
                },
            ]
        );
        assert_eq!(output.matches("<< Notify: fff0 : fff3 : 4142 (AB)").count(), 1);
        assert_eq!(output.matches("<< Notify: fff0 : fff3 : 4344 (CD)").count(), 1);
    }

    #[tokio::test]
    async fn sync_subscribe_failure_aborts_before_the_write() {
        let mut transport = MockTransport::new();
        transport.fail_subscribe = true;
        let (result, _) = run(&mut transport, "", Action::Sync, &[]).await;

        assert!(matches!(result, Err(ActionError::Transport { op: "subscribe", .. })));
        assert!(!transport.calls.iter().any(|c| matches!(c, Call::Write { .. })));
    }

    #[tokio::test]
    async fn sync_write_failure_aborts_before_listening() {
        let mut transport = MockTransport::new();
        transport.fail_writes = true;
        let (result, output) = run(&mut transport, "", Action::Sync, &[]).await;

        assert!(matches!(result, Err(ActionError::Transport { op: "write", .. })));
        assert!(!output.contains("Starting listening"));
        assert_eq!(
            transport.calls.last(),
            Some(&Call::Write {
                service_id: "fff0".to_string(),
                characteristic_id: "fff4".to_string(),
                value: vec![0xa1, 0xb2],
                mode: WriteMode::WithResponse,
            })
        );
    }

    #[tokio::test]
    async fn disconnect_needs_confirmation() {
        let mut transport = MockTransport::new();
        let (result, _) = run(&mut transport, "", Action::Disconnect, &["n"]).await;
        assert!(matches!(result, Ok(Outcome::Declined)));
        assert!(transport.calls.is_empty());

        let (result, _) = run(&mut transport, "", Action::Disconnect, &["Y"]).await;
        assert!(matches!(result, Ok(Outcome::Disconnected)));
        assert_eq!(transport.calls, vec![Call::Disconnect]);
    }

    #[test]
    fn params_only_carry_the_rows_the_action_needs() {
        let table = compile(TABLE).table;
        let params = ActionParams::new(Action::Sync, Some(&table), Vec::new());
        let tags: Vec<_> = params.entries.keys().copied().collect();
        assert_eq!(tags, vec![ActionTag::SyncSubscribe, ActionTag::SyncWrite]);
    }
}
