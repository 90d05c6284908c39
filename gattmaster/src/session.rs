//! The interactive loop: menu, action, validation, prompts, execution
//!
//! Strictly sequential. A failing action is reported and the menu comes back;
//! only a confirmed Disconnect, a table that cannot satisfy the chosen action,
//! or closed operator input end the session.

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use gattmaster_proto::{Action, CommandTable, Transport};
use tokio::io::AsyncBufRead;
use tracing::{info, warn};

use crate::console::Console;
use crate::executor::{ActionError, ActionParams, Executor, Outcome};
use crate::listener::DEFAULT_LISTEN_WINDOW;
use crate::services::ServicesDump;
use crate::validate::{Validation, validate};

const RULE: usize = 30;

/// Why the session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Disconnected,
    InputClosed,
    /// The table cannot satisfy the chosen action
    Fatal(Validation),
}

impl SessionEnd {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SessionEnd::Disconnected | SessionEnd::InputClosed => ExitCode::SUCCESS,
            SessionEnd::Fatal(_) => ExitCode::FAILURE,
        }
    }
}

pub struct Session<T, R, W> {
    transport: T,
    console: Console<R, W>,
    table: Option<CommandTable>,
    services: Option<ServicesDump>,
    listen_window: Duration,
}

impl<T, R, W> Session<T, R, W>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(transport: T, console: Console<R, W>) -> Self {
        Self {
            transport,
            console,
            table: None,
            services: None,
            listen_window: DEFAULT_LISTEN_WINDOW,
        }
    }

    pub fn with_table(mut self, table: Option<CommandTable>) -> Self {
        self.table = table;
        self
    }

    pub fn with_services(mut self, services: Option<ServicesDump>) -> Self {
        self.services = services;
        self
    }

    pub fn with_listen_window(mut self, window: Duration) -> Self {
        self.listen_window = window;
        self
    }

    /// Run until the session ends; returns the transport and console with the reason
    pub async fn run(mut self) -> std::io::Result<(SessionEnd, T, Console<R, W>)> {
        let end = self.drive().await?;
        Ok((end, self.transport, self.console))
    }

    /// The peripheral is released on every exit, console failures included
    async fn drive(&mut self) -> std::io::Result<SessionEnd> {
        match self.interact().await {
            Ok(end) => Ok(end),
            Err(e) => {
                warn!(error = %e, "console failed");
                self.close().await;
                Err(e)
            }
        }
    }

    async fn interact(&mut self) -> std::io::Result<SessionEnd> {
        loop {
            self.show_menu()?;

            let Some(key) = self.console.ask("Action").await? else {
                self.close().await;
                return Ok(SessionEnd::InputClosed);
            };

            let action = match key.parse::<Action>() {
                Ok(action) => action,
                Err(e) => {
                    self.console.say(format!("ERROR: {e}"))?;
                    continue;
                }
            };

            let validation = validate(action, self.table.as_ref());
            if !validation.is_runnable() {
                self.console.say(&validation)?;
                self.close().await;
                return Ok(SessionEnd::Fatal(validation));
            }

            let mut answers = Vec::with_capacity(action.spec().prompts.len());
            for prompt in action.spec().prompts {
                match self.console.ask(prompt).await? {
                    Some(answer) => answers.push(answer),
                    None => {
                        self.close().await;
                        return Ok(SessionEnd::InputClosed);
                    }
                }
            }

            let params = ActionParams::new(action, self.table.as_ref(), answers);
            let result = Executor::new(
                &mut self.transport,
                &mut self.console,
                self.services.as_ref(),
                self.listen_window,
            )
            .execute(&params)
            .await;

            match result {
                Ok(Outcome::Disconnected) => {
                    info!("disconnected on request");
                    return Ok(SessionEnd::Disconnected);
                }
                Ok(Outcome::Listened(summary)) => {
                    info!(
                        reported = summary.reported,
                        duplicates = summary.duplicates,
                        "sync done"
                    );
                }
                Ok(Outcome::Done | Outcome::Declined) => {}
                Err(ActionError::InputClosed) => {
                    self.close().await;
                    return Ok(SessionEnd::InputClosed);
                }
                Err(ActionError::Console(e)) => return Err(e),
                Err(e) => {
                    warn!(action = %action, error = %e, "action failed");
                    self.console.say(format!("ERROR: {e}"))?;
                }
            }
        }
    }

    fn show_menu(&mut self) -> std::io::Result<()> {
        self.console
            .say("Select the action to execute on the BLE peripheral: ")?;
        self.console.say("-".repeat(RULE))?;
        for action in Action::menu() {
            self.console.say(action)?;
        }
        self.console.say("-".repeat(RULE))
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
    }
}
