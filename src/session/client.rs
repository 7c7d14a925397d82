use super::*;

const USERNAME_CUE: &str = "Username:";
const PASSWORD_CUE: &str = "Password:";

/// Commands run after login so responses are neither paginated nor wrapped.
const SETUP_COMMANDS: &[&str] = &["terminal length 0", "terminal width 0"];

impl LineSession {
    /// Opens a session to `host:port` and logs in.
    ///
    /// Fails with [`ConnectError::ConnectTimeout`] when the device does not
    /// answer within the response timeout, and with
    /// [`ConnectError::AuthenticationFailure`] when the expected prompt does
    /// not follow the login exchange.
    pub async fn open(
        host: impl Into<String>,
        port: u16,
        credentials: Credentials,
        options: SessionOptions,
    ) -> Result<LineSession, ConnectError> {
        Self::open_with_recorder(host, port, credentials, options, None).await
    }

    /// Opens a session and records its events into `recorder`.
    pub async fn open_with_recorder(
        host: impl Into<String>,
        port: u16,
        credentials: Credentials,
        options: SessionOptions,
        recorder: Option<SessionRecorder>,
    ) -> Result<LineSession, ConnectError> {
        let host = host.into();
        let mut session = LineSession {
            prompt: derive_prompt(&host),
            host,
            port,
            credentials,
            options,
            state: SessionState::Disconnected,
            transport: None,
            recorder,
        };
        session.connect_and_login().await?;

        if let Some(recorder) = session.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::ConnectionEstablished {
                hostname: session.host.clone(),
                port: session.port,
                prompt: session.prompt.clone(),
            });
        }
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
            && matches!(self.state, SessionState::Ready | SessionState::Executing)
    }

    /// Connects, logs in and disables pagination.
    ///
    /// Any failure leaves the session in [`SessionState::Failed`] with the
    /// transport dropped.
    async fn connect_and_login(&mut self) -> Result<(), ConnectError> {
        self.transport = None;
        self.state = SessionState::Connecting;

        let result = self.try_connect_and_login().await;
        if result.is_err() {
            self.transport = None;
            self.state = SessionState::Failed;
        }
        result
    }

    async fn try_connect_and_login(&mut self) -> Result<(), ConnectError> {
        let timeout = self.options.response_timeout;
        let mut transport = TelnetTransport::connect(&self.host, self.port, timeout).await?;
        transport.set_recorder(self.recorder.clone());
        debug!("{}:{} TCP connection successful", self.host, self.port);

        self.state = SessionState::Authenticating;
        self.login(&mut transport).await?;
        self.transport = Some(transport);
        debug!("{} login successful", self.host);

        self.state = SessionState::Ready;
        for command in SETUP_COMMANDS {
            if let Err(err) = self.execute_lowlevel(command, None).await {
                return Err(ConnectError::SetupFailed(format!("{command}: {err}")));
            }
        }
        Ok(())
    }

    async fn login(&self, transport: &mut TelnetTransport) -> Result<(), ConnectError> {
        let timeout = self.options.response_timeout;

        let banner = transport.read_until(":", timeout).await?;
        if !banner.text.contains(USERNAME_CUE) {
            let _ = transport.shutdown().await;
            return Err(ConnectError::AuthenticationFailure(format!(
                "{} did not ask for a username",
                self.host
            )));
        }
        transport
            .write_str(&format!("{}{}", self.credentials.username, config::NEWLINE))
            .await?;

        transport.read_until(PASSWORD_CUE, timeout).await?;
        transport
            .write_str(&format!("{}{}", self.credentials.password, config::NEWLINE))
            .await?;

        let response = transport.read_until(&self.prompt, timeout).await?;
        if !response.matched {
            let _ = transport.shutdown().await;
            return Err(ConnectError::AuthenticationFailure(format!(
                "{} prompt '{}' not seen after login",
                self.host, self.prompt
            )));
        }
        Ok(())
    }

    /// Sends one command and reads up to the next prompt, without retries.
    async fn execute_lowlevel(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ConnectError> {
        let timeout = timeout.unwrap_or(self.options.response_timeout);
        let character_spacing = self.options.character_spacing;
        let line_spacing = self.options.line_spacing;
        let transport = self
            .transport
            .as_mut()
            .ok_or(ConnectError::StreamClosed)?;

        self.state = SessionState::Executing;
        transport.discard_buffered();
        transport
            .write_throttled(
                &format!("{command}{}", config::NEWLINE),
                character_spacing,
                line_spacing,
            )
            .await?;

        let captured = transport.read_until(&self.prompt, timeout).await?;
        if !captured.matched {
            if let Some(recorder) = self.recorder.as_ref() {
                let _ = recorder.record_event(SessionEvent::CommandOutput {
                    command: command.to_string(),
                    success: false,
                    content: captured.text.clone(),
                });
            }
            return Err(ConnectError::ResponseTimeout(captured.text));
        }

        let content = captured
            .text
            .strip_suffix(self.prompt.as_str())
            .unwrap_or(&captured.text)
            .to_string();
        self.state = SessionState::Ready;

        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::CommandOutput {
                command: command.to_string(),
                success: true,
                content: content.clone(),
            });
        }
        Ok(content)
    }

    /// Executes a command, reconnecting and retrying on stream failures.
    ///
    /// A dropped connection or a response timeout triggers a full
    /// connect-and-login before the next attempt, up to
    /// [`SessionOptions::max_attempts`] attempts in total.
    pub async fn execute(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ConnectError> {
        if self.state == SessionState::Closed {
            return Err(ConnectError::StreamClosed);
        }

        let attempts = self.options.max_attempts.max(1);
        for attempt in 1..=attempts {
            if self.transport.is_none() {
                match self.connect_and_login().await {
                    Ok(()) => {
                        debug!("{} reconnected for attempt {}", self.host, attempt);
                        if let Some(recorder) = self.recorder.as_ref() {
                            let _ = recorder.record_event(SessionEvent::Reconnected {
                                hostname: self.host.clone(),
                                attempt,
                            });
                        }
                    }
                    Err(err) => {
                        warn!(
                            "{} reconnect for '{}' failed (attempt {}/{}): {}",
                            self.host, command, attempt, attempts, err
                        );
                        continue;
                    }
                }
            }

            match self.execute_lowlevel(command, timeout).await {
                Ok(content) => return Ok(content),
                Err(err) if err.is_retryable() => {
                    warn!(
                        "{} command '{}' failed (attempt {}/{}): {}, reconnecting...",
                        self.host, command, attempt, attempts, err
                    );
                    self.transport = None;
                    self.state = SessionState::Failed;
                }
                Err(err) => return Err(err),
            }
        }

        Err(ConnectError::RetriesExhausted {
            command: command.to_string(),
            attempts,
        })
    }

    /// Logs out and closes the connection.
    pub async fn close(&mut self) -> Result<(), ConnectError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        debug!("Closing telnet session to {}...", self.host);

        if let Some(mut transport) = self.transport.take() {
            if let Err(err) = transport
                .write_str(&format!("exit{}", config::NEWLINE))
                .await
            {
                debug!("Failed to send exit command: {}", err);
            }
            let _ = transport.shutdown().await;
        }
        self.state = SessionState::Closed;

        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::ConnectionClosed {
                reason: "client_close_called".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CommandShell for LineSession {
    fn hostname(&self) -> &str {
        &self.host
    }

    async fn execute(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ConnectError> {
        LineSession::execute(self, command, timeout).await
    }

    async fn close(&mut self) -> Result<(), ConnectError> {
        LineSession::close(self).await
    }
}
