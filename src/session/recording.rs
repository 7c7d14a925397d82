use super::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// How much of a telnet session a [`SessionRecorder`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SessionRecordLevel {
    /// Nothing.
    Off,
    /// Connection lifecycle and command outputs.
    KeyEventsOnly,
    /// Record key events and decoded telnet data.
    #[default]
    Full,
}

/// One timestamped line of a recording.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionRecordEntry {
    pub ts_ms: u128,
    pub event: SessionEvent,
}

/// What [`SessionRecorder::normalize_jsonl`] keeps besides key events.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Keep raw telnet data events.
    pub keep_raw_chunks: bool,
    /// Keep reconnect events.
    pub keep_reconnects: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            keep_raw_chunks: false,
            keep_reconnects: true,
        }
    }
}

/// Events a line session emits while recording.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectionEstablished {
        hostname: String,
        port: u16,
        prompt: String,
    },
    Reconnected {
        hostname: String,
        attempt: usize,
    },
    ConnectionClosed {
        reason: String,
    },
    CommandOutput {
        command: String,
        success: bool,
        content: String,
    },
    RawChunk {
        data: String,
    },
}

/// Shared in-memory recording; clones append to the same entries.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    level: SessionRecordLevel,
    entries: Arc<Mutex<Vec<SessionRecordEntry>>>,
}

impl SessionRecorder {
    pub fn new(level: SessionRecordLevel) -> Self {
        Self {
            level,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn level(&self) -> SessionRecordLevel {
        self.level
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<SessionRecordEntry>>, ConnectError> {
        self.entries
            .lock()
            .map_err(|e| ConnectError::InternalServerError(format!("record lock error: {e}")))
    }

    /// Appends `event` unless recording is off.
    pub fn record_event(&self, event: SessionEvent) -> Result<(), ConnectError> {
        if self.level == SessionRecordLevel::Off {
            return Ok(());
        }
        self.lock()?.push(SessionRecordEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Record decoded telnet data when enabled.
    pub fn record_raw_chunk(&self, data: String) -> Result<(), ConnectError> {
        if self.level != SessionRecordLevel::Full {
            return Ok(());
        }
        self.record_event(SessionEvent::RawChunk { data })
    }

    /// Copy of everything recorded so far.
    pub fn entries(&self) -> Result<Vec<SessionRecordEntry>, ConnectError> {
        Ok(self.lock()?.clone())
    }

    /// Export records as JSONL, one entry per line.
    pub fn to_jsonl(&self) -> Result<String, ConnectError> {
        let lines = self
            .entries()?
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConnectError::InternalServerError(format!("record encode error: {e}")))?;
        Ok(lines.join("\n"))
    }

    /// Restore a recorder from JSONL. Blank lines are ignored.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, ConnectError> {
        let entries = jsonl
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<SessionRecordEntry>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConnectError::InternalServerError(format!("record decode error: {e}")))?;
        Ok(Self::from_entries(entries))
    }

    fn from_entries(entries: Vec<SessionRecordEntry>) -> Self {
        Self {
            level: SessionRecordLevel::Full,
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Rewrites a recording as a stable fixture.
    ///
    /// Entries are ordered by timestamp (ties keep their recorded order) and
    /// raw chunks or reconnects are dropped unless `options` keeps them.
    pub fn normalize_jsonl(jsonl: &str, options: NormalizeOptions) -> Result<String, ConnectError> {
        let mut entries = Self::from_jsonl(jsonl)?.entries()?;
        entries.sort_by_key(|entry| entry.ts_ms);
        entries.retain(|entry| match entry.event {
            SessionEvent::RawChunk { .. } => options.keep_raw_chunks,
            SessionEvent::Reconnected { .. } => options.keep_reconnects,
            _ => true,
        });
        Self::from_entries(entries).to_jsonl()
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new(SessionRecordLevel::Full)
    }
}

/// Offline shell backed by session recording data.
///
/// Each command is answered with the next recorded output for that exact
/// command text; a recorded failure is replayed as a response timeout.
#[derive(Debug, Clone)]
pub struct SessionReplayer {
    hostname: String,
    outputs: VecDeque<(String, bool, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayContext {
    pub hostname: String,
    pub port: u16,
    pub prompt: String,
}

impl SessionReplayer {
    /// Replays the command outputs of a recording, bound to its device.
    pub fn from_recorder(recorder: &SessionRecorder) -> Self {
        let entries = recorder.entries().unwrap_or_default();
        let hostname = entries
            .iter()
            .find_map(|entry| match &entry.event {
                SessionEvent::ConnectionEstablished { hostname, .. } => Some(hostname.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let outputs = entries
            .into_iter()
            .filter_map(|entry| match entry.event {
                SessionEvent::CommandOutput {
                    command,
                    success,
                    content,
                } => Some((command, success, content)),
                _ => None,
            })
            .collect();
        Self { hostname, outputs }
    }

    pub fn from_jsonl(jsonl: &str) -> Result<Self, ConnectError> {
        let recorder = SessionRecorder::from_jsonl(jsonl)?;
        Ok(Self::from_recorder(&recorder))
    }

    /// Build a replayer from `(command, output)` pairs.
    pub fn from_transcript<I, C, O>(hostname: impl Into<String>, transcript: I) -> Self
    where
        I: IntoIterator<Item = (C, O)>,
        C: Into<String>,
        O: Into<String>,
    {
        Self {
            hostname: hostname.into(),
            outputs: transcript
                .into_iter()
                .map(|(command, output)| (command.into(), true, output.into()))
                .collect(),
        }
    }

    /// Overrides the device identifier records are stamped with.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Number of recorded outputs not yet consumed.
    pub fn remaining(&self) -> usize {
        self.outputs.len()
    }

    /// Consumes the earliest unconsumed output recorded for `command`.
    pub fn replay_next(&mut self, command: &str) -> Result<String, ConnectError> {
        let position = self
            .outputs
            .iter()
            .position(|(recorded, _, _)| recorded == command)
            .ok_or_else(|| {
                ConnectError::ReplayMismatchError(format!(
                    "no replayable output found for command '{command}'"
                ))
            })?;
        let (_, success, content) = self.outputs.remove(position).ok_or_else(|| {
            ConnectError::InternalServerError("replay cursor out of range".to_string())
        })?;
        if success {
            Ok(content)
        } else {
            Err(ConnectError::ResponseTimeout(content))
        }
    }
}

/// Returns initial connection context if present in a recording.
pub fn initial_context(recorder: &SessionRecorder) -> Option<ReplayContext> {
    recorder
        .entries()
        .ok()?
        .into_iter()
        .find_map(|entry| match entry.event {
            SessionEvent::ConnectionEstablished {
                hostname,
                port,
                prompt,
            } => Some(ReplayContext {
                hostname,
                port,
                prompt,
            }),
            _ => None,
        })
}

#[async_trait]
impl CommandShell for SessionReplayer {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn execute(
        &mut self,
        command: &str,
        _timeout: Option<Duration>,
    ) -> Result<String, ConnectError> {
        self.replay_next(command)
    }
}

fn now_ms() -> u128 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis(),
        Err(_) => 0,
    }
}
