use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netfleet::catalog::Operation;
use netfleet::config::{Credentials, SessionOptions};
use netfleet::error::ConnectError;
use netfleet::session::{
    LineSession, SessionRecordLevel, SessionRecorder, SessionReplayer, SessionState,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const HOST: &str = "localhost";
const PROMPT: &str = "localhost#";
const IAC: u8 = 255;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    /// Drop the connection instead of answering the first non-setup command
    /// of the first connection.
    DropFirstCommand,
    /// Drop the connection on every non-setup command.
    DropEveryCommand,
    /// Greet a successful login with a prompt other than the host's.
    WrongPrompt,
    /// Answer non-setup commands without ever printing the prompt again.
    PromptStops,
}

impl Fault {
    fn drops_commands(self, connection: usize) -> bool {
        match self {
            Fault::DropFirstCommand => connection == 1,
            Fault::DropEveryCommand => true,
            _ => false,
        }
    }
}

#[derive(Default)]
struct SwitchLog {
    commands: Mutex<Vec<String>>,
    negotiation: Mutex<Vec<[u8; 2]>>,
    connections: AtomicUsize,
}

impl SwitchLog {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Minimal telnet switch: asks for credentials, negotiates two options,
/// echoes commands and answers from a fixed table.
async fn spawn_switch(
    outputs: HashMap<&'static str, &'static str>,
    fault: Fault,
) -> (u16, Arc<SwitchLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log = Arc::new(SwitchLog::default());
    let outputs = Arc::new(outputs);

    let server_log = log.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let connection = server_log.connections.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(serve(
                stream,
                outputs.clone(),
                server_log.clone(),
                fault,
                connection,
            ));
        }
    });
    (port, log)
}

async fn serve(
    mut stream: TcpStream,
    outputs: Arc<HashMap<&'static str, &'static str>>,
    log: Arc<SwitchLog>,
    fault: Fault,
    connection: usize,
) {
    // DO ECHO, WILL SUPPRESS-GO-AHEAD
    let _ = stream.write_all(&[IAC, 253, 1, IAC, 251, 3]).await;
    let _ = stream
        .write_all(b"\r\nUser Access Verification\r\n\r\nUsername: ")
        .await;
    let Some(username) = read_line(&mut stream, &log).await else {
        return;
    };
    let _ = stream.write_all(b"Password: ").await;
    let Some(password) = read_line(&mut stream, &log).await else {
        return;
    };
    if username != "admin" || password != "secret" {
        let _ = stream
            .write_all(b"\r\n% Authentication failed\r\n\r\nUsername: ")
            .await;
        let _ = read_line(&mut stream, &log).await;
        return;
    }
    let greeting = if fault == Fault::WrongPrompt { "OTHER#" } else { PROMPT };
    let _ = stream.write_all(format!("\r\n{greeting}").as_bytes()).await;

    while let Some(command) = read_line(&mut stream, &log).await {
        log.commands.lock().unwrap().push(command.clone());
        if command == "exit" {
            return;
        }
        let setup = command.starts_with("terminal ");
        if !setup && fault.drops_commands(connection) {
            return;
        }
        let output = match command.as_str() {
            "terminal length 0" | "terminal width 0" => "",
            other => outputs.get(other).copied().unwrap_or("% Invalid input detected"),
        };
        let prompt = if !setup && fault == Fault::PromptStops { "" } else { PROMPT };
        let reply = format!("{command}\r\n{output}\r\n{prompt}");
        if stream.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Reads one line, collecting telnet negotiation replies on the way.
async fn read_line(stream: &mut TcpStream, log: &SwitchLog) -> Option<String> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await.ok()?;
        match byte {
            IAC => {
                let command = stream.read_u8().await.ok()?;
                let option = stream.read_u8().await.ok()?;
                log.negotiation.lock().unwrap().push([command, option]);
            }
            b'\n' => return Some(String::from_utf8_lossy(&line).trim().to_string()),
            b'\r' => {}
            other => line.push(other),
        }
    }
}

fn options() -> SessionOptions {
    SessionOptions::default()
        .with_response_timeout(Duration::from_millis(500))
        .with_spacing(Duration::ZERO, Duration::ZERO)
}

fn credentials() -> Credentials {
    Credentials::new("admin", "secret")
}

#[tokio::test]
async fn login_disables_paging_before_first_command() {
    let (port, log) = spawn_switch(
        HashMap::from([("show version", "Cisco IOS 15.2")]),
        Fault::None,
    )
    .await;

    let mut session = LineSession::open(HOST, port, credentials(), options())
        .await
        .expect("open session");
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.port(), port);
    assert_eq!(session.prompt(), PROMPT);

    let output = session.execute("show version", None).await.expect("show version");
    assert!(output.contains("Cisco IOS 15.2"));
    assert!(!output.ends_with(PROMPT));

    assert_eq!(
        log.commands(),
        vec!["terminal length 0", "terminal width 0", "show version"]
    );
    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn offered_telnet_options_are_refused() {
    let (port, log) = spawn_switch(HashMap::new(), Fault::None).await;

    let mut session = LineSession::open(HOST, port, credentials(), options())
        .await
        .expect("open session");
    session.close().await.unwrap();

    let negotiation = log.negotiation.lock().unwrap().clone();
    // WONT ECHO, DONT SUPPRESS-GO-AHEAD
    assert!(negotiation.contains(&[252, 1]));
    assert!(negotiation.contains(&[254, 3]));
}

#[tokio::test]
async fn wrong_password_is_an_authentication_failure() {
    let (port, _log) = spawn_switch(HashMap::new(), Fault::None).await;

    let credentials = Credentials::new("admin", "wrong");
    let result = LineSession::open(HOST, port, credentials, options()).await;
    assert!(matches!(result, Err(ConnectError::AuthenticationFailure(_))));
}

#[tokio::test]
async fn unexpected_prompt_after_login_is_an_authentication_failure() {
    let (port, log) = spawn_switch(HashMap::new(), Fault::WrongPrompt).await;

    let started = tokio::time::Instant::now();
    let result = LineSession::open(HOST, port, credentials(), options()).await;

    assert!(matches!(result, Err(ConnectError::AuthenticationFailure(_))));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(log.commands().is_empty());
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = LineSession::open("127.0.0.1", port, credentials(), options()).await;
    assert!(matches!(result, Err(ConnectError::ConnectFailed(..))));
}

#[tokio::test]
async fn dropped_connection_is_retried_on_a_new_session() {
    let (port, log) = spawn_switch(
        HashMap::from([("show version", "Cisco IOS 15.2")]),
        Fault::DropFirstCommand,
    )
    .await;

    let mut session = LineSession::open(HOST, port, credentials(), options())
        .await
        .expect("open session");
    let output = session.execute("show version", None).await.expect("retried");

    assert!(output.contains("Cisco IOS 15.2"));
    assert_eq!(log.connections.load(Ordering::SeqCst), 2);
    assert!(session.is_connected());
}

#[tokio::test]
async fn retries_are_bounded() {
    let (port, log) = spawn_switch(HashMap::new(), Fault::DropEveryCommand).await;

    let mut session = LineSession::open(HOST, port, credentials(), options())
        .await
        .expect("open session");
    let err = session
        .execute("show version", None)
        .await
        .expect_err("every attempt is dropped");

    match err {
        ConnectError::RetriesExhausted { command, attempts } => {
            assert_eq!(command, "show version");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(log.connections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_prompt_mid_session_exhausts_retries() {
    let (port, log) = spawn_switch(
        HashMap::from([("show version", "Cisco IOS 15.2")]),
        Fault::PromptStops,
    )
    .await;

    let mut session = LineSession::open(HOST, port, credentials(), options())
        .await
        .expect("open session");
    let err = session
        .execute("show version", None)
        .await
        .expect_err("prompt never returns");

    assert!(matches!(
        err,
        ConnectError::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(log.connections.load(Ordering::SeqCst), 3);
    assert_eq!(session.state(), SessionState::Failed);
}

const MAC_TABLE: &str = "          Mac Address Table\r
-------------------------------------------\r
\r
Vlan    Mac Address       Type        Ports\r
----    -----------       --------    -----\r
  10    0011.2233.4455    DYNAMIC     Gi1/0/5\r
  20    0011.2233.4466    STATIC      Gi1/0/6\r
Total Mac Addresses for this criterion: 2";

#[tokio::test]
async fn catalog_operation_runs_over_telnet() {
    let (port, _log) = spawn_switch(
        HashMap::from([(
            "show mac address-table",
            MAC_TABLE,
        )]),
        Fault::None,
    )
    .await;

    let mut session = LineSession::open(HOST, port, credentials(), options())
        .await
        .expect("open session");
    let records = Operation::ShowMacAddressTable
        .run(&mut session)
        .await
        .expect("mac table");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("macaddress"), Some("0011.2233.4455"));
    assert_eq!(records[1].get("port"), Some("Gi1/0/6"));
    assert!(records.iter().all(|record| record.hostname() == Some(HOST)));
}

#[tokio::test]
async fn recorded_session_replays_offline() {
    let (port, _log) = spawn_switch(
        HashMap::from([("show version", "Cisco IOS 15.2")]),
        Fault::None,
    )
    .await;
    let recorder = SessionRecorder::new(SessionRecordLevel::KeyEventsOnly);

    let mut session = LineSession::open_with_recorder(
        HOST,
        port,
        credentials(),
        options(),
        Some(recorder.clone()),
    )
    .await
    .expect("open session");
    let live = session.execute("show version", None).await.unwrap();
    session.close().await.unwrap();

    let jsonl = recorder.to_jsonl().unwrap();
    let mut replayer = SessionReplayer::from_jsonl(&jsonl).unwrap();
    assert_eq!(replayer.replay_next("show version").unwrap(), live);
}
