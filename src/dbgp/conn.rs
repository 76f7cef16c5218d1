//! DBGP connection loop
//!
//! Sends the init handshake, then reads one command at a time, routes it to
//! the backend and writes back a response or error envelope. Backend failures
//! are answered and the loop continues; only stream I/O failures end it.

use base64::Engine;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};

use crate::backend::Backend;
use crate::common::{Error, Result};

use super::codec::{self, DEFAULT_MAX_MESSAGE_BYTES};
use super::command::{self, Command};
use super::path_from_uri;
use super::response::{self, Payload};
use super::types::{Feature, Property};

/// Upstream connection to an IDE or DBGP proxy
pub struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    backend: Box<dyn Backend>,
    max_message_bytes: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, backend: Box<dyn Backend>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            backend,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Limit the size of inbound commands
    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    /// Serve the connection until the peer closes it
    pub async fn run(mut self) -> Result<()> {
        self.init().await?;

        loop {
            let Some(raw) = codec::read_command(&mut self.reader, self.max_message_bytes).await?
            else {
                tracing::info!("Peer closed the connection");
                return Ok(());
            };

            let reply = match String::from_utf8(raw) {
                Ok(line) => self.handle_line(&line).await?,
                Err(e) => {
                    let line = String::from_utf8_lossy(e.as_bytes()).into_owned();
                    tracing::warn!("Command is not valid UTF-8: {:?}", line);
                    let (name, txn) = command::salvage(&line);
                    let error = Error::Parse("command is not valid UTF-8".to_string());
                    response::encode_error(&name, txn, &error)?
                }
            };
            codec::write_xml(&mut self.writer, &reply).await?;
        }
    }

    async fn init(&mut self) -> Result<()> {
        let init = self.backend.init().await?;
        tracing::info!(
            language = %init.language,
            fileuri = %init.file_uri,
            "Session initialized"
        );
        let xml = response::encode_init(&init)?;
        codec::write_xml(&mut self.writer, &xml).await
    }

    /// Encoded reply for one raw command line
    async fn handle_line(&mut self, line: &str) -> Result<String> {
        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!("Malformed command {:?}: {}", line, e);
                let (name, txn) = command::salvage(line);
                return response::encode_error(&name, txn, &e);
            }
        };

        tracing::debug!(command = %cmd.name, txn = cmd.transaction_id, "Dispatching command");
        match self.dispatch(&cmd).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::debug!(command = %cmd.name, "Command failed: {}", e);
                response::encode_error(&cmd.name, cmd.transaction_id, &e)
            }
        }
    }

    async fn dispatch(&mut self, cmd: &Command) -> Result<String> {
        let name = cmd.name.as_str();
        let txn = cmd.transaction_id;

        match name {
            "status" => {
                let attrs = [
                    ("status", self.backend.status().to_string()),
                    ("reason", "ok".to_string()),
                ];
                response::encode_response(name, txn, &attrs, Payload::Empty)
            }

            "step_into" | "step_over" => {
                let (status, reason) = if name == "step_into" {
                    self.backend.step_into().await?
                } else {
                    self.backend.step_over().await?
                };
                let attrs = [("status", status.to_string()), ("reason", reason.to_string())];
                response::encode_response(name, txn, &attrs, Payload::Empty)
            }

            "stack_depth" => {
                let depth = self.backend.stack_depth().await?;
                response::encode_response(name, txn, &[("depth", depth.to_string())], Payload::Empty)
            }

            "stack_get" => {
                let depth = cmd.int_flag::<u32>('d')?;
                let frames = self.backend.stack_get(depth).await?;
                response::encode_response(name, txn, &[], Payload::Stack(&frames))
            }

            "context_names" => {
                let contexts = self.backend.context_names(cmd.depth()?).await?;
                response::encode_response(name, txn, &[], Payload::Contexts(&contexts))
            }

            "context_get" => {
                let context = cmd.context_id()?;
                let properties = self.backend.context_get(cmd.depth()?, context).await?;
                response::encode_response(
                    name,
                    txn,
                    &[("context", context.to_string())],
                    Payload::Properties(&properties),
                )
            }

            "property_get" => {
                let var = required(cmd, 'n')?;
                let value = self
                    .backend
                    .property_get(cmd.depth()?, cmd.context_id()?, var)
                    .await?;
                let property = Property {
                    name: var.to_string(),
                    full_name: var.to_string(),
                    value: Some(value),
                    ..Default::default()
                };
                response::encode_response(name, txn, &[], Payload::Properties(&[property]))
            }

            "feature_get" => {
                let feature_name = required(cmd, 'n')?;
                let value = Feature::from_name(feature_name)
                    .map(|feature| feature.value(&self.backend.features()));
                let attrs = [
                    ("feature_name", feature_name.to_string()),
                    ("supported", u8::from(value.is_some()).to_string()),
                ];
                match &value {
                    Some(value) => response::encode_response(name, txn, &attrs, Payload::Text(value)),
                    None => response::encode_response(name, txn, &attrs, Payload::Empty),
                }
            }

            "breakpoint_set" => {
                let kind = required(cmd, 't')?;
                let file = cmd.str_flag('f').unwrap_or_default();
                let line = cmd
                    .int_flag::<u32>('n')?
                    .ok_or_else(|| Error::InvalidOptions("missing line number (-n)".to_string()))?;

                let bp = self.backend.breakpoint_set(kind, file, line).await?;
                let attrs = [("state", bp.state.to_string()), ("id", bp.id.to_string())];
                response::encode_response(name, txn, &attrs, Payload::Empty)
            }

            "source" => {
                let content = read_source(cmd).await?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(content);
                let raw = format!("<![CDATA[{}]]>", encoded);
                response::encode_response(
                    name,
                    txn,
                    &[("encoding", "base64".to_string())],
                    Payload::Raw(&raw),
                )
            }

            _ => Err(Error::Unimplemented(name.to_string())),
        }
    }
}

fn required(cmd: &Command, flag: char) -> Result<&str> {
    cmd.str_flag(flag)
        .ok_or_else(|| Error::InvalidOptions(format!("missing required flag -{}", flag)))
}

/// File content for the `source` command, optionally limited to lines `-b`..=`-e`
async fn read_source(cmd: &Command) -> Result<Vec<u8>> {
    let uri = required(cmd, 'f')?;
    let path = path_from_uri(uri);
    let content = tokio::fs::read(path).await.map_err(|e| Error::FileRead {
        path: path.to_string(),
        error: e.to_string(),
    })?;

    let begin = cmd.int_flag::<usize>('b')?;
    let end = cmd.int_flag::<usize>('e')?;
    if begin.is_none() && end.is_none() {
        return Ok(content);
    }

    let begin = begin.unwrap_or(1).max(1);
    let end = end.unwrap_or(usize::MAX);
    Ok(content
        .split_inclusive(|b| *b == b'\n')
        .enumerate()
        .filter(|(i, _)| (begin..=end).contains(&(i + 1)))
        .flat_map(|(_, line)| line.iter().copied())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbgp::codec::read_message;
    use crate::dbgp::types::{
        Breakpoint, BreakpointState, Context, DebuggerState, Features, FrameType, InitResponse,
        Stack, StopReason,
    };
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    /// Backend returning canned values and recording every call
    #[derive(Default)]
    struct FakeBackend {
        state: DebuggerState,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeBackend {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn init(&mut self) -> Result<InitResponse> {
            Ok(InitResponse {
                app_id: "fake".to_string(),
                ide_key: "KEY".to_string(),
                thread: "1".to_string(),
                language: "c".to_string(),
                file_uri: "file:///src/a.c".to_string(),
                ..Default::default()
            })
        }

        fn status(&self) -> DebuggerState {
            self.state
        }

        fn features(&self) -> Features {
            Features {
                supports_async: false,
                language_name: "c".to_string(),
            }
        }

        async fn step_into(&mut self) -> Result<(DebuggerState, StopReason)> {
            self.record("step_into".to_string());
            self.state = DebuggerState::Break;
            Ok((self.state, StopReason::Ok))
        }

        async fn step_over(&mut self) -> Result<(DebuggerState, StopReason)> {
            self.record("step_over".to_string());
            self.state = DebuggerState::Break;
            Ok((self.state, StopReason::Ok))
        }

        async fn stack_depth(&mut self) -> Result<u32> {
            Ok(2)
        }

        async fn stack_get(&mut self, depth: Option<u32>) -> Result<Vec<Stack>> {
            self.record(format!("stack_get {:?}", depth));
            Ok(vec![Stack {
                level: depth.unwrap_or(0),
                frame_type: FrameType::File,
                filename: "file:///src/a.c".to_string(),
                line: 7,
                r#where: Some("main".to_string()),
            }])
        }

        async fn context_names(&mut self, _depth: u32) -> Result<Vec<Context>> {
            Ok(vec![Context {
                name: "Local".to_string(),
                id: 0,
            }])
        }

        async fn context_get(&mut self, depth: u32, context: u32) -> Result<Vec<Property>> {
            self.record(format!("context_get {} {}", depth, context));
            Ok(vec![Property {
                name: "x".to_string(),
                full_name: "x".to_string(),
                data_type: "int".to_string(),
                address: Some("0x1".to_string()),
                value: Some("0x1".to_string()),
                ..Default::default()
            }])
        }

        async fn property_get(&mut self, _depth: u32, _context: u32, name: &str) -> Result<String> {
            match name {
                "n" => Ok("10".to_string()),
                other => Err(Error::NoOutput(format!("print {}", other))),
            }
        }

        async fn breakpoint_set(&mut self, kind: &str, file: &str, line: u32) -> Result<Breakpoint> {
            self.record(format!("breakpoint_set {} {} {}", kind, file, line));
            Ok(Breakpoint {
                id: 3,
                state: BreakpointState::Enabled,
            })
        }
    }

    struct Peer {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
        server: JoinHandle<Result<()>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Peer {
        async fn start() -> (Self, String) {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let backend = FakeBackend::default();
            let calls = backend.calls.clone();
            let server = tokio::spawn(Connection::new(server, Box::new(backend)).run());

            let (reader, writer) = tokio::io::split(client);
            let mut peer = Self {
                reader: BufReader::new(reader),
                writer,
                server,
                calls,
            };
            let init = peer.recv().await;
            (peer, init)
        }

        async fn recv(&mut self) -> String {
            let payload = read_message(&mut self.reader, DEFAULT_MAX_MESSAGE_BYTES)
                .await
                .unwrap()
                .expect("message");
            String::from_utf8(payload).unwrap()
        }

        async fn send(&mut self, command: &str) -> String {
            self.writer.write_all(command.as_bytes()).await.unwrap();
            self.writer.write_all(b"\0").await.unwrap();
            self.recv().await
        }

        async fn close(self) -> Result<()> {
            drop(self.writer);
            drop(self.reader);
            self.server.await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_init_is_sent_first() {
        let (peer, init) = Peer::start().await;
        assert!(init.starts_with(codec::XML_DECLARATION));
        assert!(init.contains("<init "));
        assert!(init.contains(r#"idekey="KEY""#));
        assert!(init.contains(r#"fileuri="file:///src/a.c""#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_id_and_command_are_echoed() {
        let (mut peer, _) = Peer::start().await;
        for (cmd, name, txn) in [
            ("status -i 1", "status", 1),
            ("stack_depth -i 22", "stack_depth", 22),
            ("context_names -i 305", "context_names", 305),
        ] {
            let reply = peer.send(cmd).await;
            assert!(reply.contains(&format!(r#"command="{}""#, name)), "{}", reply);
            assert!(reply.contains(&format!(r#"transaction_id="{}""#, txn)), "{}", reply);
        }
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_and_steps() {
        let (mut peer, _) = Peer::start().await;
        let reply = peer.send("status -i 1").await;
        assert!(reply.contains(r#"status="starting""#));

        let reply = peer.send("step_into -i 2").await;
        assert!(reply.contains(r#"status="break" reason="ok""#));
        let reply = peer.send("step_over -i 3").await;
        assert!(reply.contains(r#"command="step_over""#));

        let reply = peer.send("status -i 4").await;
        assert!(reply.contains(r#"status="break""#));
        assert_eq!(
            *peer.calls.lock().unwrap(),
            vec!["step_into".to_string(), "step_over".to_string()]
        );
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (mut peer, _) = Peer::start().await;
        let reply = peer.send("frobnicate -i 1").await;
        assert!(reply.contains(r#"command="frobnicate" transaction_id="1""#));
        assert!(reply.contains(r#"<error code="4">"#));

        // the loop keeps serving
        let reply = peer.send("stack_depth -i 2").await;
        assert!(reply.contains(r#"depth="2""#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_command() {
        let (mut peer, _) = Peer::start().await;
        let reply = peer.send("status -i one").await;
        assert!(reply.contains(r#"command="status" transaction_id="0""#));
        assert!(reply.contains(r#"<error code="1">"#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_utf8_command() {
        let (mut peer, _) = Peer::start().await;
        peer.writer.write_all(b"status -i 4 -n \xff\xfe\0").await.unwrap();
        let reply = peer.recv().await;
        assert!(reply.contains(r#"command="status" transaction_id="4""#), "{}", reply);
        assert!(reply.contains(r#"<error code="1">"#), "{}", reply);

        let reply = peer.send("status -i 5").await;
        assert!(reply.contains(r#"status="starting""#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_command_ends_connection() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(
            Connection::new(server, Box::new(FakeBackend::default()))
                .with_max_message_bytes(32)
                .run(),
        );
        let (reader, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(reader);
        read_message(&mut reader, DEFAULT_MAX_MESSAGE_BYTES)
            .await
            .unwrap()
            .expect("init");

        writer.write_all(&[b'x'; 4096]).await.unwrap();
        let result = server.await.unwrap();
        assert!(matches!(result, Err(Error::MessageTooLarge(33))));
    }

    #[tokio::test]
    async fn test_breakpoint_set() {
        let (mut peer, _) = Peer::start().await;
        let reply = peer
            .send("breakpoint_set -i 5 -t line -f file:///src/a.c -n 10")
            .await;
        assert!(reply.contains(r#"state="enabled" id="3""#), "{}", reply);
        assert!(peer
            .calls
            .lock()
            .unwrap()
            .contains(&"breakpoint_set line file:///src/a.c 10".to_string()));

        let reply = peer
            .send("breakpoint_set -i 6 -t line -f file:///src/a.c -n ten")
            .await;
        assert!(reply.contains(r#"transaction_id="6""#));
        assert!(reply.contains(r#"<error code="999">"#));

        let reply = peer.send("breakpoint_set -i 7 -f file:///src/a.c -n 3").await;
        assert!(reply.contains(r#"<error code="3">"#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stack_and_context_payloads() {
        let (mut peer, _) = Peer::start().await;
        let reply = peer.send("stack_get -i 8 -d 1").await;
        assert!(reply.contains(r#"<stack level="1" type="file" filename="file:///src/a.c" lineno="7" where="main"/>"#));

        let reply = peer.send("context_names -i 9").await;
        assert!(reply.contains(r#"<context name="Local" id="0"/>"#));

        let reply = peer.send("context_get -i 10 -d 0 -c 0").await;
        assert!(reply.contains(r#"context="0""#));
        assert!(reply.contains(r#"<property name="x" fullname="x" type="int" address="0x1">0x1</property>"#));

        assert_eq!(
            *peer.calls.lock().unwrap(),
            vec!["stack_get Some(1)".to_string(), "context_get 0 0".to_string()]
        );
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_property_get() {
        let (mut peer, _) = Peer::start().await;
        let reply = peer.send("property_get -i 11 -n n").await;
        assert!(reply.contains(r#"<property name="n" fullname="n">10</property>"#), "{}", reply);

        let reply = peer.send("property_get -i 12 -n missing").await;
        assert!(reply.contains(r#"<error code="999">"#));

        let reply = peer.send("property_get -i 13").await;
        assert!(reply.contains(r#"<error code="3">"#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_feature_get() {
        let (mut peer, _) = Peer::start().await;
        let reply = peer.send("feature_get -i 14 -n language_name").await;
        assert!(reply.contains(r#"feature_name="language_name" supported="1">c</response>"#));

        let reply = peer.send("feature_get -i 15 -n supports_async").await;
        assert!(reply.contains(r#"supported="1">0</response>"#));

        let reply = peer.send("feature_get -i 16 -n max_depth").await;
        assert!(reply.contains(r#"feature_name="max_depth" supported="0"/>"#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "int main() {{\n  return 0;\n}}\n").unwrap();
        let uri = format!("file://{}", file.path().display());

        let (mut peer, _) = Peer::start().await;
        let reply = peer.send(&format!("source -i 17 -f {}", uri)).await;
        let expected = base64::engine::general_purpose::STANDARD.encode("int main() {\n  return 0;\n}\n");
        assert!(reply.contains(r#"encoding="base64""#));
        assert!(reply.contains(&format!("<![CDATA[{}]]></response>", expected)));

        let reply = peer.send(&format!("source -i 18 -f {} -b 2 -e 2", uri)).await;
        let expected = base64::engine::general_purpose::STANDARD.encode("  return 0;\n");
        assert!(reply.contains(&format!("<![CDATA[{}]]>", expected)));

        let reply = peer.send("source -i 19 -f file:///nonexistent/a.c").await;
        assert!(reply.contains(r#"<error code="999">"#));
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_clean_close_ends_run() {
        let (peer, _) = Peer::start().await;
        assert!(peer.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_truncated_command_is_an_error() {
        let (mut peer, _) = Peer::start().await;
        peer.writer.write_all(b"status -i 1").await.unwrap();
        assert!(matches!(peer.close().await, Err(Error::Framing(_))));
    }
}
