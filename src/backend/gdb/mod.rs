//! gdb console backend
//!
//! Drives an interactive gdb through its stdin/stdout, turning console text
//! into DBGP entities. gdb is started in the `starting` state; the first step
//! command sets an initial breakpoint, runs the target and moves to `break`,
//! where every later step keeps it.

mod console;
pub mod parse;

use std::path::Path;

use async_trait::async_trait;

use crate::common::{config::GdbConfig, Error, Result};
use crate::dbgp::types::{
    Breakpoint, BreakpointState, Context, DebuggerState, Features, FrameType, InitResponse,
    Property, Stack, StopReason,
};
use crate::dbgp::{path_from_uri, uri_from_path};

use super::{Backend, SessionIdentity};

pub use console::{ConsoleOutput, GdbConsole};

/// The only breakpoint type gdb is driven with
const LINE_BREAKPOINT: &str = "line";

/// Backend driving a gdb console
pub struct GdbAdapter {
    console: GdbConsole,
    state: DebuggerState,
    identity: SessionIdentity,
    /// Commands sent once during init
    setup: Vec<String>,
    features: Features,
}

impl GdbAdapter {
    /// Start gdb on `target`
    pub fn spawn(config: &GdbConfig, target: &Path, identity: SessionIdentity) -> Result<Self> {
        let program = config.resolve_path()?;
        let console = GdbConsole::spawn(
            &program,
            &config.args,
            target,
            config.idle_window(),
            &config.prompt,
        )?;
        Ok(Self::with_console(console, config.setup.clone(), identity))
    }

    /// Wrap an already running console
    pub fn with_console(console: GdbConsole, setup: Vec<String>, identity: SessionIdentity) -> Self {
        Self {
            console,
            state: DebuggerState::Starting,
            identity,
            setup,
            features: Features::default(),
        }
    }

    /// Send one command and collect its output
    async fn exec(&mut self, command: &str) -> Result<ConsoleOutput> {
        self.console.send(command)?;
        Ok(self.console.collect().await)
    }

    /// Send several commands, then collect their combined output
    async fn exec_all<S: AsRef<str>>(&mut self, commands: &[S]) -> Result<ConsoleOutput> {
        for command in commands {
            self.console.send(command.as_ref())?;
        }
        Ok(self.console.collect().await)
    }

    /// Set the initial breakpoint and run the target
    async fn start(&mut self) -> Result<()> {
        let output = self.exec_all(&["break 1", "run"]).await?;
        self.state = DebuggerState::Break;
        tracing::info!(lines = output.stdout.len(), "Target started");
        tracing::debug!("start: {:?}", output.stdout);
        Ok(())
    }

    async fn step(&mut self, command: &str) -> Result<(DebuggerState, StopReason)> {
        if self.state == DebuggerState::Starting {
            self.start().await?;
        }
        let output = self.exec(command).await?;
        tracing::debug!("{}: {:?}", command, output.stdout);

        let reason = if output.stderr.is_empty() {
            StopReason::Ok
        } else {
            tracing::warn!("{} reported: {}", command, output.stderr.join(" | "));
            StopReason::Error
        };
        Ok((self.state, reason))
    }

    /// Current source file and language
    async fn current_source(&mut self) -> Result<parse::SourceInfo> {
        let output = self.exec("info source").await?;
        parse::parse_source_info(&output.stdout)
    }

    /// Type of a symbol in the selected frame
    async fn type_of(&mut self, symbol: &str) -> Result<String> {
        let output = self.exec(&format!("ptype {}", symbol)).await?;
        Ok(parse::parse_type(&output.stdout))
    }

    async fn select_frame(&mut self, depth: u32) -> Result<()> {
        if depth == 0 {
            return Ok(());
        }
        let command = format!("frame {}", depth);
        let output = self.exec(&command).await?;
        if !output.stderr.is_empty() {
            return Err(Error::console_output(&command, &output.stderr));
        }
        Ok(())
    }

    async fn restore_frame(&mut self, depth: u32) {
        if depth == 0 {
            return;
        }
        if let Err(e) = self.exec("frame 0").await {
            tracing::warn!("Failed to reselect innermost frame: {}", e);
        }
    }

    fn check_context(context: u32) -> Result<()> {
        if context != 0 {
            return Err(Error::InvalidOptions(format!("unknown context id {}", context)));
        }
        Ok(())
    }

    /// stdout of a listing command; an answer only on stderr is an error
    async fn listing(&mut self, command: &str) -> Result<Vec<String>> {
        let output = self.exec(command).await?;
        if output.stdout.is_empty() && !output.stderr.is_empty() {
            return Err(Error::console_output(command, &output.stderr));
        }
        Ok(output.stdout)
    }

    async fn read_locals(&mut self) -> Result<Vec<Property>> {
        let mut lines = self.listing("info locals").await?;
        lines.extend(self.listing("info args").await?);

        let mut properties = Vec::new();
        for line in &lines {
            if let Some(property) = parse::parse_variable(line)? {
                properties.push(property);
            }
        }
        for property in &mut properties {
            property.data_type = self.type_of(&property.name).await?;
        }
        Ok(properties)
    }

    async fn read_value(&mut self, name: &str) -> Result<String> {
        let command = format!("print {}", name);
        let output = self.exec(&command).await?;
        match output.stdout.first() {
            Some(line) => parse::parse_value(line),
            None if !output.stderr.is_empty() => {
                Err(Error::console_output(&command, &output.stderr))
            }
            None => Err(Error::NoOutput(command)),
        }
    }
}

#[async_trait]
impl Backend for GdbAdapter {
    #[tracing::instrument(skip(self))]
    async fn init(&mut self) -> Result<InitResponse> {
        let banner = self.console.collect().await;
        tracing::debug!(lines = banner.stdout.len(), "Console banner consumed");

        if !self.setup.is_empty() {
            let setup = self.setup.clone();
            self.exec_all(setup.as_slice()).await?;
        }

        // "info source" has nothing to report until a listing selects a file
        self.exec("list 1").await?;
        let source = self.current_source().await?;
        self.features.language_name = source.language.clone();

        Ok(InitResponse {
            app_id: self.identity.app_id.clone(),
            ide_key: self.identity.ide_key.clone(),
            session: self.identity.session.clone(),
            thread: "1".to_string(),
            parent: String::new(),
            language: source.language,
            file_uri: uri_from_path(&source.path),
        })
    }

    fn status(&self) -> DebuggerState {
        self.state
    }

    fn features(&self) -> Features {
        self.features.clone()
    }

    #[tracing::instrument(skip(self))]
    async fn step_into(&mut self) -> Result<(DebuggerState, StopReason)> {
        self.step("step").await
    }

    #[tracing::instrument(skip(self))]
    async fn step_over(&mut self) -> Result<(DebuggerState, StopReason)> {
        self.step("next").await
    }

    #[tracing::instrument(skip(self))]
    async fn stack_depth(&mut self) -> Result<u32> {
        let output = self.exec("backtrace").await?;
        Ok(parse::parse_backtrace(&output.stdout).len() as u32)
    }

    #[tracing::instrument(skip(self))]
    async fn stack_get(&mut self, depth: Option<u32>) -> Result<Vec<Stack>> {
        let output = self.exec("backtrace").await?;
        let frames = parse::parse_backtrace(&output.stdout);
        if frames.is_empty() {
            return Err(Error::console_output("backtrace", &output.all_lines().collect::<Vec<_>>()));
        }

        let frames: Vec<_> = frames
            .into_iter()
            .filter(|f| depth.map_or(true, |d| f.level == d))
            .collect();
        if frames.is_empty() {
            return Err(Error::InvalidOptions(format!(
                "no stack frame at depth {}",
                depth.unwrap_or_default()
            )));
        }

        // Frame 0 is reported with the absolute path gdb resolved for it
        let source = self.current_source().await?;

        Ok(frames
            .into_iter()
            .map(|frame| {
                let path = match frame.level {
                    0 => source.path.clone(),
                    _ => source.resolve(&frame.file),
                };
                Stack {
                    level: frame.level,
                    frame_type: FrameType::File,
                    filename: uri_from_path(&path),
                    line: frame.line,
                    r#where: Some(frame.function),
                }
            })
            .collect())
    }

    async fn context_names(&mut self, _depth: u32) -> Result<Vec<Context>> {
        Ok(vec![Context {
            name: "Local".to_string(),
            id: 0,
        }])
    }

    #[tracing::instrument(skip(self))]
    async fn context_get(&mut self, depth: u32, context: u32) -> Result<Vec<Property>> {
        Self::check_context(context)?;
        self.select_frame(depth).await?;
        let result = self.read_locals().await;
        self.restore_frame(depth).await;
        result
    }

    #[tracing::instrument(skip(self))]
    async fn property_get(&mut self, depth: u32, context: u32, name: &str) -> Result<String> {
        Self::check_context(context)?;
        self.select_frame(depth).await?;
        let result = self.read_value(name).await;
        self.restore_frame(depth).await;
        result
    }

    #[tracing::instrument(skip(self))]
    async fn breakpoint_set(&mut self, kind: &str, file: &str, line: u32) -> Result<Breakpoint> {
        if kind != LINE_BREAKPOINT {
            return Err(Error::InvalidOptions(format!(
                "breakpoint type '{}' is not supported, only line breakpoints are",
                kind
            )));
        }

        // Without a file gdb places the breakpoint in the current source
        let command = if file.is_empty() {
            format!("break {}", line)
        } else {
            format!("break {}:{}", path_from_uri(file), line)
        };
        let output = self
            .exec_all(&["set breakpoint pending on", command.as_str()])
            .await?;
        let id = parse::parse_breakpoint_id(&output.all_lines().collect::<Vec<_>>())?;

        tracing::info!(id, file, line, "Breakpoint set");
        Ok(Breakpoint {
            id,
            state: BreakpointState::Enabled,
        })
    }
}
