//! Engine subprocess transport.
//!
//! Spawns the engine with piped stdin/stdout and speaks GTP over them. The
//! supported command set is read once with `list_commands` at spawn time.

use async_trait::async_trait;
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::gtp::protocol::{self, is_preamble, parse_list_commands, parse_response, Response};
use crate::gtp::transport::GtpTransport;

/// A running GTP engine.
pub struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    supported: HashSet<String>,
    timeout: Option<Duration>,
    alive: bool,
}

impl EngineProcess {
    /// Spawn the engine described by `config` and query its command list.
    pub async fn spawn(config: &EngineConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(SyncError::Config("no engine command configured".to_string()));
        }

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("failed to open engine stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to open engine stdout"))?;

        let mut engine = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            supported: HashSet::new(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            alive: true,
        };

        let list = protocol::Command::list_commands().to_string();
        match engine.send(&list).await {
            Ok(text) => engine.supported = parse_list_commands(&text),
            // Pre-GTP2 engines may lack list_commands; treat as no optional commands.
            Err(SyncError::Command { .. }) => {}
            Err(e) => return Err(e),
        }

        tracing::debug!(
            "Engine `{}` started with {} advertised commands",
            config.command,
            engine.supported.len()
        );

        Ok(engine)
    }

    pub fn supported_commands(&self) -> &HashSet<String> {
        &self.supported
    }

    /// Send `quit` if the engine is still alive and wait for it to exit.
    pub async fn close(mut self) -> Result<()> {
        if self.alive {
            let quit = protocol::Command::quit().to_string();
            if let Err(e) = self.send(&quit).await {
                tracing::warn!("Engine did not acknowledge quit: {}", e);
            }
        }

        let Self {
            mut child, stdin, ..
        } = self;
        drop(stdin);
        child.wait().await?;
        Ok(())
    }

    async fn exchange(&mut self, command: &str) -> Result<Response> {
        let exited = || SyncError::EngineExited {
            command: command.to_string(),
        };

        self.stdin
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(|_| exited())?;
        self.stdin.flush().await.map_err(|_| exited())?;

        let mut block = Vec::new();
        loop {
            let line = self.stdout.next_line().await?.ok_or_else(|| exited())?;
            if block.is_empty() {
                if is_preamble(&line) {
                    continue;
                }
            } else if line.trim().is_empty() {
                break;
            }
            block.push(line);
        }

        parse_response(&block)
    }
}

#[async_trait]
impl GtpTransport for EngineProcess {
    async fn send(&mut self, command: &str) -> Result<String> {
        if !self.alive {
            return Err(SyncError::EngineExited {
                command: command.to_string(),
            });
        }

        tracing::trace!(">> {}", command);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.exchange(command)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout {
                    command: command.to_string(),
                    secs: limit.as_secs(),
                }),
            },
            None => self.exchange(command).await,
        };

        match result {
            Ok(response) => {
                tracing::trace!("<< {:?}", response);
                response.into_result(command)
            }
            Err(e) => {
                // The stream position is unknown after any framing failure.
                self.alive = false;
                tracing::warn!("Engine connection lost: {}", e);
                Err(e)
            }
        }
    }

    fn is_supported(&self, name: &str) -> bool {
        self.supported.contains(name)
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
