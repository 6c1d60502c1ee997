/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command channel on a Unix-domain stream socket.
//!
//! Every newline-terminated line a client sends is handed to the
//! [`CommandDispatcher`] as one write, and answered with one line:
//!
//! | Outcome | Reply |
//! |---|---|
//! | accepted | `ok <bytes consumed>` |
//! | malformed | `error: invalid command` |
//! | pulse running | `error: busy` |
//! | shutting down | `error: shutting down` |
//! | anything else | `error: unavailable` |
//!
//! A line longer than [`MAX_COMMAND_LEN`] bytes gets `error: invalid command`
//! and the connection is closed, since the rest of it cannot be framed.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::activation::ActivationError;
use crate::command::{CommandDispatcher, DispatchError, MAX_COMMAND_LEN};

pub const REPLY_INVALID: &str = "error: invalid command";
pub const REPLY_BUSY: &str = "error: busy";
pub const REPLY_CLOSED: &str = "error: shutting down";
pub const REPLY_UNAVAILABLE: &str = "error: unavailable";

/// Reply line (without the trailing newline) for one write.
pub fn reply_for(result: &Result<usize, DispatchError>) -> String {
    match result {
        Ok(n) => format!("ok {n}"),
        Err(DispatchError::InvalidCommand(_)) => REPLY_INVALID.to_string(),
        Err(DispatchError::Activation(ActivationError::Busy)) => REPLY_BUSY.to_string(),
        Err(DispatchError::Activation(ActivationError::Closed)) => REPLY_CLOSED.to_string(),
        Err(DispatchError::Activation(_)) => REPLY_UNAVAILABLE.to_string(),
    }
}

pub struct CommandServer {
    listener: UnixListener,
    path: PathBuf,
    dispatcher: CommandDispatcher,
}

impl CommandServer {
    /// Binds `path`, replacing a stale socket file left by a previous run.
    pub fn bind(path: &Path, dispatcher: CommandDispatcher) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create socket directory: {}", dir.display()))?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Cannot remove stale socket: {}", path.display()))
            }
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Cannot bind command socket: {}", path.display()))?;
        info!("Command socket listening on {}", path.display());

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            dispatcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections until `shutdown` completes, then removes the
    /// socket file.  Connections already open are served to completion in
    /// their own tasks.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let dispatcher = self.dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, dispatcher).await {
                                debug!("Command connection closed with error: {}", e);
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept command connection: {}", e),
                },
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Cannot remove socket {}: {}", self.path.display(), e);
        }
        info!("Command socket closed");
    }
}

async fn handle_connection(stream: UnixStream, dispatcher: CommandDispatcher) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut frame = Vec::with_capacity(MAX_COMMAND_LEN + 1);

    loop {
        frame.clear();
        // One byte past the limit is enough to tell an oversized line apart.
        let n = (&mut reader)
            .take(MAX_COMMAND_LEN as u64 + 1)
            .read_until(b'\n', &mut frame)
            .await?;
        if n == 0 {
            return Ok(());
        }

        let oversized = n > MAX_COMMAND_LEN;
        let result = dispatcher.write(&frame);
        let mut reply = reply_for(&result);
        reply.push('\n');
        write.write_all(reply.as_bytes()).await?;

        if oversized {
            return Ok(());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use crate::config::Timing;
    use crate::controller::Controller;
    use crate::gpio::{Line, RecordingLines};

    struct Rig {
        _dir: tempfile::TempDir,
        path: PathBuf,
        lines: Arc<RecordingLines>,
        stop: oneshot::Sender<()>,
        served: tokio::task::JoinHandle<()>,
    }

    fn serve() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("xnova.sock");
        let lines = Arc::new(RecordingLines::new());
        let controller = Controller::start(lines.clone(), Timing::default());
        let server = CommandServer::bind(&path, controller.dispatcher()).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let served = tokio::spawn(server.serve(async {
            let _ = stopped.await;
        }));
        Rig {
            _dir: dir,
            path,
            lines,
            stop,
            served,
        }
    }

    async fn roundtrip(path: &Path, sent: &[u8]) -> Vec<String> {
        let stream = UnixStream::connect(path).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(sent).await.unwrap();
        write.shutdown().await.unwrap();

        let mut replies = Vec::new();
        let mut lines = BufReader::new(read).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            replies.push(line);
        }
        replies
    }

    #[test]
    fn replies_match_outcomes() {
        assert_eq!(reply_for(&Ok(5)), "ok 5");
        assert_eq!(
            reply_for(&Err(DispatchError::Activation(ActivationError::Busy))),
            REPLY_BUSY
        );
        assert_eq!(
            reply_for(&Err(DispatchError::Activation(ActivationError::Aborted))),
            REPLY_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn open_over_the_socket() {
        let rig = serve();
        let replies = roundtrip(&rig.path, b"open\n").await;
        assert_eq!(replies, vec!["ok 5"]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rig.lines.level(Line::Open), "pulse is running");
    }

    #[tokio::test]
    async fn several_commands_on_one_connection() {
        let rig = serve();
        let replies = roundtrip(&rig.path, b"launch\nclose\nopen\n").await;
        assert_eq!(replies, vec![REPLY_INVALID, "ok 6", REPLY_BUSY]);
    }

    #[tokio::test]
    async fn unterminated_final_command_is_still_a_write() {
        let rig = serve();
        let replies = roundtrip(&rig.path, b"autoclose").await;
        assert_eq!(replies, vec!["ok 9"]);
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_and_connection_closed() {
        let rig = serve();
        let replies = roundtrip(&rig.path, &[b'z'; 50]).await;
        assert_eq!(replies, vec![REPLY_INVALID]);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rig.lines.edges(Line::Open).is_empty());
        assert!(rig.lines.edges(Line::Autoclose).is_empty());
    }

    #[tokio::test]
    async fn stopping_removes_the_socket_file() {
        let rig = serve();
        assert!(rig.path.exists());

        rig.stop.send(()).unwrap();
        rig.served.await.unwrap();
        assert!(!rig.path.exists());
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xnova.sock");
        std::fs::write(&path, b"stale").unwrap();

        let lines = Arc::new(RecordingLines::new());
        let controller = Controller::start(lines, Timing::default());
        let server = CommandServer::bind(&path, controller.dispatcher()).unwrap();
        assert_eq!(server.path(), path.as_path());
    }
}
