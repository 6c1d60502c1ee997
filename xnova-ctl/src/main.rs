/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use xnova::command::MAX_COMMAND_LEN;
use xnova::config::DEFAULT_SOCKET_PATH;

/// Send one command to a running xnovad.
///
/// Example:
///   xnova-ctl open
///   xnova-ctl -s /tmp/xnova.sock autoclose
#[derive(Debug, Parser)]
#[command(name = "xnova-ctl", about = "Send a command to xnovad", long_about = None)]
struct Cli {
    /// open, close or autoclose.
    command: String,

    /// xnovad command socket.
    #[arg(short = 's', long = "socket", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,
}

fn frame(command: &str) -> Result<Vec<u8>> {
    let mut frame = command.as_bytes().to_vec();
    frame.push(b'\n');
    if frame.len() > MAX_COMMAND_LEN {
        bail!("command '{}' is too long", command);
    }
    Ok(frame)
}

async fn send(socket: &PathBuf, command: &str) -> Result<String> {
    let frame = frame(command)?;

    let stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("Cannot connect to {}", socket.display()))?;
    let (read, mut write) = stream.into_split();
    write.write_all(&frame).await?;
    write.shutdown().await?;

    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("xnovad closed the connection without replying")?;
    Ok(reply)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match send(&cli.socket, &cli.command).await {
        Ok(reply) if reply.starts_with("ok") => println!("{}", reply),
        Ok(reply) => {
            eprintln!("{}", reply);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("xnova-ctl: {:#}", e);
            process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_appends_newline() {
        assert_eq!(frame("autoclose").unwrap(), b"autoclose\n".to_vec());
    }

    #[test]
    fn frame_rejects_overlong_commands() {
        assert!(frame("autoclose-now").is_err());
    }
}
