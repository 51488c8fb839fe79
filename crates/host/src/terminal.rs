//! Terminal PTY session using portable-pty.
//!
//! Spawns a login shell attached to a PTY and exposes its I/O as bounded
//! channels the WebSocket bridge selects over. The blocking reader thread
//! applies backpressure through `blocking_send`: when the bridge stops
//! draining, the reader stalls instead of dropping output.

use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, NativePtySystem, PtySize, PtySystem};
use tokio::sync::mpsc;
use tokio::task;

pub(crate) const INITIAL_COLS: u16 = 120;
pub(crate) const INITIAL_ROWS: u16 = 32;

const PTY_READ_BUFFER_BYTES: usize = 32 * 1024;
const IO_CHANNEL_CAPACITY: usize = 64;

/// A live shell attached to a PTY. Owned exclusively by one bridge; dropping
/// the master closes the PTY file and unblocks the reader thread.
pub(crate) struct TerminalSession {
    pub(crate) shell: String,
    /// Kept for resize ioctls.
    pub(crate) master: Box<dyn MasterPty + Send>,
    pub(crate) killer: Box<dyn ChildKiller + Send + Sync>,
    /// Bridge -> PTY bytes.
    pub(crate) input_tx: mpsc::Sender<Vec<u8>>,
    /// PTY -> bridge chunks, in read order.
    pub(crate) output_rx: mpsc::Receiver<Vec<u8>>,
    /// First PTY-side failure (EOF shows up as `UnexpectedEof`). Capacity 1
    /// with non-blocking sends; duplicates are dropped.
    pub(crate) pty_err_rx: mpsc::Receiver<io::Error>,
    /// Child exit code, delivered once.
    pub(crate) exit_rx: mpsc::Receiver<i32>,
}

impl TerminalSession {
    /// Spawn the user's shell on a fresh 120x32 PTY.
    pub(crate) fn spawn() -> Result<Self> {
        let (shell, args) = select_shell();

        let pty_system = NativePtySystem::default();
        let pair = pty_system
            .openpty(PtySize {
                rows: INITIAL_ROWS,
                cols: INITIAL_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to open pty")?;

        let mut cmd = CommandBuilder::new(&shell);
        cmd.args(&args);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        if let Some(home) = dirs::home_dir().filter(|p| !p.as_os_str().is_empty()) {
            cmd.cwd(home);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .context("failed to spawn shell")?;
        drop(pair.slave);

        let killer = child.clone_killer();
        let master = pair.master;
        let mut reader = master
            .try_clone_reader()
            .context("failed to clone pty reader")?;
        let mut writer = master.take_writer().context("failed to take pty writer")?;

        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(IO_CHANNEL_CAPACITY);
        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(IO_CHANNEL_CAPACITY);
        let (pty_err_tx, pty_err_rx) = mpsc::channel::<io::Error>(1);
        let (exit_tx, exit_rx) = mpsc::channel::<i32>(1);

        // PTY -> bridge. Dedicated thread: reads block until the shell
        // produces output or the PTY closes.
        let read_err_tx = pty_err_tx.clone();
        std::thread::spawn(move || {
            let mut buffer = vec![0u8; PTY_READ_BUFFER_BYTES];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => {
                        let _ = read_err_tx
                            .try_send(io::Error::new(io::ErrorKind::UnexpectedEof, "pty closed"));
                        return;
                    }
                    Ok(n) => {
                        if output_tx.blocking_send(buffer[..n].to_vec()).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = read_err_tx.try_send(err);
                        return;
                    }
                }
            }
        });

        // Bridge -> PTY.
        task::spawn_blocking(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if let Err(err) = writer.write_all(&data).and_then(|()| writer.flush()) {
                    let _ = pty_err_tx.try_send(err);
                    return;
                }
            }
        });

        // Child reaper.
        task::spawn_blocking(move || {
            let code = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(_) => -1,
            };
            let _ = exit_tx.try_send(code);
        });

        Ok(Self {
            shell,
            master,
            killer,
            input_tx,
            output_rx,
            pty_err_rx,
            exit_rx,
        })
    }
}

/// `$SHELL` if set, else `/bin/bash`; known shells get `-l` so the user
/// lands in a login shell with their profile loaded.
fn select_shell() -> (String, Vec<String>) {
    let shell = std::env::var("SHELL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string());

    let login = matches!(
        Path::new(&shell).file_name().and_then(|name| name.to_str()),
        Some("bash" | "zsh" | "fish" | "sh")
    );
    let args = if login { vec!["-l".to_string()] } else { Vec::new() };

    (shell, args)
}

/// EOF and EIO from the PTY mean the child has gone away, not that the
/// session failed.
pub(crate) fn is_process_exit_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::UnexpectedEof || err.raw_os_error() == Some(libc::EIO)
}
