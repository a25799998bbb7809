//! The interactive console.
//!
//! A prompt, a handful of local commands, and everything else forwarded
//! verbatim to the server:
//!
//! - empty input does nothing
//! - `exit` and `quit` end the session (the goodbye handshake happens in
//!   the connection's close)
//! - `?` and `? <command>` are rewritten to the server's `help` command
//! - end-of-input (Ctrl+D) and Ctrl+C end the session cleanly
//!
//! A command that hits a lost connection is retried exactly once; the
//! retry reconnects transparently. When stdin is not a terminal, or raw
//! mode is unavailable, the console degrades to a plain line loop with no
//! editing, completion, or history persistence.

use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::MoveToColumn;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::console::completion::candidates;
use crate::console::editor::{LineEditor, RawModeGuard};
use crate::history::History;
use crate::proto::{Connection, ConnectionError};

mod completion;
mod editor;

/// Bold yellow prompt.
const PROMPT: &str = "\x1b[01;33m>\x1b[00m ";

/// Columns the prompt occupies on screen (the ANSI codes are zero-width).
const PROMPT_WIDTH: u16 = 2;

const INTRO: &str = "\x1b[33mInteractive Liquidsoap console, type '?' for help.\x1b[00m";

/// Upper bound on the `help` exchange behind Tab completion. Completion
/// runs in raw mode, where Ctrl+C is an ordinary key event and cannot
/// cancel a pending exchange.
const HELP_TIMEOUT: Duration = Duration::from_secs(2);

/// What one line of input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    /// Blank line, nothing to do.
    Empty,
    /// Leave the console.
    Exit,
    /// A command for the server.
    Forward(String),
}

/// How the session should proceed after a command.
enum Flow {
    Continue,
    Quit,
    /// Stop and report: the server was never reachable.
    Fatal(ConnectionError),
}

/// What reading one line produced.
enum ReadOutcome {
    Line(String),
    Interrupted,
    Eof,
}

/// Sort one line of input into the local commands and the rest.
fn classify(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line == "exit" || line == "quit" {
        return Input::Exit;
    }
    if let Some(topic) = line.strip_prefix('?') {
        let topic = topic.trim();
        return Input::Forward(if topic.is_empty() {
            "help".to_string()
        } else {
            format!("help {}", topic)
        });
    }
    Input::Forward(line.to_string())
}

/// One command through the connection, retrying once on a lost link.
///
/// The retry re-invokes `send`, which reconnects transparently; a second
/// consecutive failure is handed back untouched.
async fn send_retry(conn: &mut Connection, command: &str) -> Result<String, ConnectionError> {
    match conn.send(command).await {
        Err(err) if err.is_lost() => {
            warn!("connection lost, retrying {:?}", command);
            conn.send(command).await
        }
        other => other,
    }
}

/// Run one server command and report how the session should proceed.
///
/// An initial connect failure ends the session; every later error is
/// reported and the prompt comes back.
async fn forward(conn: &mut Connection, command: &str, connected_once: &mut bool) -> Flow {
    let result = tokio::select! {
        result = send_retry(conn, command) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted.");
            return Flow::Quit;
        }
    };

    match result {
        Ok(response) => {
            *connected_once = true;
            println!("{}", response);
            Flow::Continue
        }
        Err(err @ ConnectionError::Connect { .. }) if !*connected_once => Flow::Fatal(err),
        Err(err) => {
            eprintln!("error: {}", err);
            Flow::Continue
        }
    }
}

/// The interactive shell over one connection.
#[derive(Debug)]
pub struct Console {
    history: History,
}

impl Console {
    pub fn new(history: History) -> Self {
        Self { history }
    }

    /// Run the console until quit, end-of-input, or interrupt.
    ///
    /// Line editing needs both ends of the terminal plus raw mode; without
    /// them the console falls back to a plain line loop.
    pub async fn run(&mut self, conn: &mut Connection) -> Result<()> {
        if !(io::stdin().is_terminal() && io::stdout().is_terminal()) {
            debug!("stdin or stdout is not a terminal, using plain line mode");
            return run_plain(conn).await;
        }
        match RawModeGuard::new() {
            Ok(guard) => drop(guard),
            Err(err) => {
                debug!("raw mode unavailable ({}), using plain line mode", err);
                return run_plain(conn).await;
            }
        }
        self.run_editor(conn).await
    }

    async fn run_editor(&mut self, conn: &mut Connection) -> Result<()> {
        println!("{}", INTRO);
        let result = self.editor_loop(conn).await;
        self.history.save();
        result
    }

    async fn editor_loop(&mut self, conn: &mut Connection) -> Result<()> {
        let mut events = EventStream::new();
        let mut connected_once = false;

        loop {
            match self.read_line(&mut events, conn).await? {
                ReadOutcome::Eof => break,
                ReadOutcome::Interrupted => {
                    println!("Interrupted.");
                    break;
                }
                ReadOutcome::Line(line) => {
                    self.history.push(&line);
                    match classify(&line) {
                        Input::Empty => {}
                        Input::Exit => break,
                        Input::Forward(command) => {
                            match forward(conn, &command, &mut connected_once).await {
                                Flow::Continue => {}
                                Flow::Quit => break,
                                Flow::Fatal(err) => return Err(err.into()),
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Read one line in raw mode, driving the editor with key events.
    async fn read_line(
        &self,
        events: &mut EventStream,
        conn: &mut Connection,
    ) -> Result<ReadOutcome> {
        let _raw = RawModeGuard::new()?;
        let mut editor = LineEditor::new();
        let mut out = io::stdout();
        render(&mut out, &editor)?;

        while let Some(event) = events.next().await {
            let Event::Key(key) = event? else { continue };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match (key.code, key.modifiers) {
                (KeyCode::Enter, _) => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    return Ok(ReadOutcome::Line(editor.take()));
                }
                (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                    write!(out, "^C\r\n")?;
                    out.flush()?;
                    return Ok(ReadOutcome::Interrupted);
                }
                (KeyCode::Char('d'), KeyModifiers::CONTROL) => {
                    if editor.is_empty() {
                        write!(out, "\r\n")?;
                        out.flush()?;
                        return Ok(ReadOutcome::Eof);
                    }
                    editor.delete();
                }
                (KeyCode::Tab, _) => complete(&mut out, &mut editor, conn).await?,
                (KeyCode::Up, _) => editor.history_up(self.history.entries()),
                (KeyCode::Down, _) => editor.history_down(self.history.entries()),
                (KeyCode::Left, _) => editor.move_left(),
                (KeyCode::Right, _) => editor.move_right(),
                (KeyCode::Home, _) => editor.move_home(),
                (KeyCode::End, _) => editor.move_end(),
                (KeyCode::Backspace, _) => editor.backspace(),
                (KeyCode::Delete, _) => editor.delete(),
                (KeyCode::Char('a'), KeyModifiers::CONTROL) => editor.move_home(),
                (KeyCode::Char('e'), KeyModifiers::CONTROL) => editor.move_end(),
                (KeyCode::Char('b'), KeyModifiers::CONTROL) => editor.move_left(),
                (KeyCode::Char('f'), KeyModifiers::CONTROL) => editor.move_right(),
                (KeyCode::Char('u'), KeyModifiers::CONTROL) => editor.kill_to_start(),
                (KeyCode::Char('k'), KeyModifiers::CONTROL) => editor.kill_to_end(),
                (KeyCode::Char('w'), KeyModifiers::CONTROL) => editor.kill_word_back(),
                (KeyCode::Char(c), modifiers)
                    if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
                {
                    editor.insert(c);
                }
                _ => {}
            }
            render(&mut out, &editor)?;
        }

        Ok(ReadOutcome::Eof)
    }
}

/// Tab completion for the first word: ask the server for `help`, bounded
/// by [`HELP_TIMEOUT`], and offer the matching command names. Server
/// trouble here is not fatal, the completion just stays silent.
async fn complete(
    out: &mut io::Stdout,
    editor: &mut LineEditor,
    conn: &mut Connection,
) -> Result<()> {
    let Some(prefix) = editor.completion_prefix() else {
        return Ok(());
    };
    let help = match timeout(HELP_TIMEOUT, send_retry(conn, "help")).await {
        Ok(Ok(help)) => help,
        Ok(Err(err)) => {
            debug!("help query for completion failed: {}", err);
            return Ok(());
        }
        Err(_) => {
            // The abandoned exchange leaves its reply in flight; a fresh
            // transport keeps it out of the next command's response.
            debug!("help query for completion timed out");
            conn.disconnect();
            return Ok(());
        }
    };
    match candidates(&help, &prefix).as_slice() {
        [] => {}
        [only] => editor.accept_completion(only),
        many => {
            write!(out, "\r\n{}\r\n", many.join("  "))?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Redraw the edit line in place.
fn render(out: &mut io::Stdout, editor: &LineEditor) -> io::Result<()> {
    queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(out, "{}{}", PROMPT, editor.buffer())?;
    queue!(out, MoveToColumn(PROMPT_WIDTH.saturating_add(editor.cursor_column())))?;
    out.flush()
}

/// Line loop for non-terminal input: no prompt, no editing, no history,
/// same dispatch and retry behavior.
async fn run_plain(conn: &mut Connection) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut connected_once = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match classify(&line) {
                    Input::Empty => {}
                    Input::Exit => break,
                    Input::Forward(command) => {
                        match forward(conn, &command, &mut connected_once).await {
                            Flow::Continue => {}
                            Flow::Quit => break,
                            Flow::Fatal(err) => return Err(err.into()),
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted.");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::ServerAddr;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn classify_sorts_local_commands_from_server_commands() {
        assert_eq!(classify(""), Input::Empty);
        assert_eq!(classify("   "), Input::Empty);
        assert_eq!(classify("exit"), Input::Exit);
        assert_eq!(classify(" quit "), Input::Exit);
        assert_eq!(classify("version"), Input::Forward("version".to_string()));
        assert_eq!(
            classify("var.set foo = 1"),
            Input::Forward("var.set foo = 1".to_string())
        );
    }

    #[test]
    fn question_mark_becomes_a_help_command() {
        assert_eq!(classify("?"), Input::Forward("help".to_string()));
        assert_eq!(
            classify("? request.push"),
            Input::Forward("help request.push".to_string())
        );
        assert_eq!(classify("?uptime"), Input::Forward("help uptime".to_string()));
    }

    #[tokio::test]
    async fn send_retry_reconnects_once_after_a_lost_link() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("liq.sock");
        let listener = UnixListener::bind(&path).expect("bind failed");

        tokio::spawn(async move {
            // First connection serves one command, then drops the link.
            let (stream, _) = listener.accept().await.expect("accept failed");
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            if let Ok(Some(_)) = lines.next_line().await {
                writer.write_all(b"pong\r\nEND\r\n").await.expect("write failed");
            }
            drop(lines);
            drop(writer);

            // Second connection keeps answering.
            let (stream, _) = listener.accept().await.expect("accept failed");
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                writer.write_all(b"pong\r\nEND\r\n").await.expect("write failed");
            }
        });

        let mut conn = Connection::new(ServerAddr::Unix(path));

        let first = timeout(TEST_TIMEOUT, send_retry(&mut conn, "ping"))
            .await
            .expect("test timed out")
            .expect("first command failed");
        assert_eq!(first, "pong");

        // The server dropped the first link; the retry inside send_retry
        // reconnects without the caller noticing.
        let second = timeout(TEST_TIMEOUT, send_retry(&mut conn, "ping"))
            .await
            .expect("test timed out")
            .expect("retry failed");
        assert_eq!(second, "pong");
    }

    #[tokio::test]
    async fn send_retry_surfaces_the_second_failure() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("liq.sock");
        let listener = UnixListener::bind(&path).expect("bind failed");
        let (gone_tx, gone_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept failed");
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            if let Ok(Some(_)) = lines.next_line().await {
                writer.write_all(b"pong\r\nEND\r\n").await.expect("write failed");
            }
            drop(lines);
            drop(writer);
            // Stop listening entirely so the retry cannot reconnect.
            drop(listener);
            let _ = gone_tx.send(());
        });

        let mut conn = Connection::new(ServerAddr::Unix(path));
        let first = timeout(TEST_TIMEOUT, send_retry(&mut conn, "ping"))
            .await
            .expect("test timed out")
            .expect("first command failed");
        assert_eq!(first, "pong");

        gone_rx.await.expect("server never shut down");

        let err = timeout(TEST_TIMEOUT, send_retry(&mut conn, "ping"))
            .await
            .expect("test timed out")
            .expect_err("should fail");
        assert!(matches!(err, ConnectionError::Connect { .. }));
    }

    #[tokio::test]
    async fn completion_gives_up_on_a_stalled_help_query() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("liq.sock");
        let listener = UnixListener::bind(&path).expect("bind failed");

        tokio::spawn(async move {
            // Accept the connection and read the help request, then go
            // quiet without ever closing the link.
            let (stream, _) = listener.accept().await.expect("accept failed");
            let (reader, _writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let _ = lines.next_line().await;
            std::future::pending::<()>().await;
        });

        let mut conn = Connection::new(ServerAddr::Unix(path));
        let mut editor = LineEditor::new();
        editor.insert('v');
        let mut out = io::stdout();

        timeout(TEST_TIMEOUT, complete(&mut out, &mut editor, &mut conn))
            .await
            .expect("completion never gave up")
            .expect("completion failed");

        // The line is untouched, and the stalled transport was dropped so
        // its late reply cannot answer the next command.
        assert_eq!(editor.buffer(), "v");
        assert!(!conn.is_connected());
    }
}
