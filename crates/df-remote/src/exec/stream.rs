//! Streaming execution
//!
//! A transport task pushes raw [`ExecEvent`]s into a bounded channel; the
//! consumer side polls it with a short timeout, cuts the bytes into lines
//! and ends with a single [`StreamItem::Exit`] sentinel.

use std::collections::VecDeque;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, OwnedMutexGuard};

use df_core::error::{ExecError, SessionError};

use super::classify::strip_prompts;
use crate::transport::ExecEvent;

/// Upper bound for one wait on the event channel
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One element of a streamed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A line of stdout or stderr
    Chunk(String),
    /// Sentinel carrying the remote exit code
    Exit(i32),
}

#[derive(Clone, Copy)]
enum Source {
    Stdout,
    Stderr,
}

/// Finite, non-restartable sequence of output lines
#[derive(Debug)]
pub struct ExecStream {
    rx: mpsc::Receiver<ExecEvent>,
    idle_timeout: Duration,
    idle: Duration,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    pending: VecDeque<StreamItem>,
    failure: Option<ExecError>,
    finished: bool,
    _turn: OwnedMutexGuard<()>,
}

impl ExecStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<ExecEvent>,
        idle_timeout: Duration,
        turn: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            rx,
            idle_timeout,
            idle: Duration::ZERO,
            stdout: Vec::new(),
            stderr: Vec::new(),
            pending: VecDeque::new(),
            failure: None,
            finished: false,
            _turn: turn,
        }
    }

    /// Next line, the exit sentinel, or an error; `None` after the end
    pub async fn next_item(&mut self) -> Option<Result<StreamItem, ExecError>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            if let Some(err) = self.failure.take() {
                return Some(Err(err));
            }
            if self.finished {
                return None;
            }

            match tokio::time::timeout(POLL_INTERVAL, self.rx.recv()).await {
                Ok(Some(ExecEvent::Stdout(bytes))) => self.absorb(Source::Stdout, &bytes),
                Ok(Some(ExecEvent::Stderr(bytes))) => self.absorb(Source::Stderr, &bytes),
                Ok(Some(ExecEvent::Exit(status))) => {
                    self.flush();
                    let code = status
                        .map(|s| s as i32)
                        .unwrap_or(super::classify::MISSING_EXIT_CODE);
                    self.pending.push_back(StreamItem::Exit(code));
                    self.finished = true;
                }
                Ok(None) => {
                    self.flush();
                    self.failure = Some(ExecError::Session(SessionError::Transport(
                        "Channel closed before the command finished".to_string(),
                    )));
                    self.finished = true;
                }
                Err(_) => {
                    self.idle += POLL_INTERVAL;
                    if self.idle >= self.idle_timeout {
                        self.flush();
                        self.failure = Some(ExecError::Timeout(self.idle_timeout.as_secs()));
                        self.finished = true;
                    }
                }
            }
        }
    }

    /// Adapt into a [`futures::Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamItem, ExecError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_item().await.map(|item| (item, stream))
        })
    }

    fn absorb(&mut self, source: Source, bytes: &[u8]) {
        self.idle = Duration::ZERO;
        let buffer = match source {
            Source::Stdout => &mut self.stdout,
            Source::Stderr => &mut self.stderr,
        };
        buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            lines.push(line);
        }
        for line in lines {
            self.emit(source, &line);
        }
    }

    fn flush(&mut self) {
        let stdout = std::mem::take(&mut self.stdout);
        let stderr = std::mem::take(&mut self.stderr);
        self.emit(Source::Stdout, &stdout);
        self.emit(Source::Stderr, &stderr);
    }

    fn emit(&mut self, source: Source, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let text = match source {
            Source::Stdout => text.trim_end_matches(['\n', '\r']).to_string(),
            Source::Stderr => strip_prompts(&text).trim_end().to_string(),
        };
        if !text.trim().is_empty() {
            self.pending.push_back(StreamItem::Chunk(text));
        }
    }
}
