//! Mock serial port implementation for testing
//!
//! This module provides a scripted serial port that plays the module's side of
//! the text protocol. Replies are produced when a complete command line is
//! written, so the driver's stale-input flush never eats them.
//!
//! Two kinds of script entries exist:
//! - one-shot expectations (`expect`), consumed in order by the first command
//!   whose text starts with the given prefix;
//! - persistent rules (`respond`), used when no one-shot entry matches.
//!
//! Unmatched commands get no reply, which the driver sees as a timeout.
//!
//! `expect_latency` advances a [`ManualClock`] while a command is being
//! written, standing in for the time the module spends on air.

use crate::util::clock::ManualClock;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Debug, Clone)]
struct ScriptEntry {
    prefix: String,
    replies: Vec<String>,
}

#[derive(Debug, Clone)]
struct Latency {
    prefix: String,
    clock: ManualClock,
    by: Duration,
}

/// Scripted serial port; clones share state.
#[derive(Clone, Default)]
pub struct ScriptedPort {
    /// Data written to the port (outgoing)
    pub tx_buffer: Arc<Mutex<Vec<u8>>>,
    /// Data to be read from the port (incoming)
    pub rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    /// Simulated errors
    pub next_error: Arc<Mutex<Option<io::Error>>>,
    once: Arc<Mutex<VecDeque<ScriptEntry>>>,
    rules: Arc<Mutex<Vec<ScriptEntry>>>,
    pending_line: Arc<Mutex<Vec<u8>>>,
    commands: Arc<Mutex<Vec<String>>>,
    latencies: Arc<Mutex<VecDeque<Latency>>>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to the next command starting with `prefix` (one shot).
    pub fn expect(&self, prefix: &str, replies: &[&str]) -> &Self {
        self.once.lock().unwrap().push_back(ScriptEntry {
            prefix: prefix.to_string(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    /// Reply to every command starting with `prefix` not claimed by `expect`.
    pub fn respond(&self, prefix: &str, replies: &[&str]) -> &Self {
        self.rules.lock().unwrap().push(ScriptEntry {
            prefix: prefix.to_string(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    /// Answer `ok` to every command starting with `prefix`.
    pub fn respond_ok(&self, prefix: &str) -> &Self {
        self.respond(prefix, &["ok"])
    }

    /// Advance `clock` by `by` when the next command starting with `prefix`
    /// is written (one shot).
    pub fn expect_latency(&self, prefix: &str, clock: &ManualClock, by: Duration) -> &Self {
        self.latencies.lock().unwrap().push_back(Latency {
            prefix: prefix.to_string(),
            clock: clock.clone(),
            by,
        });
        self
    }

    /// Queue raw bytes as if the module had sent them unprompted.
    pub fn queue_rx_data(&self, data: &[u8]) {
        let mut rx = self.rx_buffer.lock().unwrap();
        rx.extend(data);
    }

    /// Get data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        self.tx_buffer.lock().unwrap().clone()
    }

    /// Every complete command line written so far, without terminators.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands starting with `prefix`.
    pub fn commands_starting_with(&self, prefix: &str) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Set an error to be returned on the next operation
    pub fn set_next_error(&self, error: io::Error) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// Bytes still waiting to be read.
    pub fn pending_rx(&self) -> usize {
        self.rx_buffer.lock().unwrap().len()
    }

    fn on_command(&self, line: String) {
        let latency = {
            let mut latencies = self.latencies.lock().unwrap();
            latencies
                .iter()
                .position(|l| line.starts_with(&l.prefix))
                .and_then(|idx| latencies.remove(idx))
        };
        if let Some(latency) = latency {
            latency.clock.advance(latency.by);
        }

        let entry = {
            let mut once = self.once.lock().unwrap();
            match once.iter().position(|e| line.starts_with(&e.prefix)) {
                Some(idx) => once.remove(idx),
                None => self
                    .rules
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|e| line.starts_with(&e.prefix))
                    .cloned(),
            }
        };

        if let Some(entry) = entry {
            let mut rx = self.rx_buffer.lock().unwrap();
            for reply in entry.replies {
                rx.extend(reply.as_bytes());
                rx.extend(b"\r\n");
            }
        }
        self.commands.lock().unwrap().push(line);
    }

    fn absorb(&self, data: &[u8]) {
        let mut completed = Vec::new();
        {
            let mut pending = self.pending_line.lock().unwrap();
            for &byte in data {
                if byte == b'\n' {
                    if pending.last() == Some(&b'\r') {
                        pending.pop();
                    }
                    completed.push(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                } else {
                    pending.push(byte);
                }
            }
        }
        for line in completed {
            self.on_command(line);
        }
    }
}

impl AsyncRead for ScriptedPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Poll::Ready(Err(error));
        }

        let mut rx = self.rx_buffer.lock().unwrap();
        let available = rx.len().min(buf.remaining());

        if available > 0 {
            let data: Vec<u8> = rx.drain(..available).collect();
            buf.put_slice(&data);
        }

        // An empty read reports end of input; the driver treats it as silence.
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ScriptedPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Poll::Ready(Err(error));
        }

        self.tx_buffer.lock().unwrap().extend_from_slice(buf);
        self.absorb(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
