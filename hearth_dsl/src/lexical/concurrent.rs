//! Producer/consumer scanning
//!
//! The scanner runs on its own thread and pushes tokens into a bounded
//! channel; the parser pulls from the other end. A shared `CancellationToken`
//! stops the producer when the consumer goes away, even while it is blocked
//! on a full queue.

use super::scan;
use crate::logging::codes;
use crate::tokens::{Token, TokenKind};
use crate::utils::Position;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Stop signal shared by producer and consumer.
///
/// Cancelling drops the inner sender, which wakes every `select!` waiting
/// on `stopped()`.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                stop_tx: Mutex::new(Some(stop_tx)),
                stop_rx,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let mut slot = self
            .inner
            .stop_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Becomes ready (disconnected) once the token is cancelled
    pub fn stopped(&self) -> &Receiver<()> {
        &self.inner.stop_rx
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer end of a concurrent scan.
///
/// Yields the same sequence `scan` would. Dropping it cancels the producer
/// and joins its thread.
pub struct ConcurrentTokens {
    rx: Receiver<Token>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    finished: bool,
    last_position: Position,
}

impl ConcurrentTokens {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Iterator for ConcurrentTokens {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }

        match self.rx.recv() {
            Ok(token) => {
                self.last_position = token.position;
                if token.is_terminal() {
                    self.finished = true;
                }
                Some(token)
            }
            Err(_) => {
                // Producer stopped without a terminal token: cancelled or died
                self.finished = true;
                let message = if self.cancel.is_cancelled() {
                    "scan cancelled"
                } else {
                    "scanner stopped before end of input"
                };
                Some(Token::new(self.last_position, TokenKind::Error, message))
            }
        }
    }
}

impl Drop for ConcurrentTokens {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                crate::log_error!(codes::system::INTERNAL_ERROR, "Scanner thread panicked");
            }
        }
    }
}

/// Scan `input` on a dedicated thread feeding a queue of `capacity` tokens
/// (at least 1).
pub fn scan_concurrent(
    input: impl Into<String>,
    capacity: usize,
) -> std::io::Result<ConcurrentTokens> {
    let text: String = input.into();
    let capacity = capacity.max(1);
    let (tx, rx) = bounded::<Token>(capacity);
    let cancel = CancellationToken::new();
    let producer_cancel = cancel.clone();

    let handle = thread::Builder::new()
        .name("hearth-scanner".to_string())
        .spawn(move || produce(&text, tx, producer_cancel))?;

    crate::log_debug!("Concurrent scanner started", "capacity" => capacity);

    Ok(ConcurrentTokens {
        rx,
        cancel,
        handle: Some(handle),
        finished: false,
        last_position: Position::start(),
    })
}

fn produce(text: &str, tx: Sender<Token>, cancel: CancellationToken) {
    let mut sent = 0usize;
    for token in scan(text) {
        if cancel.is_cancelled() {
            break;
        }
        select! {
            send(tx, token) -> result => {
                if result.is_err() {
                    break;
                }
                sent += 1;
            }
            recv(cancel.stopped()) -> _ => break,
        }
    }
    crate::log_debug!("Concurrent scanner exiting",
        "sent" => sent,
        "cancelled" => cancel.is_cancelled()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_concurrent_scan_matches_sequential_scan() {
        let input = "set living_room.* off; at 7:30 pm { get porch.light } # done";
        let sequential: Vec<Token> = scan(input).collect();
        let concurrent: Vec<Token> = scan_concurrent(input, 2).unwrap().collect();
        assert_eq!(sequential, concurrent);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let tokens: Vec<Token> = scan_concurrent("get a.b", 0).unwrap().collect();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::EndOfInput);
    }

    #[test]
    fn test_dropping_consumer_stops_blocked_producer() {
        let input = "set a.b on; ".repeat(500);
        let mut tokens = scan_concurrent(input, 1).unwrap();
        assert_eq!(tokens.next().unwrap().kind, TokenKind::Set);

        // Let the producer block on the full queue before dropping
        thread::sleep(Duration::from_millis(20));
        let cancel = tokens.cancellation_token();

        // Drop joins the producer; a producer that ignores cancellation
        // would leave the dropping thread stuck here
        let (joined_tx, joined_rx) = bounded::<()>(1);
        thread::spawn(move || {
            drop(tokens);
            let _ = joined_tx.send(());
        });

        assert!(
            joined_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
            "producer did not exit after the consumer was dropped"
        );
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_external_cancellation_ends_with_error_token() {
        let input = "get a.b; ".repeat(500);
        let mut tokens = scan_concurrent(input, 1).unwrap();
        tokens.next();
        tokens.cancellation_token().cancel();

        let rest: Vec<Token> = tokens.by_ref().collect();
        let last = rest.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(last.text, "scan cancelled");
        assert!(tokens.next().is_none());
    }

    #[test]
    fn test_lexical_error_crosses_the_queue() {
        let tokens: Vec<Token> = scan_concurrent("set a 12:3", 4).unwrap().collect();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Error);
        assert_eq!(tokens.iter().filter(|t| t.is_terminal()).count(), 1);
    }

    #[test]
    fn test_cancellation_token_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.stopped().recv().is_err());
        token.cancel();
        assert!(handle.join().unwrap());
    }
}
