// ABOUTME: Local terminal ownership for an interactive session: raw mode, size queries, resize events
// ABOUTME: Raw mode and the resize listener are both scoped guards released on every exit path

use std::future::Future;
use std::io::Read;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc;
use nix::sys::termios::{self, SetArg, Termios};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Diagnostics;

pub const FALLBACK_COLS: u32 = 80;
pub const FALLBACK_ROWS: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u32,
    pub rows: u32,
}

impl WindowSize {
    pub const FALLBACK: WindowSize = WindowSize {
        cols: FALLBACK_COLS,
        rows: FALLBACK_ROWS,
    };

    /// Measured size, or 80x24 when the terminal cannot be queried.
    pub fn or_fallback(size: Option<WindowSize>) -> WindowSize {
        size.unwrap_or(Self::FALLBACK)
    }
}

/// Current size of the terminal attached to stdin, if there is one.
pub fn window_size() -> Option<WindowSize> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let ret = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if ret == -1 || ws.ws_col == 0 || ws.ws_row == 0 {
        return None;
    }
    Some(WindowSize {
        cols: u32::from(ws.ws_col),
        rows: u32::from(ws.ws_row),
    })
}

/// Holds the terminal in raw mode; the saved mode is restored exactly once, on drop.
pub struct TerminalGuard {
    original: Termios,
    diag: Diagnostics,
}

impl TerminalGuard {
    pub fn acquire(diag: Diagnostics) -> nix::Result<Self> {
        let stdin = std::io::stdin();
        let original = termios::tcgetattr(&stdin)?;

        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;

        diag.debug("Terminal switched to raw mode");
        Ok(Self { original, diag })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        if let Err(e) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &self.original) {
            self.diag.warn(&format!("Failed to restore terminal mode: {e}"));
        } else {
            self.diag.debug("Terminal mode restored");
        }
    }
}

/// A source of "the window changed" notifications.
pub trait ResizeNotifications: Send + 'static {
    /// `None` once the source is closed.
    fn notified(&mut self) -> impl Future<Output = Option<()>> + Send;
}

impl ResizeNotifications for Signal {
    fn notified(&mut self) -> impl Future<Output = Option<()>> + Send {
        self.recv()
    }
}

impl ResizeNotifications for mpsc::Receiver<()> {
    fn notified(&mut self) -> impl Future<Output = Option<()>> + Send {
        self.recv()
    }
}

/// Subscribe to SIGWINCH for the calling process.
pub fn sigwinch() -> std::io::Result<Signal> {
    signal(SignalKind::window_change())
}

/// SIGTERM and SIGHUP for the duration of a raw-mode session. Holding the
/// subscription replaces the default action, so the terminal guard still runs.
pub struct ShutdownSignals {
    terminate: Signal,
    hangup: Signal,
}

impl ShutdownSignals {
    pub fn subscribe() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Resolves with the reason once either signal arrives.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "terminated by signal",
            _ = self.hangup.recv() => "terminal hung up",
        }
    }
}

/// Background task that re-measures the window on every notification and
/// forwards the new size. Cancelled when dropped.
pub struct ResizeForwarder {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ResizeForwarder {
    pub fn spawn<N, Q>(mut notifications: N, measure: Q, sizes: mpsc::UnboundedSender<WindowSize>) -> Self
    where
        N: ResizeNotifications,
        Q: Fn() -> Option<WindowSize> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    notification = notifications.notified() => {
                        if notification.is_none() {
                            break;
                        }
                        // Unmeasurable sizes are skipped; the next notification retries
                        if let Some(size) = measure() {
                            if sizes.send(size).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            // `notifications` drops here, which unsubscribes from the signal
        });

        Self {
            token,
            task: Some(task),
        }
    }

    /// Cancel and wait for the task to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ResizeForwarder {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Reads local stdin on a dedicated thread. The receiver yields `None` at end of input.
pub struct StdinPump {
    shutdown: Arc<AtomicBool>,
}

impl StdinPump {
    pub fn spawn() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let stdin_fd = stdin.as_raw_fd();
            let mut buf = [0u8; 4096];
            loop {
                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }
                // Poll with a timeout so the shutdown flag is noticed
                let mut pfd = libc::pollfd {
                    fd: stdin_fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                let ret = unsafe { libc::poll(&mut pfd, 1, 100) };
                if ret <= 0 {
                    continue;
                }
                let mut handle = stdin.lock();
                match handle.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        drop(handle);
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        (Self { shutdown }, rx)
    }
}

impl Drop for StdinPump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fallback_size_is_80_by_24() {
        assert_eq!(
            WindowSize::or_fallback(None),
            WindowSize { cols: 80, rows: 24 }
        );
        let measured = WindowSize { cols: 120, rows: 40 };
        assert_eq!(WindowSize::or_fallback(Some(measured)), measured);
    }

    #[tokio::test]
    async fn test_forwarder_sends_size_per_notification() {
        let (notify_tx, notify_rx) = mpsc::channel(4);
        let (size_tx, mut size_rx) = mpsc::unbounded_channel();
        let size = WindowSize { cols: 100, rows: 30 };

        let forwarder = ResizeForwarder::spawn(notify_rx, move || Some(size), size_tx);

        notify_tx.send(()).await.unwrap();
        notify_tx.send(()).await.unwrap();
        assert_eq!(size_rx.recv().await, Some(size));
        assert_eq!(size_rx.recv().await, Some(size));

        forwarder.stop().await;
    }

    #[tokio::test]
    async fn test_forwarder_skips_unmeasurable_sizes() {
        let (notify_tx, notify_rx) = mpsc::channel(4);
        let (size_tx, mut size_rx) = mpsc::unbounded_channel();

        let forwarder = ResizeForwarder::spawn(notify_rx, || None, size_tx);
        notify_tx.send(()).await.unwrap();
        forwarder.stop().await;

        // The task is gone and dropped its sender without sending anything
        assert_eq!(size_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stop_unsubscribes() {
        let (notify_tx, notify_rx) = mpsc::channel(4);
        let (size_tx, mut size_rx) = mpsc::unbounded_channel();

        let forwarder = ResizeForwarder::spawn(
            notify_rx,
            || Some(WindowSize::FALLBACK),
            size_tx,
        );
        forwarder.stop().await;

        // The receiving half was dropped with the task
        assert!(notify_tx.send(()).await.is_err());
        assert_eq!(size_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_cancels_task() {
        let (notify_tx, notify_rx) = mpsc::channel(4);
        let (size_tx, mut size_rx) = mpsc::unbounded_channel();

        let forwarder = ResizeForwarder::spawn(
            notify_rx,
            || Some(WindowSize::FALLBACK),
            size_tx,
        );
        drop(forwarder);

        let closed = tokio::time::timeout(Duration::from_secs(5), size_rx.recv()).await;
        assert_eq!(closed.unwrap(), None);
        assert!(notify_tx.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_signals_report_hangup() {
        let mut signals = ShutdownSignals::subscribe().unwrap();
        nix::sys::signal::raise(nix::sys::signal::Signal::SIGHUP).unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(reason, "terminal hung up");
    }

    #[tokio::test]
    async fn test_forwarder_ends_when_source_closes() {
        let (notify_tx, notify_rx) = mpsc::channel::<()>(1);
        let (size_tx, mut size_rx) = mpsc::unbounded_channel();

        let forwarder = ResizeForwarder::spawn(notify_rx, || None, size_tx);
        drop(notify_tx);

        assert_eq!(size_rx.recv().await, None);
        forwarder.stop().await;
    }
}
