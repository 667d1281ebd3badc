//! Raw mode handling of the hosting terminal and interruption by signals.
use crossterm::{ExecutableCommand, terminal};
use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Signals that stop a running program instead of killing the process.
pub const INTERRUPT_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// Keeps SIGINT and SIGTERM redirected into an interrupt flag while alive.
///
/// The handlers only set the flag, the execution loop observes it between instructions and
/// returns, so the terminal is restored by the regular drop of [`RawLock`].
pub struct SignalGuard {
    ids: Vec<SigId>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Registers handlers for [`INTERRUPT_SIGNALS`] setting `interrupted`.
///
/// # Errors
/// - a handler cannot be installed
pub fn register_interrupt_signals(interrupted: &Arc<AtomicBool>) -> io::Result<SignalGuard> {
    let mut guard = SignalGuard { ids: Vec::new() };
    for signal in INTERRUPT_SIGNALS {
        // on error the already registered handlers are removed by dropping guard
        guard
            .ids
            .push(signal_hook::flag::register(signal, Arc::clone(interrupted))?);
    }
    Ok(guard)
}

/// Keeps the terminal in raw mode while alive, restores the previous mode on drop.
///
/// Dropping also happens when unwinding from a panic, so every way out of
/// [`crate::emulator::Emulator::execute`] leaves the terminal usable.
pub struct RawLock {
    active: bool,
    _signals: Option<SignalGuard>,
}

impl RawLock {
    /// True if raw mode could actually be enabled.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for RawLock {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        // terminal stays in raw mode but no means to repair
        if let Err(e) = terminal::disable_raw_mode() {
            eprintln!("Error resetting terminal {e}");
        }
    }
}

fn handle_set_raw_error(e: &io::Error) {
    eprintln!("Could not set terminal to raw mode: {e}");
}

/// Set terminal to raw (no line buffering, no echo) in best-effort mode, only log on failure,
/// since there is no terminal e.g. when stdin is redirected or in cargo doc tests.
///
/// Interruption signals are routed into `interrupted` before raw mode is entered and stay so
/// until the returned lock is dropped.
pub fn set_terminal_raw(mut stdout: impl Write, interrupted: &Arc<AtomicBool>) -> RawLock {
    let signals = register_interrupt_signals(interrupted)
        .inspect_err(|e| eprintln!("Could not install interrupt handler: {e}"))
        .ok();
    match terminal::enable_raw_mode() {
        Ok(()) => {
            if let Err(e) = stdout.execute(terminal::EnableLineWrap) {
                handle_set_raw_error(&e);
            }
            RawLock {
                active: true,
                _signals: signals,
            }
        }
        Err(e) => {
            handle_set_raw_error(&e);
            RawLock {
                active: false,
                _signals: signals,
            }
        }
    }
}

/// Output stream for program output that starts new lines at the first column in raw mode.
///
/// Raw mode disables output post-processing, so `\n` alone only moves the cursor down.
pub struct RawModeWriter<W: Write> {
    inner: W,
}

impl<W: Write> RawModeWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }
}

fn translate_newlines(buf: &[u8]) -> Vec<u8> {
    let mut translated = Vec::with_capacity(buf.len() + 8);
    for b in buf {
        if *b == b'\n' {
            translated.push(b'\r');
        }
        translated.push(*b);
    }
    translated
}

impl<W: Write> Write for RawModeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if terminal::is_raw_mode_enabled().unwrap_or(false) && buf.contains(&b'\n') {
            self.inner.write_all(&translate_newlines(buf))?;
            Ok(buf.len())
        } else {
            self.inner.write(buf)
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
