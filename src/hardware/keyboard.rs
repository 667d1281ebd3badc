use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, poll, read};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Providing Keyboard Input independent of an implementation.
pub trait KeyboardInputProvider {
    /// Returns the next pressed key if one is available, does not block.
    ///
    /// # Errors
    /// - input device cannot be read
    fn poll_key(&mut self) -> io::Result<Option<u8>>;
    /// Blocks until a key is pressed and returns it, `None` if interrupted while waiting.
    ///
    /// # Errors
    /// - input device cannot be read
    fn read_key(&mut self) -> io::Result<Option<u8>>;
    /// True if CTRL-C was triggered
    fn is_interrupted(&self) -> bool;
    /// Drains pending input without handing it to the program, so a CTRL-C is noticed even if
    /// the program never reads the keyboard. Drained keys stay available for later reads.
    ///
    /// # Errors
    /// - input device cannot be read
    fn check_events(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Keyboard of the hosting terminal, read via crossterm events.
///
/// In raw mode CTRL-C does not raise a signal but arrives as key press,
/// it is recorded in the shared interrupt flag, which is also set by the signal handlers of
/// [`crate::terminal::register_interrupt_signals`].
pub struct TerminalInputProvider {
    interrupted: Arc<AtomicBool>,
    pending: VecDeque<u8>,
}
impl Default for TerminalInputProvider {
    fn default() -> Self {
        Self::new()
    }
}
impl TerminalInputProvider {
    const READ_INTERRUPT_CHECK: Duration = Duration::from_millis(50);

    #[must_use]
    pub fn new() -> Self {
        Self::with_interrupt_flag(Arc::new(AtomicBool::new(false)))
    }
    #[must_use]
    pub const fn with_interrupt_flag(interrupted: Arc<AtomicBool>) -> Self {
        Self {
            interrupted,
            pending: VecDeque::new(),
        }
    }
    fn handle_event(&mut self, event: &Event) -> Option<u8> {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event
        else {
            return None;
        };
        if *code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
            self.interrupted.store(true, Ordering::SeqCst);
            return None;
        }
        key_code_to_ascii(*code, *modifiers)
    }
    /// Queues the keys of all events available without blocking.
    fn drain_events(&mut self) -> io::Result<()> {
        while !self.is_interrupted() && poll(Duration::ZERO)? {
            let event = read()?;
            if let Some(key) = self.handle_event(&event) {
                self.pending.push_back(key);
            }
        }
        Ok(())
    }
}

fn key_code_to_ascii(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
    match code {
        // CTRL-A .. CTRL-Z are the control codes 1 .. 26
        KeyCode::Char(c) if c.is_ascii_alphabetic() && modifiers.contains(KeyModifiers::CONTROL) => {
            u8::try_from(c).ok().map(|b| b & 0x1F)
        }
        KeyCode::Char(_) if modifiers.contains(KeyModifiers::CONTROL) => None,
        KeyCode::Char(c) if c.is_ascii() => u8::try_from(c).ok(),
        KeyCode::Enter => Some(b'\n'),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}

impl KeyboardInputProvider for TerminalInputProvider {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        if self.pending.is_empty() {
            self.drain_events()?;
        }
        Ok(self.pending.pop_front())
    }
    fn read_key(&mut self) -> io::Result<Option<u8>> {
        loop {
            if let Some(key) = self.pending.pop_front() {
                return Ok(Some(key));
            }
            if self.is_interrupted() {
                return Ok(None);
            }
            // wake up regularly, the interrupt flag may be set by a signal handler
            if poll(Self::READ_INTERRUPT_CHECK)? {
                let event = read()?;
                if let Some(key) = self.handle_event(&event) {
                    self.pending.push_back(key);
                }
            }
        }
    }
    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
    fn check_events(&mut self) -> io::Result<()> {
        self.drain_events()
    }
}

/// Keyboard replaying a fixed sequence of key presses, for running programs unattended.
///
/// Once the script is exhausted no further key ever becomes available and a blocking read
/// reports an interrupt.
#[derive(Debug, Default)]
pub struct ScriptedInputProvider {
    keys: VecDeque<u8>,
    is_interrupted: bool,
}
impl ScriptedInputProvider {
    #[must_use]
    pub fn new(keys: &[u8]) -> Self {
        Self {
            keys: keys.iter().copied().collect(),
            is_interrupted: false,
        }
    }
}
impl KeyboardInputProvider for ScriptedInputProvider {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        Ok(self.keys.pop_front())
    }
    fn read_key(&mut self) -> io::Result<Option<u8>> {
        let key = self.keys.pop_front();
        if key.is_none() {
            self.is_interrupted = true;
        }
        Ok(key)
    }
    fn is_interrupted(&self) -> bool {
        self.is_interrupted
    }
}
