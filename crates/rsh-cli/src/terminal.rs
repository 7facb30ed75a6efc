//! Local terminal state management
//!
//! Raw mode is process-wide state: it is acquired behind a guard whose drop
//! restores the previous state, so every exit path (including panics) puts
//! the terminal back.

use crossterm::terminal;

/// Puts the controlling terminal into raw mode for the guard's lifetime.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Enable raw mode.
    pub fn new() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { active: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Build the SIGWINCH payload for the current terminal:
/// `"<cols> <rows> <xpixels> <ypixels>"`.
pub fn winsize_payload() -> String {
    let (cols, rows) = terminal::size().unwrap_or((80, 24));
    let (xpixels, ypixels) = match terminal::window_size() {
        Ok(size) => (size.width, size.height),
        Err(_) => (0, 0),
    };
    format!("{} {} {} {}", cols, rows, xpixels, ypixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winsize_payload_shape() {
        let payload = winsize_payload();
        let fields: Vec<&str> = payload.split(' ').collect();
        assert_eq!(fields.len(), 4);
        for field in fields {
            field.parse::<u16>().unwrap();
        }
    }
}
