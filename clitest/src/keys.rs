//! Symbolic key names and the bytes a terminal sends for them.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Escape,
    Backspace,
    Delete,
    Tab,
    Space,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    /// Function keys `F1` to `F12`.
    F(u8),
}

impl Key {
    /// The raw input sequence for this key.
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Key::Enter => b"\r",
            Key::Escape => b"\x1b",
            Key::Backspace => b"\x7f",
            Key::Delete => b"\x1b[3~",
            Key::Tab => b"\t",
            Key::Space => b" ",
            Key::ArrowUp => b"\x1b[A",
            Key::ArrowDown => b"\x1b[B",
            Key::ArrowRight => b"\x1b[C",
            Key::ArrowLeft => b"\x1b[D",
            Key::Home => b"\x1b[H",
            Key::End => b"\x1b[F",
            Key::PageUp => b"\x1b[5~",
            Key::PageDown => b"\x1b[6~",
            Key::Insert => b"\x1b[2~",
            Key::F(1) => b"\x1bOP",
            Key::F(2) => b"\x1bOQ",
            Key::F(3) => b"\x1bOR",
            Key::F(4) => b"\x1bOS",
            Key::F(5) => b"\x1b[15~",
            Key::F(6) => b"\x1b[17~",
            Key::F(7) => b"\x1b[18~",
            Key::F(8) => b"\x1b[19~",
            Key::F(9) => b"\x1b[20~",
            Key::F(10) => b"\x1b[21~",
            Key::F(11) => b"\x1b[23~",
            Key::F(12) => b"\x1b[24~",
            // Not constructible through `FromStr`.
            Key::F(_) => b"",
        }
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let key = match name.to_ascii_lowercase().as_str() {
            "enter" | "return" => Key::Enter,
            "escape" | "esc" => Key::Escape,
            "backspace" => Key::Backspace,
            "delete" => Key::Delete,
            "tab" => Key::Tab,
            "space" => Key::Space,
            "arrowup" | "up" => Key::ArrowUp,
            "arrowdown" | "down" => Key::ArrowDown,
            "arrowleft" | "left" => Key::ArrowLeft,
            "arrowright" | "right" => Key::ArrowRight,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" => Key::PageUp,
            "pagedown" => Key::PageDown,
            "insert" => Key::Insert,
            other => other
                .strip_prefix('f')
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (1..=12).contains(n))
                .map(Key::F)
                .ok_or_else(|| Error::UnknownKey(name.to_string()))?,
        };
        Ok(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Enter => write!(f, "enter"),
            Key::Escape => write!(f, "escape"),
            Key::Backspace => write!(f, "backSpace"),
            Key::Delete => write!(f, "delete"),
            Key::Tab => write!(f, "tab"),
            Key::Space => write!(f, "space"),
            Key::ArrowUp => write!(f, "arrowUp"),
            Key::ArrowDown => write!(f, "arrowDown"),
            Key::ArrowLeft => write!(f, "arrowLeft"),
            Key::ArrowRight => write!(f, "arrowRight"),
            Key::Home => write!(f, "home"),
            Key::End => write!(f, "end"),
            Key::PageUp => write!(f, "pageUp"),
            Key::PageDown => write!(f, "pageDown"),
            Key::Insert => write!(f, "insert"),
            Key::F(n) => write!(f, "f{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!("arrowDown".parse::<Key>().unwrap(), Key::ArrowDown);
        assert_eq!("ARROWDOWN".parse::<Key>().unwrap(), Key::ArrowDown);
        assert_eq!("backSpace".parse::<Key>().unwrap(), Key::Backspace);
        assert_eq!("F12".parse::<Key>().unwrap(), Key::F(12));
    }

    #[test]
    fn test_aliases() {
        assert_eq!("up".parse::<Key>().unwrap(), Key::ArrowUp);
        assert_eq!("esc".parse::<Key>().unwrap(), Key::Escape);
        assert_eq!("return".parse::<Key>().unwrap(), Key::Enter);
    }

    #[test]
    fn test_bytes() {
        assert_eq!(Key::Enter.bytes(), b"\r");
        assert_eq!(Key::ArrowDown.bytes(), b"\x1b[B");
        assert_eq!(Key::F(1).bytes(), b"\x1bOP");
        assert_eq!(Key::F(5).bytes(), b"\x1b[15~");
        assert_eq!(Key::Delete.bytes(), b"\x1b[3~");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        for name in ["", "f0", "f13", "ctrl", "arrow"] {
            let err = name.parse::<Key>().unwrap_err();
            assert!(matches!(err, Error::UnknownKey(ref n) if n == name), "{name}");
        }
    }

    #[test]
    fn test_display_parses_back() {
        for key in [Key::Enter, Key::Backspace, Key::PageDown, Key::F(7)] {
            assert_eq!(key.to_string().parse::<Key>().unwrap(), key);
        }
    }
}
