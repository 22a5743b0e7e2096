use std::fmt;

/// A `major.minor.patch` version parsed out of a driver string.
///
/// The default value (`0.0.0`) means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses the first dotted number in `text`.
    ///
    /// Leading non-digits are skipped and parsing stops at the first
    /// character that is neither a digit nor `.`:
    /// `"OpenGL ES 3.2 Mesa 24.0"` → `3.2.0`, `"4.60 NVIDIA"` → `4.60.0`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let start = text.find(|c: char| c.is_ascii_digit()).unwrap_or(text.len());
        let rest = &text[start..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let mut parts = rest[..end].split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }

    /// Version of the token following `marker` in a whitespace-split string,
    /// e.g. the Mesa version in `"4.6 (Core Profile) Mesa 24.1.0"`.
    #[must_use]
    pub fn after_token(text: &str, marker: &str) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        tokens.position(|t| t == marker)?;
        tokens.next().map(Self::parse)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != Self::default()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}
