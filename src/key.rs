//! Resource keys derived from detected glyph sequences
//!
//! A key is the glyph's code points in lower-case hex joined by `-`, the
//! same naming the twemoji asset tree uses (`🇦🇺` -> `1f1e6-1f1fa`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// First regional indicator symbol (🇦)
pub const REGIONAL_INDICATOR_START: u32 = 0x1F1E6;

/// Last regional indicator symbol (🇿)
pub const REGIONAL_INDICATOR_END: u32 = 0x1F1FF;

/// Variation selector-16, dropped from keys
const VARIATION_SELECTOR_16: char = '\u{FE0F}';

/// Normalized identifier for a glyph sequence, shared by every cache layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Derive the key for a glyph's original text
    pub fn from_glyph(text: &str) -> Self {
        let parts: Vec<String> = text
            .chars()
            .filter(|c| *c != VARIATION_SELECTOR_16)
            .map(|c| format!("{:x}", u32::from(c)))
            .collect();
        Self(parts.join("-"))
    }

    /// Wrap an already-normalized key string
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Code points encoded in the key, or `None` if any part is not hex
    pub fn code_points(&self) -> Option<Vec<u32>> {
        self.0
            .split('-')
            .map(|part| u32::from_str_radix(part, 16).ok())
            .collect()
    }

    /// Whether the key names a flag: exactly two regional indicators
    pub fn is_flag(&self) -> bool {
        match self.code_points().as_deref() {
            Some([first, second]) => is_regional_indicator(*first) && is_regional_indicator(*second),
            _ => false,
        }
    }
}

/// Whether a code point is a regional indicator symbol
pub fn is_regional_indicator(code_point: u32) -> bool {
    (REGIONAL_INDICATOR_START..=REGIONAL_INDICATOR_END).contains(&code_point)
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
