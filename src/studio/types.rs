use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::media::ImageRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "9:16")]
    Story9x16,
    #[serde(rename = "1:1")]
    Square1x1,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "16:9")]
    Wide16x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Portrait3x4,
        AspectRatio::Story9x16,
        AspectRatio::Square1x1,
        AspectRatio::Landscape4x3,
        AspectRatio::Wide16x9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Story9x16 => "9:16",
            AspectRatio::Square1x1 => "1:1",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Wide16x9 => "16:9",
        }
    }

    /// Caption shown next to a result card.
    pub fn display_label(self) -> &'static str {
        match self {
            AspectRatio::Story9x16 => "Story Format",
            AspectRatio::Portrait3x4 => "Post Format (Portrait)",
            AspectRatio::Square1x1 => "Square Format",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported aspect ratio '{0}' (expected one of 3:4, 9:16, 1:1, 4:3, 16:9)")]
pub struct UnknownAspectRatio(pub String);

impl FromStr for AspectRatio {
    type Err = UnknownAspectRatio;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == trimmed)
            .ok_or_else(|| UnknownAspectRatio(trimmed.to_string()))
    }
}

/// One completed generation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub id: String,
    pub original_image: ImageRef,
    pub generated_image: ImageRef,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub ratio: AspectRatio,
}

impl GenerationResult {
    /// Last four characters of the id, used as the visible shot number.
    pub fn short_id(&self) -> &str {
        let start = self
            .id
            .char_indices()
            .rev()
            .nth(3)
            .map(|(index, _)| index)
            .unwrap_or(0);
        &self.id[start..]
    }
}

pub fn describe_prompt(persona_label: &str, pose_label: &str) -> String {
    format!("{persona_label} in {pose_label}")
}

/// Millisecond timestamp id, bumped past `previous` so ids stay unique and
/// increasing within a session.
pub fn next_result_id(previous: Option<&str>, now_millis: i64) -> String {
    let floor = previous
        .and_then(|value| value.parse::<i64>().ok())
        .map(|value| value.saturating_add(1))
        .unwrap_or(i64::MIN);
    now_millis.max(floor).to_string()
}
