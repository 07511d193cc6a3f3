use serde::{Deserialize, Serialize};

/// One observed chat message.
///
/// Immutable once built; every cache scope that holds it shares the same
/// allocation (see `koalabot_core::cache`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub guild_id: String,
    pub channel_id: String,
    pub author_name: String,
    pub author_id: String,
    pub content: String,
    /// Wall-clock milliseconds since the epoch at the time we observed it.
    pub timestamp_ms: i64,
    /// Attachment URL, empty when the message carried no image.
    #[serde(default)]
    pub image_url: String,
}

impl ChatEvent {
    pub fn new(
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        author_name: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            author_name: author_name.into(),
            author_id: author_id.into(),
            content: content.into(),
            timestamp_ms,
            image_url: String::new(),
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = url.into();
        self
    }

    /// `"{author}<@{author_id}>: {content}"`, the line format used by the
    /// chat history logs.
    pub fn standard_format(&self) -> String {
        format!("{}<@{}>: {}", self.author_name, self.author_id, self.content)
    }

    /// Parses a line written by [`ChatEvent::standard_format`].
    ///
    /// Returns `None` when the author/id markers are missing.
    pub fn parse_standard_format(
        guild_id: &str,
        channel_id: &str,
        line: &str,
        timestamp_ms: i64,
    ) -> Option<Self> {
        let (author, rest) = line.split_once('<')?;
        let (raw_id, rest) = rest.split_once('>')?;
        let author_id = raw_id.trim_start_matches('@');
        let content = rest.strip_prefix(':')?;
        let content = content.strip_prefix(' ').unwrap_or(content);

        if author.is_empty() {
            return None;
        }

        Some(Self::new(guild_id, channel_id, author, author_id, content, timestamp_ms))
    }
}
