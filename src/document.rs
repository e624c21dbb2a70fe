//! Document snapshots
//!
//! A [`Document`] is one version of an editor buffer together with the
//! data derived from it. Everything is computed when the snapshot is built
//! and never mutated afterwards; an edit replaces the whole snapshot.

use crate::position::{LineIndex, Position, Range};
use crate::segmenter::{self, Command, CommandSeparator};

/// One version of a document and its segmentation
#[derive(Debug, Clone)]
pub struct Document {
    uri: String,
    version: u64,
    text: String,
    line_index: LineIndex,
    commands: Vec<Command>,
}

impl Document {
    /// Build a snapshot, segmenting `text` with `separator`
    #[must_use]
    pub fn new(
        uri: impl Into<String>,
        version: u64,
        text: impl Into<String>,
        separator: CommandSeparator,
    ) -> Self {
        let uri = uri.into();
        let text = text.into();
        let commands = segmenter::segment(&text, separator);
        log::debug!(
            "Segmented '{uri}' version {version}: {} commands in {} bytes",
            commands.len(),
            text.len()
        );
        Self {
            line_index: LineIndex::new(&text),
            uri,
            version,
            text,
            commands,
        }
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Per-URI version, starting at `1`
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Commands ordered by `absolute_start`
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Index of the command containing `offset`
    #[must_use]
    pub fn command_index_at(&self, offset: usize) -> Option<usize> {
        segmenter::command_index_at(&self.commands, offset)
    }

    /// The command containing `offset`
    #[must_use]
    pub fn command_at(&self, offset: usize) -> Option<&Command> {
        segmenter::command_at(&self.commands, offset)
    }

    #[must_use]
    pub fn position_at(&self, offset: usize) -> Position {
        self.line_index.position_at(&self.text, offset)
    }

    #[must_use]
    pub fn offset_at(&self, position: Position) -> usize {
        self.line_index.offset_at(&self.text, position)
    }

    /// Line/character range of a byte span
    #[must_use]
    pub fn range(&self, start: usize, end: usize) -> Range {
        self.line_index.range(&self.text, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_segmented_on_creation() {
        let doc = Document::new("file:///a.kql", 1, "T | take 1\n\nU | count", CommandSeparator::BlankLine);
        assert_eq!(doc.commands().len(), 2);
        assert_eq!(doc.command_index_at(13), Some(1));
        assert_eq!(doc.command_at(0).unwrap().content(), "T | take 1");
    }

    #[test]
    fn test_positions() {
        let doc = Document::new("u", 1, "T\n| take 1", CommandSeparator::BlankLine);
        assert_eq!(doc.position_at(4), Position::new(1, 2));
        assert_eq!(doc.offset_at(Position::new(1, 2)), 4);
        let range = doc.range(0, doc.text().len());
        assert_eq!(range.end, Position::new(1, 8));
    }

    #[test]
    fn test_empty_document() {
        let doc = Document::new("u", 1, "", CommandSeparator::Semicolon);
        assert!(doc.commands().is_empty());
        assert!(doc.command_at(0).is_none());
    }
}
