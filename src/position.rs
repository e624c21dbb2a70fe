//! Text positions
//!
//! The worker addresses text with byte offsets. Editors address it with
//! 0-based line/character pairs where `character` counts UTF-16 code units.
//! `LineIndex` converts between the two.

use serde::{Deserialize, Serialize};

/// A 0-based line/character position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Line number (0-based)
    pub line: u32,
    /// Character in the line, in UTF-16 code units (0-based)
    pub character: u32,
}

impl Position {
    /// Create a position
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A line/character range, end exclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// A `[start, end)` window of byte offsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    /// Create an interval; reversed bounds are swapped
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// Whether a `[start, end)` span intersects this interval
    ///
    /// An empty span is a point and intersects when it lies within the
    /// interval bounds, end included.
    #[must_use]
    pub fn intersects(&self, start: usize, end: usize) -> bool {
        if start >= end {
            self.start <= start && start <= self.end
        } else {
            start < self.end && self.start < end
        }
    }
}

/// Line start table for one text snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    /// Build the index for `text`
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: text.len(),
        }
    }

    /// Number of lines (a text without line breaks has one)
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to a position, clamping to the text
    #[must_use]
    pub fn position_at(&self, text: &str, offset: usize) -> Position {
        let mut offset = offset.min(self.len);
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_starts.partition_point(|start| *start <= offset) - 1;
        let character = text[self.line_starts[line]..offset].encode_utf16().count();
        Position {
            line: u32::try_from(line).unwrap_or(u32::MAX),
            character: u32::try_from(character).unwrap_or(u32::MAX),
        }
    }

    /// Convert a position to a byte offset
    ///
    /// Lines past the end map to the end of the text. Characters past the
    /// end of a line map to the end of that line.
    #[must_use]
    pub fn offset_at(&self, text: &str, position: Position) -> usize {
        let Some(&line_start) = self.line_starts.get(position.line as usize) else {
            return self.len;
        };
        let mut units = 0u32;
        for (idx, ch) in text[line_start..].char_indices() {
            if ch == '\n' || ch == '\r' || units >= position.character {
                return line_start + idx;
            }
            units += u32::try_from(ch.len_utf16()).unwrap_or(2);
        }
        self.len
    }

    /// Convert a byte span to a line/character range
    #[must_use]
    pub fn range(&self, text: &str, start: usize, end: usize) -> Range {
        Range {
            start: self.position_at(text, start),
            end: self.position_at(text, end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_round_trip_over_lines() {
        let text = "T\n| take 10\n\nU";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.position_at(text, 4), Position::new(1, 2));
        assert_eq!(index.offset_at(text, Position::new(1, 2)), 4);
        assert_eq!(index.position_at(text, text.len()), Position::new(3, 1));
    }

    #[test]
    fn test_utf16_characters() {
        let text = "print '😀x'";
        let index = LineIndex::new(text);
        let x = text.find('x').unwrap();
        // The emoji is two UTF-16 code units
        assert_eq!(index.position_at(text, x), Position::new(0, 9));
        assert_eq!(index.offset_at(text, Position::new(0, 9)), x);
    }

    #[test]
    fn test_offset_clamps() {
        let text = "ab\ncd";
        let index = LineIndex::new(text);
        assert_eq!(index.offset_at(text, Position::new(0, 40)), 2);
        assert_eq!(index.offset_at(text, Position::new(9, 0)), text.len());
        assert_eq!(index.position_at(text, 100), Position::new(1, 2));
    }

    #[test]
    fn test_interval_intersection() {
        let interval = Interval::new(10, 20);
        assert!(interval.intersects(5, 11));
        assert!(interval.intersects(19, 30));
        assert!(!interval.intersects(20, 30));
        assert!(!interval.intersects(0, 10));
        assert!(interval.intersects(20, 20));
        assert!(!interval.intersects(21, 21));
        assert_eq!(Interval::new(5, 2), Interval { start: 2, end: 5 });
    }
}
