use crate::files::{File, FileRef};
use line_index::{LineCol, LineIndex, TextSize};

/// A byte-offset range inside one file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Loc {
    pub file: FileRef,
    pub start: u32,
    pub end: u32,
}

impl Loc {
    pub fn new(file: FileRef, start: u32, end: u32) -> Loc {
        Loc { file, start, end }
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset <= self.end
    }
}

/// Zero-based line/character pair, the unit LSP speaks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineColumn {
    pub line: u32,
    pub column: u32,
}

/// Map a byte offset into a zero-based line/column.
pub fn offset_to_line_column(source: &str, lines: &LineIndex, offset: u32) -> LineColumn {
    let lc = lines.line_col(TextSize::new(offset.min(source.len() as u32)));
    LineColumn {
        line: lc.line,
        column: lc.col,
    }
}

/// Map a zero-based line/column back to a byte offset. Positions past the end
/// of a line clamp to the line end; positions past the last line clamp to the
/// end of the file. The clamping is done here because the line index accepts
/// any column for an existing line.
pub fn line_column_to_offset(source: &str, lines: &LineIndex, pos: LineColumn) -> u32 {
    let line_start: u32 = match lines.offset(LineCol {
        line: pos.line,
        col: 0,
    }) {
        Some(offset) => offset.into(),
        None => return source.len() as u32,
    };

    let rest = &source[line_start as usize..];
    let line_len = rest.find('\n').unwrap_or(rest.len()) as u32;
    line_start + pos.column.min(line_len)
}

impl File {
    pub fn line_column(&self, offset: u32) -> LineColumn {
        offset_to_line_column(self.source(), self.lines(), offset)
    }

    pub fn offset(&self, pos: LineColumn) -> u32 {
        line_column_to_offset(self.source(), self.lines(), pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileTable;
    use pretty_assertions::assert_eq;

    #[test]
    fn offset_round_trips_through_line_column() {
        let mut files = FileTable::default();
        let f = files.enter("/w/a.moss", "x = 1\ndef greet(name)\nend\n".to_string());
        let file = files.get(f);

        for offset in 0..=file.source().len() as u32 {
            let lc = file.line_column(offset);
            assert_eq!(file.offset(lc), offset);
        }
    }

    #[test]
    fn past_end_positions_clamp() {
        let mut files = FileTable::default();
        let f = files.enter("/w/a.moss", "ab\ncd\n".to_string());
        let file = files.get(f);

        let clamped = file.offset(LineColumn {
            line: 0,
            column: 99,
        });
        assert_eq!(clamped, 2);

        let past_last = file.offset(LineColumn {
            line: 40,
            column: 0,
        });
        assert_eq!(past_last, 6);
    }
}
