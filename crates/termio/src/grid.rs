//! vt100-backed screen that can sit behind a transport's read thread.

use std::sync::Mutex;

use termio_common::mutex_lock_or_recover;
use vt100::Parser;

use crate::config::GridSize;
use crate::config::saturate_u16;
use crate::ingest::Ingest;

const MAX_SCROLLBACK: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
}

/// Terminal grid fed from the read thread and inspected from anywhere else.
pub struct Grid {
    parser: Mutex<Parser>,
}

impl Grid {
    pub fn new(size: GridSize) -> Self {
        let parser = Parser::new(
            saturate_u16(size.rows),
            saturate_u16(size.columns),
            MAX_SCROLLBACK,
        );
        Self {
            parser: Mutex::new(parser),
        }
    }

    pub fn size(&self) -> GridSize {
        let parser = mutex_lock_or_recover(&self.parser);
        let (rows, cols) = parser.screen().size();
        GridSize::new(u32::from(cols), u32::from(rows))
    }

    pub fn resize(&self, size: GridSize) {
        let mut parser = mutex_lock_or_recover(&self.parser);
        parser.set_size(saturate_u16(size.rows), saturate_u16(size.columns));
    }

    /// Visible text, one line per row, trailing blanks and blank rows trimmed.
    pub fn screen_text(&self) -> String {
        let parser = mutex_lock_or_recover(&self.parser);
        let screen = parser.screen();
        let (rows, cols) = screen.size();

        let mut lines: Vec<String> = (0..rows)
            .map(|row| {
                let line: String = (0..cols)
                    .map(|col| {
                        screen
                            .cell(row, col)
                            .and_then(|cell| cell.contents().chars().next())
                            .unwrap_or(' ')
                    })
                    .collect();
                line.trim_end().to_string()
            })
            .collect();

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        lines.join("\n")
    }

    pub fn cursor(&self) -> CursorPosition {
        let parser = mutex_lock_or_recover(&self.parser);
        let screen = parser.screen();
        let (row, col) = screen.cursor_position();

        CursorPosition {
            row,
            col,
            visible: !screen.hide_cursor(),
        }
    }
}

impl Ingest for Grid {
    fn ingest(&self, data: &[u8]) {
        let mut parser = mutex_lock_or_recover(&self.parser);
        parser.process(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_updates_screen() {
        let grid = Grid::new(GridSize::new(80, 24));
        grid.ingest(b"Hello, World!");
        assert_eq!(grid.screen_text(), "Hello, World!");
    }

    #[test]
    fn test_cursor_follows_output() {
        let grid = Grid::new(GridSize::new(80, 24));
        grid.ingest(b"ABC\r\nde");
        let cursor = grid.cursor();
        assert_eq!(cursor.row, 1);
        assert_eq!(cursor.col, 2);
        assert!(cursor.visible);
    }

    #[test]
    fn test_resize_changes_size() {
        let grid = Grid::new(GridSize::new(80, 24));
        assert_eq!(grid.size(), GridSize::new(80, 24));
        grid.resize(GridSize::new(100, 30));
        assert_eq!(grid.size(), GridSize::new(100, 30));
    }

    #[test]
    fn test_escape_sequences_are_interpreted() {
        let grid = Grid::new(GridSize::new(20, 5));
        grid.ingest(b"\x1b[1mBold\x1b[0m\x1b[?25l");
        assert_eq!(grid.screen_text(), "Bold");
        assert!(!grid.cursor().visible);
    }
}
