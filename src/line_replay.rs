use vte::{Parser, Perform};

const TAB_WIDTH: usize = 8;

/// Replays bytes written to a sink and reconstructs what a viewer would see: the lines
/// that were terminated, and the line the cursor is currently on.
///
/// Only what the printer's output relies on is modelled: printable text, carriage
/// return, line feed, tab and backspace. Line feeds are treated as carriage return plus
/// line feed, the way a terminal in cooked mode shows them. Escape sequences are parsed
/// and dropped.
pub struct LineReplay {
    parser: Parser,
    screen: Line,
}

impl LineReplay {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            screen: Line::default(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> &mut Self {
        for byte in bytes {
            self.parser.advance(&mut self.screen, *byte);
        }
        self
    }

    /// Lines that have been ended with a line feed, trailing blanks removed.
    pub fn committed(&self) -> &[String] {
        &self.screen.committed
    }

    /// The line under the cursor, trailing blanks removed.
    pub fn visible(&self) -> String {
        self.screen.text()
    }
}

impl Default for LineReplay {
    fn default() -> Self {
        Self::new()
    }
}

// Cells of the cursor's line plus everything scrolled past it.
#[derive(Default)]
struct Line {
    committed: Vec<String>,
    cells: Vec<char>,
    cursor: usize,
}

impl Line {
    fn text(&self) -> String {
        let line: String = self.cells.iter().collect();
        line.trim_end().to_string()
    }

    fn pad_to(&mut self, column: usize) {
        if self.cells.len() < column {
            self.cells.resize(column, ' ');
        }
    }
}

impl Perform for Line {
    fn print(&mut self, c: char) {
        self.pad_to(self.cursor);
        match self.cells.get_mut(self.cursor) {
            Some(cell) => *cell = c,
            None => self.cells.push(c),
        }
        self.cursor += 1;
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\x08' => self.cursor = self.cursor.saturating_sub(1),
            b'\t' => {
                self.cursor = (self.cursor / TAB_WIDTH + 1) * TAB_WIDTH;
                self.pad_to(self.cursor);
            }
            b'\n' => {
                let line = self.text();
                self.committed.push(line);
                self.cells.clear();
                self.cursor = 0;
            }
            b'\r' => self.cursor = 0,
            _ => {}
        }
    }
}
