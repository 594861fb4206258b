//! Terminal rendering — crossterm-backed output for the edit line.
//!
//! ## Architecture
//!
//! [`Renderer`] owns the output sink and knows how to print buffer text,
//! move the visual cursor, and erase ahead, keeping the terminal cursor at
//! `prompt columns + buffer cursor` (one code point = one column).  Two
//! strategies share the interface:
//!
//! * **ANSI** — `queue!`-buffered CSI commands: `n A/B/C/D` relative moves,
//!   `n G` column set, `K`/`2K` erases, `2J` + `1;1H` clear screen.
//!   Backward motion across a wrap boundary goes up with `A` and re-seats
//!   the column with `G`.
//! * **Dumb** — backspace characters to move left, re-emitted text to move
//!   right, spaces-then-backspaces to erase.  Tabs count four columns.
//!
//! A *weird-wrap* terminal does not advance the cursor when the last column
//! fills; a dummy space plus carriage return after each boundary character
//! forces the wrap to commit.
//!
//! Masking substitutes the mask character for every buffer character shown;
//! the NUL mask prints nothing at all, so the visual cursor stays parked at
//! the end of the prompt.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::{
    cursor, queue,
    style::Print,
    terminal::{self, ClearType},
};

use crate::keys::KeystrokeDecoder;
use crate::nonblock::Peek;

/// Tab width used for column accounting by the dumb strategy.
const DUMB_TAB_WIDTH: usize = 4;

// ── TermCaps ──────────────────────────────────────────────────────────────────

/// What the renderer needs to know about the terminal.
#[derive(Debug, Clone, Copy)]
pub struct TermCaps {
    /// CSI sequences understood; `false` selects the dumb strategy.
    pub ansi: bool,
    /// Columns per row.
    pub width: usize,
    /// Rows on screen (pagination of completion listings).
    pub height: usize,
    /// Filling the last column does not advance the cursor until the next
    /// character is emitted.
    pub weird_wrap: bool,
    /// The terminal echoes typed input locally; the editor wipes the echo.
    pub echo: bool,
}

impl TermCaps {
    /// Probe the controlling terminal.  Falls back to a dumb 80×24 screen
    /// when stdout is not a terminal or `TERM` says `dumb`.
    pub fn detect() -> Self {
        use crossterm::tty::IsTty;
        let (w, h) = terminal::size().unwrap_or((80, 24));
        let term = std::env::var("TERM").unwrap_or_default();
        let ansi = io::stdout().is_tty() && !term.is_empty() && term != "dumb";
        Self {
            ansi,
            width: w as usize,
            height: h as usize,
            weird_wrap: false,
            echo: false,
        }
    }

    pub fn ansi(width: usize) -> Self {
        Self {
            ansi: true,
            width,
            height: 24,
            weird_wrap: false,
            echo: false,
        }
    }

    pub fn dumb(width: usize) -> Self {
        Self {
            ansi: false,
            ..Self::ansi(width)
        }
    }
}

impl Default for TermCaps {
    fn default() -> Self {
        Self::ansi(80)
    }
}

// ── Raw mode ──────────────────────────────────────────────────────────────────

/// Enable raw mode.  The guard restores cooked mode on drop.
pub fn enter_raw_mode() -> io::Result<RawModeGuard> {
    terminal::enable_raw_mode()?;
    Ok(RawModeGuard(()))
}

pub struct RawModeGuard(());

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────────

/// Owns the output sink and the display-side line state (prompt, mask).
pub struct Renderer {
    out: Box<dyn Write + Send>,
    caps: TermCaps,
    mask: Option<char>,
    prompt: String,
    prompt_cols: usize,
}

impl Renderer {
    pub fn new(out: Box<dyn Write + Send>, caps: TermCaps) -> Self {
        Self {
            out,
            caps,
            mask: None,
            prompt: String::new(),
            prompt_cols: 0,
        }
    }

    pub fn caps(&self) -> &TermCaps {
        &self.caps
    }

    pub fn mask(&self) -> Option<char> {
        self.mask
    }

    pub fn set_mask(&mut self, mask: Option<char>) {
        self.mask = mask;
    }

    /// Install the prompt for this line.  Only the portion after the last
    /// newline counts toward the cursor column, with ANSI escapes stripped.
    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.to_owned();
        let tail = prompt.rsplit('\n').next().unwrap_or("");
        self.prompt_cols = strip_ansi(tail).chars().count();
    }

    /// Visible width of the last prompt line.
    pub fn prompt_cols(&self) -> usize {
        self.prompt_cols
    }

    // ── Raw output ────────────────────────────────────────────────────────────

    pub fn draw_prompt(&mut self) -> io::Result<()> {
        write!(self.out, "{}", self.prompt)
    }

    /// Print `s` verbatim (messages, candidate listings).
    pub fn print_text(&mut self, s: &str) -> io::Result<()> {
        write!(self.out, "{s}")
    }

    /// End the current display line.
    pub fn newline(&mut self) -> io::Result<()> {
        write!(self.out, "\r\n")
    }

    pub fn bell(&mut self) -> io::Result<()> {
        write!(self.out, "\x07")?;
        self.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    // ── Buffer text ───────────────────────────────────────────────────────────

    /// Print `chars` with the visual cursor currently at buffer index `at`,
    /// leaving it after the last printed character.  Applies the mask and,
    /// on weird-wrap terminals, commits each wrap with a dummy space and
    /// carriage return.
    pub fn emit_chars(&mut self, chars: &[char], at: usize) -> io::Result<()> {
        if self.mask == Some('\0') {
            return Ok(());
        }
        let width = self.caps.width.max(1);
        for (k, &ch) in chars.iter().enumerate() {
            let shown = self.mask.unwrap_or(ch);
            if !self.caps.ansi && shown == '\t' {
                write!(self.out, "{}", " ".repeat(DUMB_TAB_WIDTH))?;
            } else {
                write!(self.out, "{shown}")?;
            }
            if self.caps.weird_wrap && (self.prompt_cols + at + k + 1) % width == 0 {
                queue!(self.out, Print(' '), Print('\r'))?;
            }
        }
        Ok(())
    }

    /// Move the visual cursor left over `num` buffer characters.
    ///
    /// `chars` is the whole buffer and `new_cursor` the buffer cursor after
    /// the move; the characters being crossed are
    /// `chars[new_cursor..new_cursor + num]`.
    pub fn back(&mut self, chars: &[char], new_cursor: usize, num: usize) -> io::Result<()> {
        if num == 0 || self.mask == Some('\0') {
            return Ok(());
        }
        if self.caps.ansi {
            let width = self.caps.width.max(1);
            let cursor_abs = self.prompt_cols + new_cursor;
            let new_col = cursor_abs % width;
            let real_col = (cursor_abs + num) % width;
            let mut up = num / width;
            if real_col < new_col {
                up += 1;
            }
            if up > 0 {
                queue!(
                    self.out,
                    cursor::MoveUp(up as u16),
                    cursor::MoveToColumn(new_col as u16)
                )?;
            } else {
                queue!(self.out, cursor::MoveLeft(num as u16))?;
            }
        } else {
            let crossed = chars
                .get(new_cursor..(new_cursor + num).min(chars.len()))
                .unwrap_or(&[]);
            let cols = if crossed.is_empty() {
                num
            } else {
                self.cols_of(crossed)
            };
            write!(self.out, "{}", "\u{8}".repeat(cols))?;
        }
        Ok(())
    }

    /// Erase `num` columns of stale text ahead of the visual cursor, which
    /// sits `delta` characters past buffer index `cursor`, and return to it.
    pub fn clear_ahead(&mut self, num: usize, cursor: usize, delta: usize) -> io::Result<()> {
        if num == 0 || self.mask == Some('\0') {
            return Ok(());
        }
        if self.caps.ansi {
            let width = self.caps.width.max(1);
            let pos = self.prompt_cols + cursor + delta;
            queue!(self.out, terminal::Clear(ClearType::UntilNewLine))?;
            let cur_col = pos % width;
            let end_col = (pos + num - 1) % width;
            let mut lines = num / width;
            if end_col < cur_col {
                lines += 1;
            }
            for _ in 0..lines {
                queue!(
                    self.out,
                    cursor::MoveDown(1),
                    terminal::Clear(ClearType::CurrentLine)
                )?;
            }
            if lines > 0 {
                queue!(
                    self.out,
                    cursor::MoveUp(lines as u16),
                    cursor::MoveToColumn(cur_col as u16)
                )?;
            }
        } else {
            write!(self.out, "{}", " ".repeat(num))?;
            write!(self.out, "{}", "\u{8}".repeat(num))?;
        }
        Ok(())
    }

    /// Wipe `cols` columns of locally-echoed input behind the cursor.
    pub fn erase_echo(&mut self, cols: usize) -> io::Result<()> {
        if cols == 0 {
            return Ok(());
        }
        write!(self.out, "{}", "\u{8}".repeat(cols))?;
        write!(self.out, "{}", " ".repeat(cols))?;
        write!(self.out, "{}", "\u{8}".repeat(cols))
    }

    /// Move to column 0 of the first edit row and erase prompt plus buffer.
    pub fn clear_edit_line(&mut self, chars: &[char], cursor: usize) -> io::Result<()> {
        let shown = if self.mask == Some('\0') { 0 } else { chars.len() };
        let shown_cursor = cursor.min(shown);
        if self.caps.ansi {
            let width = self.caps.width.max(1);
            let cur = self.prompt_cols + shown_cursor;
            let total = self.prompt_cols + shown;
            queue!(self.out, Print('\r'))?;
            let up = cur / width;
            if up > 0 {
                queue!(self.out, cursor::MoveUp(up as u16))?;
            }
            queue!(self.out, terminal::Clear(ClearType::UntilNewLine))?;
            let rows = if total == 0 { 0 } else { (total - 1) / width };
            for _ in 0..rows {
                queue!(
                    self.out,
                    cursor::MoveDown(1),
                    terminal::Clear(ClearType::CurrentLine)
                )?;
            }
            if rows > 0 {
                queue!(self.out, cursor::MoveUp(rows as u16), Print('\r'))?;
            }
        } else {
            let behind = self.prompt_cols + self.cols_of(&chars[..shown_cursor]);
            let total = self.prompt_cols + self.cols_of(&chars[..shown]);
            write!(self.out, "{}", "\u{8}".repeat(behind))?;
            write!(self.out, "{}", " ".repeat(total))?;
            write!(self.out, "{}", "\u{8}".repeat(total))?;
        }
        Ok(())
    }

    /// Clear the whole screen and home the cursor.  Reports `false` on a
    /// dumb terminal, which has no way to do this.
    pub fn clear_screen(&mut self) -> io::Result<bool> {
        if !self.caps.ansi {
            return Ok(false);
        }
        queue!(self.out, terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        Ok(true)
    }

    // ── Position report ───────────────────────────────────────────────────────

    /// Ask the terminal where its cursor is (`CSI 6n`), parsing the
    /// `CSI row ; col R` report from `decoder`.  `None` when the report
    /// cannot be read or parsed; callers must tolerate that.
    pub fn cursor_position(
        &mut self,
        decoder: &mut KeystrokeDecoder,
    ) -> io::Result<Option<(u16, u16)>> {
        if !self.caps.ansi {
            return Ok(None);
        }
        write!(self.out, "\x1b[6n")?;
        self.flush()?;
        if decoder.is_nonblocking_enabled()
            && decoder.peek(Duration::from_millis(500)) == Peek::TimedOut
        {
            return Ok(None);
        }
        if decoder.read_character() != Some('\x1b') {
            return Ok(None);
        }
        if decoder.read_character() != Some('[') {
            return Ok(None);
        }
        let mut row = 0u32;
        let mut col = 0u32;
        let mut into_col = false;
        for _ in 0..16 {
            match decoder.read_character() {
                Some(c) if c.is_ascii_digit() => {
                    let d = c as u32 - '0' as u32;
                    if into_col {
                        col = col * 10 + d;
                    } else {
                        row = row * 10 + d;
                    }
                }
                Some(';') if !into_col => into_col = true,
                Some('R') if into_col => {
                    return Ok(u16::try_from(row)
                        .ok()
                        .zip(u16::try_from(col).ok()));
                }
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    // ── Column accounting ─────────────────────────────────────────────────────

    /// Columns `chars` occupy on screen under the current mask and strategy.
    fn cols_of(&self, chars: &[char]) -> usize {
        match self.mask {
            Some('\0') => 0,
            Some(_) => chars.len(),
            None if !self.caps.ansi => chars
                .iter()
                .map(|&c| if c == '\t' { DUMB_TAB_WIDTH } else { 1 })
                .sum(),
            None => chars.len(),
        }
    }
}

// ── ANSI stripping ────────────────────────────────────────────────────────────

/// Remove ANSI escape sequences from `s` for width computation.
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut it = s.chars().peekable();
    while let Some(c) = it.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        match it.peek() {
            Some('[') => {
                it.next();
                for c2 in it.by_ref() {
                    if ('\x40'..='\x7e').contains(&c2) {
                        break;
                    }
                }
            }
            Some(']') => {
                it.next();
                for c2 in it.by_ref() {
                    if c2 == '\x07' {
                        break;
                    }
                }
            }
            Some(_) => {
                it.next();
            }
            None => {}
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
