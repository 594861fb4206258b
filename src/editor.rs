//! The editor — top-level read loop, binding resolution, and the command
//! set.
//!
//! ## Read-loop shape
//!
//! One iteration pulls a key (pushback stack first, then the decoder),
//! appends it to the pending sequence, and resolves the sequence against
//! the active keymap.  A partial match keeps reading — except for a lone
//! ESC, which commits the node's `another_key` when the escape timer
//! expires with no byte waiting.  A miss backs off: tail keys are pushed
//! back and shorter prefixes retried.  Macros replay through the pushback
//! stack, so resolution stays a single flat state machine with no
//! recursive key handlers.
//!
//! All rendering goes through buffer-index primitives that keep the
//! terminal cursor equal to the prompt width plus the buffer cursor.
//!
//! Per-line state (buffer, pending sequence, pushback, search, repeat
//! count) is reset when `read_line` starts; keymaps, history, the macro
//! recorder, and the kill slot persist across calls.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::buffer::CursorBuffer;
use crate::complete::{Completer, CompletionHandler, ListCompletionHandler};
use crate::config::{EditorConfig, InitSource};
use crate::expand::expand_events;
use crate::history::HistoryView;
use crate::keymap::{Binding, KeymapName, Keymaps, Lookup, Operation};
use crate::keys::{caret_width, KeystrokeDecoder};
use crate::nonblock::{NonblockingReader, Peek};
use crate::render::{Renderer, TermCaps};
use crate::search::SearchState;

const ESC: char = '\x1b';

// ── Internal state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Search,
}

#[derive(Debug, Default)]
struct MacroState {
    recording: bool,
    keys: String,
}

/// What a dispatched command did.
enum Flow {
    Done,
    Failed,
    Accept(String),
    Eof,
}

enum Resolution {
    /// More keys may follow; keep reading.
    Pending,
    /// Nothing matched at any prefix; drop the sequence.
    Discard,
    /// A terminal binding.
    Commit(Binding),
}

enum SearchEnd {
    Complete,
    Abort,
}

// ── Editor ────────────────────────────────────────────────────────────────────

/// Keymap-driven line editor over a byte source and an output sink.
///
/// Callers must serialize `read_line` calls; the editor owns all mutable
/// state and shares none of it.
pub struct Editor {
    decoder: KeystrokeDecoder,
    renderer: Renderer,
    keymaps: Keymaps,
    history: HistoryView,
    completers: Vec<Arc<dyn Completer>>,
    completion_handler: Arc<dyn CompletionHandler>,
    init_source: Option<Arc<dyn InitSource>>,
    config: EditorConfig,
    macro_state: MacroState,
    kill_buffer: String,

    // Per-line state, reset at `read_line` entry.
    buf: CursorBuffer,
    pending: String,
    pushback: Vec<char>,
    last_seq: String,
    repeat_count: u32,
    arg_digit: bool,
    state: State,
    search: SearchState,
    search_backup: String,
    search_backup_cursor: usize,
    original_prompt: String,
}

impl Editor {
    /// Build an editor over `input` and `output`.
    ///
    /// The non-blocking helper thread is started when the configured escape
    /// timeout is non-zero; a zero timeout reads the source inline and
    /// disables escape disambiguation.
    pub fn new(
        input: Box<dyn Read + Send>,
        output: Box<dyn Write + Send>,
        caps: TermCaps,
        config: EditorConfig,
    ) -> Self {
        let nonblocking = !config.escape_timeout.is_zero();
        Self {
            decoder: KeystrokeDecoder::new(NonblockingReader::new(input, nonblocking)),
            renderer: Renderer::new(output, caps),
            keymaps: Keymaps::new(),
            history: HistoryView::default(),
            completers: Vec::new(),
            completion_handler: Arc::new(ListCompletionHandler),
            init_source: None,
            config,
            macro_state: MacroState::default(),
            kill_buffer: String::new(),
            buf: CursorBuffer::new(),
            pending: String::new(),
            pushback: Vec::new(),
            last_seq: String::new(),
            repeat_count: 0,
            arg_digit: false,
            state: State::Normal,
            search: SearchState::new(),
            search_backup: String::new(),
            search_backup_cursor: 0,
            original_prompt: String::new(),
        }
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EditorConfig {
        &mut self.config
    }

    pub fn history(&self) -> &HistoryView {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryView {
        &mut self.history
    }

    pub fn set_history(&mut self, history: HistoryView) {
        self.history = history;
    }

    pub fn keymaps(&self) -> &Keymaps {
        &self.keymaps
    }

    pub fn keymaps_mut(&mut self) -> &mut Keymaps {
        &mut self.keymaps
    }

    pub fn set_keymap(&mut self, name: KeymapName) {
        self.keymaps.select(name);
    }

    pub fn keymap_name(&self) -> KeymapName {
        self.keymaps.active_name()
    }

    pub fn add_completer(&mut self, completer: Arc<dyn Completer>) {
        self.completers.push(completer);
    }

    pub fn set_completion_handler(&mut self, handler: Arc<dyn CompletionHandler>) {
        self.completion_handler = handler;
    }

    pub fn set_init_source(&mut self, source: Arc<dyn InitSource>) {
        self.init_source = Some(source);
    }

    /// Current buffer contents.
    pub fn buffer_text(&self) -> String {
        self.buf.text()
    }

    /// Current buffer cursor.
    pub fn cursor(&self) -> usize {
        self.buf.cursor
    }

    /// Insert host-supplied clipboard text at the cursor.
    pub fn paste(&mut self, text: &str) -> io::Result<()> {
        self.put_string(text)?;
        self.renderer.flush()
    }

    /// Ask the terminal where its cursor is (`CSI 6n`).  `None` when the
    /// report cannot be read or parsed.
    pub fn query_cursor_position(&mut self) -> io::Result<Option<(u16, u16)>> {
        self.renderer.cursor_position(&mut self.decoder)
    }

    /// Stop the background input helper (idempotent).
    pub fn shutdown(&mut self) {
        self.decoder.shutdown();
    }

    // ── Read loop ─────────────────────────────────────────────────────────────

    /// Read one line.  `None` means EOF on the input source.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.read_line_masked(prompt, None)
    }

    /// Read one line, echoing `mask` instead of typed characters.
    /// A NUL mask echoes nothing; masked lines stay out of history.
    pub fn read_line_masked(
        &mut self,
        prompt: &str,
        mask: Option<char>,
    ) -> io::Result<Option<String>> {
        self.original_prompt = prompt.to_owned();
        self.renderer.set_prompt(prompt);
        self.renderer.set_mask(mask);
        self.buf.clear();
        self.buf.overtype = false;
        self.pending.clear();
        self.pushback.clear();
        self.last_seq.clear();
        self.repeat_count = 0;
        self.arg_digit = false;
        self.state = State::Normal;
        self.search = SearchState::new();
        self.search_backup.clear();
        self.search_backup_cursor = 0;

        self.renderer.draw_prompt()?;
        self.renderer.flush()?;

        loop {
            let Some(key) = self.next_key()? else {
                self.renderer.set_mask(None);
                return Ok(None);
            };
            self.pending.push(key);
            if self.macro_state.recording {
                self.macro_state.keys.push(key);
            }

            let binding = match self.resolve_pending(key) {
                Resolution::Pending => continue,
                Resolution::Discard => {
                    self.pending.clear();
                    continue;
                }
                Resolution::Commit(b) => b,
            };
            self.last_seq = std::mem::take(&mut self.pending);

            match binding {
                Binding::Macro(body) => {
                    for ch in body.chars().rev() {
                        self.pushback.push(ch);
                    }
                }
                Binding::Callback(cb) => {
                    cb(&mut self.buf);
                }
                Binding::Keymap(_) => {}
                Binding::Op(op) => {
                    let flow = self.handle_operation(op, key)?;
                    self.renderer.flush()?;
                    match flow {
                        Flow::Done => {}
                        Flow::Failed => {
                            if self.config.bell_enabled {
                                self.renderer.bell()?;
                            }
                        }
                        Flow::Accept(line) => {
                            if self.config.history_enabled && self.renderer.mask().is_none() {
                                self.history.add(&line);
                            }
                            self.renderer.set_mask(None);
                            return Ok(Some(line));
                        }
                        Flow::Eof => {
                            self.renderer.set_mask(None);
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    /// One key: pushback stack first, then the decoder.  Wipes the local
    /// echo (caret-notation columns) when the terminal echoes.
    fn next_key(&mut self) -> io::Result<Option<char>> {
        if let Some(k) = self.pushback.pop() {
            return Ok(Some(k));
        }
        let Some(ch) = self.decoder.read_character() else {
            return Ok(None);
        };
        if self.renderer.caps().echo {
            let col = self.renderer.prompt_cols() + self.buf.cursor;
            let w = caret_width(ch, col);
            self.renderer.erase_echo(w)?;
        }
        Ok(Some(ch))
    }

    /// Resolve the pending sequence: lowercase retry, escape timeout,
    /// prefix backoff.
    fn resolve_pending(&mut self, key: char) -> Resolution {
        enum Hit {
            Miss,
            Partial(Option<Binding>),
            Found(Binding),
        }
        fn hit(maps: &Keymaps, seq: &str) -> Hit {
            match maps.active().lookup(seq) {
                Lookup::Miss => Hit::Miss,
                Lookup::Partial(m) => Hit::Partial(m.another_key().cloned()),
                Lookup::Found(b) => Hit::Found(b.clone()),
            }
        }

        let mut h = hit(&self.keymaps, &self.pending);
        if matches!(h, Hit::Found(Binding::Op(Operation::DoLowercaseVersion))) {
            if let Some(last) = self.pending.pop() {
                self.pending.extend(last.to_lowercase());
            }
            h = hit(&self.keymaps, &self.pending);
        }

        match h {
            Hit::Found(b) => Resolution::Commit(b),
            Hit::Partial(another) => {
                let lone_esc =
                    key == ESC && self.pending.chars().count() == 1 && self.pushback.is_empty();
                if lone_esc
                    && self.decoder.is_nonblocking_enabled()
                    && !self.config.escape_timeout.is_zero()
                    && self.decoder.peek(self.config.escape_timeout) == Peek::TimedOut
                {
                    return match another {
                        Some(b) => Resolution::Commit(b),
                        None => Resolution::Discard,
                    };
                }
                Resolution::Pending
            }
            Hit::Miss => {
                while self.pending.chars().count() > 1 {
                    if let Some(last) = self.pending.pop() {
                        self.pushback.push(last);
                    }
                    match hit(&self.keymaps, &self.pending) {
                        Hit::Found(b) => return Resolution::Commit(b),
                        Hit::Partial(Some(b)) => return Resolution::Commit(b),
                        _ => {}
                    }
                }
                Resolution::Discard
            }
        }
    }

    /// Route an operation through the SEARCH policy table, then dispatch.
    fn handle_operation(&mut self, op: Operation, key: char) -> io::Result<Flow> {
        let op = if self.state == State::Search {
            match self.search_key(op)? {
                Some(next) => next,
                None => return Ok(Flow::Done),
            }
        } else {
            op
        };
        let flow = self.dispatch(op, key)?;
        if self.arg_digit {
            self.arg_digit = false;
        } else {
            self.repeat_count = 0;
        }
        Ok(flow)
    }

    // ── Command dispatch ──────────────────────────────────────────────────────

    fn dispatch(&mut self, op: Operation, key: char) -> io::Result<Flow> {
        use Operation::*;
        let count = self.repeat_count.max(1) as usize;
        let ok = match op {
            SelfInsert => {
                let seq = self.last_seq.clone();
                self.put_string(&seq)?;
                true
            }
            TabInsert => {
                self.put_string("\t")?;
                true
            }
            BeginningOfLine => {
                self.set_cursor(0)?;
                true
            }
            EndOfLine => {
                self.set_cursor(self.buf.len())?;
                true
            }
            BackwardChar => self.move_cursor(-(count as i64))? != 0,
            ForwardChar => self.move_cursor(count as i64)? != 0,
            BackwardWord => self.backward_word()?,
            ForwardWord => self.forward_word()?,
            BackwardDeleteChar => self.backspace(1)? > 0,
            DeleteChar => self.delete_current()?,
            KillLine => self.kill_line()?,
            KillWholeLine => self.kill_whole_line()?,
            UnixLineDiscard => self.unix_line_discard()?,
            UnixWordRubout => self.rubout_word(char::is_whitespace)?,
            BackwardKillWord => self.rubout_word(is_delimiter)?,
            KillWord => self.kill_word()?,
            Yank => self.yank()?,
            CapitalizeWord => self.case_word(CaseMode::Capitalize)?,
            UpcaseWord => self.case_word(CaseMode::Upper)?,
            DowncaseWord => self.case_word(CaseMode::Lower)?,
            TransposeChars => self.transpose_chars(count)?,
            OverwriteMode => {
                self.buf.overtype = !self.buf.overtype;
                true
            }
            ClearScreen => {
                if self.renderer.clear_screen()? {
                    self.redraw_line()?;
                    true
                } else {
                    false
                }
            }

            PreviousHistory => self.move_history(-1, false)?,
            NextHistory => self.move_history(1, false)?,
            ViPreviousHistory => self.move_history(-1, true)?,
            ViNextHistory => self.move_history(1, true)?,
            BeginningOfHistory => {
                if self.history.move_to_first() {
                    self.install_history_entry(false)?;
                    true
                } else {
                    false
                }
            }
            EndOfHistory => {
                if self.history.move_to_last() {
                    self.install_history_entry(false)?;
                    true
                } else {
                    false
                }
            }
            ReverseSearchHistory => {
                self.start_search()?;
                true
            }

            Complete => self.complete_op()?,
            PossibleCompletions => self.possible_completions()?,

            StartKbdMacro => {
                self.macro_state.recording = true;
                self.macro_state.keys.clear();
                true
            }
            EndKbdMacro => {
                if !self.macro_state.recording {
                    false
                } else {
                    self.macro_state.recording = false;
                    for _ in 0..self.last_seq.chars().count() {
                        self.macro_state.keys.pop();
                    }
                    true
                }
            }
            CallLastKbdMacro => {
                if self.macro_state.keys.is_empty() {
                    false
                } else {
                    for ch in self.macro_state.keys.chars().rev() {
                        self.pushback.push(ch);
                    }
                    true
                }
            }

            AcceptLine => return self.accept_line(),
            ViMoveAcceptLine => {
                self.keymaps.select(KeymapName::ViInsert);
                return self.accept_line();
            }
            ViEofMaybe => {
                if self.buf.is_empty() {
                    return Ok(Flow::Eof);
                }
                return self.accept_line();
            }
            InsertComment => return self.insert_comment(false),
            ViInsertComment => return self.insert_comment(true),

            EmacsEditingMode => {
                self.keymaps.select(KeymapName::Emacs);
                true
            }
            ViEditingMode | ViInsertionMode => {
                self.keymaps.select(KeymapName::ViInsert);
                true
            }
            ViMovementMode => {
                self.move_cursor(-1)?;
                self.keymaps.select(KeymapName::ViMove);
                true
            }
            ViAppendMode => {
                self.move_cursor(1)?;
                self.keymaps.select(KeymapName::ViInsert);
                true
            }
            ViAppendEol => {
                self.set_cursor(self.buf.len())?;
                self.keymaps.select(KeymapName::ViInsert);
                true
            }
            ViInsertBeg => {
                self.set_cursor(0)?;
                self.keymaps.select(KeymapName::ViInsert);
                true
            }
            ViArgDigit => {
                self.push_arg_digit(key);
                true
            }
            ViBeginningOfLineOrArgDigit => {
                if self.repeat_count > 0 {
                    self.push_arg_digit(key);
                } else {
                    self.set_cursor(0)?;
                }
                true
            }
            ViPrevWord => self.vi_prev_word(count)?,
            ViNextWord => self.vi_next_word(count)?,
            ViEndWord => self.vi_end_word(count)?,
            ViRubout => self.backspace(count)? > 0,
            ViDelete => self.delete_current()?,
            ViChangeCase => self.vi_change_case(count)?,
            ViMatch => self.vi_match()?,
            ViSearch => return self.vi_search(key),

            ReReadInitFile => match self.init_source.clone() {
                Some(source) => {
                    source.apply(&mut self.keymaps, &mut self.config)?;
                    true
                }
                None => false,
            },
            Abort | DoLowercaseVersion => false,
        };
        Ok(if ok { Flow::Done } else { Flow::Failed })
    }

    fn push_arg_digit(&mut self, key: char) {
        if let Some(d) = key.to_digit(10) {
            self.arg_digit = true;
            self.repeat_count = self.repeat_count.saturating_mul(10).saturating_add(d);
        }
    }

    // ── Accept ────────────────────────────────────────────────────────────────

    fn accept_line(&mut self) -> io::Result<Flow> {
        self.set_cursor(self.buf.len())?;
        let mut line = self.buf.text();
        let mut expanded_changed = false;
        if self.config.expand_events {
            match expand_events(&line, self.history.provider()) {
                Ok((expanded, changed)) => {
                    expanded_changed = changed;
                    line = expanded;
                }
                Err(e) => {
                    self.renderer.newline()?;
                    self.renderer.print_text(&e.to_string())?;
                    self.renderer.newline()?;
                    self.redraw_line()?;
                    return Ok(Flow::Done);
                }
            }
        }
        self.renderer.newline()?;
        if expanded_changed {
            self.renderer.print_text(&line)?;
            self.renderer.newline()?;
        }
        self.renderer.flush()?;
        Ok(Flow::Accept(line))
    }

    fn insert_comment(&mut self, vi_mode: bool) -> io::Result<Flow> {
        let prefix = self.comment_prefix();
        self.set_cursor(0)?;
        self.put_string(&prefix)?;
        if vi_mode {
            self.keymaps.select(KeymapName::ViInsert);
        }
        self.accept_line()
    }

    fn comment_prefix(&self) -> String {
        if let Some(c) = &self.config.comment_begin {
            return c.clone();
        }
        if let Some(source) = &self.init_source {
            if let Some(v) = source.variable("comment-begin") {
                return v;
            }
        }
        "#".to_owned()
    }

    // ── History navigation ────────────────────────────────────────────────────

    fn move_history(&mut self, dir: i32, cursor_to_start: bool) -> io::Result<bool> {
        let moved = if dir < 0 {
            self.history.previous()
        } else {
            self.history.next()
        };
        if !moved {
            return Ok(false);
        }
        self.install_history_entry(cursor_to_start)?;
        Ok(true)
    }

    fn install_history_entry(&mut self, cursor_to_start: bool) -> io::Result<()> {
        let text = self.history.current().to_owned();
        self.set_buffer(&text)?;
        if cursor_to_start {
            self.set_cursor(0)?;
        }
        Ok(())
    }

    // ── Reverse incremental search ────────────────────────────────────────────

    fn start_search(&mut self) -> io::Result<()> {
        self.state = State::Search;
        self.search.start();
        self.search_backup = self.buf.text();
        self.search_backup_cursor = self.buf.cursor;
        self.draw_search_status()
    }

    /// SEARCH-state key policy.  `Some(op)` exits search and re-dispatches.
    fn search_key(&mut self, op: Operation) -> io::Result<Option<Operation>> {
        use Operation::*;
        match op {
            SelfInsert => {
                for ch in self.last_seq.clone().chars() {
                    self.search.push(ch);
                }
                self.research_from_end()?;
                Ok(None)
            }
            BackwardDeleteChar => {
                self.search.pop();
                self.research_from_end()?;
                Ok(None)
            }
            ReverseSearchHistory => {
                if self.search.term.is_empty() && !self.search.reuse_previous() {
                    self.fail_bell()?;
                    return Ok(None);
                }
                let next = match self.search.index {
                    Some(0) => None,
                    Some(i) => self.history.search_backwards(&self.search.term, i - 1, false),
                    None => self.history.search_backwards(&self.search.term, usize::MAX, false),
                };
                match next {
                    Some(i) => self.search.index = Some(i),
                    None => self.fail_bell()?,
                }
                self.draw_search_status()?;
                Ok(None)
            }
            Abort => {
                self.exit_search(false)?;
                Ok(None)
            }
            _ => {
                self.exit_search(true)?;
                Ok(Some(op))
            }
        }
    }

    fn research_from_end(&mut self) -> io::Result<()> {
        if self.search.term.is_empty() {
            self.search.index = None;
        } else {
            let found = self
                .history
                .search_backwards(&self.search.term, usize::MAX, false);
            if found.is_none() {
                self.fail_bell()?;
            }
            self.search.index = found;
        }
        self.draw_search_status()
    }

    fn draw_search_status(&mut self) -> io::Result<()> {
        let matched = match self.search.index {
            Some(i) => self.history.get(i).unwrap_or("").to_owned(),
            None => String::new(),
        };
        let label = format!("(reverse-i-search)`{}': ", self.search.term);
        self.reset_prompt_line(&label, &matched, None)
    }

    /// Leave SEARCH state, installing the match (or restoring the original
    /// buffer when `install` is false or nothing matched).
    fn exit_search(&mut self, install: bool) -> io::Result<()> {
        self.state = State::Normal;
        let prompt = self.original_prompt.clone();
        let installed = install && self.search.index.is_some();
        if installed {
            if let Some(i) = self.search.index {
                self.history.move_to(i);
            }
            let text = self.history.current().to_owned();
            self.search.finish();
            self.reset_prompt_line(&prompt, &text, None)
        } else {
            self.search.finish();
            let text = self.search_backup.clone();
            let cursor = self.search_backup_cursor;
            self.reset_prompt_line(&prompt, &text, Some(cursor))
        }
    }

    fn fail_bell(&mut self) -> io::Result<()> {
        if self.config.bell_enabled {
            self.renderer.bell()?;
        }
        Ok(())
    }

    // ── Vi search sub-loop ────────────────────────────────────────────────────

    fn vi_search(&mut self, dir: char) -> io::Result<Flow> {
        let forward = dir == '/';
        let saved = self.buf.clone();
        let original_prompt = self.original_prompt.clone();
        self.reset_prompt_line(&dir.to_string(), "", None)?;
        self.renderer.flush()?;

        let ended = loop {
            let Some(ch) = self.decoder.read_character() else {
                break SearchEnd::Abort;
            };
            match ch {
                '\r' | '\n' => break SearchEnd::Complete,
                ESC => break SearchEnd::Abort,
                '\x08' | '\x7f' => {
                    if self.buf.is_empty() {
                        break SearchEnd::Abort;
                    }
                    self.backspace(1)?;
                    self.renderer.flush()?;
                }
                _ => {
                    self.put_string(&ch.to_string())?;
                    self.renderer.flush()?;
                }
            }
        };

        let term = self.buf.text();
        if matches!(ended, SearchEnd::Abort) || term.is_empty() {
            self.restore_line(&original_prompt, &saved)?;
            return Ok(Flow::Done);
        }

        let found = if forward {
            self.history.search_forwards(&term, 0)
        } else {
            match self.history.size() {
                0 => None,
                size => self.history.search_backwards(&term, size - 1, false),
            }
        };
        let Some(mut idx) = found else {
            self.restore_line(&original_prompt, &saved)?;
            return Ok(Flow::Failed);
        };

        self.history.move_to(idx);
        let entry = self.history.current().to_owned();
        self.reset_prompt_line(&original_prompt, &entry, None)?;
        self.renderer.flush()?;

        // Post-loop: n repeats the search, N reverses it, anything else
        // returns to the main loop through the pushback stack.
        loop {
            let Some(ch) = self.decoder.read_character() else {
                break;
            };
            let again_forward = match ch {
                'n' => forward,
                'N' => !forward,
                _ => {
                    self.pushback.push(ch);
                    break;
                }
            };
            let next = if again_forward {
                self.history.search_forwards(&term, idx + 1)
            } else if idx == 0 {
                None
            } else {
                self.history.search_backwards(&term, idx - 1, false)
            };
            match next {
                Some(i) => {
                    idx = i;
                    self.history.move_to(i);
                    let entry = self.history.current().to_owned();
                    self.reset_prompt_line(&original_prompt, &entry, None)?;
                    self.renderer.flush()?;
                }
                None => self.fail_bell()?,
            }
        }
        Ok(Flow::Done)
    }

    fn restore_line(&mut self, prompt: &str, saved: &CursorBuffer) -> io::Result<()> {
        self.reset_prompt_line(prompt, &saved.text(), Some(saved.cursor))?;
        self.buf.overtype = saved.overtype;
        Ok(())
    }

    /// Erase the current display line, install a new prompt and buffer
    /// content, and place the cursor (`None` leaves it at the end).
    fn reset_prompt_line(
        &mut self,
        prompt: &str,
        text: &str,
        cursor: Option<usize>,
    ) -> io::Result<()> {
        self.renderer.clear_edit_line(self.buf.chars(), self.buf.cursor)?;
        self.renderer.set_prompt(prompt);
        self.renderer.draw_prompt()?;
        self.buf.clear();
        self.buf.write(text);
        self.renderer.emit_chars(self.buf.chars(), 0)?;
        if let Some(dest) = cursor {
            let dest = dest.min(self.buf.len());
            let back = self.buf.len() - dest;
            self.renderer.back(self.buf.chars(), dest, back)?;
            self.buf.cursor = dest;
        }
        self.renderer.flush()
    }

    // ── Completion ────────────────────────────────────────────────────────────

    fn complete_op(&mut self) -> io::Result<bool> {
        let line = self.buf.text();
        let cursor = self.buf.cursor;
        let mut candidates = Vec::new();
        let mut position = -1isize;
        for completer in &self.completers {
            candidates.clear();
            let pos = completer.complete(&line, cursor, &mut candidates);
            if pos >= 0 {
                position = pos;
                break;
            }
        }
        if position < 0 || candidates.is_empty() {
            return Ok(false);
        }
        let handler = Arc::clone(&self.completion_handler);
        handler.handle(self, &candidates, position as usize)?;
        Ok(true)
    }

    fn possible_completions(&mut self) -> io::Result<bool> {
        let line = self.buf.text();
        let cursor = self.buf.cursor;
        let mut candidates = Vec::new();
        let mut found = false;
        for completer in &self.completers {
            candidates.clear();
            if completer.complete(&line, cursor, &mut candidates) >= 0 {
                found = true;
                break;
            }
        }
        if !found || candidates.is_empty() {
            return Ok(false);
        }
        let mut distinct: Vec<&str> = candidates.iter().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();
        self.renderer.newline()?;
        self.print_columns(&distinct)?;
        self.redraw_line()?;
        Ok(true)
    }

    /// Replace the word from `position` to the cursor with `value`.
    pub fn install_completion(&mut self, position: usize, value: &str) -> io::Result<()> {
        let back = self.buf.cursor.saturating_sub(position);
        self.backspace(back)?;
        self.put_string(value)?;
        self.renderer.flush()
    }

    /// Print candidates in padded columns, paginating when enabled.
    pub fn print_columns(&mut self, items: &[&str]) -> io::Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let width = self.renderer.caps().width.max(1);
        let height = self.renderer.caps().height.max(2);
        let col_width = items.iter().map(|s| s.chars().count()).max().unwrap_or(0) + 3;
        let columns = (width / col_width).max(1);
        let rows = items.len().div_ceil(columns);
        let mut line = String::new();
        for (row, chunk) in items.chunks(columns).enumerate() {
            line.clear();
            for item in chunk {
                line.push_str(item);
                for _ in item.chars().count()..col_width {
                    line.push(' ');
                }
            }
            self.renderer.print_text(line.trim_end())?;
            self.renderer.newline()?;
            let more = row + 1 < rows;
            if self.config.page_completions && more && (row + 1) % (height - 1) == 0 {
                self.renderer.print_text("--More--")?;
                self.renderer.flush()?;
                let ch = self.decoder.read_character();
                self.renderer.print_text("\r        \r")?;
                if ch == Some('q') || ch.is_none() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Print raw text to the output sink (messages, listings).
    pub fn print_text(&mut self, s: &str) -> io::Result<()> {
        self.renderer.print_text(s)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.renderer.flush()
    }

    /// Read one raw character from the decoder (confirmation prompts).
    pub fn read_character(&mut self) -> io::Result<Option<char>> {
        Ok(self.decoder.read_character())
    }

    /// Repaint the prompt and buffer at the current cursor position.
    pub fn redraw_line(&mut self) -> io::Result<()> {
        self.renderer.draw_prompt()?;
        self.renderer.emit_chars(self.buf.chars(), 0)?;
        let back = self.buf.len() - self.buf.cursor;
        self.renderer.back(self.buf.chars(), self.buf.cursor, back)?;
        self.renderer.flush()
    }

    // ── Buffer + display primitives ───────────────────────────────────────────

    /// Write `s` into the buffer and paint it, honoring overtype and the
    /// mid-line tail repaint.
    fn put_string(&mut self, s: &str) -> io::Result<()> {
        if s.is_empty() {
            return Ok(());
        }
        let start = self.buf.cursor;
        let was_overtype = self.buf.overtype;
        self.buf.write(s);
        let cursor = self.buf.cursor;
        let len = self.buf.len();
        if cursor == len {
            self.renderer.emit_chars(&self.buf.chars()[start..], start)?;
        } else if was_overtype {
            self.renderer.emit_chars(&self.buf.chars()[start..cursor], start)?;
        } else {
            self.renderer.emit_chars(&self.buf.chars()[start..], start)?;
            self.renderer.back(self.buf.chars(), cursor, len - cursor)?;
        }
        Ok(())
    }

    /// Delete up to `num` characters before the cursor, repainting the tail.
    /// Returns how many were deleted.
    fn backspace(&mut self, num: usize) -> io::Result<usize> {
        if self.buf.cursor == 0 || num == 0 {
            return Ok(0);
        }
        let count = num.min(self.buf.cursor);
        let new_cursor = self.buf.cursor - count;
        self.renderer.back(self.buf.chars(), new_cursor, count)?;
        self.buf.cursor = new_cursor;
        self.buf.delete_range(new_cursor, new_cursor + count);
        self.draw_buffer(count)?;
        Ok(count)
    }

    /// Repaint from the cursor to the end and erase `clear` stale columns.
    fn draw_buffer(&mut self, clear: usize) -> io::Result<()> {
        let cursor = self.buf.cursor;
        let tail_len = self.buf.len() - cursor;
        if tail_len == 0 && clear == 0 {
            return Ok(());
        }
        self.renderer.emit_chars(&self.buf.chars()[cursor..], cursor)?;
        self.renderer.clear_ahead(clear, cursor, tail_len)?;
        self.renderer.back(self.buf.chars(), cursor, tail_len)?;
        Ok(())
    }

    fn delete_current(&mut self) -> io::Result<bool> {
        if self.buf.cursor >= self.buf.len() {
            return Ok(false);
        }
        self.delete(1)?;
        Ok(true)
    }

    /// Remove one character at the cursor; the argument is ignored.
    fn delete(&mut self, _num: usize) -> io::Result<()> {
        let c = self.buf.cursor;
        self.buf.delete_range(c, c + 1);
        self.draw_buffer(1)
    }

    /// Move the buffer and visual cursor by up to `num`, clamped.
    /// Returns the signed distance actually moved.
    fn move_cursor(&mut self, num: i64) -> io::Result<i64> {
        let cursor = self.buf.cursor as i64;
        let len = self.buf.len() as i64;
        let target = (cursor + num).clamp(0, len);
        let delta = target - cursor;
        if delta < 0 {
            self.renderer
                .back(self.buf.chars(), target as usize, (-delta) as usize)?;
            self.buf.cursor = target as usize;
        } else if delta > 0 {
            let (a, b) = (cursor as usize, target as usize);
            self.renderer.emit_chars(&self.buf.chars()[a..b], a)?;
            self.buf.cursor = b;
        }
        Ok(delta)
    }

    fn set_cursor(&mut self, pos: usize) -> io::Result<()> {
        let pos = pos.min(self.buf.len()) as i64;
        self.move_cursor(pos - self.buf.cursor as i64)?;
        Ok(())
    }

    /// Replace the whole line by diffing against the shared prefix: back up
    /// over the difference, erase the stale tail, type the new suffix.
    /// Shorter replacements rely on the tail erase.
    fn set_buffer(&mut self, text: &str) -> io::Result<()> {
        if self.buf.text() == text {
            return Ok(());
        }
        let new_chars: Vec<char> = text.chars().collect();
        let same = self
            .buf
            .chars()
            .iter()
            .zip(new_chars.iter())
            .take_while(|(a, b)| a == b)
            .count();
        if self.buf.cursor < same {
            self.set_cursor(self.buf.len())?;
        }
        self.backspace(self.buf.cursor - same)?;
        let stale = self.buf.len() - self.buf.cursor;
        if stale > 0 {
            self.buf.truncate(self.buf.cursor);
            self.renderer.clear_ahead(stale, self.buf.cursor, 0)?;
        }
        let suffix: String = new_chars[same..].iter().collect();
        self.put_string(&suffix)
    }

    // ── Kill / yank ───────────────────────────────────────────────────────────

    fn kill_line(&mut self) -> io::Result<bool> {
        let c = self.buf.cursor;
        let killed = self.buf.truncate(c);
        let n = killed.chars().count();
        if n > 0 {
            self.kill_buffer = killed;
            self.renderer.clear_ahead(n, c, 0)?;
        }
        Ok(true)
    }

    fn kill_whole_line(&mut self) -> io::Result<bool> {
        self.set_cursor(0)?;
        let killed = self.buf.truncate(0);
        let n = killed.chars().count();
        if n > 0 {
            self.kill_buffer = killed;
            self.renderer.clear_ahead(n, 0, 0)?;
        }
        Ok(true)
    }

    fn unix_line_discard(&mut self) -> io::Result<bool> {
        let c = self.buf.cursor;
        if c == 0 {
            return Ok(false);
        }
        self.kill_buffer = self.buf.chars()[..c].iter().collect();
        self.backspace(c)?;
        Ok(true)
    }

    /// Delete backward over one separator run and then one word, where
    /// `separator` decides the word boundary.  Covers both the whitespace
    /// and the delimiter flavor.
    fn rubout_word(&mut self, separator: fn(char) -> bool) -> io::Result<bool> {
        let cursor = self.buf.cursor;
        if cursor == 0 {
            return Ok(false);
        }
        let pos = {
            let chars = self.buf.chars();
            let mut pos = cursor;
            while pos > 0 && separator(chars[pos - 1]) {
                pos -= 1;
            }
            while pos > 0 && !separator(chars[pos - 1]) {
                pos -= 1;
            }
            pos
        };
        self.kill_buffer = self.buf.chars()[pos..cursor].iter().collect();
        self.backspace(cursor - pos)?;
        Ok(true)
    }

    fn kill_word(&mut self) -> io::Result<bool> {
        let cursor = self.buf.cursor;
        let end = {
            let chars = self.buf.chars();
            let len = chars.len();
            let mut pos = cursor;
            while pos < len && is_delimiter(chars[pos]) {
                pos += 1;
            }
            while pos < len && !is_delimiter(chars[pos]) {
                pos += 1;
            }
            pos
        };
        if end == cursor {
            return Ok(false);
        }
        let killed = self.buf.delete_range(cursor, end);
        self.kill_buffer = killed;
        self.draw_buffer(end - cursor)?;
        Ok(true)
    }

    fn yank(&mut self) -> io::Result<bool> {
        if self.kill_buffer.is_empty() {
            return Ok(false);
        }
        let text = self.kill_buffer.clone();
        self.put_string(&text)?;
        Ok(true)
    }

    // ── Word motion ───────────────────────────────────────────────────────────

    fn backward_word(&mut self) -> io::Result<bool> {
        if self.buf.cursor == 0 {
            return Ok(false);
        }
        let pos = {
            let chars = self.buf.chars();
            let mut pos = self.buf.cursor;
            while pos > 0 && is_delimiter(chars[pos - 1]) {
                pos -= 1;
            }
            while pos > 0 && !is_delimiter(chars[pos - 1]) {
                pos -= 1;
            }
            pos
        };
        self.set_cursor(pos)?;
        Ok(true)
    }

    fn forward_word(&mut self) -> io::Result<bool> {
        if self.buf.cursor == self.buf.len() {
            return Ok(false);
        }
        let pos = {
            let chars = self.buf.chars();
            let len = chars.len();
            let mut pos = self.buf.cursor;
            while pos < len && is_delimiter(chars[pos]) {
                pos += 1;
            }
            while pos < len && !is_delimiter(chars[pos]) {
                pos += 1;
            }
            pos
        };
        self.set_cursor(pos)?;
        Ok(true)
    }

    fn vi_prev_word(&mut self, count: usize) -> io::Result<bool> {
        if self.buf.cursor == 0 {
            return Ok(false);
        }
        let pos = {
            let chars = self.buf.chars();
            let mut pos = self.buf.cursor;
            for _ in 0..count {
                if pos == 0 {
                    break;
                }
                while pos > 0 && chars[pos - 1].is_whitespace() {
                    pos -= 1;
                }
                while pos > 0 && !chars[pos - 1].is_whitespace() {
                    pos -= 1;
                }
            }
            pos
        };
        self.set_cursor(pos)?;
        Ok(true)
    }

    fn vi_next_word(&mut self, count: usize) -> io::Result<bool> {
        if self.buf.cursor == self.buf.len() {
            return Ok(false);
        }
        let pos = {
            let chars = self.buf.chars();
            let len = chars.len();
            let mut pos = self.buf.cursor;
            for _ in 0..count {
                if pos == len {
                    break;
                }
                while pos < len && !chars[pos].is_whitespace() {
                    pos += 1;
                }
                while pos < len && chars[pos].is_whitespace() {
                    pos += 1;
                }
            }
            pos
        };
        self.set_cursor(pos)?;
        Ok(true)
    }

    fn vi_end_word(&mut self, count: usize) -> io::Result<bool> {
        let len = self.buf.len();
        if self.buf.cursor == len {
            return Ok(false);
        }
        let pos = {
            let chars = self.buf.chars();
            let mut pos = self.buf.cursor;
            for _ in 0..count {
                if pos + 1 >= len {
                    break;
                }
                pos += 1;
                while pos < len && chars[pos].is_whitespace() {
                    pos += 1;
                }
                while pos + 1 < len && !chars[pos + 1].is_whitespace() {
                    pos += 1;
                }
            }
            pos.min(len - 1)
        };
        self.set_cursor(pos)?;
        Ok(true)
    }

    // ── Case, transpose, brackets ─────────────────────────────────────────────

    fn case_word(&mut self, mode: CaseMode) -> io::Result<bool> {
        let len = self.buf.len();
        let start = self.buf.cursor;
        if start >= len {
            return Ok(false);
        }
        let mut i = start;
        while i < len && is_delimiter(self.buf.char_at(i).unwrap_or(' ')) {
            i += 1;
        }
        let mut first = true;
        while i < len {
            let Some(ch) = self.buf.char_at(i) else { break };
            if is_delimiter(ch) {
                break;
            }
            let new = match mode {
                CaseMode::Capitalize => {
                    if first {
                        upcase(ch)
                    } else {
                        downcase(ch)
                    }
                }
                CaseMode::Upper => upcase(ch),
                CaseMode::Lower => downcase(ch),
            };
            first = false;
            self.buf.set_char_at(i, new);
            i += 1;
        }
        self.renderer
            .emit_chars(&self.buf.chars()[start..i], start)?;
        self.buf.cursor = i;
        Ok(true)
    }

    fn transpose_chars(&mut self, count: usize) -> io::Result<bool> {
        for _ in 0..count {
            if self.buf.cursor == 0 || self.buf.len() < 2 {
                return Ok(false);
            }
            if self.buf.cursor == self.buf.len() {
                self.move_cursor(-1)?;
            }
            let c = self.buf.cursor;
            let (Some(a), Some(b)) = (self.buf.char_at(c - 1), self.buf.char_at(c)) else {
                return Ok(false);
            };
            self.buf.set_char_at(c - 1, b);
            self.buf.set_char_at(c, a);
            self.move_cursor(-1)?;
            self.renderer
                .emit_chars(&self.buf.chars()[c - 1..=c], c - 1)?;
            self.buf.cursor = c + 1;
        }
        Ok(true)
    }

    fn vi_change_case(&mut self, count: usize) -> io::Result<bool> {
        if self.buf.cursor >= self.buf.len() {
            return Ok(false);
        }
        for _ in 0..count {
            let i = self.buf.cursor;
            let Some(ch) = self.buf.char_at(i) else { break };
            let flipped = if ch.is_uppercase() {
                downcase(ch)
            } else if ch.is_lowercase() {
                upcase(ch)
            } else {
                ch
            };
            self.buf.set_char_at(i, flipped);
            self.renderer.emit_chars(&[flipped], i)?;
            self.buf.cursor = i + 1;
        }
        Ok(true)
    }

    /// Jump to the bracket matching the one under the cursor.
    fn vi_match(&mut self) -> io::Result<bool> {
        let pos = self.buf.cursor;
        let dest = {
            let chars = self.buf.chars();
            let Some(&ch) = chars.get(pos) else {
                return Ok(false);
            };
            let kind = bracket_type(ch);
            if kind == 0 {
                return Ok(false);
            }
            let dir: i64 = if kind > 0 { 1 } else { -1 };
            let mut depth = 1i32;
            let mut i = pos as i64;
            loop {
                i += dir;
                if i < 0 || i as usize >= chars.len() {
                    return Ok(false);
                }
                let t = bracket_type(chars[i as usize]);
                if t == kind {
                    depth += 1;
                } else if t == -kind {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
            }
            i as usize
        };
        self.set_cursor(dest)?;
        Ok(true)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum CaseMode {
    Capitalize,
    Upper,
    Lower,
}

/// Word delimiter for the Emacs-flavored motions.
fn is_delimiter(ch: char) -> bool {
    !ch.is_alphanumeric()
}

fn upcase(ch: char) -> char {
    ch.to_uppercase().next().unwrap_or(ch)
}

fn downcase(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

/// Bracket class: openers positive, closers negative, pairs share a
/// magnitude.
fn bracket_type(ch: char) -> i32 {
    match ch {
        '[' => 1,
        ']' => -1,
        '{' => 2,
        '}' => -2,
        '(' => 3,
        ')' => -3,
        _ => 0,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complete::StringsCompleter;
    use std::io::Cursor;

    fn editor(input: &[u8]) -> Editor {
        Editor::new(
            Box::new(Cursor::new(input.to_vec())),
            Box::new(io::sink()),
            TermCaps::ansi(80),
            EditorConfig::default(),
        )
    }

    fn editor_with_history(input: &[u8], entries: &[&str]) -> Editor {
        let mut ed = editor(input);
        for &e in entries {
            ed.history_mut().add(e);
        }
        ed
    }

    fn read(ed: &mut Editor) -> Option<String> {
        ed.read_line("").unwrap()
    }

    // ── Basic editing ─────────────────────────────────────────────────────────

    #[test]
    fn types_and_accepts() {
        let mut ed = editor(b"hello\r");
        assert_eq!(read(&mut ed), Some("hello".into()));
    }

    #[test]
    fn eof_returns_none() {
        let mut ed = editor(b"");
        assert_eq!(read(&mut ed), None);
    }

    #[test]
    fn eof_mid_line_returns_none() {
        let mut ed = editor(b"abc");
        assert_eq!(read(&mut ed), None);
    }

    #[test]
    fn backspace_removes_char() {
        let mut ed = editor(b"abc\x7f\r");
        assert_eq!(read(&mut ed), Some("ab".into()));
    }

    #[test]
    fn delete_char_at_cursor() {
        // ^A then ^D deletes the first character.
        let mut ed = editor(b"abc\x01\x04\r");
        assert_eq!(read(&mut ed), Some("bc".into()));
    }

    #[test]
    fn insert_at_line_start() {
        let mut ed = editor(b"abc\x01d\r");
        assert_eq!(read(&mut ed), Some("dabc".into()));
    }

    #[test]
    fn overwrite_mode_toggles() {
        // Insert "ab", go home, toggle overwrite, type "X".
        let mut ed = editor(b"ab\x01\x1b[2~X\r");
        assert_eq!(read(&mut ed), Some("Xb".into()));
    }

    #[test]
    fn kill_line_and_yank() {
        // "one two", ^A, ^K kills all, ^Y ^Y yanks twice.
        let mut ed = editor(b"one\x01\x0b\x19\x19\r");
        assert_eq!(read(&mut ed), Some("oneone".into()));
    }

    #[test]
    fn unix_line_discard_kills_to_start() {
        let mut ed = editor(b"one two\x15done\r");
        assert_eq!(read(&mut ed), Some("done".into()));
    }

    #[test]
    fn unix_word_rubout_uses_whitespace_rule() {
        let mut ed = editor(b"foo bar.baz \x17\r");
        assert_eq!(read(&mut ed), Some("foo ".into()));
    }

    #[test]
    fn backward_kill_word_uses_delimiter_rule() {
        let mut ed = editor(b"foo bar.baz\x1b\x7f\r");
        assert_eq!(read(&mut ed), Some("foo bar.".into()));
    }

    #[test]
    fn kill_word_forward() {
        // ^A then M-d kills "foo".
        let mut ed = editor(b"foo bar\x01\x1bd\r");
        assert_eq!(read(&mut ed), Some(" bar".into()));
    }

    #[test]
    fn kill_whole_line_empties_buffer() {
        let mut ed = editor(b"junk\x0fok\r");
        ed.keymaps_mut()
            .emacs
            .bind("\x0f", Binding::Op(Operation::KillWholeLine));
        assert_eq!(read(&mut ed), Some("ok".into()));
    }

    #[test]
    fn transpose_at_end_swaps_last_two() {
        let mut ed = editor(b"abc\x14\r");
        assert_eq!(read(&mut ed), Some("acb".into()));
    }

    #[test]
    fn transpose_mid_line() {
        // "abcd", left twice -> cursor between b and c; ^T swaps b,c.
        let mut ed = editor(b"abcd\x02\x02\x14\r");
        assert_eq!(read(&mut ed), Some("acbd".into()));
    }

    #[test]
    fn word_motions_and_case() {
        // M-b back over "bar", M-c capitalizes it.
        let mut ed = editor(b"foo bar\x1bb\x1bc\r");
        assert_eq!(read(&mut ed), Some("foo Bar".into()));
    }

    #[test]
    fn upcase_and_downcase_word() {
        let mut ed = editor(b"foo\x01\x1bu\r");
        assert_eq!(read(&mut ed), Some("FOO".into()));
        let mut ed = editor(b"BAR\x01\x1bl\r");
        assert_eq!(read(&mut ed), Some("bar".into()));
    }

    #[test]
    fn meta_uppercase_resolves_through_lowercase_version() {
        // M-B is bound to do-lowercase-version, landing on backward-word.
        let mut ed = editor(b"foo bar\x1bB\x1bu\r");
        assert_eq!(read(&mut ed), Some("foo BAR".into()));
    }

    #[test]
    fn tab_inserts_literal_tab_via_meta_tab() {
        let mut ed = editor(b"a\x1b\tb\r");
        assert_eq!(read(&mut ed), Some("a\tb".into()));
    }

    // ── History ───────────────────────────────────────────────────────────────

    #[test]
    fn accepted_lines_enter_history() {
        let mut ed = editor(b"hello\r");
        read(&mut ed);
        assert_eq!(ed.history().size(), 1);
        assert_eq!(ed.history().get(0), Some("hello"));
    }

    #[test]
    fn previous_history_recalls() {
        let mut ed = editor_with_history(b"\x10\r", &["one", "two"]);
        assert_eq!(read(&mut ed), Some("two".into()));
    }

    #[test]
    fn up_arrow_recalls() {
        let mut ed = editor_with_history(b"\x1b[A\r", &["one"]);
        assert_eq!(read(&mut ed), Some("one".into()));
    }

    #[test]
    fn down_past_newest_fails_quietly() {
        let mut ed = editor_with_history(b"\x0e\r", &["one"]);
        assert_eq!(read(&mut ed), Some("".into()));
    }

    #[test]
    fn beginning_and_end_of_history() {
        let mut ed = editor_with_history(b"\x1b<\r", &["first", "second", "third"]);
        assert_eq!(read(&mut ed), Some("first".into()));
        let mut ed = editor_with_history(b"\x1b<\x1b>\r", &["first", "second", "third"]);
        assert_eq!(read(&mut ed), Some("third".into()));
    }

    #[test]
    fn history_replaces_edited_line() {
        let mut ed = editor_with_history(b"abc\x10\r", &["old"]);
        assert_eq!(read(&mut ed), Some("old".into()));
    }

    // ── Reverse search ────────────────────────────────────────────────────────

    #[test]
    fn reverse_search_finds_latest_match() {
        let mut ed = editor_with_history(b"\x12foo\r", &["foo", "bar", "food"]);
        assert_eq!(read(&mut ed), Some("food".into()));
    }

    #[test]
    fn reverse_search_abort_restores_line() {
        let mut ed = editor_with_history(b"keep\x12ba\x07\r", &["x", "bar"]);
        assert_eq!(read(&mut ed), Some("keep".into()));
    }

    #[test]
    fn reverse_search_advances_to_older_match() {
        // Entry 0 is unreachable for backward search; go1 sits there.
        let mut ed =
            editor_with_history(b"\x12go\x12\r", &["go1", "go2", "go3", "zzz"]);
        assert_eq!(read(&mut ed), Some("go2".into()));
    }

    #[test]
    fn reverse_search_backspace_shortens_term() {
        let mut ed = editor_with_history(b"\x12fox\x7f\r", &["x", "food"]);
        assert_eq!(read(&mut ed), Some("food".into()));
    }

    #[test]
    fn reverse_search_exit_key_redispatches() {
        // ^A after a match exits search and moves to line start; "X" lands
        // at column 0.
        let mut ed = editor_with_history(b"\x12oo\x01X\r", &["z", "foo"]);
        assert_eq!(read(&mut ed), Some("Xfoo".into()));
    }

    // ── Macros ────────────────────────────────────────────────────────────────

    #[test]
    fn macro_records_and_replays() {
        let mut ed = editor(b"\x18(ab\x18)\x18e\r");
        assert_eq!(read(&mut ed), Some("abab".into()));
    }

    #[test]
    fn macro_stop_key_is_trimmed() {
        let mut ed = editor(b"\x18(x\x18)\x18e\x18e\r");
        assert_eq!(read(&mut ed), Some("xxx".into()));
    }

    #[test]
    fn call_macro_without_recording_fails() {
        let mut ed = editor(b"\x18eok\r");
        assert_eq!(read(&mut ed), Some("ok".into()));
    }

    // ── Keymap bindings ───────────────────────────────────────────────────────

    #[test]
    fn macro_string_binding_replays_keys() {
        let mut ed = editor(b"\x1dy\r");
        ed.keymaps_mut()
            .emacs
            .bind("\x1d", Binding::Macro("abc".into()));
        assert_eq!(read(&mut ed), Some("abcy".into()));
    }

    #[test]
    fn callback_binding_runs() {
        let mut ed = editor(b"\x1d\r");
        ed.keymaps_mut().emacs.bind(
            "\x1d",
            Binding::Callback(Arc::new(|buf: &mut CursorBuffer| {
                buf.write("cb");
            })),
        );
        assert_eq!(read(&mut ed), Some("cb".into()));
    }

    #[test]
    fn unbound_escape_sequence_backs_off() {
        // ESC [ Z has no binding; ESC resolves to nothing and the tail
        // keys replay through the pushback stack as ordinary input.
        let mut ed = editor(b"\x1b[Zok\r");
        assert_eq!(read(&mut ed), Some("[Zok".into()));
    }

    #[test]
    fn unbound_keys_in_vi_move_are_discarded() {
        let mut ed = vi_editor(b"qqiok\x1b\r");
        assert_eq!(read(&mut ed), Some("ok".into()));
    }

    // ── Vi mode ───────────────────────────────────────────────────────────────

    fn vi_editor(input: &[u8]) -> Editor {
        let mut ed = editor(input);
        ed.set_keymap(KeymapName::ViMove);
        ed
    }

    #[test]
    fn vi_insert_then_delete_all() {
        let mut ed = vi_editor(b"ihi\x1b0xx\r");
        assert_eq!(read(&mut ed), Some("".into()));
    }

    #[test]
    fn vi_append_at_eol() {
        let mut ed = vi_editor(b"iab\x1b0A!\r");
        assert_eq!(read(&mut ed), Some("ab!".into()));
    }

    #[test]
    fn vi_insert_beg() {
        let mut ed = vi_editor(b"iab\x1bIX\r");
        assert_eq!(read(&mut ed), Some("Xab".into()));
    }

    #[test]
    fn vi_change_case_advances() {
        let mut ed = vi_editor(b"iaB\x1b0~~\r");
        assert_eq!(read(&mut ed), Some("Ab".into()));
    }

    #[test]
    fn vi_repeat_count_applies_to_motion() {
        // "abcdef", back to start, 3l right three, x deletes 'd'.
        let mut ed = vi_editor(b"iabcdef\x1b03lx\r");
        assert_eq!(read(&mut ed), Some("abcef".into()));
    }

    #[test]
    fn vi_delete_ignores_repeat_count() {
        // 2x still deletes a single character.
        let mut ed = vi_editor(b"iabc\x1b02x\r");
        assert_eq!(read(&mut ed), Some("bc".into()));
    }

    #[test]
    fn vi_zero_is_motion_without_count() {
        let mut ed = vi_editor(b"iabc\x1b0iX\r");
        assert_eq!(read(&mut ed), Some("Xabc".into()));
    }

    #[test]
    fn vi_words_use_whitespace_rule() {
        // b over "c.d" (one vi word), then insert.
        let mut ed = vi_editor(b"iab c.d\x1bbiX\r");
        assert_eq!(read(&mut ed), Some("ab Xc.d".into()));
    }

    #[test]
    fn vi_end_word_lands_on_last_char() {
        let mut ed = vi_editor(b"ifoo bar\x1b0exY\r");
        assert_eq!(read(&mut ed), Some("fo bar".into()));
    }

    #[test]
    fn vi_match_jumps_to_mate() {
        // On '(', % jumps to ')', x deletes it.
        let mut ed = vi_editor(b"i(ab)\x1b0%x\r");
        assert_eq!(read(&mut ed), Some("(ab".into()));
    }

    #[test]
    fn vi_match_twice_returns_to_start() {
        let mut ed = vi_editor(b"i(ab)\x1b0%%x\r");
        assert_eq!(read(&mut ed), Some("ab)".into()));
    }

    #[test]
    fn vi_match_on_non_bracket_fails() {
        let mut ed = vi_editor(b"iab\x1b0%x\r");
        assert_eq!(read(&mut ed), Some("b".into()));
    }

    #[test]
    fn vi_eof_on_empty_buffer() {
        let mut ed = vi_editor(b"\x04");
        assert_eq!(read(&mut ed), None);
    }

    #[test]
    fn vi_eof_with_text_accepts() {
        let mut ed = vi_editor(b"iok\x1b\x04");
        assert_eq!(read(&mut ed), Some("ok".into()));
    }

    #[test]
    fn vi_history_recall_places_cursor_at_start() {
        // k recalls "old", X types at column 0 after insert.
        let mut ed = vi_editor(b"kiX\r");
        ed.history_mut().add("old");
        assert_eq!(read(&mut ed), Some("Xold".into()));
    }

    #[test]
    fn vi_search_forward_finds_oldest() {
        let mut ed = vi_editor(b"/oo\r\r");
        ed.history_mut().add("foo");
        ed.history_mut().add("bar");
        ed.history_mut().add("food");
        assert_eq!(read(&mut ed), Some("foo".into()));
    }

    #[test]
    fn vi_search_backward_finds_newest() {
        let mut ed = vi_editor(b"?oo\r\r");
        ed.history_mut().add("foo");
        ed.history_mut().add("bar");
        ed.history_mut().add("food");
        assert_eq!(read(&mut ed), Some("food".into()));
    }

    #[test]
    fn vi_search_n_moves_to_next_match() {
        let mut ed = vi_editor(b"/go\rn\r");
        for e in ["go1", "xx", "go2"] {
            ed.history_mut().add(e);
        }
        assert_eq!(read(&mut ed), Some("go2".into()));
    }

    #[test]
    fn vi_search_escape_restores() {
        let mut ed = vi_editor(b"ikeep\x1b/zz\x1bA!\r");
        ed.history_mut().add("zzz");
        assert_eq!(read(&mut ed), Some("keep!".into()));
    }

    #[test]
    fn vi_search_no_match_restores() {
        let mut ed = vi_editor(b"ikeep\x1b/nope\r\r");
        ed.history_mut().add("other");
        assert_eq!(read(&mut ed), Some("keep".into()));
    }

    // ── Comments ──────────────────────────────────────────────────────────────

    #[test]
    fn insert_comment_prepends_and_accepts() {
        let mut ed = editor(b"note\x1b#");
        assert_eq!(read(&mut ed), Some("#note".into()));
    }

    #[test]
    fn insert_comment_uses_configured_prefix() {
        let mut ed = editor(b"note\x1b#");
        ed.config_mut().comment_begin = Some("//".into());
        assert_eq!(read(&mut ed), Some("//note".into()));
    }

    #[test]
    fn vi_insert_comment_accepts_and_switches_mode() {
        let mut ed = vi_editor(b"inote\x1b#");
        assert_eq!(read(&mut ed), Some("#note".into()));
        assert_eq!(ed.keymap_name(), KeymapName::ViInsert);
    }

    // ── Expansion on accept ───────────────────────────────────────────────────

    #[test]
    fn bang_bang_expands_on_accept() {
        let mut ed = editor(b"foo\rbar\r!!\r");
        assert_eq!(read(&mut ed), Some("foo".into()));
        assert_eq!(read(&mut ed), Some("bar".into()));
        assert_eq!(read(&mut ed), Some("bar".into()));
    }

    #[test]
    fn failed_expansion_keeps_editing() {
        // "!9" fails; the buffer survives, so two backspaces clear it.
        let mut ed = editor(b"!9\r\x7f\x7fok\r");
        assert_eq!(read(&mut ed), Some("ok".into()));
    }

    #[test]
    fn expansion_can_be_disabled() {
        let mut ed = editor(b"x\r!!\r");
        ed.config_mut().expand_events = false;
        assert_eq!(read(&mut ed), Some("x".into()));
        assert_eq!(read(&mut ed), Some("!!".into()));
    }

    // ── Masking ───────────────────────────────────────────────────────────────

    #[test]
    fn masked_line_returns_text_but_skips_history() {
        let mut ed = editor(b"secret\r");
        let line = ed.read_line_masked("pw: ", Some('*')).unwrap();
        assert_eq!(line, Some("secret".into()));
        assert_eq!(ed.history().size(), 0);
    }

    #[test]
    fn null_mask_records_input() {
        let mut ed = editor(b"hidden\r");
        let line = ed.read_line_masked("pw: ", Some('\0')).unwrap();
        assert_eq!(line, Some("hidden".into()));
    }

    // ── Completion ────────────────────────────────────────────────────────────

    #[test]
    fn single_candidate_installs() {
        let mut ed = editor(b"fo\t\r");
        ed.add_completer(Arc::new(StringsCompleter::new(["foobar"])));
        assert_eq!(read(&mut ed), Some("foobar".into()));
    }

    #[test]
    fn common_prefix_extends() {
        let mut ed = editor(b"f\t\r");
        ed.add_completer(Arc::new(StringsCompleter::new(["foobar", "foobaz"])));
        assert_eq!(read(&mut ed), Some("fooba".into()));
    }

    #[test]
    fn completion_without_candidates_fails_quietly() {
        let mut ed = editor(b"zz\t\r");
        ed.add_completer(Arc::new(StringsCompleter::new(["foo"])));
        assert_eq!(read(&mut ed), Some("zz".into()));
    }

    #[test]
    fn first_nonnegative_completer_wins() {
        let mut ed = editor(b"a\t\r");
        ed.add_completer(Arc::new(StringsCompleter::new(["zebra"])));
        ed.add_completer(Arc::new(StringsCompleter::new(["apple"])));
        assert_eq!(read(&mut ed), Some("apple".into()));
    }

    // ── Paste ─────────────────────────────────────────────────────────────────

    #[test]
    fn paste_inserts_at_cursor() {
        let mut ed = editor(b"\r");
        ed.paste("clip").unwrap();
        assert_eq!(read(&mut ed), Some("clip".into()));
    }

    // ── Init source ───────────────────────────────────────────────────────────

    struct TestSource;

    impl InitSource for TestSource {
        fn apply(
            &self,
            keymaps: &mut Keymaps,
            _config: &mut EditorConfig,
        ) -> io::Result<()> {
            keymaps
                .emacs
                .bind("\x1d", Binding::Macro("bound".into()));
            Ok(())
        }

        fn variable(&self, name: &str) -> Option<String> {
            (name == "comment-begin").then(|| ";;".to_owned())
        }
    }

    #[test]
    fn reread_init_file_applies_bindings() {
        // ^X^R re-reads, then the new ^] macro fires.
        let mut ed = editor(b"\x18\x12\x1d\r");
        ed.set_init_source(Arc::new(TestSource));
        assert_eq!(read(&mut ed), Some("bound".into()));
    }

    #[test]
    fn comment_prefix_falls_back_to_init_variable() {
        let mut ed = editor(b"note\x1b#");
        ed.set_init_source(Arc::new(TestSource));
        assert_eq!(read(&mut ed), Some(";;note".into()));
    }
}
