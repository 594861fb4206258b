//! End-to-end editor scenarios: raw byte scripts in, accepted lines out.
//!
//! Each test builds an editor over an in-memory byte source and a shared
//! sink, feeds it a keystroke script, and checks the returned line (and,
//! where it matters, the bytes written to the terminal).

use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use keyline::{Editor, EditorConfig, KeymapName, TermCaps};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Shared writer so terminal output stays inspectable after the editor
/// takes ownership of its clone.
#[derive(Clone, Default)]
struct Sink(Arc<Mutex<Vec<u8>>>);

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Sink {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// A byte source fed from a channel; `read` blocks between chunks, which
/// is what lets the escape-timeout tests stall the stream on purpose.
struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl ChannelReader {
    fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.pending.len());
        out[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

fn editor_over(bytes: &[u8], caps: TermCaps) -> (Editor, Sink) {
    let sink = Sink::default();
    let ed = Editor::new(
        Box::new(io::Cursor::new(bytes.to_vec())),
        Box::new(sink.clone()),
        caps,
        EditorConfig::default(),
    );
    (ed, sink)
}

fn editor(bytes: &[u8]) -> (Editor, Sink) {
    editor_over(bytes, TermCaps::ansi(80))
}

// ── Accepted-line scenarios ───────────────────────────────────────────────────

#[test]
fn plain_line_lands_in_history() {
    let (mut ed, _) = editor(b"hello\r");
    assert_eq!(ed.read_line("").unwrap(), Some("hello".into()));
    assert_eq!(ed.history().size(), 1);
    assert_eq!(ed.history().get(0), Some("hello"));
}

#[test]
fn ctrl_a_moves_insertion_point_home() {
    let (mut ed, _) = editor(b"abc\x01d\r");
    assert_eq!(ed.read_line("").unwrap(), Some("dabc".into()));
}

#[test]
fn bang_bang_replays_previous_line() {
    let (mut ed, _) = editor(b"foo\rbar\r!!\r");
    assert_eq!(ed.read_line("").unwrap(), Some("foo".into()));
    assert_eq!(ed.read_line("").unwrap(), Some("bar".into()));
    assert_eq!(ed.read_line("").unwrap(), Some("bar".into()));
}

#[test]
fn reverse_search_then_enter_accepts_match() {
    let (mut ed, _) = editor(b"\x12foo\x0d");
    for e in ["foo", "bar", "food"] {
        ed.history_mut().add(e);
    }
    assert_eq!(ed.read_line("").unwrap(), Some("food".into()));
}

#[test]
fn vi_mode_insert_escape_home_delete_twice() {
    let (mut ed, _) = editor(b"ihi\x1b0xx\r");
    ed.set_keymap(KeymapName::ViMove);
    assert_eq!(ed.read_line("").unwrap(), Some("".into()));
}

#[test]
fn transpose_at_line_end_swaps_final_pair() {
    let (mut ed, _) = editor(b"abc\x14\r");
    assert_eq!(ed.read_line("").unwrap(), Some("acb".into()));
}

// ── Escape disambiguation ─────────────────────────────────────────────────────

#[test]
fn escape_sequence_arriving_promptly_resolves_whole_binding() {
    let (mut ed, _) = editor(b"\x1b[A\r");
    ed.history_mut().add("one");
    assert_eq!(ed.read_line("").unwrap(), Some("one".into()));
}

#[test]
fn lone_escape_commits_another_key_after_timeout() {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let mut config = EditorConfig::default();
    config.escape_timeout = Duration::from_millis(60);
    let mut ed = Editor::new(
        Box::new(ChannelReader::new(rx)),
        Box::new(io::sink()),
        TermCaps::ansi(80),
        config,
    );
    ed.set_keymap(KeymapName::ViInsert);
    ed.history_mut().add("one");

    let feeder = thread::spawn(move || {
        tx.send(b"\x1b".to_vec()).unwrap();
        // Past the escape timeout: the lone ESC must commit on its own.
        thread::sleep(Duration::from_millis(400));
        tx.send(b"[Ahi\r".to_vec()).unwrap();
    });

    // ESC leaves insert mode; the late "[A" is then two loose vi-move keys
    // ("[" unbound, "A" append-at-eol), so the typed text is just "hi".
    // Had ESC[A resolved as one sequence, history recall would prepend "one".
    let line = ed.read_line("").unwrap();
    feeder.join().unwrap();
    assert_eq!(line, Some("hi".into()));
}

#[test]
fn escape_followed_quickly_keeps_sequence_intact() {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let mut config = EditorConfig::default();
    config.escape_timeout = Duration::from_millis(300);
    let mut ed = Editor::new(
        Box::new(ChannelReader::new(rx)),
        Box::new(io::sink()),
        TermCaps::ansi(80),
        config,
    );
    ed.set_keymap(KeymapName::ViInsert);
    ed.history_mut().add("one");

    let feeder = thread::spawn(move || {
        tx.send(b"\x1b".to_vec()).unwrap();
        thread::sleep(Duration::from_millis(20));
        tx.send(b"[A\r".to_vec()).unwrap();
    });

    let line = ed.read_line("").unwrap();
    feeder.join().unwrap();
    assert_eq!(line, Some("one".into()));
}

// ── Display output ────────────────────────────────────────────────────────────

#[test]
fn prompt_and_text_reach_the_terminal() {
    let (mut ed, sink) = editor(b"hi\r");
    ed.read_line("> ").unwrap();
    let out = sink.text();
    assert!(out.starts_with("> "));
    assert!(out.contains("hi"));
}

#[test]
fn moving_home_emits_a_backward_move() {
    let (mut ed, sink) = editor(b"hello\x01\r");
    ed.read_line("").unwrap();
    assert!(sink.text().contains("\x1b[5D"));
}

#[test]
fn backward_move_across_wrap_goes_up_a_row() {
    let (mut ed, sink) = editor_over(b"0123456789ab\x01\r", TermCaps::ansi(10));
    ed.read_line("> ").unwrap();
    let out = sink.text();
    assert!(out.contains("\x1b[1A"));
    assert!(out.contains("\x1b[3G"));
}

#[test]
fn dumb_terminal_moves_with_backspaces() {
    let (mut ed, sink) = editor_over(b"hello\x01\r", TermCaps::dumb(80));
    ed.read_line("").unwrap();
    assert!(sink.text().contains("\u{8}\u{8}\u{8}\u{8}\u{8}"));
}

#[test]
fn masked_input_echoes_the_mask() {
    let (mut ed, sink) = editor(b"ab\r");
    let line = ed.read_line_masked("pw: ", Some('*')).unwrap();
    assert_eq!(line, Some("ab".into()));
    let out = sink.text();
    assert!(out.contains("**"));
    assert!(!out.contains('a'));
}

#[test]
fn null_mask_shows_nothing_after_prompt() {
    let (mut ed, sink) = editor(b"secret\r");
    let line = ed.read_line_masked("pw: ", Some('\0')).unwrap();
    assert_eq!(line, Some("secret".into()));
    assert!(!sink.text().contains("secret"));
}

#[test]
fn expanded_line_is_echoed_before_returning() {
    let (mut ed, sink) = editor(b"ls -l\r!!\r");
    ed.read_line("").unwrap();
    ed.read_line("").unwrap();
    // The expansion result is printed on its own line.
    assert!(sink.text().contains("ls -l\r\n"));
}

#[test]
fn failed_expansion_reports_event_not_found() {
    let (mut ed, sink) = editor(b"!zap\r\x15done\r");
    assert_eq!(ed.read_line("").unwrap(), Some("done".into()));
    assert!(sink.text().contains("!zap: event not found"));
}

#[test]
fn clear_screen_redraws_prompt_and_line() {
    let (mut ed, sink) = editor(b"abc\x0c\r");
    ed.read_line("$ ").unwrap();
    let out = sink.text();
    assert!(out.contains("\x1b[2J"));
    assert!(out.contains("\x1b[1;1H"));
    let redraw = out.rsplit("\x1b[1;1H").next().unwrap();
    assert!(redraw.contains("$ abc"));
}

#[test]
fn reverse_search_shows_status_prompt() {
    let (mut ed, sink) = editor(b"\x12fo\x0d");
    ed.history_mut().add("food");
    ed.history_mut().add("misc");
    ed.read_line("").unwrap();
    assert!(sink.text().contains("(reverse-i-search)`fo': "));
}

// ── Multiple reads on one editor ──────────────────────────────────────────────

#[test]
fn keymap_changes_survive_between_lines() {
    let (mut ed, _) = editor(b"ix\x1b\rjunk");
    ed.set_keymap(KeymapName::ViMove);
    assert_eq!(ed.read_line("").unwrap(), Some("x".into()));
    // vi-move-accept-line put the next read into insert mode.
    assert_eq!(ed.keymap_name(), KeymapName::ViInsert);
}

#[test]
fn eof_after_some_lines_returns_none() {
    let (mut ed, _) = editor(b"one\r");
    assert_eq!(ed.read_line("").unwrap(), Some("one".into()));
    assert_eq!(ed.read_line("").unwrap(), None);
}
