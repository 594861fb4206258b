//! Key binding dispatch — the `Operation` command tags, the `Binding` sum
//! type, and the `KeyMap` prefix trie.
//!
//! ## Key sequence format
//!
//! Sequences are strings of logical key codes (chars) as produced by the
//! decoder.  Control characters appear as their byte values (`\x01` for
//! Ctrl-A); escape sequences start with `\x1b`.  The helper
//! [`crate::keys::key_sequence`] converts readline notation.
//!
//! A node that both terminates a binding and prefixes longer ones stores the
//! short binding as its `another_key`; the controller commits it when the
//! escape disambiguation timer fires or when prefix backoff lands on the
//! node.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::buffer::CursorBuffer;

// ── Operation ─────────────────────────────────────────────────────────────────

/// Built-in editor commands that key sequences can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Abort,
    AcceptLine,
    BackwardChar,
    BackwardDeleteChar,
    BackwardKillWord,
    BackwardWord,
    BeginningOfHistory,
    BeginningOfLine,
    CallLastKbdMacro,
    CapitalizeWord,
    ClearScreen,
    Complete,
    DeleteChar,
    DoLowercaseVersion,
    DowncaseWord,
    EmacsEditingMode,
    EndKbdMacro,
    EndOfHistory,
    EndOfLine,
    ForwardChar,
    ForwardWord,
    InsertComment,
    KillLine,
    KillWholeLine,
    KillWord,
    NextHistory,
    OverwriteMode,
    PossibleCompletions,
    PreviousHistory,
    ReReadInitFile,
    ReverseSearchHistory,
    SelfInsert,
    StartKbdMacro,
    TabInsert,
    TransposeChars,
    UnixLineDiscard,
    UnixWordRubout,
    UpcaseWord,
    ViAppendEol,
    ViAppendMode,
    ViArgDigit,
    ViBeginningOfLineOrArgDigit,
    ViChangeCase,
    ViDelete,
    ViEditingMode,
    ViEndWord,
    ViEofMaybe,
    ViInsertBeg,
    ViInsertComment,
    ViInsertionMode,
    ViMatch,
    ViMoveAcceptLine,
    ViMovementMode,
    ViNextHistory,
    ViNextWord,
    ViPrevWord,
    ViPreviousHistory,
    ViRubout,
    ViSearch,
    Yank,
}

impl Operation {
    /// The canonical name an init file binds against.
    pub fn name(self) -> &'static str {
        use Operation::*;
        match self {
            Abort => "abort",
            AcceptLine => "accept-line",
            BackwardChar => "backward-char",
            BackwardDeleteChar => "backward-delete-char",
            BackwardKillWord => "backward-kill-word",
            BackwardWord => "backward-word",
            BeginningOfHistory => "beginning-of-history",
            BeginningOfLine => "beginning-of-line",
            CallLastKbdMacro => "call-last-kbd-macro",
            CapitalizeWord => "capitalize-word",
            ClearScreen => "clear-screen",
            Complete => "complete",
            DeleteChar => "delete-char",
            DoLowercaseVersion => "do-lowercase-version",
            DowncaseWord => "downcase-word",
            EmacsEditingMode => "emacs-editing-mode",
            EndKbdMacro => "end-kbd-macro",
            EndOfHistory => "end-of-history",
            EndOfLine => "end-of-line",
            ForwardChar => "forward-char",
            ForwardWord => "forward-word",
            InsertComment => "insert-comment",
            KillLine => "kill-line",
            KillWholeLine => "kill-whole-line",
            KillWord => "kill-word",
            NextHistory => "next-history",
            OverwriteMode => "overwrite-mode",
            PossibleCompletions => "possible-completions",
            PreviousHistory => "previous-history",
            ReReadInitFile => "re-read-init-file",
            ReverseSearchHistory => "reverse-search-history",
            SelfInsert => "self-insert",
            StartKbdMacro => "start-kbd-macro",
            TabInsert => "tab-insert",
            TransposeChars => "transpose-chars",
            UnixLineDiscard => "unix-line-discard",
            UnixWordRubout => "unix-word-rubout",
            UpcaseWord => "upcase-word",
            ViAppendEol => "vi-append-eol",
            ViAppendMode => "vi-append-mode",
            ViArgDigit => "vi-arg-digit",
            ViBeginningOfLineOrArgDigit => "vi-beginning-of-line-or-arg-digit",
            ViChangeCase => "vi-change-case",
            ViDelete => "vi-delete",
            ViEditingMode => "vi-editing-mode",
            ViEndWord => "vi-end-word",
            ViEofMaybe => "vi-eof-maybe",
            ViInsertBeg => "vi-insert-beg",
            ViInsertComment => "vi-insert-comment",
            ViInsertionMode => "vi-insertion-mode",
            ViMatch => "vi-match",
            ViMoveAcceptLine => "vi-move-accept-line",
            ViMovementMode => "vi-movement-mode",
            ViNextHistory => "vi-next-history",
            ViNextWord => "vi-next-word",
            ViPrevWord => "vi-prev-word",
            ViPreviousHistory => "vi-previous-history",
            ViRubout => "vi-rubout",
            ViSearch => "vi-search",
            Yank => "yank",
        }
    }

    /// All operations, in name order.
    pub const ALL: &'static [Operation] = &[
        Operation::Abort,
        Operation::AcceptLine,
        Operation::BackwardChar,
        Operation::BackwardDeleteChar,
        Operation::BackwardKillWord,
        Operation::BackwardWord,
        Operation::BeginningOfHistory,
        Operation::BeginningOfLine,
        Operation::CallLastKbdMacro,
        Operation::CapitalizeWord,
        Operation::ClearScreen,
        Operation::Complete,
        Operation::DeleteChar,
        Operation::DoLowercaseVersion,
        Operation::DowncaseWord,
        Operation::EmacsEditingMode,
        Operation::EndKbdMacro,
        Operation::EndOfHistory,
        Operation::EndOfLine,
        Operation::ForwardChar,
        Operation::ForwardWord,
        Operation::InsertComment,
        Operation::KillLine,
        Operation::KillWholeLine,
        Operation::KillWord,
        Operation::NextHistory,
        Operation::OverwriteMode,
        Operation::PossibleCompletions,
        Operation::PreviousHistory,
        Operation::ReReadInitFile,
        Operation::ReverseSearchHistory,
        Operation::SelfInsert,
        Operation::StartKbdMacro,
        Operation::TabInsert,
        Operation::TransposeChars,
        Operation::UnixLineDiscard,
        Operation::UnixWordRubout,
        Operation::UpcaseWord,
        Operation::ViAppendEol,
        Operation::ViAppendMode,
        Operation::ViArgDigit,
        Operation::ViBeginningOfLineOrArgDigit,
        Operation::ViChangeCase,
        Operation::ViDelete,
        Operation::ViEditingMode,
        Operation::ViEndWord,
        Operation::ViEofMaybe,
        Operation::ViInsertBeg,
        Operation::ViInsertComment,
        Operation::ViInsertionMode,
        Operation::ViMatch,
        Operation::ViMoveAcceptLine,
        Operation::ViMovementMode,
        Operation::ViNextHistory,
        Operation::ViNextWord,
        Operation::ViPrevWord,
        Operation::ViPreviousHistory,
        Operation::ViRubout,
        Operation::ViSearch,
        Operation::Yank,
    ];

    /// Parse a canonical name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|op| op.name() == lower)
    }
}

// ── Binding ───────────────────────────────────────────────────────────────────

/// Host hook invoked with the edit buffer when its key sequence fires.
pub type Callback = Arc<dyn Fn(&mut CursorBuffer) + Send + Sync>;

/// What a key sequence resolves to.
#[derive(Clone)]
pub enum Binding {
    /// A built-in editor command.
    Op(Operation),
    /// A macro: the string is replayed as synthetic keystrokes.
    Macro(String),
    /// A host callback.
    Callback(Callback),
    /// An interior trie node; more keys may follow.
    Keymap(KeyMap),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Op(op) => write!(f, "Op({})", op.name()),
            Binding::Macro(m) => write!(f, "Macro({m:?})"),
            Binding::Callback(_) => write!(f, "Callback(..)"),
            Binding::Keymap(_) => write!(f, "Keymap(..)"),
        }
    }
}

// ── Lookup ────────────────────────────────────────────────────────────────────

/// Result of resolving a pending key sequence against a [`KeyMap`].
#[derive(Debug)]
pub enum Lookup<'a> {
    /// No binding and no longer binding starts with this sequence.
    Miss,
    /// The sequence is a proper prefix; the node may carry an `another_key`.
    Partial(&'a KeyMap),
    /// A terminal binding.
    Found(&'a Binding),
}

// ── KeyMap ────────────────────────────────────────────────────────────────────

/// Prefix trie mapping key sequences to [`Binding`]s.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    entries: HashMap<char, Binding>,
    /// Binding committed when a sequence legitimately ends at this node.
    another_key: Option<Box<Binding>>,
    /// Fallback for code points ≥ `\u{80}` with no explicit entry.
    unicode: Option<Box<Binding>>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The binding committed when a sequence ends at this interior node.
    pub fn another_key(&self) -> Option<&Binding> {
        self.another_key.as_deref()
    }

    /// Resolve `seq`.  Empty sequences miss.
    pub fn lookup(&self, seq: &str) -> Lookup<'_> {
        let mut map = self;
        let mut it = seq.chars().peekable();
        while let Some(c) = it.next() {
            let last = it.peek().is_none();
            let entry = map.entries.get(&c).or_else(|| {
                if (c as u32) >= 0x80 {
                    map.unicode.as_deref()
                } else {
                    None
                }
            });
            match entry {
                None => return Lookup::Miss,
                Some(Binding::Keymap(m)) => {
                    if last {
                        return Lookup::Partial(m);
                    }
                    map = m;
                }
                Some(b) => {
                    if last {
                        return Lookup::Found(b);
                    }
                    return Lookup::Miss;
                }
            }
        }
        Lookup::Miss
    }

    /// Bind `seq` to `binding`.
    ///
    /// Binding a sequence through an existing terminal binding demotes that
    /// binding to the new interior node's `another_key`; binding a sequence
    /// that ends at an interior node sets that node's `another_key`.
    pub fn bind(&mut self, seq: &str, binding: Binding) {
        let chars: Vec<char> = seq.chars().collect();
        if chars.is_empty() {
            return;
        }
        let mut map = self;
        for (i, &c) in chars.iter().enumerate() {
            if i + 1 == chars.len() {
                match map.entries.get_mut(&c) {
                    Some(Binding::Keymap(m)) => m.another_key = Some(Box::new(binding)),
                    _ => {
                        map.entries.insert(c, binding);
                    }
                }
                return;
            }
            let entry = map
                .entries
                .entry(c)
                .or_insert_with(|| Binding::Keymap(KeyMap::new()));
            if !matches!(entry, Binding::Keymap(_)) {
                let old = std::mem::replace(entry, Binding::Keymap(KeyMap::new()));
                if let Binding::Keymap(m) = entry {
                    m.another_key = Some(Box::new(old));
                }
            }
            let Binding::Keymap(m) = entry else { return };
            map = m;
        }
    }

    /// Remove the binding for `seq`, leaving any longer bindings intact.
    pub fn unbind(&mut self, seq: &str) {
        let chars: Vec<char> = seq.chars().collect();
        let Some((&last, prefix)) = chars.split_last() else {
            return;
        };
        let mut map = self;
        for &c in prefix {
            match map.entries.get_mut(&c) {
                Some(Binding::Keymap(m)) => map = m,
                _ => return,
            }
        }
        match map.entries.get_mut(&last) {
            Some(Binding::Keymap(m)) => m.another_key = None,
            Some(_) => {
                map.entries.remove(&last);
            }
            None => {}
        }
    }

    fn bind_op(&mut self, seq: &str, op: Operation) {
        self.bind(seq, Binding::Op(op));
    }

    /// Arrow, home/end, delete and insert keys, shared by all three maps.
    fn bind_keypad(&mut self, up: Operation, down: Operation) {
        use Operation::*;
        for prefix in ["\x1b[", "\x1bO"] {
            self.bind_op(&format!("{prefix}A"), up);
            self.bind_op(&format!("{prefix}B"), down);
            self.bind_op(&format!("{prefix}C"), ForwardChar);
            self.bind_op(&format!("{prefix}D"), BackwardChar);
        }
        self.bind_op("\x1b[H", BeginningOfLine);
        self.bind_op("\x1b[F", EndOfLine);
        self.bind_op("\x1b[1~", BeginningOfLine);
        self.bind_op("\x1b[4~", EndOfLine);
        self.bind_op("\x1b[3~", DeleteChar);
        self.bind_op("\x1b[2~", OverwriteMode);
    }

    // ── Default maps ──────────────────────────────────────────────────────────

    /// The default Emacs-style map.
    pub fn emacs() -> Self {
        use Operation::*;
        let mut map = KeyMap::new();
        for c in ' '..='\u{7e}' {
            map.bind(&c.to_string(), Binding::Op(SelfInsert));
        }
        map.unicode = Some(Box::new(Binding::Op(SelfInsert)));

        map.bind_op("\x01", BeginningOfLine);
        map.bind_op("\x02", BackwardChar);
        map.bind_op("\x04", DeleteChar);
        map.bind_op("\x05", EndOfLine);
        map.bind_op("\x06", ForwardChar);
        map.bind_op("\x07", Abort);
        map.bind_op("\x08", BackwardDeleteChar);
        map.bind_op("\t", Complete);
        map.bind_op("\n", AcceptLine);
        map.bind_op("\x0b", KillLine);
        map.bind_op("\x0c", ClearScreen);
        map.bind_op("\r", AcceptLine);
        map.bind_op("\x0e", NextHistory);
        map.bind_op("\x10", PreviousHistory);
        map.bind_op("\x12", ReverseSearchHistory);
        map.bind_op("\x14", TransposeChars);
        map.bind_op("\x15", UnixLineDiscard);
        map.bind_op("\x17", UnixWordRubout);
        map.bind_op("\x19", Yank);
        map.bind_op("\x7f", BackwardDeleteChar);

        map.bind_op("\x18(", StartKbdMacro);
        map.bind_op("\x18)", EndKbdMacro);
        map.bind_op("\x18e", CallLastKbdMacro);
        map.bind_op("\x18\x12", ReReadInitFile);

        map.bind_op("\x1bb", BackwardWord);
        map.bind_op("\x1bf", ForwardWord);
        map.bind_op("\x1bd", KillWord);
        map.bind_op("\x1bc", CapitalizeWord);
        map.bind_op("\x1bu", UpcaseWord);
        map.bind_op("\x1bl", DowncaseWord);
        for c in ["B", "F", "D", "C", "U", "L"] {
            map.bind_op(&format!("\x1b{c}"), DoLowercaseVersion);
        }
        map.bind_op("\x1b\x7f", BackwardKillWord);
        map.bind_op("\x1b\x08", BackwardKillWord);
        map.bind_op("\x1b<", BeginningOfHistory);
        map.bind_op("\x1b>", EndOfHistory);
        map.bind_op("\x1b#", InsertComment);
        map.bind_op("\x1b\t", TabInsert);

        map.bind_keypad(PreviousHistory, NextHistory);
        map
    }

    /// The default Vi insert-mode map.
    pub fn vi_insert() -> Self {
        use Operation::*;
        let mut map = KeyMap::new();
        for c in ' '..='\u{7e}' {
            map.bind(&c.to_string(), Binding::Op(SelfInsert));
        }
        map.unicode = Some(Box::new(Binding::Op(SelfInsert)));

        map.bind_op("\x04", ViEofMaybe);
        map.bind_op("\x08", BackwardDeleteChar);
        map.bind_op("\t", Complete);
        map.bind_op("\n", AcceptLine);
        map.bind_op("\r", AcceptLine);
        map.bind_op("\x12", ReverseSearchHistory);
        map.bind_op("\x15", UnixLineDiscard);
        map.bind_op("\x17", UnixWordRubout);
        map.bind_op("\x19", Yank);
        map.bind_op("\x7f", BackwardDeleteChar);

        map.bind_keypad(PreviousHistory, NextHistory);
        // Lone ESC leaves insert mode once the disambiguation timer fires.
        map.bind_op("\x1b", ViMovementMode);
        map
    }

    /// The default Vi movement-mode map.  Unbound keys are discarded.
    pub fn vi_move() -> Self {
        use Operation::*;
        let mut map = KeyMap::new();

        map.bind_op("h", BackwardChar);
        map.bind_op("l", ForwardChar);
        map.bind_op(" ", ForwardChar);
        map.bind_op("0", ViBeginningOfLineOrArgDigit);
        for d in '1'..='9' {
            map.bind(&d.to_string(), Binding::Op(ViArgDigit));
        }
        map.bind_op("^", BeginningOfLine);
        map.bind_op("$", EndOfLine);
        map.bind_op("w", ViNextWord);
        map.bind_op("b", ViPrevWord);
        map.bind_op("e", ViEndWord);
        map.bind_op("x", ViDelete);
        map.bind_op("X", ViRubout);
        map.bind_op("D", KillLine);
        map.bind_op("i", ViInsertionMode);
        map.bind_op("I", ViInsertBeg);
        map.bind_op("a", ViAppendMode);
        map.bind_op("A", ViAppendEol);
        map.bind_op("~", ViChangeCase);
        map.bind_op("%", ViMatch);
        map.bind_op("/", ViSearch);
        map.bind_op("?", ViSearch);
        map.bind_op("j", ViNextHistory);
        map.bind_op("k", ViPreviousHistory);
        map.bind_op("G", EndOfHistory);
        map.bind_op("#", ViInsertComment);
        map.bind_op("y", Yank);

        map.bind_op("\x04", ViEofMaybe);
        map.bind_op("\x07", Abort);
        map.bind_op("\x08", BackwardChar);
        map.bind_op("\x7f", BackwardChar);
        map.bind_op("\n", ViMoveAcceptLine);
        map.bind_op("\r", ViMoveAcceptLine);
        map.bind_op("\x0c", ClearScreen);
        map.bind_op("\x12", ReverseSearchHistory);

        map.bind_keypad(ViPreviousHistory, ViNextHistory);
        map
    }
}

// ── Keymaps ───────────────────────────────────────────────────────────────────

/// Names of the three coexisting maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeymapName {
    Emacs,
    ViInsert,
    ViMove,
}

impl KeymapName {
    pub fn as_str(self) -> &'static str {
        match self {
            KeymapName::Emacs => "emacs",
            KeymapName::ViInsert => "vi-insert",
            KeymapName::ViMove => "vi-move",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "emacs" => Some(KeymapName::Emacs),
            "vi-insert" => Some(KeymapName::ViInsert),
            "vi-move" => Some(KeymapName::ViMove),
            _ => None,
        }
    }
}

/// The three named maps plus the pointer to the active one.
#[derive(Debug, Clone)]
pub struct Keymaps {
    pub emacs: KeyMap,
    pub vi_insert: KeyMap,
    pub vi_move: KeyMap,
    active: KeymapName,
}

impl Keymaps {
    pub fn new() -> Self {
        Self {
            emacs: KeyMap::emacs(),
            vi_insert: KeyMap::vi_insert(),
            vi_move: KeyMap::vi_move(),
            active: KeymapName::Emacs,
        }
    }

    pub fn active(&self) -> &KeyMap {
        self.by_name(self.active)
    }

    pub fn active_name(&self) -> KeymapName {
        self.active
    }

    pub fn select(&mut self, name: KeymapName) {
        self.active = name;
    }

    pub fn by_name(&self, name: KeymapName) -> &KeyMap {
        match name {
            KeymapName::Emacs => &self.emacs,
            KeymapName::ViInsert => &self.vi_insert,
            KeymapName::ViMove => &self.vi_move,
        }
    }

    pub fn by_name_mut(&mut self, name: KeymapName) -> &mut KeyMap {
        match name {
            KeymapName::Emacs => &mut self.emacs,
            KeymapName::ViInsert => &mut self.vi_insert,
            KeymapName::ViMove => &mut self.vi_move,
        }
    }
}

impl Default for Keymaps {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
