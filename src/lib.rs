//! keyline — a keymap-driven interactive line editor for terminals.
//!
//! The crate reads one line of input at a time with in-place editing,
//! history navigation, incremental reverse search, tab completion,
//! keyboard macros, and Emacs or modal Vi key handling.
//!
//! ```no_run
//! use keyline::{Editor, EditorConfig, TermCaps};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut editor = Editor::new(
//!     Box::new(std::io::stdin()),
//!     Box::new(std::io::stdout()),
//!     TermCaps::detect(),
//!     EditorConfig::default(),
//! );
//! let _guard = keyline::enter_raw_mode()?;
//! while let Some(line) = editor.read_line("> ")? {
//!     println!("got: {line}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module map
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`buffer`] | edit buffer with cursor and overtype flag |
//! | [`keys`] | byte → key-code decoding, caret widths, key notation |
//! | [`nonblock`] | background reader with a timed peek |
//! | [`keymap`] | binding trie, command tags, default maps |
//! | [`render`] | ANSI / dumb terminal painting |
//! | [`history`] | history provider, in-memory store, search view |
//! | [`expand`] | `!` / `^old^new` event expansion |
//! | [`search`] | incremental-search state |
//! | [`complete`] | completers and the completion handler |
//! | [`config`] | settings and the init-source seam |
//! | [`editor`] | read loop and command dispatch |

pub mod buffer;
pub mod complete;
pub mod config;
pub mod editor;
pub mod expand;
pub mod history;
pub mod keymap;
pub mod keys;
pub mod nonblock;
pub mod render;
pub mod search;

pub use buffer::CursorBuffer;
pub use complete::{Completer, CompletionHandler, ListCompletionHandler, StringsCompleter};
pub use config::{default_init_file, EditorConfig, InitSource};
pub use editor::Editor;
pub use expand::{expand_events, ExpandError};
pub use history::{History, HistoryView, MemoryHistory};
pub use keymap::{Binding, Callback, KeyMap, KeymapName, Keymaps, Operation};
pub use keys::{caret_width, key_sequence, KeystrokeDecoder};
pub use nonblock::{NonblockingReader, Peek};
pub use render::{enter_raw_mode, strip_ansi, RawModeGuard, Renderer, TermCaps};
pub use search::SearchState;
