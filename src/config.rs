//! Editor configuration and the init-source seam.
//!
//! Parsing of the startup init file lives outside this crate; an
//! [`InitSource`] hands finished bindings and variables to the editor, and
//! the `re-read-init-file` command re-applies it in place.

use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;

use crate::keymap::Keymaps;

// ── EditorConfig ──────────────────────────────────────────────────────────────

/// Process-wide editor settings.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// How long a lone ESC waits for a following byte before it commits.
    pub escape_timeout: Duration,
    /// Ring the bell on command failure.  Suppressed by default.
    pub bell_enabled: bool,
    /// Candidate count above which listing asks for confirmation.
    pub autoprint_threshold: usize,
    /// Apply history event expansion to accepted lines.
    pub expand_events: bool,
    /// Page completion listings taller than the screen.
    pub page_completions: bool,
    /// Record accepted lines in history.
    pub history_enabled: bool,
    /// Prefix used by the insert-comment commands.  When unset, the init
    /// source's `comment-begin` variable applies, then `#`.
    pub comment_begin: Option<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            escape_timeout: Duration::from_millis(150),
            bell_enabled: false,
            autoprint_threshold: 100,
            expand_events: true,
            page_completions: false,
            history_enabled: true,
            comment_begin: None,
        }
    }
}

// ── InitSource ────────────────────────────────────────────────────────────────

/// External supplier of keymap bindings and readline variables.
pub trait InitSource: Send + Sync {
    /// (Re)load bindings and settings into the live keymaps and config.
    fn apply(&self, keymaps: &mut Keymaps, config: &mut EditorConfig) -> std::io::Result<()>;

    /// Look up a readline variable such as `comment-begin`.
    fn variable(&self, _name: &str) -> Option<String> {
        None
    }
}

/// The conventional per-user init-file location.
pub fn default_init_file() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".inputrc"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
