//! Completion — pluggable candidate generators and the handler that installs
//! or lists what they return.
//!
//! A [`Completer`] inspects the line and cursor and appends candidates,
//! returning the buffer position its candidates replace from (or -1 to pass).
//! Completers are consulted in registration order; the first non-negative
//! answer wins.  The winning set goes to the [`CompletionHandler`], which
//! may edit the buffer or print a listing.

use std::io;

use crate::editor::Editor;

// ── Completer ─────────────────────────────────────────────────────────────────

/// Candidate generator.
pub trait Completer: Send + Sync {
    /// Append candidates for `line` with the cursor at char index `cursor`.
    ///
    /// Returns the char index candidates should replace from, or `-1` when
    /// this completer has nothing to offer.
    fn complete(&self, line: &str, cursor: usize, candidates: &mut Vec<String>) -> isize;
}

/// Completes the word before the cursor against a fixed candidate set.
#[derive(Debug, Clone, Default)]
pub struct StringsCompleter {
    strings: Vec<String>,
}

impl StringsCompleter {
    pub fn new<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut strings: Vec<String> = strings.into_iter().map(Into::into).collect();
        strings.sort();
        Self { strings }
    }
}

impl Completer for StringsCompleter {
    fn complete(&self, line: &str, cursor: usize, candidates: &mut Vec<String>) -> isize {
        let chars: Vec<char> = line.chars().collect();
        let cursor = cursor.min(chars.len());
        let mut start = cursor;
        while start > 0 && !chars[start - 1].is_whitespace() {
            start -= 1;
        }
        let word: String = chars[start..cursor].iter().collect();
        candidates.extend(
            self.strings
                .iter()
                .filter(|s| s.starts_with(&word))
                .cloned(),
        );
        if candidates.is_empty() {
            -1
        } else {
            start as isize
        }
    }
}

// ── CompletionHandler ─────────────────────────────────────────────────────────

/// Consumer of the winning candidate set.
///
/// Returns `true` iff it modified the buffer.
pub trait CompletionHandler: Send + Sync {
    fn handle(&self, editor: &mut Editor, candidates: &[String], position: usize)
        -> io::Result<bool>;
}

/// Default handler: installs a sole candidate, extends to the common prefix,
/// otherwise lists candidates in columns — asking first when there are more
/// than the autoprint threshold, and paging when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListCompletionHandler;

impl CompletionHandler for ListCompletionHandler {
    fn handle(
        &self,
        editor: &mut Editor,
        candidates: &[String],
        position: usize,
    ) -> io::Result<bool> {
        let mut distinct: Vec<&str> = candidates.iter().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();

        if let [only] = distinct.as_slice() {
            editor.install_completion(position, only)?;
            return Ok(true);
        }

        let typed = editor.cursor().saturating_sub(position);
        let prefix = common_prefix(&distinct);
        if prefix.chars().count() > typed {
            editor.install_completion(position, &prefix)?;
            return Ok(true);
        }

        if distinct.len() > editor.config().autoprint_threshold {
            editor.print_text(&format!(
                "\r\nDisplay all {} possibilities? (y or n)",
                distinct.len()
            ))?;
            editor.flush()?;
            let yes = loop {
                match editor.read_character()? {
                    Some('y') | Some('Y') | Some(' ') => break true,
                    Some('n') | Some('N') | Some('\x7f') => break false,
                    Some(_) => {}
                    None => break false,
                }
            };
            if !yes {
                editor.print_text("\r\n")?;
                editor.redraw_line()?;
                return Ok(false);
            }
        }

        editor.print_text("\r\n")?;
        editor.print_columns(&distinct)?;
        editor.redraw_line()?;
        Ok(false)
    }
}

/// Longest prefix shared by every candidate.
pub fn common_prefix(candidates: &[&str]) -> String {
    let Some(first) = candidates.first() else {
        return String::new();
    };
    let mut prefix: Vec<char> = first.chars().collect();
    for c in &candidates[1..] {
        let mut shared = 0;
        for (a, b) in prefix.iter().zip(c.chars()) {
            if *a != b {
                break;
            }
            shared += 1;
        }
        prefix.truncate(shared);
        if prefix.is_empty() {
            break;
        }
    }
    prefix.into_iter().collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
