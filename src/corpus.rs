use std::{fs, path::Path};
use tracing::{debug, info};

use crate::errors::{LyricError, Result};

/// Load every song file in `dir`, concatenated and cleaned into one corpus.
///
/// Files are read in file-name order so the corpus (and therefore the
/// vocabulary indices) is the same on every run.
pub fn load_lyrics_dir<P: AsRef<Path>>(dir: P) -> Result<String> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut raw = String::new();
    for path in &paths {
        let song = fs::read_to_string(path)?;
        debug!(file = %path.display(), chars = song.len(), "read song");
        raw.push_str(&song);
        raw.push('\n');
    }
    info!(files = paths.len(), dir = %dir.display(), "loaded lyric files");

    finish(clean_text(&raw))
}

/// Load the `column` field of every row of a CSV file into one corpus.
pub fn load_lyrics_csv<P: AsRef<Path>>(path: P, column: &str) -> Result<String> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let col_idx = reader
        .headers()?
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| LyricError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;

    let mut raw = String::new();
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record?;
        if let Some(text) = record.get(col_idx) {
            raw.push_str(text);
            raw.push('\n');
        }
        rows += 1;
    }
    info!(rows, file = %path.display(), "loaded lyric rows");

    finish(clean_text(&raw))
}

fn finish(corpus: String) -> Result<String> {
    if corpus.is_empty() {
        return Err(LyricError::EmptyCorpus);
    }
    info!(chars = corpus.chars().count(), "corpus ready");
    Ok(corpus)
}

/// Characters that survive the alphabet filter (after lowercasing).
fn is_kept(c: char) -> bool {
    c.is_ascii_lowercase() || matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Lowercase, drop anything outside `a-z` and whitespace, then fix up the
/// individual tokens with [`clean_token`]. Tokens are rejoined with single spaces.
pub fn clean_text(raw: &str) -> String {
    let filtered: String = raw
        .to_lowercase()
        .chars()
        .filter(|&c| is_kept(c))
        .collect();

    filtered
        .split(|c: char| !c.is_ascii_lowercase())
        .map(clean_token)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip a quote or parenthesis that only appears on one side of a token.
pub fn clean_token(token: &str) -> &str {
    let mut word = token;

    if word.starts_with('"') && !word.ends_with('"') {
        word = &word[1..];
    } else if word.ends_with('"') && !word.starts_with('"') {
        word = &word[..word.len() - 1];
    }

    if word.starts_with('(') && !word.ends_with(')') {
        word = &word[1..];
    } else if word.ends_with(')') && !word.starts_with('(') {
        word = &word[..word.len() - 1];
    }

    word
}
