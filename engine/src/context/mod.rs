//! Context Assembler
//!
//! Holds the files the user pinned into the conversation, enforces a global
//! token budget over them and renders them into the prompt prefix.
//!
//! Entries are keyed by canonical absolute path, so the same file reached
//! through two different spellings is stored once. A path is resolved by
//! trying, in order: its absolute form, the launch directory, the process
//! working directory, and the literal path.

pub mod mentions;

pub use mentions::{extract_mentions, strip_mentions};

use std::fmt;
use std::path::{Path, PathBuf};

use glob::MatchOptions;
use sdk::errors::EngineError;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::tokens::TokenCounter;

/// Default token budget when none is configured
pub const DEFAULT_TOKEN_BUDGET: usize = 100_000;

/// Default pattern for `add_folder`
pub const DEFAULT_FOLDER_PATTERN: &str = "**/*";

/// Error lines kept in a `FolderReport`
const MAX_REPORTED_ERRORS: usize = 5;

/// One file pinned into context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub path: PathBuf,
    pub content: String,
    pub token_count: usize,
}

/// Outcome of `add_folder`
#[derive(Debug, Clone, Default)]
pub struct FolderReport {
    pub folder: PathBuf,
    pub added: usize,
    pub errors: Vec<String>,
}

impl fmt::Display for FolderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Added {} file(s) from {}",
            self.added,
            self.folder.display()
        )?;
        for line in self.errors.iter().take(MAX_REPORTED_ERRORS) {
            write!(f, "\n  {}", line)?;
        }
        if self.errors.len() > MAX_REPORTED_ERRORS {
            write!(
                f,
                "\n  ... and {} more",
                self.errors.len() - MAX_REPORTED_ERRORS
            )?;
        }
        Ok(())
    }
}

/// Token-budgeted set of context files
#[derive(Debug)]
pub struct ContextAssembler {
    entries: Vec<ContextEntry>,
    budget: usize,
    counter: TokenCounter,
    launch_dir: PathBuf,
}

impl ContextAssembler {
    pub fn new(counter: TokenCounter, budget: usize, launch_dir: PathBuf) -> Self {
        Self {
            entries: Vec::new(),
            budget,
            counter,
            launch_dir,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn launch_dir(&self) -> &Path {
        &self.launch_dir
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Add a file, or replace it if it is already in context.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no resolution candidate exists
    /// - `NotAFile` when the first existing candidate is a directory
    /// - `UnreadableBinary` when the content is not UTF-8 text
    /// - `BudgetExceeded` when the file does not fit; the entry set is untouched
    pub async fn add(&mut self, path: &str) -> Result<&ContextEntry, EngineError> {
        let resolved = self.resolve_file(path)?;
        let key = resolved.canonicalize().unwrap_or(resolved);

        let bytes = fs::read(&key).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::NotFound(key.clone()),
            _ => EngineError::Io(e),
        })?;
        let content =
            String::from_utf8(bytes).map_err(|_| EngineError::UnreadableBinary(key.clone()))?;

        let token_count = self.counter.count(&content);
        let existing = self.entries.iter().position(|e| e.path == key);
        let current = self.total_tokens()
            - existing
                .map(|i| self.entries[i].token_count)
                .unwrap_or(0);

        if current + token_count > self.budget {
            warn!(
                "Rejected {}: {} tokens over budget ({} + {} > {})",
                key.display(),
                current + token_count - self.budget,
                current,
                token_count,
                self.budget
            );
            return Err(EngineError::BudgetExceeded {
                requested: token_count,
                current,
                budget: self.budget,
            });
        }

        let entry = ContextEntry {
            path: key,
            content,
            token_count,
        };
        debug!(
            "Context add {} ({} tokens)",
            entry.path.display(),
            entry.token_count
        );

        let index = match existing {
            Some(i) => {
                self.entries[i] = entry;
                i
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        Ok(&self.entries[index])
    }

    /// Add every regular file under `path` matching `pattern`.
    ///
    /// Failures on individual files are collected rather than aborting;
    /// files added before a failure stay in context. Hidden files and
    /// directories are skipped.
    pub async fn add_folder(
        &mut self,
        path: &str,
        pattern: Option<&str>,
    ) -> Result<FolderReport, EngineError> {
        let folder = self.resolve_dir(path)?;
        let folder = folder.canonicalize().unwrap_or(folder);
        let pattern = pattern.unwrap_or(DEFAULT_FOLDER_PATTERN);

        let folder_str = folder.to_str().ok_or_else(|| {
            EngineError::InvalidArguments(format!("Invalid UTF-8 in {}", folder.display()))
        })?;
        let full_pattern = format!(
            "{}/{}",
            glob::Pattern::escape(folder_str).trim_end_matches('/'),
            pattern
        );

        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };
        let matches = glob::glob_with(&full_pattern, options).map_err(|e| {
            EngineError::InvalidArguments(format!("Invalid glob pattern '{}': {}", pattern, e))
        })?;

        let mut report = FolderReport {
            folder: folder.clone(),
            ..FolderReport::default()
        };

        for item in matches {
            let file = match item {
                Ok(p) => p,
                Err(e) => {
                    report.errors.push(e.to_string());
                    continue;
                }
            };
            if !file.is_file() {
                continue;
            }

            let display = file
                .strip_prefix(&folder)
                .unwrap_or(&file)
                .display()
                .to_string();
            let Some(file_str) = file.to_str() else {
                report.errors.push(format!("{}: invalid UTF-8 path", display));
                continue;
            };

            match self.add(file_str).await {
                Ok(_) => report.added += 1,
                Err(e) => report.errors.push(format!("{}: {}", display, e)),
            }
        }

        info!(
            "Added {} file(s) from {} ({} error(s))",
            report.added,
            folder.display(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Remove a file from context, returning the removed entry.
    pub fn remove(&mut self, path: &str) -> Result<ContextEntry, EngineError> {
        let index = self
            .find(path)
            .ok_or_else(|| EngineError::NotInContext(path.to_string()))?;
        let entry = self.entries.remove(index);
        debug!("Context remove {}", entry.path.display());
        Ok(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order
    pub fn list(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&ContextEntry> {
        self.find(path).map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of entry token counts, recomputed on every call
    pub fn total_tokens(&self) -> usize {
        self.entries.iter().map(|e| e.token_count).sum()
    }

    /// Render all entries as labeled sections. Empty context renders to "".
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("=== {} ===\n{}\n", e.path.display(), e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn candidates(&self, path: &str) -> Vec<PathBuf> {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            return vec![expanded];
        }

        let mut out = vec![self.launch_dir.join(&expanded)];
        if let Ok(cwd) = std::env::current_dir() {
            out.push(cwd.join(&expanded));
        }
        out.push(expanded);
        out
    }

    fn resolve_file(&self, path: &str) -> Result<PathBuf, EngineError> {
        let candidates = self.candidates(path);
        if let Some(file) = candidates.iter().find(|c| c.is_file()) {
            return Ok(file.clone());
        }
        match candidates.into_iter().find(|c| c.exists()) {
            Some(other) => Err(EngineError::NotAFile(other)),
            None => Err(EngineError::NotFound(PathBuf::from(path))),
        }
    }

    fn resolve_dir(&self, path: &str) -> Result<PathBuf, EngineError> {
        let candidates = self.candidates(path);
        if let Some(dir) = candidates.iter().find(|c| c.is_dir()) {
            return Ok(dir.clone());
        }
        match candidates.into_iter().find(|c| c.exists()) {
            Some(other) => Err(EngineError::NotADirectory(other)),
            None => Err(EngineError::NotFound(PathBuf::from(path))),
        }
    }

    fn find(&self, path: &str) -> Option<usize> {
        let keys: Vec<PathBuf> = self
            .candidates(path)
            .into_iter()
            .map(|c| c.canonicalize().unwrap_or(c))
            .collect();

        self.entries.iter().position(|e| keys.contains(&e.path))
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
