//! Filesystem tools
//!
//! `read_file`, `write_file`, `edit_file` and `list_directory`. Mutating tools
//! run their checks in a fixed order: protected-path guard, then the
//! permission gate, then the effect. A connected editor bridge receives every
//! edit as part of the file's pending batch; without one the write simply
//! lands on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sdk::{EngineError, Tool, ToolInput};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tracing::{debug, info, warn};

use super::context::ToolContext;
use super::escape::normalize_escapes;

const PREVIEW_CHARS: usize = 80;

/// Read a text file, mapping failures onto the tool error taxonomy.
pub(crate) async fn read_text(path: &Path) -> Result<String, EngineError> {
    let metadata = match fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        return Err(EngineError::NotAFile(path.to_path_buf()));
    }

    let bytes = fs::read(path).await?;
    String::from_utf8(bytes).map_err(|_| EngineError::UnreadableBinary(path.to_path_buf()))
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

pub struct ReadFileTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
}

impl ReadFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the full contents of a text file. Relative paths resolve against the working directory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to read"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: ReadFileArgs = input.parse()?;
        let path = self.ctx.resolve(&args.path);
        info!("Reading file: {}", path.display());

        let content = read_text(&path).await?;
        debug!("Read {} bytes from {}", content.len(), path.display());
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

pub struct WriteFileTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

impl WriteFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Show an overwrite as a full-file diff. `None` when no review applies.
    async fn review(&self, path: &Path, after: &str) -> Option<bool> {
        if !self.ctx.settings.review_writes {
            return None;
        }
        let bridge = self.ctx.connected_bridge()?;
        let before = fs::read_to_string(path).await.ok()?;

        let description = format!("Overwrite {}", self.ctx.display_path(path));
        Some(bridge.open_diff(path, &before, after, &description).await)
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content. Parent directories are created as needed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to write"},
                "content": {"type": "string", "description": "Complete new file content"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: WriteFileArgs = input.parse()?;
        let path = self.ctx.resolve(&args.path);
        let content = normalize_escapes(&args.content);
        let shown = self.ctx.display_path(&path).into_owned();

        self.ctx.guard.check_writable(&path)?;
        self.ctx
            .request_permission(
                "write_file",
                &format!("Write {} bytes to {}", content.len(), shown),
            )
            .await?;

        let reviewed = match self.review(&path, &content).await {
            Some(false) => {
                info!("Write to {} rejected in editor", path.display());
                return Ok(format!("Write to {} was rejected in the editor", shown));
            }
            Some(true) => true,
            None => false,
        };

        // An open editor buffer is updated after an unreviewed overwrite
        let previous = match self.ctx.connected_bridge() {
            Some(_) if !reviewed => fs::read_to_string(&path).await.ok(),
            _ => None,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content.as_bytes()).await?;

        info!("Wrote {} bytes to {}", content.len(), path.display());
        if let (Some(before), Some(bridge)) = (previous, self.ctx.connected_bridge()) {
            if let Err(e) = bridge.sync_overwrite(&path, &before, &content).await {
                warn!("Could not sync {} to editor: {}", path.display(), e);
            }
        }
        Ok(format!("Successfully wrote {} bytes to {}", content.len(), shown))
    }
}

// ---------------------------------------------------------------------------
// edit_file
// ---------------------------------------------------------------------------

pub struct EditFileTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: String,
    old_text: String,
    new_text: String,
}

impl EditFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Hand the edit to the editor as part of the file's pending batch.
    async fn propose(&self, path: &Path, live: &str, offset: usize, old: &str, new: &str) -> Option<usize> {
        let bridge = self.ctx.connected_bridge()?;
        bridge.record_edit(path, live, offset, old, new);

        let description = format!("Edit {}", self.ctx.display_path(path));
        match bridge.propose_pending(path, live, &description).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Could not propose edit to editor, kept direct write: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace the first occurrence of old_text with new_text in a file. old_text must match the current file content exactly, including whitespace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to edit"},
                "old_text": {"type": "string", "description": "Exact text to replace"},
                "new_text": {"type": "string", "description": "Replacement text"}
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: EditFileArgs = input.parse()?;
        if args.old_text.is_empty() {
            return Err(EngineError::InvalidArguments("old_text must not be empty".into()));
        }

        let path: PathBuf = self.ctx.resolve(&args.path);
        let shown = self.ctx.display_path(&path).into_owned();
        self.ctx.guard.check_writable(&path)?;

        let current = read_text(&path).await?;

        // Raw text first, then the escape-normalized pair
        let (offset, old_text, new_text) = match current.find(&args.old_text) {
            Some(offset) => (offset, args.old_text.clone(), args.new_text.clone()),
            None => {
                let old = normalize_escapes(&args.old_text);
                match current.find(old.as_ref()) {
                    Some(offset) => (
                        offset,
                        old.into_owned(),
                        normalize_escapes(&args.new_text).into_owned(),
                    ),
                    None => {
                        return Err(EngineError::TextNotFound {
                            path,
                            preview: preview(&args.old_text),
                        })
                    }
                }
            }
        };

        self.ctx
            .request_permission(
                "edit_file",
                &format!(
                    "Edit {}: replace {} chars with {} chars",
                    shown,
                    old_text.chars().count(),
                    new_text.chars().count()
                ),
            )
            .await?;

        let mut updated = String::with_capacity(current.len() + new_text.len());
        updated.push_str(&current[..offset]);
        updated.push_str(&new_text);
        updated.push_str(&current[offset + old_text.len()..]);
        fs::write(&path, updated.as_bytes()).await?;
        info!("Edited {} at byte {}", path.display(), offset);

        match self.propose(&path, &updated, offset, &old_text, &new_text).await {
            Some(pending) => Ok(format!(
                "Successfully edited {} ({} pending edit(s) shown in editor)",
                shown, pending
            )),
            None => Ok(format!("Successfully edited {}", shown)),
        }
    }
}

// ---------------------------------------------------------------------------
// list_directory
// ---------------------------------------------------------------------------

pub struct ListDirectoryTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct ListDirectoryArgs {
    #[serde(default = "default_dir")]
    path: String,
}

fn default_dir() -> String {
    ".".to_string()
}

impl ListDirectoryTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List a directory: subdirectories first, then files with their sizes."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list (default: working directory)"}
            },
            "required": []
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: ListDirectoryArgs = input.parse()?;
        let path = self.ctx.resolve(&args.path);
        info!("Listing directory: {}", path.display());

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::NotFound(path))
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(EngineError::NotADirectory(path));
        }

        let mut entries = fs::read_dir(&path).await?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follows symlinks, so a link to a directory lists as one
            match fs::metadata(entry.path()).await {
                Ok(m) if m.is_dir() => dirs.push(name),
                Ok(m) => files.push((name, m.len())),
                Err(_) => files.push((name, 0)),
            }
        }

        if dirs.is_empty() && files.is_empty() {
            return Ok("Empty directory".to_string());
        }

        dirs.sort();
        files.sort();

        let mut out = Vec::with_capacity(dirs.len() + files.len());
        out.extend(dirs.into_iter().map(|name| format!("d  {}/", name)));
        out.extend(
            files
                .into_iter()
                .map(|(name, size)| format!("f  {:>8}  {}", format_size(size), name)),
        );
        Ok(out.join("\n"))
    }
}

/// Format a byte count into a human-readable size string.
fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
