//! Writing inline images and documents to disk for the CLI's Read tool

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use base64::{Engine, engine::general_purpose::STANDARD};
use bridge_cli::PermissionPolicy;
use tempfile::NamedTempFile;

use crate::{
    MessagesError,
    normalize::{Block, NormalizedRequest},
    protocol::MediaSource,
};

/// Tool the CLI uses to open attachment files
pub const READ_TOOL: &str = "Read";

const FILE_PREFIX: &str = "bridge_";
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const MAX_DOCUMENT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Document,
}

impl AttachmentKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }

    const fn max_bytes(self) -> usize {
        match self {
            Self::Image => MAX_IMAGE_BYTES,
            Self::Document => MAX_DOCUMENT_BYTES,
        }
    }

    fn extension(self, media_type: &str) -> Option<&'static str> {
        match (self, media_type) {
            (Self::Image, "image/jpeg") => Some(".jpg"),
            (Self::Image, "image/png") => Some(".png"),
            (Self::Image, "image/gif") => Some(".gif"),
            (Self::Image, "image/webp") => Some(".webp"),
            (Self::Document, "application/pdf") => Some(".pdf"),
            _ => None,
        }
    }
}

/// One materialized file, removed when dropped
#[derive(Debug)]
pub struct Attachment {
    kind: AttachmentKind,
    file: NamedTempFile,
}

impl Attachment {
    pub const fn kind(&self) -> AttachmentKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Files written for one request, keyed by `(turn, block)` position
///
/// Dropping the set deletes every file, so the files live exactly as long as
/// the request that owns them.
#[derive(Debug, Default)]
pub struct Attachments {
    files: BTreeMap<(usize, usize), Attachment>,
}

impl Attachments {
    /// Decode every image and document block of `request` into a file
    ///
    /// Files go into the policy's first allowed directory, which the `Read`
    /// tool must be authorized for. Blocking; run it off the async runtime.
    ///
    /// # Errors
    ///
    /// [`MessagesError::PermissionDenied`] without a usable directory,
    /// [`MessagesError::InvalidAttachment`] for bad sources, media types or
    /// sizes. Files written before the failure are removed.
    pub fn materialize(request: &NormalizedRequest, policy: &PermissionPolicy) -> Result<Self, MessagesError> {
        let mut attachments = Self::default();

        if request.media_positions().next().is_none() {
            return Ok(attachments);
        }

        let dir = policy
            .upload_directory()
            .filter(|dir| policy.authorize(READ_TOOL, Some(dir)))
            .ok_or_else(|| {
                MessagesError::PermissionDenied(format!(
                    "attachments require the {READ_TOOL} tool and an allowed directory"
                ))
            })?;

        for (t, turn) in request.turns.iter().enumerate() {
            for (b, block) in turn.blocks.iter().enumerate() {
                let (kind, source) = match block {
                    Block::Image(source) => (AttachmentKind::Image, source),
                    Block::Document(source) => (AttachmentKind::Document, source),
                    _ => continue,
                };

                let location = format!("messages.{t}.content.{b}");
                let (extension, bytes) = decode(kind, source).map_err(|reason| {
                    MessagesError::InvalidAttachment(format!("{location}: {reason}"))
                })?;

                let file = write_file(dir, extension, &bytes)?;
                tracing::debug!(path = %file.path().display(), kind = kind.label(), size = bytes.len(), "attachment written");

                attachments.files.insert((t, b), Attachment { kind, file });
            }
        }

        Ok(attachments)
    }

    pub fn get(&self, turn: usize, block: usize) -> Option<&Attachment> {
        self.files.get(&(turn, block))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Paths in conversation order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.values().map(Attachment::path)
    }

    /// Owned copies of every path, for tests and cleanup checks
    pub fn path_bufs(&self) -> Vec<PathBuf> {
        self.paths().map(Path::to_path_buf).collect()
    }
}

fn decode(kind: AttachmentKind, source: &MediaSource) -> Result<(&'static str, Vec<u8>), String> {
    if source.source_type != "base64" {
        return Err(format!("unsupported source type '{}', only base64 is accepted", source.source_type));
    }

    let media_type = source.media_type.as_deref().ok_or("media_type is required")?;
    let extension = kind
        .extension(media_type)
        .ok_or_else(|| format!("unsupported media type '{media_type}' for {} blocks", kind.label()))?;

    let data: String = source
        .data
        .as_deref()
        .ok_or("data is required")?
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let limit = kind.max_bytes();
    if data.len() / 4 * 3 > limit {
        return Err(format!("{} exceeds the {} MiB limit", kind.label(), limit / (1024 * 1024)));
    }

    let bytes = STANDARD.decode(data.as_bytes()).map_err(|e| format!("invalid base64 data: {e}"))?;
    if bytes.len() > limit {
        return Err(format!("{} exceeds the {} MiB limit", kind.label(), limit / (1024 * 1024)));
    }

    Ok((extension, bytes))
}

fn write_file(dir: &Path, extension: &str, bytes: &[u8]) -> Result<NamedTempFile, MessagesError> {
    let mut file = tempfile::Builder::new()
        .prefix(FILE_PREFIX)
        .suffix(extension)
        .tempfile_in(dir)
        .with_context(|| format!("failed to create attachment in {}", dir.display()))?;

    file.write_all(bytes)
        .and_then(|()| file.flush())
        .with_context(|| format!("failed to write attachment {}", file.path().display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .with_context(|| format!("failed to set permissions on {}", file.path().display()))?;
    }

    Ok(file)
}
