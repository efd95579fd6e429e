//! Imperative builder for patch trees.
//!
//! `PatchWriter` records commands at paths relative to a base path and folds
//! them into a single [`MutationPatch`]. Later writes to the same path
//! replace earlier ones.

use crate::{LinkSpec, MutationCommand, MutationPatch, Path};
use serde_json::Value;

/// Builds a [`MutationPatch`] one path at a time.
///
/// # Examples
///
/// ```
/// use tirea_docstore::{path, PatchWriter};
/// use serde_json::json;
///
/// let mut w = PatchWriter::new();
/// w.set(path!("name"), json!("Alice"));
/// w.merge(path!("tags"), json!(["admin"]));
/// w.delete(path!("draft"));
///
/// let patch = w.build();
/// assert_eq!(patch.command_count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct PatchWriter {
    base: Path,
    patch: MutationPatch,
    len: usize,
}

impl PatchWriter {
    /// Create a new writer at the document root.
    #[inline]
    pub fn new() -> Self {
        Self::at(Path::root())
    }

    /// Create a new writer at the specified base path.
    #[inline]
    pub fn at(base: Path) -> Self {
        Self {
            base,
            patch: MutationPatch::empty(),
            len: 0,
        }
    }

    /// Get the base path of this writer.
    #[inline]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Record an arbitrary command at a relative path.
    pub fn command(&mut self, path: Path, command: MutationCommand) -> &mut Self {
        let full = self.base.join(&path);
        self.patch.insert(&full, MutationPatch::Command(command));
        self.len += 1;
        self
    }

    /// Set a value at the specified path.
    #[inline]
    pub fn set(&mut self, path: Path, value: impl Into<Value>) -> &mut Self {
        self.command(path, MutationCommand::set(value))
    }

    /// Merge into the value at the specified path.
    #[inline]
    pub fn merge(&mut self, path: Path, value: impl Into<Value>) -> &mut Self {
        self.command(path, MutationCommand::merge(value))
    }

    /// Delete the value at the specified path.
    #[inline]
    pub fn delete(&mut self, path: Path) -> &mut Self {
        self.command(path, MutationCommand::delete())
    }

    /// Move from one absolute path to another.
    #[inline]
    pub fn move_path(&mut self, from: &Path, to: &Path) -> &mut Self {
        self.command(Path::root(), MutationCommand::move_path(from, to))
    }

    /// Link the node at `path`.
    #[inline]
    pub fn link(&mut self, path: Path, spec: LinkSpec) -> &mut Self {
        self.command(path, MutationCommand::link(spec))
    }

    /// Unlink the node at `path`.
    #[inline]
    pub fn unlink(&mut self, path: Path, spec: LinkSpec) -> &mut Self {
        self.command(path, MutationCommand::unlink(spec))
    }

    /// Check if this writer has recorded anything.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of recorded commands (including overwritten ones).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Consume this writer and build the patch.
    #[inline]
    pub fn build(self) -> MutationPatch {
        self.patch
    }
}

impl Default for PatchWriter {
    fn default() -> Self {
        Self::new()
    }
}
