use crate::{
    access,
    error::StoreResult,
    executor::Execution,
    mutation::link,
    LinkSpec, MutationPatch, Path, Seg,
};
use serde_json::Value;

/// The view an operator gets of the tree being patched.
///
/// Reads see every earlier write of the same patch. Writes record a change
/// at their anchor path, labelled with the operator's name. Methods without
/// a suffix act on the command's own path; `*_at` variants take an absolute
/// path.
pub struct MutationContext<'a> {
    exec: &'a mut Execution,
    path: Path,
    operation: String,
}

impl<'a> MutationContext<'a> {
    pub(crate) fn new(exec: &'a mut Execution, path: Path, operation: &str) -> Self {
        Self {
            exec,
            path,
            operation: operation.to_string(),
        }
    }

    /// The path this command sits at.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the operator being run.
    #[inline]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The whole tree as patched so far.
    #[inline]
    pub fn state(&self) -> &Value {
        &self.exec.state
    }

    /// The value at the command's path.
    #[inline]
    pub fn get(&self) -> Option<&Value> {
        access::get(&self.exec.state, &self.path)
    }

    /// The value at an absolute path.
    #[inline]
    pub fn get_at(&self, path: &Path) -> Option<&Value> {
        access::get(&self.exec.state, path)
    }

    /// The value at the command's path before the patch started.
    #[inline]
    pub fn original(&self) -> Option<&Value> {
        access::get(&self.exec.original, &self.path)
    }

    /// Replace the value at the command's path.
    pub fn set(&mut self, value: Value) -> StoreResult<()> {
        let path = self.path.clone();
        self.set_at(&path, value)
    }

    /// Replace the value at an absolute path.
    pub fn set_at(&mut self, path: &Path, value: Value) -> StoreResult<()> {
        self.exec
            .write(path, &self.operation, |root, p| access::set(root, p, value))
    }

    /// Merge into the value at the command's path.
    pub fn merge(&mut self, value: Value) -> StoreResult<()> {
        let path = self.path.clone();
        self.merge_at(&path, value)
    }

    /// Arrays concatenate, objects merge field by field (one change per
    /// field), anything else is replaced.
    pub fn merge_at(&mut self, path: &Path, value: Value) -> StoreResult<()> {
        match (self.get_at(path), value) {
            (Some(Value::Array(current)), Value::Array(extra)) => {
                let mut merged = current.clone();
                merged.extend(extra);
                self.set_at(path, Value::Array(merged))
            }
            (Some(Value::Object(_)), Value::Object(fields)) => {
                for (key, field) in fields {
                    self.set_at(&path.with_segment(Seg::Key(key)), field)?;
                }
                Ok(())
            }
            (_, value) => self.set_at(path, value),
        }
    }

    /// Remove the value at the command's path.
    pub fn del(&mut self) -> StoreResult<()> {
        let path = self.path.clone();
        self.del_at(&path)
    }

    /// Remove the value at an absolute path. Missing paths are a no-op.
    pub fn del_at(&mut self, path: &Path) -> StoreResult<()> {
        self.exec.write(path, &self.operation, |root, p| {
            access::delete(root, p);
            Ok(())
        })
    }

    /// Move inside the container at the command's path.
    ///
    /// Bare keys or indices reorder an array or rename an object key. Path
    /// arrays and dotted strings move between two absolute paths instead.
    /// A missing source is a no-op.
    pub fn move_item(&mut self, from: &Value, to: &Value) -> StoreResult<()> {
        if is_bare(from) && is_bare(to) {
            return self.move_within(from, to);
        }
        match (Path::from_json(from), Path::from_json(to)) {
            (Some(from), Some(to)) => self.move_path(&from, &to),
            _ => {
                tracing::debug!(path = %self.path, "ignoring move with malformed endpoints");
                Ok(())
            }
        }
    }

    /// Move the value at `from` to `to`, both absolute.
    pub fn move_path(&mut self, from: &Path, to: &Path) -> StoreResult<()> {
        if from.same_as(to) {
            return Ok(());
        }
        let Some(value) = self.get_at(from).cloned() else {
            return Ok(());
        };
        self.del_at(from)?;
        self.set_at(to, value)
    }

    fn move_within(&mut self, from: &Value, to: &Value) -> StoreResult<()> {
        let (Some(from), Some(to)) = (bare_seg(from), bare_seg(to)) else {
            return Ok(());
        };
        let moved = match self.get() {
            Some(Value::Array(items)) => {
                let (Some(from), Some(to)) = (from.array_index(), to.array_index()) else {
                    tracing::debug!(path = %self.path, "ignoring array move with non-index endpoints");
                    return Ok(());
                };
                if from >= items.len() || from == to {
                    return Ok(());
                }
                let mut items = items.clone();
                let item = items.remove(from);
                let to = to.min(items.len());
                items.insert(to, item);
                Value::Array(items)
            }
            Some(Value::Object(fields)) => {
                let (from, to) = (from.object_key(), to.object_key());
                if from == to || !fields.contains_key(from.as_ref()) {
                    return Ok(());
                }
                let mut fields = fields.clone();
                if let Some(value) = fields.shift_remove(from.as_ref()) {
                    fields.insert(to.into_owned(), value);
                }
                Value::Object(fields)
            }
            _ => return Ok(()),
        };
        self.set(moved)
    }

    /// Add graph links for the node at the command's path.
    pub fn link(&mut self, spec: &LinkSpec) -> StoreResult<()> {
        link::link(self, spec)
    }

    /// Remove graph links for the node at the command's path.
    pub fn unlink(&mut self, spec: &LinkSpec) -> StoreResult<()> {
        link::unlink(self, spec)
    }

    /// Apply a sub-patch relative to the command's path.
    pub fn apply(&mut self, patch: &MutationPatch) -> StoreResult<()> {
        let base = self.path.clone();
        self.exec.apply(&base, patch)
    }
}

/// A JSON scalar naming one slot rather than a path.
fn is_bare(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => !s.contains('.'),
        _ => false,
    }
}

fn bare_seg(value: &Value) -> Option<Seg> {
    match value {
        Value::Number(n) => n.as_u64().map(|i| Seg::Index(i as usize)),
        Value::String(s) => Some(Seg::key(s.as_str())),
        _ => None,
    }
}
