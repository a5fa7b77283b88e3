use std::sync::{Arc, OnceLock};

/// Reference navigation: at most one related instance, shared with the rest
/// of the loaded graph. The cell is settable once per instance; eager
/// loaders fill it and later duplicate fills are ignored.
pub struct BelongsTo<T> {
    cell: OnceLock<Option<Arc<T>>>,
}

impl<T> Default for BelongsTo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BelongsTo<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Whether an eager load has resolved this navigation (possibly to null).
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The target, when loaded and present.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get().and_then(|v| v.as_ref())
    }

    /// Loaded state: `None` until loaded, then `Some(target-or-null)`.
    pub fn value(&self) -> Option<&Option<Arc<T>>> {
        self.cell.get()
    }

    /// Fill the navigation. Returns false when it was already loaded.
    pub fn set(&self, target: Option<Arc<T>>) -> bool {
        self.cell.set(target).is_ok()
    }
}

impl<T> Clone for BelongsTo<T> {
    fn clone(&self) -> Self {
        let clone = Self::new();
        if let Some(v) = self.cell.get() {
            let _ = clone.cell.set(v.clone());
        }
        clone
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BelongsTo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell.get() {
            Some(v) => f.debug_tuple("BelongsTo").field(v).finish(),
            None => f.write_str("BelongsTo(<not loaded>)"),
        }
    }
}

impl<T: PartialEq> PartialEq for BelongsTo<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.get() == other.cell.get()
    }
}

/// Collection navigation: the many side of a one-to-many relationship.
/// Same once-settable discipline as [`BelongsTo`].
pub struct HasMany<T> {
    cell: OnceLock<Vec<Arc<T>>>,
}

impl<T> Default for HasMany<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HasMany<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The loaded items, `None` until an eager load resolved them.
    pub fn get(&self) -> Option<&[Arc<T>]> {
        self.cell.get().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.cell.get().into_iter().flatten()
    }

    /// Fill the navigation. Returns false when it was already loaded.
    pub fn set(&self, items: Vec<Arc<T>>) -> bool {
        self.cell.set(items).is_ok()
    }
}

impl<T> Clone for HasMany<T> {
    fn clone(&self) -> Self {
        let clone = Self::new();
        if let Some(v) = self.cell.get() {
            let _ = clone.cell.set(v.clone());
        }
        clone
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for HasMany<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell.get() {
            Some(v) => f.debug_tuple("HasMany").field(v).finish(),
            None => f.write_str("HasMany(<not loaded>)"),
        }
    }
}

impl<T: PartialEq> PartialEq for HasMany<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.get() == other.cell.get()
    }
}
