//! Name inventories and the "missing at destination" set.
//!
//! Identity is the full file name, extension included, compared without
//! regard to case. Sizes and contents are not looked at.

use std::collections::HashSet;

use crate::shell::FileEntry;

pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

/// Normalized names present at the destination.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    names: HashSet<String>,
}

impl Inventory {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| normalize_name(n.as_ref())).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Eligible source files absent from `destination`, in source order.
///
/// `on_examined(current, total, entry)` fires once per eligible source file
/// with a 1-based position. A name listed twice in the source only makes it
/// into the result once.
pub fn find_missing<F>(
    source: &[FileEntry],
    destination: &Inventory,
    mut on_examined: F,
) -> Vec<FileEntry>
where
    F: FnMut(usize, usize, &FileEntry),
{
    let eligible: Vec<&FileEntry> = source.iter().filter(|e| e.is_eligible_file()).collect();
    let total = eligible.len();
    let mut seen = HashSet::new();
    let mut missing = Vec::new();

    for (index, entry) in eligible.into_iter().enumerate() {
        on_examined(index + 1, total, entry);
        if destination.contains(&entry.name) {
            continue;
        }
        if seen.insert(normalize_name(&entry.name)) {
            missing.push(entry.clone());
        }
    }
    missing
}
