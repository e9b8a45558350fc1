// Licensed under the Apache-2.0 license

//! Name and attribute lookup over a parsed index.

use crate::{Attributes, OsiiEntry, OsipIndex};

impl OsipIndex {
    /// Position of the used entry whose name is exactly `name`.
    pub fn resolve_by_name(&self, name: &str) -> Option<usize> {
        self.used_entries()
            .find(|(_, entry)| entry.name() == name.as_bytes())
            .map(|(index, _)| index)
    }

    /// Lowest position of a used entry sharing at least one bit with `mask`.
    pub fn resolve_by_attribute(&self, mask: Attributes) -> Option<usize> {
        self.used_entries()
            .find(|(_, entry)| entry.attributes().intersects(mask))
            .map(|(index, _)| index)
    }

    fn used_entries(&self) -> impl Iterator<Item = (usize, &OsiiEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.is_unused())
    }
}
