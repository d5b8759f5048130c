use serde::{de::DeserializeOwned, Serialize};

/// A row type that lives in one backend table and is keyed by a stable id.
///
/// The id doubles as list key and dedup key in every cached list.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> &str;
}

/// Appends `incoming` to `items`, skipping any record whose id is already
/// present (including duplicates inside `incoming`). Returns how many were
/// appended.
pub fn append_unique<T: Record>(items: &mut Vec<T>, incoming: Vec<T>) -> usize {
    let mut seen: std::collections::HashSet<String> =
        items.iter().map(|item| item.id().to_owned()).collect();
    let before = items.len();

    for item in incoming {
        if seen.insert(item.id().to_owned()) {
            items.push(item);
        }
    }

    items.len() - before
}
