use bib_types::Record;

/// Overlay `partial` onto `current`.
///
/// Keys in `partial` replace the same key in `current` and keep its
/// position; keys only in `current` survive; keys only in `partial` are
/// appended in their own order.
pub fn shallow_merge(mut current: Record, partial: &Record) -> Record {
    for (key, value) in partial {
        current.insert(key.clone(), value.clone());
    }
    current
}
