use bib_types::{now_ms, Metadata};

use crate::hasher::{char_length, quick_hash, record_hash};

/// Derives [`Metadata`] from a serialized record.
///
/// Pure apart from the ingest timestamp: no I/O and no failure modes.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataGenerator;

impl MetadataGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Fingerprint `serialized`, stamping the current wall-clock time.
    pub fn generate(&self, guid: &str, serialized: &str) -> Metadata {
        self.generate_at(guid, serialized, now_ms())
    }

    /// Fingerprint `serialized` with a caller-supplied ingest time.
    ///
    /// An empty serialization is fingerprinted as `{}`.
    pub fn generate_at(&self, guid: &str, serialized: &str, ingest: i64) -> Metadata {
        let body = if serialized.is_empty() { "{}" } else { serialized };
        Metadata {
            guid: guid.to_string(),
            length: char_length(body),
            qhash: quick_hash(body),
            md5: record_hash(body),
            ingest,
            deleted: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_known_metadata() {
        let meta = MetadataGenerator::new().generate_at("A", r#"{"Name":"Alice","Age":41}"#, 7);
        assert_eq!(meta.guid, "A");
        assert_eq!(meta.length, 25);
        assert_eq!(meta.qhash, "HSH-1024085287");
        assert_eq!(meta.md5, "461d65fea865254459a3c57f2f554ccf");
        assert_eq!(meta.ingest, 7);
        assert!(meta.deleted.is_none());
    }

    #[test]
    fn empty_input_is_treated_as_empty_object() {
        let generator = MetadataGenerator::new();
        let empty = generator.generate_at("G", "", 1);
        let braces = generator.generate_at("G", "{}", 1);
        assert_eq!(empty, braces);
        assert_eq!(empty.length, 2);
    }

    #[test]
    fn equal_input_yields_equal_fingerprint() {
        let generator = MetadataGenerator::new();
        let a = generator.generate("G", r#"{"x":1}"#);
        let b = generator.generate("G", r#"{"x":1}"#);
        assert_eq!(a.changed_field(&b), None);
        assert!(b.ingest >= a.ingest);
    }

    #[test]
    fn different_input_yields_different_fingerprint() {
        let generator = MetadataGenerator::new();
        let a = generator.generate_at("G", r#"{"x":1}"#, 0);
        let b = generator.generate_at("G", r#"{"x":2}"#, 0);
        assert!(a.changed_field(&b).is_some());
    }
}
