use crate::errors::{DocsetError, DocsetResult, ErrorKind};

/// A normalized index key specification.
///
/// A spec names one or more key paths, separated by commas and/or
/// whitespace (`"a"`, `"a,b"`, `"a, b"` all normalize the same way). A spec
/// with exactly one path is `simple`; with two or more it is `compound`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySpec {
    normalized: String,
    keys: Vec<String>,
}

impl KeySpec {
    /// Parses and normalizes a key specification.
    pub fn parse(spec: &str) -> DocsetResult<Self> {
        let keys: Vec<String> = spec
            .split([',', ' ', '\t', '\n'])
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect();
        if keys.is_empty() {
            log::error!("Empty index key specification");
            return Err(DocsetError::new(
                "Empty index key specification",
                ErrorKind::InvalidFieldName,
            ));
        }
        Ok(KeySpec {
            normalized: keys.join(","),
            keys,
        })
    }

    /// The canonical spelling, used as the index's registry name.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The individual key paths.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// `true` when the spec names exactly one key path.
    pub fn is_simple(&self) -> bool {
        self.keys.len() == 1
    }
}
