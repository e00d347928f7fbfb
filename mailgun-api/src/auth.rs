//! Client authentication (§6): a process-wide set of valid `client_id`
//! strings loaded from a file, one id per line. Mirrors the teacher's
//! bearer-token auth config shape, simplified to the spec's flat
//! id-list scheme (no hashing -- `client_id` itself is the credential).

use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    known: HashSet<String>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(known: HashSet<String>) -> Self {
        Self { known }
    }

    /// Load from the default path, `/conf/clients`.
    pub fn load_default() -> std::io::Result<Self> {
        Self::load("/conf/clients")
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_lines(&contents))
    }

    fn from_lines(contents: &str) -> Self {
        let known = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { known }
    }

    #[must_use]
    pub fn is_known(&self, client_id: &str) -> bool {
        !client_id.trim().is_empty() && self.known.contains(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_id_per_line_and_skips_blanks() {
        let registry = ClientRegistry::from_lines("alice\n\nbob\n  \ncarol\n");
        assert!(registry.is_known("alice"));
        assert!(registry.is_known("bob"));
        assert!(registry.is_known("carol"));
        assert!(!registry.is_known("dave"));
    }

    #[test]
    fn empty_client_id_is_never_known() {
        let registry = ClientRegistry::from_lines("\n");
        assert!(!registry.is_known(""));
    }
}
