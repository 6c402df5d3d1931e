//! Parameter names and hash-to-name recovery.
//!
//! Binary parameter archives store only CRC-32 hashes of structure names.
//! [`NameTable`] maps hashes back to strings, seeded with a list of known
//! names and a list of numbered-name templates, and can guess indexed names
//! (`Node_0`, `Node_1`, ...) from their parent's name.

use std::sync::OnceLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use veles_common::crc;

/// Known names shipped with the library, one per line.
const HASHED_NAMES: &str = include_str!("../data/botw_hashed_names.txt");
/// Printf-style numbered name templates, one per line.
const NUMBERED_NAMES: &str = include_str!("../data/botw_numbered_names.txt");

/// Parameter structure name: a thin wrapper over a CRC-32 hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    /// Hash of `param_root`, the key every archive's root list serializes
    /// under.
    pub const ROOT: Name = Name(0xA4F6_CB6C);

    /// Wrap an already-computed hash.
    #[inline]
    pub const fn from_hash(hash: u32) -> Self {
        Name(hash)
    }

    /// The CRC-32 hash of the name.
    #[inline]
    pub const fn hash(self) -> u32 {
        self.0
    }
}

impl From<&str> for Name {
    #[inline]
    fn from(name: &str) -> Self {
        Name(crc::hash_str(name))
    }
}

impl From<u32> for Name {
    #[inline]
    fn from(hash: u32) -> Self {
        Name(hash)
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A table of names used to recover original strings from hashes.
///
/// Guessed names are memoized, so repeated lookups of the same structure are
/// cheap.
#[derive(Debug, Default)]
pub struct NameTable {
    /// Hash to name map for strings with static storage.
    names: FxHashMap<u32, &'static str>,
    /// Hash to name map for strings discovered or added at runtime.
    owned_names: FxHashMap<u32, String>,
    /// Numbered name templates (printf-style `%d` specifiers).
    numbered_names: Vec<&'static str>,
}

impl NameTable {
    /// Create a name table, optionally seeded with the embedded name lists.
    pub fn new(with_botw_strings: bool) -> Self {
        let mut table = Self::default();
        if with_botw_strings {
            for name in HASHED_NAMES.lines().filter(|l| !l.is_empty()) {
                table.names.insert(crc::hash_str(name), name);
            }
            table
                .numbered_names
                .extend(NUMBERED_NAMES.lines().filter(|l| !l.is_empty()));
        }
        table
    }

    /// Add a known name, computing its hash.
    pub fn add_name(&mut self, name: String) -> &str {
        let hash = crc::hash_str(&name);
        self.owned_names.entry(hash).or_insert(name)
    }

    /// Add a known name with static storage, avoiding a copy.
    pub fn add_name_ref(&mut self, name: &'static str) {
        self.names.insert(crc::hash_str(name), name);
    }

    /// Iterate over all statically known names.
    pub fn known_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names.values().copied()
    }

    /// Try to find the name associated with `hash`.
    ///
    /// `index` is the position of the structure in its parent and
    /// `parent_hash` the parent's name hash; both feed the guessing
    /// heuristics for indexed names. Successful guesses are remembered.
    pub fn get_name(&mut self, hash: u32, index: usize, parent_hash: u32) -> Option<&str> {
        if self.names.contains_key(&hash) {
            return self.names.get(&hash).copied();
        }
        if !self.owned_names.contains_key(&hash) {
            let guessed = self.guess(hash, index, parent_hash)?;
            self.owned_names.insert(hash, guessed);
        }
        self.owned_names.get(&hash).map(|s| s.as_str())
    }

    fn guess(&self, hash: u32, index: usize, parent_hash: u32) -> Option<String> {
        // Guess from the parent structure's name if it is known.
        if let Some(parent_name) = self.names.get(&parent_hash).copied() {
            if let Some(found) = test_prefix(parent_name, index, hash) {
                return Some(found);
            }
            // Sometimes the parent name is plural and the child names are
            // singular.
            if let Some(found) = test_prefix("Children", index, hash) {
                return Some(found);
            }
            for suffix in ["s", "es", "List"] {
                if let Some(stem) = parent_name.strip_suffix(suffix) {
                    if let Some(found) = test_prefix(stem, index, hash) {
                        return Some(found);
                    }
                }
            }
        }

        // Last resort: evaluate every numbered template.
        for template in &self.numbered_names {
            for i in 0..index + 2 {
                let Some(candidate) = format_numbered(template, i) else {
                    break;
                };
                if crc::hash_str(&candidate) == hash {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Try the indexed-name formats with the given prefix for `index` and
/// `index + 1`.
fn test_prefix(prefix: &str, index: usize, hash: u32) -> Option<String> {
    for i in [index, index + 1] {
        let candidates = [
            format!("{prefix}{i}"),
            format!("{prefix}_{i}"),
            format!("{prefix}{i:02}"),
            format!("{prefix}_{i:02}"),
            format!("{prefix}{i:03}"),
            format!("{prefix}_{i:03}"),
        ];
        for candidate in candidates {
            if crc::hash_str(&candidate) == hash {
                return Some(candidate);
            }
        }
    }
    None
}

/// Evaluate a printf-style numbered name template (`%d`, `%02d`, ...) at
/// `value`. Returns `None` for templates without a valid specifier.
fn format_numbered(template: &str, value: usize) -> Option<String> {
    let percent = template.find('%')?;
    let rest = &template[percent + 1..];
    let d = rest.find('d')?;
    let spec = &rest[..d];
    if !spec.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let width: usize = if spec.is_empty() { 0 } else { spec.parse().ok()? };
    let mut out = String::with_capacity(template.len() + 8);
    out.push_str(&template[..percent]);
    out.push_str(&format!("{value:0width$}"));
    out.push_str(&rest[d + 1..]);
    Some(out)
}

/// The process-wide default name table, seeded with the embedded name lists
/// on first use.
///
/// The table only ever grows, so readers observe at least the names present
/// when they first acquired the lock.
pub fn default_name_table() -> &'static RwLock<NameTable> {
    static TABLE: OnceLock<RwLock<NameTable>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(NameTable::new(true)))
}
