//! Cell name parsing, validation, and normalization.
//!
//! A cell name is a letters-then-digits identifier (`A1`, `BC27`, ...). The
//! shape is fixed by the engine and checked with a compiled `regex::Regex`;
//! what counts as *valid* and how a name is *normalized* (typically
//! uppercasing) are left to the caller.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::EngineError;

fn shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z]+[0-9]+$").expect("cell name shape regex must compile")
    })
}

/// Caller-supplied validity and normalization policy for cell names.
///
/// `normalize` is applied first (it is the thing that decides canonical
/// casing/form), then `is_valid` is checked against the normalized result —
/// this is what lets a formula's variable tokens and a freshly typed cell
/// name share one validation path.
pub trait NameRules: Send + Sync {
    /// Returns true if `normalized` (already shape-checked and normalized)
    /// is an acceptable cell name under this policy (e.g. within sheet
    /// bounds).
    fn is_valid(&self, normalized: &str) -> bool;

    /// Canonicalize a shape-checked raw name, e.g. uppercasing it.
    fn normalize(&self, raw: &str) -> String;
}

/// The default policy: uppercase, no additional bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNameRules;

impl NameRules for DefaultNameRules {
    fn is_valid(&self, _normalized: &str) -> bool {
        true
    }

    fn normalize(&self, raw: &str) -> String {
        raw.to_ascii_uppercase()
    }
}

/// A validated, normalized cell name. All `CellStore`/`DependencyGraph` keys
/// are `CellName`s; construction is the only place shape/validity/
/// normalization are enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellName(String);

impl CellName {
    /// Parse and validate a raw name against `rules`.
    ///
    /// Order: shape check, then normalize, then validity check on the
    /// normalized form (so `rules.is_valid` never has to re-derive the
    /// canonical casing itself).
    pub fn parse(raw: &str, rules: &dyn NameRules) -> Result<CellName, EngineError> {
        if !shape_re().is_match(raw) {
            return Err(EngineError::InvalidName(raw.to_string()));
        }
        let normalized = rules.normalize(raw);
        if !shape_re().is_match(&normalized) {
            return Err(EngineError::InvalidName(raw.to_string()));
        }
        if !rules.is_valid(&normalized) {
            return Err(EngineError::InvalidName(raw.to_string()));
        }
        Ok(CellName(normalized))
    }

    /// Construct from an already-normalized, already-validated string.
    /// Used internally once a name has passed `parse` once (e.g. when
    /// re-hydrating from storage) to avoid re-running the caller's policy.
    pub(crate) fn from_normalized(normalized: String) -> CellName {
        debug_assert!(shape_re().is_match(&normalized));
        CellName(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CellName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
