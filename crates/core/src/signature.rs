//! Function signatures and property names (spec §3).
//!
//! A signature is a sequence of *parts*: name parts (one or more alternative
//! spellings, optionally optional) and parameter slots (optionally typed,
//! optionally named). Its stable ID is either a random 64-bit value (local
//! visibility) or a hash of a canonical string built from the library name
//! and the parts, matching spec §3 exactly.

use rand::RngCore;

use crate::casefold::fold_str;
use crate::hash::hash64;
use crate::value::ValueType;

/// Where a function or property may be called from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
    /// Function-internal; gets a random ID instead of a hashed one.
    Local,
}

/// One name-part alternative, already case-folded for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePart {
    pub alternatives: Vec<String>,
    pub optional: bool,
}

impl NamePart {
    pub fn new(alternatives: Vec<String>, optional: bool) -> Self {
        NamePart {
            alternatives: alternatives.iter().map(|s| fold_str(s)).collect(),
            optional,
        }
    }

    pub fn matches(&self, folded_token: &str) -> bool {
        self.alternatives.iter().any(|a| a == folded_token)
    }

    /// Canonical text for hashing: alternates joined by `/`, concatenated.
    fn canonical(&self) -> String {
        self.alternatives.join("/")
    }
}

/// A parameter slot, optionally constrained to a `ValueType` and optionally
/// named for use inside the function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub param_type: Option<ValueType>,
    pub name: Option<String>,
}

impl ParamSlot {
    fn canonical(&self) -> String {
        match self.param_type {
            Some(t) => format!("{{{t}}}"),
            None => "{}".to_string(),
        }
    }
}

/// One element of a signature's part list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignaturePart {
    Name(NamePart),
    Param(ParamSlot),
}

/// A complete, validated function signature (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub library: String,
    pub visibility: Visibility,
    pub parts: Vec<SignaturePart>,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    NoNonOptionalNamePart,
    AdjacentParamSlots,
    SeparatorAllOptional,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            SignatureError::NoNonOptionalNamePart => {
                "a signature must have at least one non-optional name part"
            }
            SignatureError::AdjacentParamSlots => {
                "parameter slots cannot be adjacent with no name part between them"
            }
            SignatureError::SeparatorAllOptional => {
                "a name part separating two parameter slots must have at least one non-optional alternative"
            }
        };
        f.write_str(msg)
    }
}

impl FunctionSignature {
    /// Build and validate a signature, computing its stable ID per spec §3.
    pub fn new(
        library: &str,
        visibility: Visibility,
        parts: Vec<SignaturePart>,
    ) -> Result<Self, SignatureError> {
        Self::validate(&parts)?;
        let id = match visibility {
            Visibility::Local => random_id(),
            _ => hash64(&canonical_signature_text(library, &parts)),
        };
        Ok(FunctionSignature {
            library: library.to_string(),
            visibility,
            parts,
            id,
        })
    }

    fn validate(parts: &[SignaturePart]) -> Result<(), SignatureError> {
        let has_non_optional_name = parts.iter().any(|p| match p {
            SignaturePart::Name(n) => !n.optional,
            _ => false,
        });
        if !has_non_optional_name {
            return Err(SignatureError::NoNonOptionalNamePart);
        }
        for window in parts.windows(2) {
            if let [SignaturePart::Param(_), SignaturePart::Param(_)] = window {
                return Err(SignatureError::AdjacentParamSlots);
            }
        }
        for window in parts.windows(3) {
            if let [SignaturePart::Param(_), SignaturePart::Name(n), SignaturePart::Param(_)] =
                window
            {
                if n.optional || n.alternatives.is_empty() {
                    return Err(SignatureError::SeparatorAllOptional);
                }
            }
        }
        Ok(())
    }

    pub fn param_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, SignaturePart::Param(_)))
            .count()
    }
}

/// The same stable ID a `Public`/`Private` `FunctionSignature::new` would
/// compute for `library`/`parts`, without needing to build (and validate) a
/// whole signature first. Used by `Script::find_function`, which is handed
/// only a library name and a signature string and needs the ID a prior
/// `register_function`/script-defined `function` call would already have
/// produced for the same text.
pub fn lookup_id(library: &str, parts: &[SignaturePart]) -> u64 {
    hash64(&canonical_signature_text(library, parts))
}

fn canonical_signature_text(library: &str, parts: &[SignaturePart]) -> String {
    let mut out = String::new();
    out.push_str(library);
    for part in parts {
        out.push(' ');
        match part {
            SignaturePart::Name(n) => out.push_str(&n.canonical()),
            SignaturePart::Param(p) => out.push_str(&p.canonical()),
        }
    }
    out
}

fn random_id() -> u64 {
    rand::thread_rng().next_u64()
}

/// A (visibility, read-only?, library-qualified name, default value) tuple
/// (spec §3). The default `Value` lives in `jinx-core::value` but is kept
/// generic here via the caller supplying it at registration time, to avoid
/// this module importing `Value` just for a default payload nobody compares
/// structurally at the signature level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyName {
    pub library: String,
    pub name: String,
    pub visibility: Visibility,
    pub read_only: bool,
    pub id: u64,
    /// Number of whitespace-separated words in `name`, precomputed for
    /// parser lookahead.
    pub part_count: usize,
}

impl PropertyName {
    pub fn new(library: &str, name: &str, visibility: Visibility, read_only: bool) -> Self {
        let id = hash64(&format!("{library} {name}"));
        let part_count = name.split_whitespace().count();
        PropertyName {
            library: library.to_string(),
            name: name.to_string(),
            visibility,
            read_only,
            id,
            part_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(alts: &[&str], optional: bool) -> SignaturePart {
        SignaturePart::Name(NamePart::new(
            alts.iter().map(|s| s.to_string()).collect(),
            optional,
        ))
    }

    fn param(ty: Option<ValueType>) -> SignaturePart {
        SignaturePart::Param(ParamSlot {
            param_type: ty,
            name: None,
        })
    }

    #[test]
    fn same_text_same_id_across_compiles() {
        let a = FunctionSignature::new(
            "math",
            Visibility::Public,
            vec![name(&["add"], false), param(None), name(&["to"], false), param(None)],
        )
        .unwrap();
        let b = FunctionSignature::new(
            "math",
            Visibility::Public,
            vec![name(&["add"], false), param(None), name(&["to"], false), param(None)],
        )
        .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn local_signatures_get_distinct_random_ids() {
        let a = FunctionSignature::new("math", Visibility::Local, vec![name(&["helper"], false)])
            .unwrap();
        let b = FunctionSignature::new("math", Visibility::Local, vec![name(&["helper"], false)])
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn rejects_signature_with_no_required_name_part() {
        let err = FunctionSignature::new(
            "math",
            Visibility::Public,
            vec![name(&["maybe"], true), param(None)],
        )
        .unwrap_err();
        assert_eq!(err, SignatureError::NoNonOptionalNamePart);
    }

    #[test]
    fn rejects_adjacent_param_slots() {
        let err = FunctionSignature::new(
            "math",
            Visibility::Public,
            vec![name(&["call"], false), param(None), param(None)],
        )
        .unwrap_err();
        assert_eq!(err, SignatureError::AdjacentParamSlots);
    }

    #[test]
    fn rejects_all_optional_separator_between_params() {
        let err = FunctionSignature::new(
            "math",
            Visibility::Public,
            vec![
                name(&["call"], false),
                param(None),
                name(&["maybe"], true),
                param(None),
            ],
        )
        .unwrap_err();
        assert_eq!(err, SignatureError::SeparatorAllOptional);
    }

    #[test]
    fn property_id_hashes_library_and_name() {
        let p = PropertyName::new("math", "pi value", Visibility::Public, true);
        assert_eq!(p.part_count, 2);
        assert_eq!(p.id, hash64("math pi value"));
    }
}
