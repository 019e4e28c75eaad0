//! String hashing used for stable signature and property IDs.
//!
//! Spec §1 treats the actual hash primitive as an external collaborator
//! ("a non-cryptographic 64-bit string hash built from two 32-bit mixes"):
//! the core only needs *some* stable, deterministic 64-bit hash of a
//! canonical string, not a specific algorithm. This module supplies a
//! minimal implementation of that interface so IDs are reproducible across
//! compiles of the same source, without claiming any particular provenance
//! for the mixing constants.

/// Mix a 32-bit lane using the finalizer from Murmur3's 32-bit hash.
fn mix32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x85eb_ca6b);
    x ^= x >> 13;
    x = x.wrapping_mul(0xc2b2_ae35);
    x ^= x >> 16;
    x
}

/// Hash a string to a stable 64-bit value by running two differently-seeded
/// 32-bit mixes over the UTF-8 bytes and packing the results into one u64.
pub fn hash64(s: &str) -> u64 {
    let bytes = s.as_bytes();
    let mut lo: u32 = 0x811c_9dc5;
    let mut hi: u32 = 0x9e37_79b9;
    for &b in bytes {
        lo = lo.wrapping_add(b as u32).wrapping_mul(0x0100_0193);
        hi = (hi ^ (b as u32)).wrapping_mul(0x0100_01b3).rotate_left(5);
    }
    let lo = mix32(lo);
    let hi = mix32(hi ^ (bytes.len() as u32));
    ((hi as u64) << 32) | (lo as u64)
}

/// Stable ID for a variable at a given lexical (scope-stack) depth: spec §3
/// describes root-frame variable IDs as "hash(folded_name) + stackDepth".
/// Depth is 1 at the outermost scope, incrementing with each nested scope
/// or function frame, so the same name at a different nesting level never
/// collides with an outer binding of the same name.
pub fn variable_id(folded_name: &str, depth: u32) -> u64 {
    hash64(folded_name).wrapping_add(depth as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash64("hello world"), hash64("hello world"));
    }

    #[test]
    fn sensitive_to_content() {
        assert_ne!(hash64("abc"), hash64("abd"));
    }

    #[test]
    fn empty_string_hashes() {
        let _ = hash64("");
    }

    #[test]
    fn variable_id_separates_depth() {
        assert_ne!(variable_id("x", 1), variable_id("x", 2));
        assert_eq!(variable_id("x", 1), variable_id("x", 1));
    }
}
