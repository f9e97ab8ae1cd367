//! Entity-name derivation from table names.
//!
//! The entity name labels lifecycle events. It is a
//! naming convention only: irregular plurals (`quizzes` -> `quizze`) are not
//! handled.

/// Strips the host and product prefixes, then one trailing `s`.
pub fn entity_name(table: &str, table_prefix: &str, namespace_prefix: &str) -> String {
    let bare = table.strip_prefix(table_prefix).unwrap_or(table);
    let bare = bare.strip_prefix(namespace_prefix).unwrap_or(bare);
    bare.strip_suffix('s').unwrap_or(bare).to_string()
}

/// FNV-1a digest used to build fixed-width cache keys from arbitrary values.
pub(crate) fn fnv1a_hex(input: &str) -> String {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = input.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    });
    format!("{hash:016x}")
}
