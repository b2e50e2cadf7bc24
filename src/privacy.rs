// Fan identifier hashing — HMAC-SHA256 with a per-agency secret salt.
//
// External fan identifiers from platform exports are hashed before they
// touch the store. The raw identifier never appears in the database, in
// logs, or in any result object.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hash an external fan identifier with the agency's secret salt.
///
/// Returns a lowercase hex digest. The same (salt, id) pair always produces
/// the same hash, so repeated imports dedupe naturally.
pub fn hash_external_id(salt: &str, external_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(external_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_external_id("agency-salt", "fan-12345");
        let b = hash_external_id("agency-salt", "fan-12345");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA-256 hex
    }

    #[test]
    fn different_salts_produce_different_hashes() {
        let a = hash_external_id("agency-a", "fan-12345");
        let b = hash_external_id("agency-b", "fan-12345");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_does_not_contain_raw_id() {
        let h = hash_external_id("salt", "veryrecognizableid");
        assert!(!h.contains("veryrecognizableid"));
    }
}
