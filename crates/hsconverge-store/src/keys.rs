//! Key encoding utilities for `RocksDB`.
//!
//! Records are filed in their kind's column family under the UTF-8 bytes of
//! the local name, so iteration order is the byte order of names.

use hsconverge_core::ResourceAddress;

/// Encode the key of a record within its column family.
#[must_use]
pub fn record_key(address: &ResourceAddress) -> Vec<u8> {
    address.name.as_bytes().to_vec()
}

/// Decode a local name from a record key.
///
/// Returns `None` if the key is not valid UTF-8.
#[must_use]
pub fn name_from_key(key: &[u8]) -> Option<String> {
    std::str::from_utf8(key).ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsconverge_core::ResourceKind;

    #[test]
    fn key_is_the_name() {
        let address = ResourceAddress::new(ResourceKind::User, "alice");
        let key = record_key(&address);
        assert_eq!(key, b"alice");
        assert_eq!(name_from_key(&key).as_deref(), Some("alice"));
    }

    #[test]
    fn non_utf8_key_is_rejected() {
        assert!(name_from_key(&[0xff, 0xfe]).is_none());
    }
}
