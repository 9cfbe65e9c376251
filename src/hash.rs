use crate::error::{Error, Result};

pub type Hash = [u8; 32];

#[must_use]
pub fn hash_bytes(data: &[u8]) -> Hash {
    blake3::hash(data).into()
}

#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

pub fn hex_to_hash(s: &str) -> Result<Hash> {
    let bytes =
        hex::decode(s).map_err(|_| Error::InvalidArgument(format!("invalid object id '{s}'")))?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidArgument(format!("invalid object id '{s}'")))
}

/// Cheap syntactic check used when a revision string could be either a
/// ref name or a hex digest.
#[must_use]
pub fn looks_like_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
