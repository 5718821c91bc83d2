//! Cache key derivation
//!
//! Format: imgcache:{sha1-hex of "url|width|height"}
//! Metadata sub-key: {key}:meta

use sha1::{Digest, Sha1};

pub const KEY_PREFIX: &str = "imgcache:";
const META_SUFFIX: &str = ":meta";

/// Key of the payload entry for one (url, width, height) triple.
pub fn cache_key(url: &str, width: i64, height: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{url}|{width}|{height}").as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Key of the content-type entry paired with `key`.
pub fn meta_key(key: &str) -> String {
    format!("{key}{META_SUFFIX}")
}
