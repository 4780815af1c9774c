//! SHA-256 content hashing and SHA-1 referrer fingerprints for the CAS.

use std::io::{self, Read};
use std::path::Path;

use base64::Engine;
use sha2::{Digest, Sha256};

/// Hash a file's contents with SHA-256, returning lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash raw bytes with SHA-256, returning lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Base64 (URL-safe alphabet, `+`/`-` as the last two characters) of the
/// SHA-1 of a referrer path string. Used to name GC-root symlinks.
pub fn referrer_fingerprint(path: &Path) -> String {
    let digest = sha1::Sha1::digest(path.to_string_lossy().as_bytes());
    let engine = base64::engine::general_purpose::GeneralPurpose::new(
        &base64::alphabet::Alphabet::new(
            "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+-",
        )
        .expect("valid base64 alphabet"),
        base64::engine::general_purpose::NO_PAD,
    );
    engine.encode(digest)
}

/// A content address is valid iff it is exactly 64 lowercase hex characters.
pub fn is_valid_address(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            write!(out, "{b:02x}").expect("write to String cannot fail");
        }
        out
    }
}
