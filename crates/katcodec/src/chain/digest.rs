use md5::{Digest, Md5};
use ring::digest as sha;

use crate::error::DecodeError;

const UPPER: &[u8; 16] = b"0123456789ABCDEF";
const LOWER: &[u8; 16] = b"0123456789abcdef";

#[inline]
pub(crate) fn upper_nibble(n: u8) -> u8 {
    UPPER[usize::from(n & 0xF)]
}

#[inline]
pub(crate) fn lower_nibble(n: u8) -> u8 {
    LOWER[usize::from(n & 0xF)]
}

/// Hashes `bytes` with the named algorithm. Names are matched
/// case-insensitively, with or without the dash (`SHA-256` / `sha256`).
pub(crate) fn digest(bytes: &[u8], algorithm: &str) -> Result<Vec<u8>, DecodeError> {
    let name: String = algorithm
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let sha = match name.as_str() {
        "MD5" => return Ok(Md5::digest(bytes).to_vec()),
        "SHA1" => &sha::SHA1_FOR_LEGACY_USE_ONLY,
        "SHA256" => &sha::SHA256,
        "SHA384" => &sha::SHA384,
        "SHA512" => &sha::SHA512,
        _ => return Err(DecodeError::UnsupportedAlgorithm(algorithm.to_owned())),
    };
    Ok(sha::digest(sha, bytes).as_ref().to_vec())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("MD5", "", "d41d8cd98f00b204e9800998ecf8427e")]
    #[case("md5", "User{i:id(1)s:name(kraity)}", "d04f45fd1805ea7a98821bdad6894cb4")]
    #[case("SHA1", "User{i:id(1)s:name(kraity)}", "21707be3777f237901b7edcdd73dc8288a81a4d2")]
    #[case(
        "SHA-256",
        "",
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    )]
    fn known_digests(#[case] algorithm: &str, #[case] input: &str, #[case] expected: &str) {
        let out = digest(input.as_bytes(), algorithm).unwrap();
        assert_eq!(hex::encode(out), expected);
    }

    #[test]
    fn unknown_algorithm() {
        assert!(matches!(
            digest(b"", "crc32"),
            Err(DecodeError::UnsupportedAlgorithm(name)) if name == "crc32"
        ));
    }
}
