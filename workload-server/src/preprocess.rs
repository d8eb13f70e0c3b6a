use sha2::{Digest, Sha256};

/// Number of SHA-256 applications, the first over the input and the rest over the previous hex digest.
pub const HASH_ROUNDS: usize = 1000;

/// Length of the returned digest prefix, in hex characters.
pub const PREPROCESSED_LEN: usize = 16;

/// Derive a short digest from `data` by hashing it repeatedly.
///
/// Pure and deterministic: the same input always yields the same 16 lowercase hex characters.
/// The repeated hashing has no meaning beyond occupying a core for a reproducible amount of time.
pub fn preprocess(data: &str) -> String {
    let mut digest = hex::encode(Sha256::digest(data.as_bytes()));
    for _ in 1..HASH_ROUNDS {
        digest = hex::encode(Sha256::digest(digest.as_bytes()));
    }

    digest.truncate(PREPROCESSED_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_lower_hex(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    #[test]
    fn is_deterministic() {
        for input in ["hello", "x", "", "a much longer payload with spaces and ünïcode"] {
            assert_eq!(preprocess(input), preprocess(input));
        }
    }

    #[test]
    fn output_is_sixteen_lowercase_hex_chars() {
        for input in ["hello", "x", "", "{\"nested\": \"json\"}"] {
            let output = preprocess(input);
            assert_eq!(output.len(), PREPROCESSED_LEN);
            assert!(is_lower_hex(&output), "not lowercase hex: {output}");
        }
    }

    #[test]
    fn differs_between_inputs() {
        assert_ne!(preprocess("hello"), preprocess("hellp"));
    }

    #[test]
    fn applies_every_round() {
        let mut expected = "hello".to_owned();
        for _ in 0..HASH_ROUNDS {
            expected = hex::encode(Sha256::digest(expected.as_bytes()));
        }

        assert_eq!(preprocess("hello"), expected[..PREPROCESSED_LEN]);
    }
}
