//! Password hashes and random tokens.
//!
//! Hashes are stored as `sha256$<rounds>$<salt>$<digest>`: the salt is 16
//! random bytes in hex and the digest is SHA-256 iterated `rounds` times over
//! `salt || password`.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";

/// Iterations applied by [`make`].
pub const ROUNDS: u32 = 10_000;

const SALT_LEN: usize = 16;

/// Hashes `password` with a fresh salt.
///
/// # Examples
///
/// ```
/// use captacion::security::hash;
///
/// let stored = hash::make("secreto");
/// assert!(hash::check("secreto", &stored));
/// assert!(!hash::check("otro", &stored));
/// ```
pub fn make(password: &str) -> String {
    make_with(password, ROUNDS)
}

fn make_with(password: &str, rounds: u32) -> String {
    let salt = token(SALT_LEN);
    let digest = digest(password, &salt, rounds);
    format!("{SCHEME}${rounds}${salt}${digest}")
}

/// `true` if `password` produces the stored hash. Malformed hashes never match.
pub fn check(password: &str, stored: &str) -> bool {
    let Some((rounds, salt, expected)) = parse(stored) else {
        return false;
    };
    constant_time_eq(digest(password, salt, rounds).as_bytes(), expected.as_bytes())
}

/// `true` if `stored` was made with other parameters than [`make`] uses now.
pub fn needs_rehash(stored: &str) -> bool {
    parse(stored).is_none_or(|(rounds, _, _)| rounds != ROUNDS)
}

/// `len` random bytes, hex encoded.
pub fn token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn parse(stored: &str) -> Option<(u32, &str, &str)> {
    let mut parts = stored.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let rounds = parts.next()?.parse::<u32>().ok().filter(|r| *r > 0)?;
    let salt = parts.next()?;
    let digest = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((rounds, salt, digest))
}

fn digest(password: &str, salt: &str, rounds: u32) -> String {
    let mut out = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..rounds {
        out = Sha256::digest(out);
    }
    hex::encode(out)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_gets_different_salts() {
        let a = make("clave");
        let b = make("clave");
        assert_ne!(a, b);
        assert!(check("clave", &a));
        assert!(check("clave", &b));
    }

    #[test]
    fn format_has_four_parts() {
        let stored = make_with("x", 3);
        let parts: Vec<&str> = stored.split('$').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "sha256");
        assert_eq!(parts[1], "3");
        assert_eq!(parts[2].len(), SALT_LEN * 2);
        assert_eq!(parts[3].len(), 64);
    }

    #[test]
    fn malformed_hashes_never_match() {
        for stored in ["", "clave", "md5$1$aa$bb", "sha256$0$aa$bb", "sha256$x$aa$bb", "sha256$1$aa$bb$cc"] {
            assert!(!check("clave", stored), "{stored}");
            assert!(needs_rehash(stored), "{stored}");
        }
    }

    #[test]
    fn rehash_when_rounds_change() {
        assert!(needs_rehash(&make_with("x", 5)));
        assert!(!needs_rehash(&make("x")));
    }

    #[test]
    fn tokens_are_hex_of_requested_length() {
        let t = token(32);
        assert_eq!(t.len(), 64);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(t, token(32));
    }
}
