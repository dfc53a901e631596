use rand::Rng;

use crate::models::PublicId;

/// Characters that survive being read aloud or copied by hand: no 0/O, 1/I/L.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub const SUFFIX_LEN: usize = 6;

/// Draws one candidate id. Uniqueness is the caller's problem.
pub fn generate<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> PublicId {
    let mut code = String::with_capacity(prefix.len() + SUFFIX_LEN);
    code.push_str(prefix);
    for _ in 0..SUFFIX_LEN {
        let idx = rng.gen_range(0..ALPHABET.len());
        code.push(char::from(ALPHABET[idx]));
    }
    PublicId::from_trusted(code)
}

/// True when `candidate` could have come out of [`generate`] with `prefix`.
pub fn matches_format(prefix: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(prefix)
        .map(|suffix| suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| ALPHABET.contains(&b)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_ids_use_prefix_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let id = generate("BK", &mut rng);
            assert!(matches_format("BK", id.as_str()), "bad id {}", id);
            assert!(!id.as_str()[2..].contains(['0', 'O', '1', 'I', 'L']));
        }
    }

    #[test]
    fn generated_ids_are_already_normalized() {
        let mut rng = StdRng::seed_from_u64(99);
        let id = generate("BK", &mut rng);
        assert_eq!(PublicId::parse(&id.as_str().to_lowercase()), Some(id));
    }

    #[test]
    fn format_check_rejects_near_misses() {
        assert!(matches_format("BK", "BK7X3M9K"));
        assert!(!matches_format("BK", "BK7X3M9"));
        assert!(!matches_format("BK", "BK7X3M9KA"));
        assert!(!matches_format("BK", "BK7X3M0K"));
        assert!(!matches_format("BK", "XX7X3M9K"));
    }
}
