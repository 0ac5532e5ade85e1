/// Hash an ordered sequence of `(key, value)` string pairs.
///
/// Each field is length-prefixed so that `("ab", "c")` and `("a", "bc")` never
/// collide. Callers are responsible for iterating in a stable order.
#[must_use]
pub fn blake3_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = blake3::Hasher::new();
    for (key, value) in pairs {
        hasher.update(&(key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_are_length_prefixed() {
        let a = blake3_pairs([("ab", "c")]);
        let b = blake3_pairs([("a", "bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_pairs_stable() {
        let first = blake3_pairs([("A.sol", "contract A {}"), ("B.sol", "contract B {}")]);
        let second = blake3_pairs([("A.sol", "contract A {}"), ("B.sol", "contract B {}")]);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }
}
