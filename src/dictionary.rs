
// imports
use crate::error::ConfigError;
use crate::tokenizer::{TokenId, RESERVED_TOKEN_CLASSES};

use std::collections::HashMap;
use rayon::prelude::*;


/// A dictionary entry after optimization.
///
/// `fast_return` is set when no longer vocabulary string starts with this one,
/// so a match on it can never be extended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptimizedEntry {
    pub id: TokenId,
    pub fast_return: bool,
}

#[derive(Clone, Debug, Default)]
pub struct OptimizedDictionary {
    entries: HashMap<String, OptimizedEntry>,
}

impl OptimizedDictionary {

    pub fn optimize(vocab: &HashMap<String, TokenId>) -> OptimizedDictionary {

        // every entry scans the full key list once, this runs a single time
        // before tokenization so the quadratic cost is acceptable.
        let keys: Vec<&str> = vocab.keys().map(String::as_str).collect();

        let entries = vocab
        .par_iter()
        .map(|(token, id)| {
            let fast_return = !keys.iter().any(|other| {
                other.len() > token.len() && other.starts_with(token.as_str())
            });
            (token.to_owned(), OptimizedEntry { id: *id, fast_return })
        })
        .collect::<HashMap<String, OptimizedEntry>>();

        Self { entries }
    }

    pub fn get(&self, token: &str) -> Option<&OptimizedEntry> {
        self.entries.get(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest vocabulary string, in characters.
    pub fn max_token_len(&self) -> usize {
        self.entries.keys().map(|k| k.chars().count()).max().unwrap_or(0)
    }

    pub fn max_id(&self) -> Option<TokenId> {
        self.entries.values().map(|e| e.id).max()
    }

    /// Size of the token id space: every vocabulary id shifted above the
    /// reserved range, plus one.
    pub fn token_classes(&self) -> Result<usize, ConfigError> {

        let max_id = self.max_id().ok_or(ConfigError::EmptyDictionary)?;
        if max_id.checked_add(RESERVED_TOKEN_CLASSES).is_none() {
            return Err(ConfigError::VocabularyOverflow { max_id, reserved: RESERVED_TOKEN_CLASSES });
        }
        Ok(max_id as usize + RESERVED_TOKEN_CLASSES as usize + 1)
    }
}


#[cfg(test)]
mod tests {

    use std::collections::HashMap;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use super::OptimizedDictionary;
    use crate::error::ConfigError;

    fn vocab(pairs: &[(&str, u16)]) -> HashMap<String, u16> {
        pairs.iter().map(|(t, i)| (t.to_string(), *i)).collect()
    }

    #[test]
    fn fast_return_marks_non_prefixes() {

        let dict = OptimizedDictionary::optimize(&vocab(&[("a", 1), ("ab", 2), ("abc", 3), ("b", 4)]));

        assert!(!dict.get("a").unwrap().fast_return);
        assert!(!dict.get("ab").unwrap().fast_return);
        assert!(dict.get("abc").unwrap().fast_return);
        assert!(dict.get("b").unwrap().fast_return);
        assert_eq!(dict.get("ab").unwrap().id, 2);
    }

    #[test]
    fn empty_vocabulary_gives_empty_dictionary() {

        let dict = OptimizedDictionary::optimize(&HashMap::new());
        assert!(dict.is_empty());
        assert_eq!(dict.max_token_len(), 0);
        assert!(matches!(dict.token_classes(), Err(ConfigError::EmptyDictionary)));
    }

    #[test]
    fn statistics_follow_vocabulary() {

        // max length is measured in characters, not bytes
        let dict = OptimizedDictionary::optimize(&vocab(&[("cat", 0), ("sat", 1), ("on", 2), ("éé", 7)]));
        assert_eq!(dict.max_token_len(), 3);
        assert_eq!(dict.max_id(), Some(7));
        assert_eq!(dict.token_classes().unwrap(), 7 + 4 + 1);

        let overflow = OptimizedDictionary::optimize(&vocab(&[("x", u16::MAX - 2)]));
        assert!(matches!(overflow.token_classes(), Err(ConfigError::VocabularyOverflow { .. })));
    }

    #[test]
    fn fast_return_matches_brute_force_on_random_sets() {

        // small alphabet so that prefix relations are frequent
        let mut rng = StdRng::seed_from_u64(17);
        let alphabet = ['a', 'b', 'c'];

        for _round in 0..50 {

            let mut vocab: HashMap<String, u16> = HashMap::new();
            for id in 0..rng.gen_range(1..40u16) {
                let len = rng.gen_range(1..6);
                let token: String = (0..len).map(|_| alphabet[rng.gen_range(0..alphabet.len())]).collect();
                vocab.entry(token).or_insert(id);
            }

            let dict = OptimizedDictionary::optimize(&vocab);
            assert_eq!(dict.len(), vocab.len());

            for (s, id) in &vocab {
                let extendable = vocab.keys().any(|s2| s2.len() > s.len() && s2.starts_with(s.as_str()));
                let entry = dict.get(s).unwrap();
                assert_eq!(entry.fast_return, !extendable, "token {}", s);
                assert_eq!(entry.id, *id);
            }
        }
    }

}
