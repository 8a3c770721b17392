//! Deterministic Option Shuffling
//!
//! Produces a per-(participant, question) stable permutation of answer
//! options. The server and every client recompute the same ordering
//! independently, so option letters stay positional without the server
//! ever transmitting per-participant orderings.
//!
//! # Determinism Guarantee
//!
//! Given the same `(options, user_id, question_id)` triple, the shuffle
//! produces the exact same permutation on every call and every host.
//! The generator is not cryptographically strong and does not need to be;
//! reproducibility is the only requirement.

/// Derive the shuffle seed from a participant and question identifier.
///
/// Folds the UTF-16 code units of `user_id + question_id` through a
/// polynomial rolling hash, truncating to a signed 32-bit integer at
/// every step, and returns the absolute value. Both sides of the wire
/// must use this exact fold or letter mapping breaks.
pub fn option_seed(user_id: &str, question_id: &str) -> f64 {
    let mut hash: i32 = 0;
    for unit in user_id.encode_utf16().chain(question_id.encode_utf16()) {
        let step = ((hash.wrapping_shl(5) as i64) - (hash as i64)) + unit as i64;
        hash = step as i32;
    }
    (hash as f64).abs()
}

/// Sine-based seeded pseudo-random draw in `[0, 1)`.
#[inline]
pub fn seeded_random(seed: f64) -> f64 {
    let x = seed.sin() * 10000.0;
    x - x.floor()
}

/// Fisher-Yates shuffle driven by [`seeded_random`], reseeded per draw
/// by adding the current index to the base seed.
///
/// Inputs of length 0 or 1 are returned unchanged.
pub fn shuffle_with_seed<T: Clone>(items: &[T], seed: f64) -> Vec<T> {
    let mut shuffled = items.to_vec();
    let mut current = shuffled.len();

    while current > 0 {
        let draw = seeded_random(seed + current as f64);
        let pick = (draw * current as f64).floor() as usize;
        current -= 1;
        shuffled.swap(current, pick);
    }

    shuffled
}

/// Shuffle a question's options for one participant.
pub fn shuffle_options(options: &[String], user_id: &str, question_id: &str) -> Vec<String> {
    let seed = option_seed(user_id, question_id);
    shuffle_with_seed(options, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_options() -> Vec<String> {
        ["Immanuel Kant", "John Stuart Mill", "John Rawls", "Robert Nozick"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_shuffle_is_stable() {
        let options = sample_options();
        let a = shuffle_options(&options, "user1", "q1");
        let b = shuffle_options(&options, "user1", "q1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let options = sample_options();
        let mut shuffled = shuffle_options(&options, "user1", "q1");
        let mut original = options.clone();
        shuffled.sort();
        original.sort();
        assert_eq!(shuffled, original);
    }

    #[test]
    fn test_empty_and_single_unchanged() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(shuffle_options(&empty, "user1", "q1"), empty);

        let single = vec!["only".to_string()];
        assert_eq!(shuffle_options(&single, "user1", "q1"), single);
    }

    #[test]
    fn test_different_users_diverge() {
        // Not guaranteed for any single pair, but over a sample of
        // identifiers at least one ordering must differ.
        let options = sample_options();
        let base = shuffle_options(&options, "user-0", "q1");
        let diverged = (1..50)
            .map(|i| shuffle_options(&options, &format!("user-{}", i), "q1"))
            .any(|other| other != base);
        assert!(diverged);
    }

    #[test]
    fn test_different_questions_diverge() {
        let options = sample_options();
        let base = shuffle_options(&options, "user1", "q-0");
        let diverged = (1..50)
            .map(|i| shuffle_options(&options, "user1", &format!("q-{}", i)))
            .any(|other| other != base);
        assert!(diverged);
    }

    #[test]
    fn test_seed_non_negative() {
        for (user, question) in [("", ""), ("a", "b"), ("陈述", "问题"), ("user1", "q1")] {
            assert!(option_seed(user, question) >= 0.0);
        }
    }

    #[test]
    fn test_seeded_random_in_unit_interval() {
        for i in 0..1000 {
            let r = seeded_random(i as f64 * 17.3);
            assert!((0.0..1.0).contains(&r));
        }
    }

    proptest! {
        #[test]
        fn prop_shuffle_deterministic(user in "[a-z0-9]{1,16}", question in "[a-z0-9]{1,16}") {
            let options = sample_options();
            prop_assert_eq!(
                shuffle_options(&options, &user, &question),
                shuffle_options(&options, &user, &question)
            );
        }

        #[test]
        fn prop_shuffle_preserves_elements(
            options in proptest::collection::vec("[a-z]{1,8}", 0..12),
            user in "[a-z0-9]{1,16}",
        ) {
            let mut shuffled = shuffle_options(&options, &user, "q1");
            let mut original = options.clone();
            shuffled.sort();
            original.sort();
            prop_assert_eq!(shuffled, original);
        }
    }
}
