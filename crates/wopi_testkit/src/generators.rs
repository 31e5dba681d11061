//! Property-based test generators using proptest.

use proptest::prelude::*;
use wopi_protocol::{Operation, STANDARD_LOCK_LENGTH};

/// Strategy for lock tokens valid under the standard length limit.
pub fn lock_token_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex(&format!("[!-~]{{1,{STANDARD_LOCK_LENGTH}}}")).expect("Invalid regex")
}

/// Strategy for short lock tokens drawn from a small alphabet, so that
/// generated sequences often reuse a token.
pub fn colliding_lock_token_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["A", "B", "C"]).prop_map(str::to_string)
}

/// Strategy for file stems accepted by RenameFile.
pub fn file_stem_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9 _.-]{0,40}").expect("Invalid regex")
}

/// Strategy for file content.
pub fn file_content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Strategy for any operation.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop::sample::select(Operation::ALL.to_vec())
}

/// A lock-scoped request in a generated sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStep {
    /// Lock with a token.
    Lock(String),
    /// Unlock with a token.
    Unlock(String),
    /// RefreshLock with a token.
    Refresh(String),
    /// GetLock.
    GetLock,
    /// Advance the clock by this many minutes.
    Wait(u32),
}

/// Strategy for lock step sequences.
pub fn lock_steps_strategy(max_len: usize) -> impl Strategy<Value = Vec<LockStep>> {
    let step = prop_oneof![
        colliding_lock_token_strategy().prop_map(LockStep::Lock),
        colliding_lock_token_strategy().prop_map(LockStep::Unlock),
        colliding_lock_token_strategy().prop_map(LockStep::Refresh),
        Just(LockStep::GetLock),
        (1u32..45).prop_map(LockStep::Wait),
    ];
    prop::collection::vec(step, 1..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wopi_protocol::LockToken;

    proptest! {
        #[test]
        fn generated_tokens_are_valid(token in lock_token_strategy()) {
            prop_assert!(LockToken::parse(&token, false).is_ok());
        }

        #[test]
        fn generated_stems_are_non_empty(stem in file_stem_strategy()) {
            prop_assert!(!stem.trim().is_empty());
        }
    }
}
