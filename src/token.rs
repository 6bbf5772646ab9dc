//! Random identifiers that stay unique among the ones currently handed out.

use std::collections::HashSet;

use parking_lot::Mutex;
use rand::Rng;

use crate::error::SqlSessionError;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of the identifiers assigned to connection handles.
pub const HANDLE_TOKEN_LEN: usize = 6;

/// Shared set of issued tokens.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    issued: Mutex<HashSet<String>>,
}

impl TokenRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a token of `length` alphanumeric characters that is not currently issued,
    /// and record it before returning.
    ///
    /// # Errors
    /// Returns `SqlSessionError::TokenSpaceExhausted` when every token of that length is taken.
    pub fn generate(&self, length: usize) -> Result<String, SqlSessionError> {
        let mut issued = self.issued.lock();
        if let Some(space) = token_space(length)
            && issued.iter().filter(|t| t.len() == length).count() >= space
        {
            return Err(SqlSessionError::TokenSpaceExhausted(length));
        }

        let mut rng = rand::thread_rng();
        loop {
            let token: String = (0..length)
                .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
                .collect();
            if issued.insert(token.clone()) {
                return Ok(token);
            }
        }
    }

    /// Forget a token so it may be issued again. Returns whether it was present.
    pub fn release(&self, token: &str) -> bool {
        self.issued.lock().remove(token)
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.issued.lock().contains(token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issued.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issued.lock().is_empty()
    }
}

// None when the space is too large to ever fill
fn token_space(length: usize) -> Option<usize> {
    let exp = u32::try_from(length).ok()?;
    ALPHABET.len().checked_pow(exp)
}
