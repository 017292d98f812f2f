//! Accounts: an identity bound to the log's sequence counter.
//!
//! The log owns the counter. An [`Account`] only caches the value it last
//! saw so callers can predict the sequence number of their next submission
//! (the number that keys its payload cipher). A wrong prediction is detected
//! by the log and fixed by [`Account::reload`].

use crate::crypto::{Address, Identity};

/// Anything that can sign and submit entries.
pub trait Signable {
    /// The identity entries are submitted under.
    fn identity(&self) -> &Identity;

    /// The predicted sequence number of the next submission.
    fn sequence(&self) -> u64;

    /// Shorthand for `identity().address()`.
    fn address(&self) -> Address {
        self.identity().address()
    }
}

/// The single concrete [`Signable`].
#[derive(Debug, Clone)]
pub struct Account {
    identity: Identity,
    next_sequence: u64,
}

impl Account {
    pub fn new(identity: Identity, next_sequence: u64) -> Self {
        Self {
            identity,
            next_sequence,
        }
    }

    /// Replace the cached counter with a value freshly read from the log.
    pub fn reload(&mut self, next_sequence: u64) {
        self.next_sequence = next_sequence;
    }

    /// Record that the log accepted an entry at `seq`.
    pub fn advance_past(&mut self, seq: u64) {
        self.next_sequence = self.next_sequence.max(seq.saturating_add(1));
    }
}

impl Signable for Account {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn sequence(&self) -> u64 {
        self.next_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_counter() {
        let identity = Identity::from_seed(&[9; 32]);
        let mut account = Account::new(identity.clone(), 4);
        assert_eq!(account.sequence(), 4);
        assert_eq!(account.address(), identity.address());

        account.advance_past(4);
        assert_eq!(account.sequence(), 5);

        // stale acknowledgements never move the counter backwards
        account.advance_past(2);
        assert_eq!(account.sequence(), 5);

        account.reload(11);
        assert_eq!(account.sequence(), 11);
    }
}
