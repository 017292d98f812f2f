//! Identity and channel cryptography.
//!
//! Every participant (sensor, collector, window reporter) owns one long-lived
//! Ed25519 identity. Two identities agree on a symmetric channel key by
//! mapping both halves of their keypairs onto Curve25519 and running X25519:
//!
//! ```text
//! key = SHA-256( X25519( mont(priv_a), mont(pub_b) ) )
//! ```
//!
//! The key drives an AES-256-CTR keystream whose initial counter block is
//! `seq * 2` (big-endian, 128 bits), where `seq` is the sequence number the
//! *sender's* account had when the entry was submitted. CTR encryption and
//! decryption are the same XOR, so [`transform`] serves both directions.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use x25519_dalek::{PublicKey as MontgomeryPublic, StaticSecret};
use zeroize::Zeroize;

use crate::error::{CoreError, Result};
use crate::types::Block;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// The public half of an identity, used as a ledger address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }

    /// Decompress into an Ed25519 verifying key.
    ///
    /// Fails when the bytes are not a valid Edwards point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CoreError::InvalidKey(format!("{} is not a curve point", self)))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A long-lived asymmetric identity.
///
/// Wraps ed25519-dalek's `SigningKey`, which zeroes its secret on drop.
/// The secret is never serialized.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Create from a 64-digit hex seed.
    pub fn from_hex_seed(s: &str) -> Result<Self> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut seed)
            .map_err(|e| CoreError::InvalidKey(format!("bad hex seed: {}", e)))?;
        let identity = Self::from_seed(&seed);
        seed.zeroize();
        Ok(identity)
    }

    /// The ledger address of this identity.
    pub fn address(&self) -> Address {
        Address(self.signing_key.verifying_key().to_bytes())
    }

    fn montgomery_secret(&self) -> StaticSecret {
        StaticSecret::from(self.signing_key.to_scalar_bytes())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:?})", self.address())
    }
}

/// A 32-byte symmetric channel key shared by exactly one pair of identities.
///
/// Derived on demand and zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelKey([u8; 32]);

impl ChannelKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for ChannelKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelKey(..)")
    }
}

/// Derive the channel key between `identity` and the holder of `counterpart`.
///
/// `derive_shared_secret(a, b.address()) == derive_shared_secret(b, a.address())`
/// for every pair of identities.
pub fn derive_shared_secret(identity: &Identity, counterpart: &Address) -> Result<ChannelKey> {
    let point = MontgomeryPublic::from(counterpart.verifying_key()?.to_montgomery().to_bytes());
    let shared = identity.montgomery_secret().diffie_hellman(&point);
    if !shared.was_contributory() {
        return Err(CoreError::InvalidKey(format!(
            "{} is a low-order point",
            counterpart
        )));
    }
    Ok(ChannelKey(Sha256::digest(shared.as_bytes()).into()))
}

/// The initial CTR counter block for sequence number `seq`.
pub fn counter_block(seq: u64) -> [u8; 16] {
    (u128::from(seq) * 2).to_be_bytes()
}

/// XOR `block` with the AES-256-CTR keystream for `(key, seq)`.
///
/// Applying it twice with the same key and sequence returns the input.
pub fn transform(seq: u64, key: &ChannelKey, block: &Block) -> Block {
    let mut out = *block;
    let mut cipher = Aes256Ctr::new(key.as_bytes().into(), &counter_block(seq).into());
    cipher.apply_keystream(&mut out);
    out
}

/// Derive the channel key to `counterpart` and transform `block` in one step.
pub fn seal(identity: &Identity, counterpart: &Address, seq: u64, block: &Block) -> Result<Block> {
    let key = derive_shared_secret(identity, counterpart)?;
    Ok(transform(seq, &key, block))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret_symmetric() {
        for _ in 0..8 {
            let alice = Identity::generate();
            let bob = Identity::generate();

            let by_alice = derive_shared_secret(&alice, &bob.address()).unwrap();
            let by_bob = derive_shared_secret(&bob, &alice.address()).unwrap();
            assert_eq!(by_alice, by_bob);
        }
    }

    #[test]
    fn test_shared_secret_differs_per_pair() {
        let alice = Identity::from_seed(&[1; 32]);
        let bob = Identity::from_seed(&[2; 32]);
        let carol = Identity::from_seed(&[3; 32]);

        let ab = derive_shared_secret(&alice, &bob.address()).unwrap();
        let ac = derive_shared_secret(&alice, &carol.address()).unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_pinned_channel_bytes() {
        let alice = Identity::from_seed(&[1; 32]);
        let bob = Identity::from_seed(&[2; 32]);
        let key = derive_shared_secret(&alice, &bob.address()).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "8eab68546929e1565c58e32fce049da22f04a0fb83ec3386834b6e1b3c2d79c3"
        );

        let mut reading = [0u8; 32];
        reading[..2].copy_from_slice(b"10");
        assert_eq!(
            hex::encode(transform(0, &key, &reading)),
            "de5114d82fdc3d77706da4de1dd4cec5ce86165dfd6db9956900530e5589cd5a"
        );
    }

    #[test]
    fn test_invalid_public_key_rejected() {
        let alice = Identity::generate();
        // y = 2 has no matching x on edwards25519
        let mut bytes = [0u8; 32];
        bytes[0] = 2;
        let err = derive_shared_secret(&alice, &Address::from_bytes(bytes)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKey(_)));
    }

    #[test]
    fn test_counter_block_layout() {
        let block = counter_block(1);
        assert_eq!(&block[..8], &[0u8; 8]);
        assert_eq!(&block[8..], &2u64.to_be_bytes());

        let block = counter_block(0x0102_0304);
        assert_eq!(&block[8..], &0x0204_0608u64.to_be_bytes());
    }

    #[test]
    fn test_transform_roundtrip_between_parties() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mut plaintext = [0u8; 32];
        plaintext[..3].copy_from_slice(b"abc");

        let ciphertext = seal(&alice, &bob.address(), 1, &plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);

        let decrypted = seal(&bob, &alice.address(), 1, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_transform_depends_on_seq() {
        let key = ChannelKey::from_bytes([0x42; 32]);
        let block = [7u8; 32];
        assert_ne!(transform(1, &key, &block), transform(2, &key, &block));
        // wrong sequence does not decrypt
        let ciphertext = transform(10, &key, &block);
        assert_ne!(transform(11, &key, &ciphertext), block);
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let address = Identity::generate().address();
        let recovered = Address::from_hex(&address.to_hex()).unwrap();
        assert_eq!(address, recovered);
    }

    #[test]
    fn test_identity_from_hex_seed() {
        let hex_seed = "42".repeat(32);
        let identity = Identity::from_hex_seed(&hex_seed).unwrap();
        assert_eq!(identity.address(), Identity::from_seed(&[0x42; 32]).address());

        assert!(Identity::from_hex_seed("abcd").is_err());
        assert!(Identity::from_hex_seed(&"zz".repeat(32)).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn transform_is_self_inverse(
                key in any::<[u8; 32]>(),
                seq in any::<u64>(),
                block in any::<[u8; 32]>(),
            ) {
                let key = ChannelKey::from_bytes(key);
                prop_assert_eq!(transform(seq, &key, &transform(seq, &key, &block)), block);
            }

            #[test]
            fn channel_is_symmetric(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
                let a = Identity::from_seed(&a);
                let b = Identity::from_seed(&b);
                prop_assert_eq!(
                    derive_shared_secret(&a, &b.address()).unwrap(),
                    derive_shared_secret(&b, &a.address()).unwrap()
                );
            }
        }
    }
}
