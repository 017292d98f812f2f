//! Channel test vectors.
//!
//! Each vector fixes two seeds, a sequence number and a reading, along with
//! the channel key and ciphertext they must produce. Checking them confirms
//! the key agreement and keystream against the pinned bytes, that either
//! party can open the payload, and that the wrong sequence number does not.

use sensorlog_core::{
    decode, derive_shared_secret, encode, seal, transform, Block, Identity, Result,
};

/// A channel test vector.
#[derive(Debug, Clone)]
pub struct ChannelVector {
    pub name: &'static str,
    pub sender_seed: [u8; 32],
    pub receiver_seed: [u8; 32],
    pub seq: u64,
    pub value: i64,
    /// Hex of the channel key both parties derive.
    pub expected_key: &'static str,
    /// Hex of the sealed payload.
    pub expected_ciphertext: &'static str,
}

impl ChannelVector {
    pub fn sender(&self) -> Identity {
        Identity::from_seed(&self.sender_seed)
    }

    pub fn receiver(&self) -> Identity {
        Identity::from_seed(&self.receiver_seed)
    }

    /// The sealed payload the sender would publish.
    pub fn ciphertext(&self) -> Result<Block> {
        let receiver = self.receiver().address();
        seal(&self.sender(), &receiver, self.seq, &encode(self.value))
    }
}

/// All channel vectors.
pub fn all_vectors() -> Vec<ChannelVector> {
    vec![
        ChannelVector {
            name: "first reading",
            sender_seed: [0x01; 32],
            receiver_seed: [0x02; 32],
            seq: 0,
            value: 10,
            expected_key:
                "8eab68546929e1565c58e32fce049da22f04a0fb83ec3386834b6e1b3c2d79c3",
            expected_ciphertext:
                "de5114d82fdc3d77706da4de1dd4cec5ce86165dfd6db9956900530e5589cd5a",
        },
        ChannelVector {
            name: "negative reading",
            sender_seed: [0x01; 32],
            receiver_seed: [0x02; 32],
            seq: 1,
            value: -273,
            expected_key:
                "8eab68546929e1565c58e32fce049da22f04a0fb83ec3386834b6e1b3c2d79c3",
            expected_ciphertext:
                "4c83d3067919b1bccccca4ef580a91180c95bb889094ae1878c3bfd5bc3f3543",
        },
        ChannelVector {
            name: "ten digits",
            sender_seed: [0x42; 32],
            receiver_seed: [0x43; 32],
            seq: 17_280,
            value: 9_999_999_999,
            expected_key:
                "2c33e2554720714ae98a91ae94ec3ee0d265a59f64f0051dd2986858ccd1b938",
            expected_ciphertext:
                "18c70059864df52eaabfc3897e20e7c6177b73b658d2926ab4c4faaf7fcda55a",
        },
        ChannelVector {
            name: "zero value, zero seeds",
            sender_seed: [0x00; 32],
            receiver_seed: [0xFF; 32],
            seq: 7,
            value: 0,
            expected_key:
                "cb2b56d90420aa434be345b936f6d28104ed4c6c50fb44bf3f82d4b48fb0bcfc",
            expected_ciphertext:
                "759f990b85d73f698d66979f013ca7e9a01ec9f9f9eaa5c85a02010ef79cb5ef",
        },
        ChannelVector {
            name: "high sequence",
            sender_seed: [0x5E; 32],
            receiver_seed: [0xC0; 32],
            seq: (1 << 62) + 3,
            value: 630,
            expected_key:
                "7e07c538a686eed1fb2d74c6529abe627d91085a506d7e33132f6bce94e1d5b1",
            expected_ciphertext:
                "3d11d6cd81c5e15b73a2398566fffd02e66bd71501571c63fbb84835b28644c6",
        },
    ]
}

/// Check every vector. Returns `(name, passed, detail)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .into_iter()
        .map(|vector| {
            let (passed, detail) = check(&vector);
            (vector.name.to_string(), passed, detail)
        })
        .collect()
}

fn check(vector: &ChannelVector) -> (bool, String) {
    let sender = vector.sender();
    let receiver = vector.receiver();
    let (ciphertext, again) = match (vector.ciphertext(), vector.ciphertext()) {
        (Ok(first), Ok(second)) => (first, second),
        (Err(e), _) | (_, Err(e)) => return (false, e.to_string()),
    };
    if ciphertext != again {
        return (false, "sealing is not deterministic".to_string());
    }
    if hex::encode(ciphertext) != vector.expected_ciphertext {
        return (false, format!("ciphertext {}", hex::encode(ciphertext)));
    }

    let key = match derive_shared_secret(&receiver, &sender.address()) {
        Ok(key) => key,
        Err(e) => return (false, e.to_string()),
    };
    if hex::encode(key.as_bytes()) != vector.expected_key {
        return (false, format!("channel key {}", hex::encode(key.as_bytes())));
    }
    match decode(&transform(vector.seq, &key, &ciphertext)) {
        Ok(value) if value == vector.value => {}
        Ok(value) => return (false, format!("opened to {} instead of {}", value, vector.value)),
        Err(e) => return (false, e.to_string()),
    }

    let wrong = transform(vector.seq.wrapping_add(1), &key, &ciphertext);
    if wrong == encode(vector.value) {
        return (false, "a different sequence number opened the payload".to_string());
    }

    (true, hex::encode(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_pass() {
        for (name, passed, detail) in verify_all_vectors() {
            assert!(passed, "{}: {}", name, detail);
        }
    }

    #[test]
    fn test_pinned_bytes_are_well_formed() {
        for vector in all_vectors() {
            assert_eq!(vector.expected_key.len(), 64, "{}", vector.name);
            assert_eq!(vector.expected_ciphertext.len(), 64, "{}", vector.name);
            assert_ne!(
                vector.expected_ciphertext,
                hex::encode(encode(vector.value)),
                "{}",
                vector.name
            );
        }
    }

    #[test]
    fn test_tampered_vector_fails() {
        let mut vector = all_vectors().remove(0);
        vector.expected_ciphertext =
            "0000000000000000000000000000000000000000000000000000000000000000";
        let (passed, _) = check(&vector);
        assert!(!passed);
    }

    #[test]
    fn test_vector_names_unique() {
        let mut names: Vec<_> = all_vectors().iter().map(|v| v.name).collect();
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
    }
}
