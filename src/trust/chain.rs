//! HMAC-linked audit chain over AIR record hashes.
//!
//! Each entry carries the hash of the previous entry's JSON serialization,
//! so modifying any record breaks every later link. Appends and verifies
//! serialize on one mutex; readers receive snapshot copies.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// One signed link in the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Monotonic counter, 1-based.
    pub sequence: u64,
    /// The AIR record this entry signs.
    pub run_id: String,
    /// SHA-256 of the AIR record JSON, hex.
    pub record_hash: String,
    /// SHA-256 of the previous entry's JSON, hex; empty for the first.
    pub prev_hash: String,
    /// HMAC-SHA256(key, "sequence|run_id|record_hash|prev_hash"), hex.
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of walking the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainVerification {
    pub valid: bool,
    /// Sequence number of the first bad entry, 0 when valid.
    pub broken_at: u64,
    pub reason: Option<String>,
}

impl ChainVerification {
    fn ok() -> Self {
        Self {
            valid: true,
            broken_at: 0,
            reason: None,
        }
    }
}

#[derive(Debug, Default)]
struct ChainInner {
    entries: Vec<ChainEntry>,
    /// Hash of the last serialized entry, chained into the next one.
    last: String,
    seq: u64,
}

/// An ordered, signed sequence of AIR record hashes. Safe for concurrent
/// use; the chain lives in memory unless an operator sinks it externally.
#[derive(Debug)]
pub struct AuditChain {
    secret: Vec<u8>,
    inner: Mutex<ChainInner>,
}

impl AuditChain {
    /// Create a chain with the given HMAC signing key. An empty key keeps
    /// the chain structurally intact but its signatures are decorative.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            inner: Mutex::new(ChainInner::default()),
        }
    }

    /// Append a record to the chain and return a copy of the new entry.
    pub fn append(&self, run_id: &str, record_json: &[u8]) -> ChainEntry {
        let mut inner = self.inner.lock().unwrap();

        inner.seq += 1;

        let mut entry = ChainEntry {
            sequence: inner.seq,
            run_id: run_id.to_string(),
            record_hash: sha256_hex(record_json),
            prev_hash: inner.last.clone(),
            signature: String::new(),
            timestamp: Utc::now(),
        };
        entry.signature = self.sign(&entry);

        // The serialized entry becomes the prev_hash of its successor.
        let entry_json = serde_json::to_vec(&entry).expect("chain entry serializes");
        inner.last = sha256_hex(&entry_json);

        inner.entries.push(entry.clone());
        entry
    }

    /// Walk the chain, recomputing every signature and checking every
    /// `prev_hash` against the hash of the prior serialized entry. An
    /// empty chain is valid.
    pub fn verify(&self) -> ChainVerification {
        let inner = self.inner.lock().unwrap();

        let mut prev_hash = String::new();
        for entry in &inner.entries {
            if entry.prev_hash != prev_hash {
                return ChainVerification {
                    valid: false,
                    broken_at: entry.sequence,
                    reason: Some(format!(
                        "chain broken at sequence {}: prev_hash mismatch",
                        entry.sequence
                    )),
                };
            }

            if entry.signature != self.sign(entry) {
                return ChainVerification {
                    valid: false,
                    broken_at: entry.sequence,
                    reason: Some(format!(
                        "chain broken at sequence {}: signature mismatch",
                        entry.sequence
                    )),
                };
            }

            let entry_json = serde_json::to_vec(entry).expect("chain entry serializes");
            prev_hash = sha256_hex(&entry_json);
        }

        ChainVerification::ok()
    }

    /// A snapshot copy of all entries.
    pub fn entries(&self) -> Vec<ChainEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> u64 {
        self.inner.lock().unwrap().seq
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The signature is reproducible from an entry's public fields alone.
    fn sign(&self, entry: &ChainEntry) -> String {
        let msg = format!(
            "{}|{}|{}|{}",
            entry.sequence, entry.run_id, entry.record_hash, entry.prev_hash
        );
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(msg.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_chain_is_valid() {
        let chain = AuditChain::new("secret");
        let v = chain.verify();
        assert!(v.valid);
        assert_eq!(v.broken_at, 0);
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn appends_link_sequentially() {
        let chain = AuditChain::new("secret");
        let e1 = chain.append("run-1", br#"{"a":1}"#);
        let e2 = chain.append("run-2", br#"{"a":2}"#);
        let e3 = chain.append("run-3", br#"{"a":3}"#);

        assert_eq!(e1.sequence, 1);
        assert_eq!(e2.sequence, 2);
        assert_eq!(e3.sequence, 3);
        assert!(e1.prev_hash.is_empty());
        assert!(!e2.prev_hash.is_empty());

        // Each prev_hash equals the hash of the prior serialized entry.
        let entries = chain.entries();
        let e1_json = serde_json::to_vec(&entries[0]).unwrap();
        assert_eq!(entries[1].prev_hash, sha256_hex(&e1_json));
        let e2_json = serde_json::to_vec(&entries[1]).unwrap();
        assert_eq!(entries[2].prev_hash, sha256_hex(&e2_json));

        assert!(chain.verify().valid);
    }

    #[test]
    fn tampered_record_hash_breaks_chain_at_its_sequence() {
        let chain = AuditChain::new("secret");
        chain.append("run-1", br#"{"a":1}"#);
        chain.append("run-2", br#"{"a":2}"#);
        chain.append("run-3", br#"{"a":3}"#);

        // Mutate the middle entry behind the chain's back.
        {
            let mut inner = chain.inner.lock().unwrap();
            inner.entries[1].record_hash = sha256_hex(b"forged");
        }

        let v = chain.verify();
        assert!(!v.valid);
        assert_eq!(v.broken_at, 2);
        assert!(v
            .reason
            .as_deref()
            .unwrap()
            .starts_with("chain broken at sequence 2:"));
    }

    #[test]
    fn tampered_prev_hash_is_detected() {
        let chain = AuditChain::new("secret");
        chain.append("run-1", b"one");
        chain.append("run-2", b"two");

        {
            let mut inner = chain.inner.lock().unwrap();
            inner.entries[1].prev_hash = sha256_hex(b"wrong");
        }

        let v = chain.verify();
        assert!(!v.valid);
        assert_eq!(v.broken_at, 2);
        assert!(v.reason.unwrap().contains("prev_hash mismatch"));
    }

    #[test]
    fn signature_depends_on_the_key() {
        let chain_a = AuditChain::new("key-a");
        let chain_b = AuditChain::new("key-b");
        let e_a = chain_a.append("run-1", b"payload");
        let e_b = chain_b.append("run-1", b"payload");
        assert_ne!(e_a.signature, e_b.signature);
    }

    #[test]
    fn concurrent_appends_keep_the_chain_intact() {
        let chain = Arc::new(AuditChain::new("secret"));
        let mut handles = Vec::new();

        for t in 0..8 {
            let chain = Arc::clone(&chain);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    chain.append(&format!("run-{t}-{i}"), format!("rec-{t}-{i}").as_bytes());
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(chain.len(), 200);
        let entries = chain.entries();
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence, i as u64 + 1);
        }
        assert!(chain.verify().valid);
    }

    #[test]
    fn entries_returns_a_snapshot() {
        let chain = AuditChain::new("secret");
        chain.append("run-1", b"one");
        let snapshot = chain.entries();
        chain.append("run-2", b"two");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(chain.entries().len(), 2);
    }
}
