use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

pub const WORKER_KEY_HEADER: &str = "x-lease-worker-key";
pub const LEGACY_WORKER_KEY_HEADER: &str = "x-worker-key";

/// Shared secret, held and compared as a SHA-256 digest.
#[derive(Clone)]
pub struct WorkerKey {
    digest: [u8; 32],
}

impl WorkerKey {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: hash_bytes(secret.as_bytes()),
        }
    }

    pub fn verify(&self, headers: &HeaderMap) -> bool {
        let presented = headers
            .get(WORKER_KEY_HEADER)
            .or_else(|| headers.get(LEGACY_WORKER_KEY_HEADER))
            .and_then(|value| value.to_str().ok());
        match presented {
            Some(value) => digests_match(&self.digest, &hash_bytes(value.as_bytes())),
            None => false,
        }
    }
}

fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

fn digests_match(left: &[u8; 32], right: &[u8; 32]) -> bool {
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
