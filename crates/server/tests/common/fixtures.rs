//! Test fixtures for generating test data.

use bytes::Bytes;
use spool_core::ArtifactId;

/// Access token configured by `AppConfig::for_testing`.
#[allow(dead_code)]
pub const TEST_ACCESS_TOKEN: &str = "test-access-token-0123456789";

/// Origin allowed by `AppConfig::for_testing`.
#[allow(dead_code)]
pub const TEST_ORIGIN: &str = "https://app.example.com";

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Parse a known-good artifact id.
#[allow(dead_code)]
pub fn artifact_id(raw: &str) -> ArtifactId {
    ArtifactId::parse(raw).expect("test id should be valid")
}
