pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{chunked_stream, id, seeded_bytes, slow_stream, test_store};
