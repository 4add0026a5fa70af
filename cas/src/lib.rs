//! Content-addressed storage of opaque payloads.
//!
//! A content id is a pure function of the stored bytes, so uploading the
//! same payload twice is safe and yields the same id.

pub mod cas;
pub mod error;
pub mod ipfs;
pub mod memory;

pub use cas::ContentStore;
pub use error::CasError;
pub use ipfs::IpfsClient;
pub use memory::MemoryContentStore;
