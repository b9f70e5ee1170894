//! Collection persistence and vector similarity.
//!
//! [`LanceStore`] keeps collections and the experiment log in a local
//! LanceDB directory; [`MemoryStore`] is the in-process equivalent.

pub mod memory;
pub mod schema;
pub mod similarity;
pub mod store;
pub mod table;

pub use memory::MemoryStore;
pub use similarity::{cosine_all, cosine_similarity};
pub use store::LanceStore;
