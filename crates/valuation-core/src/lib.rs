pub mod error;
pub mod memory;
pub mod provider;
pub mod stats;
pub mod types;

pub use error::*;
pub use memory::InMemoryProvider;
pub use provider::*;
pub use types::*;
