pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod score;
pub mod types;

pub use error::{MuninnError, Result};
pub use types::*;
