pub mod config;
pub mod error;
pub mod persona;
pub mod types;

pub use config::SuperagentConfig;
pub use error::{Result, SuperagentError};
pub use persona::{Language, Labels};
pub use types::*;
