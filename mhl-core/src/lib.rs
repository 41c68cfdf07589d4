pub mod digest;
pub mod error;
pub mod fs;
pub mod hashlist;
pub mod inputs;
pub mod manifest;
pub mod path;
pub mod progress;
pub mod seal;
pub mod sequence;
pub mod verify;
pub mod writer;
pub mod xml;

pub use error::{ErrorKind, MhlError, Result};
