pub mod config;
pub mod error;
pub mod handle;
pub mod value;

pub use config::*;
pub use error::*;
pub use handle::*;
pub use value::*;
