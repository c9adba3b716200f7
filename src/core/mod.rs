pub mod error;
pub mod value;

pub use error::{KvError, Result};
pub use value::Reply;
