pub mod error;
pub mod id;
pub mod method;
pub mod value;

pub use error::{CoreError, ErrorCategory, Result};
pub use id::generate_id;
pub use method::HttpMethod;
pub use value::ValueTree;
