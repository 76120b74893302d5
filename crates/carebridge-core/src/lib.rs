pub mod error;
pub mod ndjson;
pub mod resource;
pub mod time;

pub use error::{CoreError, Result};
pub use resource::ResourceType;
pub use time::{format_rfc3339, now_utc, parse_rfc3339};
