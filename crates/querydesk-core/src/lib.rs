pub mod config;
pub mod error;
pub mod logging;

pub use config::{GeneralConfig, MemoryConfig, QueryConfig, QuerydeskConfig, RouterConfig};
pub use error::{QuerydeskError, Result};
pub use logging::init_tracing;
