pub mod config;
pub mod error;
pub mod workload;

pub use config::{load_dotenv, SimConfig};
pub use error::*;
pub use workload::*;
