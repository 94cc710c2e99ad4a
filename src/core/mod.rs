pub mod config;
pub mod errors;
pub mod kernel;
pub mod params;
pub mod traits;
pub mod types;
