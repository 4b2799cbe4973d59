pub mod fixtures;
pub mod fs;
pub mod strategies;

pub use fs::create_config_dir;
