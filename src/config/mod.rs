pub mod env;
pub mod loader;
pub mod types;

pub use loader::{discover_config_file, load_client_config, load_or_default};
pub use types::{ClientConfig, ConfigResource, Settings};
