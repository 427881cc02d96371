mod engine;
mod path_classifier;
mod key_path;
mod connection_string;
mod settings_scanner;
mod port_updater;
mod env_files;
mod token_codec;
mod environment_store;
mod last_environment;
mod prompt;

// External collaborators
mod database;
mod docker;

pub use environment_store::EnvironmentUpdate;

// Export the main engine
pub use engine::{Engine, NewEnvironment};
