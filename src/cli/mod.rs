pub mod app;
pub mod config_cmd;
pub mod output;
pub mod status;
