mod config_cmd;
mod movie;

pub use config_cmd::ConfigCommand;
pub use movie::MovieCommand;

pub use movie::OutputFormat;
