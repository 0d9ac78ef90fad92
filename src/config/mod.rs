//! Configuration module for the Aternos controller.
//!
//! This module handles parsing, validation, and access to the credentials,
//! endpoint URLs and timing knobs the controller needs. It supports loading
//! configurations from JSON or YAML files, strings, or the process
//! environment.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use aternos_controller::config::Config;
//!
//! let config = Config::from_file("aternos.json").unwrap();
//! println!("Controlling servers at {}", config.endpoints.base_url);
//! ```
//!
//! Creating a configuration programmatically:
//! ```
//! use aternos_controller::config::{Config, Credentials};
//!
//! let config = Config::new(Credentials::new("steve", "hunter2"));
//! assert_eq!(config.transport.max_retries, 3);
//! assert_eq!(config.endpoints.login_url, "https://aternos.org/go/");
//! ```
mod parser;
pub mod validator;

pub use parser::{Config, Credentials, Endpoints, TimingConfig, TransportConfig};
pub use validator::validate_config;
