#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::ignored_unit_patterns,
    clippy::items_after_statements
)]

pub mod attribute;
pub mod bus;
pub mod command;
pub mod dbus;
pub mod dispatch;
pub mod marker;
pub mod paths;
pub mod reboot_reason;
pub mod settings;
pub mod shell;
pub mod state;
pub mod upgrade;

pub const SYSLOG_IDENTIFIER: &str = "hub-otamgr";
