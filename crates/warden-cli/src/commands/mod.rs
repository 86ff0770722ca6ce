//! CLI commands.

pub(crate) mod catalog;
pub(crate) mod config;
pub(crate) mod install;
pub(crate) mod packages;
pub(crate) mod permissions;
