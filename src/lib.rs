//! Development-time backend for the Kobra printer web console.
//!
//! Provides a mock protocol server emulating the print-job lifecycle and a
//! Range-serving system log, plus the log-tail client the console's log
//! viewer is built on. Strictly a dev fixture: nothing here talks to real
//! hardware.

pub mod config;
pub mod logmock;
pub mod logtail;
pub mod printer;
pub mod web;
