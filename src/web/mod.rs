//! The web module for the mock backend API.
//! This file declares the other files in this directory as sub-modules.

pub mod api;
pub mod models;
