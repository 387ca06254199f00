//! API Module
//!
//! REST front door for target creation, deletion and health listing.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
