//! HTTP request handlers.

pub mod blobs;
pub mod health;
pub mod uploads;

pub use blobs::*;
pub use health::*;
pub use uploads::*;
