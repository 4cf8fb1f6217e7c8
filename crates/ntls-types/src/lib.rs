#![forbid(unsafe_code)]
#![doc = "Error and alert types shared by the ntls TLS 1.0-1.2 engine."]

pub mod alert;
pub mod error;

pub use alert::*;
pub use error::*;
