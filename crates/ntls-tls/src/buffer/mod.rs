//! Byte containers used throughout the engine.
//!
//! - [`SecureBuffer`]: fixed-size secret storage, zeroed on drop.
//! - [`TlsReader`]: big-endian cursor over received bytes.
//! - [`TlsWriter`]: growable big-endian encoder.
//! - [`MultiBuffer`]: accumulator for one or more outgoing records.

mod multi;
mod reader;
mod secure;
mod writer;

pub use multi::MultiBuffer;
pub use reader::TlsReader;
pub use secure::SecureBuffer;
pub use writer::TlsWriter;
