// Section layout: order overrides and visibility.
// Pure functions only; no I/O.

pub mod resolver;

pub use resolver::{resolve, resolve_record};
