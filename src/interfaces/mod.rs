//! Outer surfaces: CSV import/export and the HTTP trigger.

pub mod csv;
pub mod http;
