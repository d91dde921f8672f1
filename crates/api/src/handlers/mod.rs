//! Request handlers, one module per resource.

pub mod jobs;
pub mod tasks;
