//! Gateway integration tests.

mod support;
mod in_memory;
mod subscribe;
