pub mod error;
pub mod producers;
pub mod types;
