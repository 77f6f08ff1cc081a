pub mod annotate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gosrc;
pub mod metadata;
pub mod operation;
pub mod parse;
pub mod plan;
pub mod reconcile;
pub mod validate;
