//! Filter-driven selection and aggregation behind the Cultural Vista
//! heritage, tourism and budget dashboard.

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod filter;
pub mod map;
pub mod normalize;
pub mod pages;
pub mod server;
pub mod types;

pub use error::PipelineError;
