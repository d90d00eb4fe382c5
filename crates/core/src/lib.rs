//! Core library: report extraction, finding-model catalog, similarity mapping.

pub mod catalog;
pub mod config;
pub mod embeddings;
pub mod extractor;
pub mod mapper;
pub mod models;
pub mod pipeline;
pub mod similarity;
