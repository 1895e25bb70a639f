//! Core domain types and logic.

pub mod audit;
pub mod bar;
pub mod batch;
pub mod candidate;
pub mod catalog;
pub mod config;
pub mod config_validation;
pub mod entry;
pub mod error;
pub mod evaluator;
pub mod levels;
pub mod pattern;
pub mod policy;
pub mod result;
pub mod strategy;
pub mod summary;
pub mod tick_stream;
