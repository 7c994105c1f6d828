//! Dataset-to-PDF analysis pipeline: generated Python analysis code,
//! isolated execution with self-healing repair, multimodal chart
//! annotation and a paginated report assembler.

pub mod annotate;
pub mod artifact;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod generate;
pub mod llm;
pub mod pipeline;
pub mod repair;
pub mod report;
pub mod retry;
pub mod workspace;
