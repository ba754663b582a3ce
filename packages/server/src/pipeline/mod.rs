//! The three stage-worker loops: encoder, retriever, generator.

pub mod encoder;
pub mod generator;
pub mod retriever;
