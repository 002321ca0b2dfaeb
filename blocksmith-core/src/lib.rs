//! Blocksmith core library.
//!
//! Fits a degree-distribution-corrected stochastic block model from tabular
//! graph data, persists it in a line-oriented text format whose node
//! identity is a continuous real interval (so multiplicative rescaling stays
//! closed over the representation), and samples arbitrarily many realized
//! graphs from it. A small instruction language sequences the pipeline:
//! read → scale → save/load → generate.

mod codec;
mod error;
mod fitter;
mod ingest;
mod model;
mod rng;
mod sampler;
pub mod script;

pub use crate::{
    codec::{read_model, write_model},
    error::{
        CodecError, IngestError, Result, RuntimeError, RuntimeErrorCode, SamplerError,
        ScriptError,
    },
    fitter::GraphFitter,
    ingest::TsvReader,
    model::{
        interval_end, interval_start, Amount, ContinuousNodeId, Degree, EdgeBlock, EdgeRecord,
        MetaRecord, Model, NodeId, NodeRecord, Probability, DEFAULT_MODEL_NAME, SCALE_KEY,
    },
    rng::{mix_seed, seed_from_phrase},
    sampler::{generate_graph, SampleReport},
    script::{
        parse::{parse, ExecuteSpec, GenerateSpec, Instruction, ReadSpec},
        runtime::{RunSummary, ScriptRuntime},
        token::{tokenize, Token, TokenKind},
    },
};
