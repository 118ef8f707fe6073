mod error;
mod config;
mod dictionary;
mod tokenizer;
mod corpus;
mod cooccurrence;
mod embedding;
mod pipeline;

pub use error::{ConfigError, Error, Result, TokenizeError};
pub use config::{files_handling, Config, JsonTypes, OutputFormat};
pub use dictionary::{OptimizedDictionary, OptimizedEntry};
pub use tokenizer::{tokenize, ReservedToken, TokenId, Tokenizer, RESERVED_TOKEN_CLASSES};
pub use corpus::{Article, Corpus, CorpusBuilder, QaPair, TokenSequence};
pub use cooccurrence::{merge_hash, xorshift64, CollocationCounter, CollocationCounts, CountingParams, HashSalts};
pub use embedding::EmbeddingMatrix;
pub use pipeline::{Pipeline, TrainOptions};
