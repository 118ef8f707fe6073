
// imports
use crate::config::{files_handling, Config, JsonTypes, OutputFormat};
use crate::cooccurrence::{CollocationCounter, CountingParams};
use crate::corpus::{Article, Corpus, CorpusBuilder, QaPair};
use crate::dictionary::OptimizedDictionary;
use crate::embedding::EmbeddingMatrix;
use crate::error::{ConfigError, Result};
use crate::tokenizer::{Tokenizer, RESERVED_TOKEN_CLASSES};

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use ndarray_stats::QuantileExt;
use tracing::info;


/// Options for the in-memory part of a run.
#[derive(Clone, Copy, Debug)]
pub struct TrainOptions {
    pub max_context_size: usize,
    pub num_threads_tokenize: usize,
    pub num_threads_count: usize,
    pub progress_interval: usize,
    pub counting: CountingParams,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            max_context_size: 4096,
            num_threads_tokenize: std::thread::available_parallelism().map(usize::from).unwrap_or(1),
            num_threads_count: 1,
            progress_interval: 4096,
            counting: CountingParams::default(),
        }
    }
}

impl From<&JsonTypes> for TrainOptions {
    fn from(params: &JsonTypes) -> Self {
        Self {
            max_context_size: params.max_context_size,
            num_threads_tokenize: params.num_threads_tokenize,
            num_threads_count: params.num_threads_count,
            progress_interval: params.progress_interval,
            counting: params.counting,
        }
    }
}


pub struct Pipeline {}

impl Pipeline {

    // runs the procedure of 4 steps over already loaded inputs -
    // -> dictionary optimization
    // -> parallel tokenization of both sources
    // -> hashed collocation counting
    // -> normalization

    pub fn train(vocab: &HashMap<String, u16>, qa_pairs: &[QaPair], articles: &[Article], options: &TrainOptions) -> Result<EmbeddingMatrix> {

        let timer = Instant::now();
        info!("optimizing dictionary...");
        let dict = OptimizedDictionary::optimize(vocab);
        let token_classes = dict.token_classes()?;
        let max_token_len = dict.max_token_len();
        info!("{} dictionary entries, longest token {} chars, {} token classes, took {} ms",
            dict.len(), max_token_len, token_classes, timer.elapsed().as_millis());

        let timer = Instant::now();
        let tokenizer = Tokenizer::new(&dict, max_token_len, RESERVED_TOKEN_CLASSES)?;
        let corpus: Corpus = CorpusBuilder::new(tokenizer, options.max_context_size, options.num_threads_tokenize)
        .with_progress_interval(options.progress_interval)
        .build(qa_pairs, articles)?;
        info!("tokenized {} sequences with {} tokens, took {} seconds",
            corpus.len(), corpus.total_tokens(), timer.elapsed().as_secs());

        // the dictionary is no longer needed once tokenization is done
        drop(dict);

        let timer = Instant::now();
        info!("computing hashed collocation count...");
        let counter = CollocationCounter::new(options.counting).with_progress_interval(options.progress_interval);
        let counts = counter.count_parallel(corpus.sequences(), token_classes, options.num_threads_count)?;
        drop(corpus);
        info!("finished counting, took {} seconds", timer.elapsed().as_secs());

        info!("flattening and rescaling...");
        let embedding = EmbeddingMatrix::from_counts(&counts);
        if let (Ok(lo), Ok(hi)) = (embedding.as_array().min(), embedding.as_array().max()) {
            info!("embedding matrix {:?}, values within [{}, {}]", embedding.shape(), lo, hi);
        }
        Ok(embedding)
    }

    pub fn save(embedding: &EmbeddingMatrix, output_file: &Path, format: OutputFormat) -> Result<()> {

        let timer = Instant::now();
        match format {
            OutputFormat::Deflate => {
                info!("deflating and saving to {}...", output_file.display());
                files_handling::save_output(output_file, embedding)?;
            },
            OutputFormat::Npy => {
                info!("saving npy to {}...", output_file.display());
                files_handling::save_output(output_file, embedding.as_array())?;
            }
        }
        info!("saved, took {} seconds", timer.elapsed().as_secs());
        Ok(())
    }

    pub fn run_with(params: &JsonTypes) -> Result<()> {

        info!("{}", params);

        let timer = Instant::now();
        info!("loading dictionary...");
        let vocab = files_handling::read_input::<HashMap<String, u16>>(&params.dictionary_path())?;
        if vocab.is_empty() {
            return Err(ConfigError::EmptyDictionary.into());
        }

        info!("loading question answering dataset...");
        let qa_pairs = files_handling::read_input::<Vec<QaPair>>(&params.qa_path())?;

        info!("loading articles dataset...");
        let articles = files_handling::read_input::<Vec<Article>>(&params.articles_path())?;
        info!("loaded {} question-answer pairs and {} articles, took {} seconds",
            qa_pairs.len(), articles.len(), timer.elapsed().as_secs());

        let embedding = Pipeline::train(&vocab, &qa_pairs, &articles, &TrainOptions::from(params))?;
        Pipeline::save(&embedding, Path::new(&params.output_file), params.output_format)
    }

    pub fn run(args: &[String]) -> Result<()> {

        info!("building parameters...");
        let params = Config::new(args)?.get_params();

        let timer = Instant::now();
        Pipeline::run_with(&params)?;
        info!("finished, took {} seconds", timer.elapsed().as_secs());
        Ok(())
    }

}
