
// imports
use crate::error::Result;
use crate::tokenizer::{ReservedToken, TokenId, Tokenizer};

use std::sync::atomic::{AtomicUsize, Ordering};
use rayon::ThreadPoolBuilder;
use serde::Deserialize;
use tracing::{debug, info};


pub type TokenSequence = Box<[TokenId]>;

/// Sections with fewer characters than this are not worth encoding.
const MIN_SECTION_CHARS: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {

    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into() }
    }

    /// Parses a `["question", "answer"]` json line, `None` if malformed.
    pub fn from_json(line: &str) -> Option<QaPair> {
        let mut pair: Vec<String> = serde_json::from_str(line).ok()?;
        if pair.len() < 2 {
            return None;
        }
        pair.truncate(2);
        let answer = pair.pop()?;
        let question = pair.pop()?;
        Some(Self { question, answer })
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub section_titles: Vec<String>,
    #[serde(default)]
    pub section_texts: Vec<String>,
}


/// The tokenized corpus. Order carries no meaning.
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    sequences: Vec<TokenSequence>,
}

impl Corpus {

    pub fn new(sequences: Vec<TokenSequence>) -> Self {
        Self { sequences }
    }

    pub fn sequences(&self) -> &[TokenSequence] {
        &self.sequences
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.sequences.iter().map(|s| s.len()).sum()
    }
}


fn is_list_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.starts_with("list of") || lower.starts_with("lists of")
}

fn is_skipped_section(title: &str) -> bool {
    matches!(title.to_lowercase().as_str(), "see also" | "references")
}

/// Removes wiki bold and italic markup.
fn strip_emphasis(text: &str) -> String {
    text.replace("'''", "").replace("''", "")
}


pub struct CorpusBuilder<'a> {
    tokenizer: Tokenizer<'a>,
    max_context_size: usize,
    num_threads: usize,
    progress_interval: usize,
}

impl<'a> CorpusBuilder<'a> {

    pub fn new(tokenizer: Tokenizer<'a>, max_context_size: usize, num_threads: usize) -> Self {
        Self {
            tokenizer,
            max_context_size,
            num_threads,
            progress_interval: 4096,
        }
    }

    pub fn with_progress_interval(mut self, progress_interval: usize) -> Self {
        self.progress_interval = progress_interval.max(1);
        self
    }

    /// Encodes one question-answer pair into `buf`, returning the sequence length.
    ///
    /// `None` when the question fills the buffer or the answer yields no tokens.
    pub fn encode_qa(&self, buf: &mut [TokenId], pair: &QaPair) -> Option<usize> {

        let max = buf.len();
        let mut size = self.tokenizer.encode(buf, &pair.question);
        if size == max {
            return None;
        }

        buf[size] = ReservedToken::ReplyStart.id();
        size += 1;
        if size == max {
            return None;
        }

        let answer = self.tokenizer.encode(&mut buf[size..], &pair.answer);
        if answer == 0 {
            return None;
        }
        size += answer;

        // the closing token is dropped when the answer ran to the end of the buffer
        if size < max {
            buf[size] = ReservedToken::ReplyEnd.id();
            size += 1;
        }
        Some(size)
    }

    /// Encodes every usable section of an article, each prefixed by the
    /// tokenized title, and pushes the sequences to `out`.
    pub fn encode_article(&self, buf: &mut [TokenId], article: &Article, out: &mut Vec<TokenSequence>) {

        if is_list_title(&article.title) {
            return;
        }

        let max = buf.len();
        let mut prefix = self.tokenizer.encode(buf, &article.title);
        if prefix == max || prefix == 0 {
            return;
        }

        buf[prefix] = ReservedToken::ArticleRetrieval.id();
        prefix += 1;
        if prefix == max {
            return;
        }

        for (title, text) in article.section_titles.iter().zip(&article.section_texts) {

            if text.chars().count() < MIN_SECTION_CHARS || is_skipped_section(title) {
                continue;
            }

            let title_len = self.tokenizer.encode(&mut buf[prefix..], title);
            if title_len == 0 {
                continue;
            }
            let mut size = prefix + title_len;
            if size == max {
                continue;
            }

            buf[size] = ReservedToken::ReplyStart.id();
            size += 1;
            if size == max {
                continue;
            }

            let text_len = self.tokenizer.encode(&mut buf[size..], &strip_emphasis(text));
            if text_len == 0 {
                continue;
            }
            size += text_len;

            if size < max {
                buf[size] = ReservedToken::ReplyEnd.id();
                size += 1;
            }
            out.push(buf[..size].into());
        }
    }

    fn run_worker(&self,
        qa_pairs: &[QaPair],
        articles: &[Article],
        next_qa: &AtomicUsize,
        next_article: &AtomicUsize,
        thread_i: usize) -> Vec<TokenSequence> {

        // each worker reuses one scratch buffer and keeps its own shard of
        // sequences, the only shared state is the pair of claim counters.
        let mut buf: Vec<TokenId> = vec![0; self.max_context_size];
        let mut shard: Vec<TokenSequence> = Vec::new();
        let interval = self.progress_interval;

        loop {
            let i = next_qa.fetch_add(1, Ordering::Relaxed);
            if i >= qa_pairs.len() { break }

            if let Some(size) = self.encode_qa(&mut buf, &qa_pairs[i]) {
                shard.push(buf[..size].into());
            }
            if i % interval == interval - 1 {
                info!("tokenized {}/{} question-answer pairs", i + 1, qa_pairs.len());
            }
        }

        loop {
            let i = next_article.fetch_add(1, Ordering::Relaxed);
            if i >= articles.len() { break }

            self.encode_article(&mut buf, &articles[i], &mut shard);
            if i % interval == interval - 1 {
                info!("tokenized {}/{} articles", i + 1, articles.len());
            }
        }

        debug!("tokenizer thread {} finished with {} sequences", thread_i, shard.len());
        shard
    }

    /// Tokenizes both sources on a dedicated pool, one worker per thread.
    /// Returns once every worker has finished.
    pub fn build(&self, qa_pairs: &[QaPair], articles: &[Article]) -> Result<Corpus> {

        let pool = ThreadPoolBuilder::new()
        .num_threads(self.num_threads)
        .thread_name(|i| format!("dataset tokenizer #{}", i))
        .build()?;

        let next_qa = AtomicUsize::new(0);
        let next_article = AtomicUsize::new(0);

        info!("starting {} dataset tokenizers...", pool.current_num_threads());
        let shards: Vec<Vec<TokenSequence>> = pool.broadcast(|ctx| {
            self.run_worker(qa_pairs, articles, &next_qa, &next_article, ctx.index())
        });

        Ok(Corpus::new(shards.into_iter().flatten().collect()))
    }
}
