
use crate::cooccurrence::{CountingParams, DEFAULT_SEED};
use crate::error::{ConfigError, Result};

use serde_json::Value;
use std::{fmt::Display, fs::File, io::BufReader, path::{Path, PathBuf}};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw little-endian f32 rows, deflate compressed.
    Deflate,
    /// Uncompressed numpy array.
    Npy,
}

impl OutputFormat {
    fn parse(value: &str) -> std::result::Result<Self, ConfigError> {
        match value {
            "deflate" => Ok(OutputFormat::Deflate),
            "npy" => Ok(OutputFormat::Npy),
            other => Err(ConfigError::invalid_value("output_format", format!("unrecognized format {}", other)))
        }
    }
}

#[derive(Clone, Debug)]
pub struct JsonTypes {
    pub data_dir: String,
    pub output_file: String,
    pub dictionary_file: String,
    pub qa_file: String,
    pub articles_file: String,
    pub num_threads_tokenize: usize,
    pub num_threads_count: usize,
    pub max_context_size: usize,
    pub progress_interval: usize,
    pub output_format: OutputFormat,
    pub counting: CountingParams,
}

impl JsonTypes {

    pub fn dictionary_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.dictionary_file)
    }

    pub fn qa_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.qa_file)
    }

    pub fn articles_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.articles_file)
    }
}

impl Display for JsonTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using hyper-params:
        data_dir: {}
        output_file: {}
        dictionary_file: {}
        qa_file: {}
        articles_file: {}
        num_threads_tokenize: {}
        num_threads_count: {}
        max_context_size: {}
        latent_dim: {}
        seed: {:#x}
        output_format: {:?}",
        self.data_dir, self.output_file, self.dictionary_file, self.qa_file, self.articles_file,
        self.num_threads_tokenize, self.num_threads_count, self.max_context_size,
        self.counting.latent_dim, self.counting.seed, self.output_format)
    }
}


fn required_str(json: &Value, key: &'static str) -> std::result::Result<String, ConfigError> {
    match json.get(key) {
        Some(value) => value.as_str().map(str::to_owned).ok_or(ConfigError::WrongType { key, expected: "a string" }),
        None => Err(ConfigError::MissingKey { key })
    }
}

fn optional_str(json: &Value, key: &'static str, default: &str) -> std::result::Result<String, ConfigError> {
    match json.get(key) {
        Some(_) => required_str(json, key),
        None => Ok(default.to_owned())
    }
}

fn optional_u64(json: &Value, key: &'static str, default: u64) -> std::result::Result<u64, ConfigError> {
    match json.get(key) {
        Some(value) => value.as_u64().ok_or(ConfigError::WrongType { key, expected: "a non-negative integer" }),
        None => Ok(default)
    }
}

fn positive_usize(json: &Value, key: &'static str, default: usize) -> std::result::Result<usize, ConfigError> {
    let value = optional_u64(json, key, default as u64)?;
    if value == 0 {
        return Err(ConfigError::invalid_value(key, "must be positive"));
    }
    usize::try_from(value).map_err(|_| ConfigError::invalid_value(key, "too large"))
}


pub struct Config {
    params: JsonTypes
}

impl Config {

    pub fn get_params(&self) -> JsonTypes {
        self.params.clone()
    }

    pub fn new(args: &[String]) -> Result<Config> {

        if args.len() != 2 {
            return Err(ConfigError::Usage.into());
        }

        // parse input json
        let f = BufReader::new(File::open(&args[1])?);
        let json: Value = serde_json::from_reader(f)?;
        Ok(Config::from_json(&json)?)
    }

    pub fn from_json(json: &Value) -> std::result::Result<Config, ConfigError> {

        let available = std::thread::available_parallelism().map(usize::from).unwrap_or(1);
        let defaults = CountingParams::default();

        let params = JsonTypes {
            data_dir: required_str(json, "data_dir")?,
            output_file: required_str(json, "output_file")?,
            dictionary_file: optional_str(json, "dictionary_file", "encoder.json")?,
            qa_file: optional_str(json, "qa_file", "QuestionAnswering.jsonl.deflate")?,
            articles_file: optional_str(json, "articles_file", "simplewiki-latest.jsonl")?,
            num_threads_tokenize: positive_usize(json, "num_threads_tokenize", available)?,
            num_threads_count: positive_usize(json, "num_threads_count", 1)?,
            max_context_size: positive_usize(json, "max_context_size", 4096)?,
            progress_interval: positive_usize(json, "progress_interval", 4096)?,
            output_format: OutputFormat::parse(&optional_str(json, "output_format", "deflate")?)?,
            counting: CountingParams {
                latent_dim: positive_usize(json, "latent_dim", defaults.latent_dim)?,
                seed: optional_u64(json, "seed", DEFAULT_SEED)?,
                ..defaults
            }
        };

        Ok(Self { params })
    }

}


pub mod files_handling {

    use crate::corpus::{Article, QaPair};
    use crate::embedding::EmbeddingMatrix;
    use crate::error::{Error, Result};

    use std::{collections::HashMap, ffi::OsStr, fs::{self, File}, io::{BufRead, BufReader, BufWriter, Write}, path::Path};
    use flate2::{Compression, read::{DeflateDecoder, GzDecoder}, write::DeflateEncoder};
    use ndarray::Array2;
    use ndarray_npy::write_npy;
    use rayon::prelude::*;
    use serde::de::DeserializeOwned;
    use tracing::{debug, warn};

    const READ_BUFFER: usize = 1 << 24;

    pub fn read_input<R: ReadFile>(file_path: &Path) -> std::result::Result<R::Item, R::Error> {
        R::read_file(file_path)
    }

    pub fn save_output<S: SaveFile>(output_file: &Path, item: &S) -> std::result::Result<(), S::Error> {
        item.save_file(output_file)
    }

    pub trait ReadFile {
        type Error;
        type Item;
        fn read_file(file_path: &Path) -> std::result::Result<Self::Item, Self::Error>;
    }

    pub trait SaveFile {
        type Error;
        fn save_file(&self, output_file: &Path) -> std::result::Result<(), Self::Error>;
    }

    /// Opens `file_path`, decompressing by extension (`.deflate` raw deflate, `.gz` gzip).
    pub fn open_reader(file_path: &Path) -> Result<Box<dyn BufRead>> {

        let f = File::open(file_path)?;
        let reader: Box<dyn BufRead> = match file_path.extension().and_then(OsStr::to_str) {
            Some("deflate") => Box::new(BufReader::with_capacity(READ_BUFFER, DeflateDecoder::new(BufReader::new(f)))),
            Some("gz") => Box::new(BufReader::with_capacity(READ_BUFFER, GzDecoder::new(BufReader::new(f)))),
            _ => Box::new(BufReader::with_capacity(READ_BUFFER, f))
        };
        Ok(reader)
    }

    /// Parses every line in parallel, malformed lines are dropped.
    fn parse_lines<T, F>(file_path: &Path, parse: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&str) -> Option<T> + Sync {

        // raw lines, a line that is not valid utf-8 is a malformed record
        let mut lines: Vec<Vec<u8>> = open_reader(file_path)?.split(b'\n').collect::<std::io::Result<_>>()?;
        for line in lines.iter_mut() {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        let items: Vec<T> = lines
        .par_iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let item = std::str::from_utf8(line).ok().and_then(|line| parse(line));
            if item.is_none() {
                debug!("skipping malformed record at line {} of {}", i + 1, file_path.display());
            }
            item
        })
        .collect();

        let skipped = lines.len() - items.len();
        if skipped > 0 {
            warn!("skipped {} malformed records in {}", skipped, file_path.display());
        }
        Ok(items)
    }

    fn parse_json<T: DeserializeOwned>(line: &str) -> Option<T> {
        serde_json::from_str(line).ok()
    }

    impl ReadFile for HashMap<String, u16> {
        type Error = Error;
        type Item = Self;
        fn read_file(file_path: &Path) -> Result<Self::Item> {
            let item = serde_json::from_reader(open_reader(file_path)?)?;
            Ok(item)
        }
    }

    impl ReadFile for Vec<QaPair> {
        type Error = Error;
        type Item = Self;
        fn read_file(file_path: &Path) -> Result<Self::Item> {
            parse_lines(file_path, QaPair::from_json)
        }
    }

    impl ReadFile for Vec<Article> {
        type Error = Error;
        type Item = Self;
        fn read_file(file_path: &Path) -> Result<Self::Item> {
            parse_lines(file_path, parse_json::<Article>)
        }
    }

    fn create_parent(output_file: &Path) -> Result<()> {
        if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    impl SaveFile for EmbeddingMatrix {
        type Error = Error;
        fn save_file(&self, output_file: &Path) -> Result<()> {
            create_parent(output_file)?;
            let f = BufWriter::new(File::create(output_file)?);
            let mut writer = DeflateEncoder::new(f, Compression::best());
            writer.write_all(&self.to_le_bytes())?;
            writer.finish()?.flush()?;
            Ok(())
        }
    }

    impl SaveFile for Array2<f32> {
        type Error = Error;
        fn save_file(&self, output_file: &Path) -> Result<()> {
            create_parent(output_file)?;
            write_npy(output_file, self)?;
            Ok(())
        }
    }
}
