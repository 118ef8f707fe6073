
// imports
use crate::dictionary::OptimizedDictionary;
use crate::error::TokenizeError;


pub type TokenId = u16;

/// Control tokens occupying the lowest ids, below every vocabulary id.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservedToken {
    ReplyStart = 0,
    ReplyEnd = 1,
    ArticleRetrieval = 2,
    Mask = 3,
}

impl ReservedToken {
    pub const fn id(self) -> TokenId {
        self as TokenId
    }
}

pub const RESERVED_TOKEN_CLASSES: TokenId = 4;


/// Greedy longest-match tokenization of `input` into `output`.
///
/// Returns the number of ids written. Characters that start no vocabulary
/// string are skipped. Stops at the end of the input or when `output` is full.
pub fn tokenize(dict: &OptimizedDictionary,
    output: &mut [TokenId],
    input: &str,
    max_token_len: usize,
    reserved_offset: TokenId) -> Result<usize, TokenizeError> {

    if max_token_len < 1 {
        return Err(TokenizeError::MaxTokenLenOutOfRange(max_token_len));
    }
    Ok(longest_match(dict, output, input, max_token_len, reserved_offset))
}

// callers guarantee max_token_len >= 1
fn longest_match(dict: &OptimizedDictionary,
    output: &mut [TokenId],
    input: &str,
    max_token_len: usize,
    reserved_offset: TokenId) -> usize {

    let mut pos = 0; // byte offset of the read cursor
    let mut written = 0;

    while pos < input.len() && written < output.len() {

        let rest = &input[pos..];

        // grow the candidate one char at a time, remembering the longest match
        let mut best: Option<(TokenId, usize)> = None;
        for (offset, ch) in rest.char_indices().take(max_token_len) {
            let end = offset + ch.len_utf8();
            if let Some(entry) = dict.get(&rest[..end]) {
                best = Some((entry.id, end));
                if entry.fast_return {
                    break;
                }
            }
        }

        match best {
            Some((id, end)) => {
                output[written] = id + reserved_offset;
                written += 1;
                pos += end;
            },
            None => pos += rest.chars().next().map_or(rest.len(), char::len_utf8)
        }
    }

    written
}


/// A dictionary bound to its validated tokenization parameters.
#[derive(Clone, Copy, Debug)]
pub struct Tokenizer<'a> {
    dict: &'a OptimizedDictionary,
    max_token_len: usize,
    reserved_offset: TokenId,
}

impl<'a> Tokenizer<'a> {

    pub fn new(dict: &'a OptimizedDictionary, max_token_len: usize, reserved_offset: TokenId) -> Result<Self, TokenizeError> {
        if max_token_len < 1 {
            return Err(TokenizeError::MaxTokenLenOutOfRange(max_token_len));
        }
        Ok(Self { dict, max_token_len, reserved_offset })
    }

    pub fn encode(&self, output: &mut [TokenId], input: &str) -> usize {
        longest_match(self.dict, output, input, self.max_token_len, self.reserved_offset)
    }
}
