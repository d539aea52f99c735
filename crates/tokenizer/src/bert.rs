use std::fs;
use std::path::Path;

use tokenizers::normalizers::{BertNormalizer, NormalizerWrapper};
use tokenizers::Tokenizer;

use crate::encoding::{normalize_whitespace, PaddedEncoding};
use crate::error::{Result, TokenizerError};

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";

/// WordPiece tokenizer for BERT checkpoints, producing fixed-length
/// `[CLS] text [SEP]` encodings.
///
/// Normalization, pre-tokenization and the WordPiece model come from the
/// checkpoint's `tokenizer.json`; special tokens, truncation and padding are
/// applied here.
#[derive(Clone)]
pub struct BertTokenizer {
    inner: Tokenizer,
    cls_id: u32,
    sep_id: u32,
    lowercase: bool,
}

impl std::fmt::Debug for BertTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertTokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("lowercase", &self.lowercase)
            .finish()
    }
}

impl BertTokenizer {
    pub fn new(inner: Tokenizer) -> Result<Self> {
        let lookup = |token: &str| {
            inner
                .token_to_id(token)
                .ok_or_else(|| TokenizerError::MissingSpecialToken(token.to_string()))
        };
        let cls_id = lookup(CLS_TOKEN)?;
        let sep_id = lookup(SEP_TOKEN)?;

        Ok(Self {
            inner,
            cls_id,
            sep_id,
            lowercase: false,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let inner: Tokenizer = serde_json::from_str(json)?;
        Self::new(inner)
    }

    /// Swaps in an uncased BERT normalizer: lower-casing plus accent
    /// stripping, so `Lóve` and `love` share ids. With `false` the
    /// checkpoint's own normalizer is kept.
    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        if lowercase {
            self.inner.with_normalizer(NormalizerWrapper::BertNormalizer(
                BertNormalizer::new(true, true, Some(true), true),
            ));
        }
        self.lowercase = lowercase;
        self
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// WordPiece ids of `text` without special tokens.
    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let text = normalize_whitespace(text);
        let encoding = self.inner.encode(text.as_str(), false)?;
        Ok(encoding.get_ids().to_vec())
    }

    /// `[CLS] tokens [SEP]`, truncated so the whole sequence fits in `max_len`,
    /// then zero-padded to exactly `max_len`.
    pub fn encode_plus(&self, text: &str, max_len: usize) -> Result<PaddedEncoding> {
        if max_len < 2 {
            return Err(TokenizerError::MaxLenTooSmall(max_len));
        }

        let tokens = self.tokenize(text)?;
        let budget = max_len - 2;

        let mut ids = Vec::with_capacity(max_len);
        ids.push(self.cls_id as i64);
        ids.extend(tokens.iter().take(budget).map(|&t| t as i64));
        ids.push(self.sep_id as i64);

        Ok(PaddedEncoding::from_ids(ids, max_len))
    }
}
