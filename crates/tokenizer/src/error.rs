use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tokenizer definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tokenizer backend error: {0}")]
    Backend(String),

    #[error("Special token not in vocabulary: {0}")]
    MissingSpecialToken(String),

    #[error("max_len must leave room for [CLS] and [SEP], got {0}")]
    MaxLenTooSmall(usize),
}

impl From<tokenizers::Error> for TokenizerError {
    fn from(err: tokenizers::Error) -> Self {
        TokenizerError::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
