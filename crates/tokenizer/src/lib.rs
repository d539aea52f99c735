pub mod error;
pub mod encoding;
pub mod bert;

pub use bert::BertTokenizer;
pub use encoding::{normalize_whitespace, PaddedEncoding};
pub use error::TokenizerError;
