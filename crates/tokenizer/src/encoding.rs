use serde::{Deserialize, Serialize};

/// Id written into every padded position of every field.
pub const PAD_ID: i64 = 0;

/// A single-segment encoding padded to a fixed length.
///
/// All three vectors have the same length; `attention_mask` is a prefix of
/// ones (real tokens) followed by zeros (padding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddedEncoding {
    pub ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl PaddedEncoding {
    /// Pads `ids` (special tokens already included) up to `max_len`.
    pub fn from_ids(ids: Vec<i64>, max_len: usize) -> Self {
        let real = ids.len().min(max_len);
        let mut ids = ids;
        ids.truncate(real);

        let mut attention_mask = vec![1; real];
        let mut token_type_ids = vec![0; real];

        let padding_length = max_len - real;
        ids.extend(std::iter::repeat(PAD_ID).take(padding_length));
        attention_mask.extend(std::iter::repeat(0).take(padding_length));
        token_type_ids.extend(std::iter::repeat(PAD_ID).take(padding_length));

        Self {
            ids,
            attention_mask,
            token_type_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of non-padding positions.
    pub fn num_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_max_len() {
        let enc = PaddedEncoding::from_ids(vec![2, 7, 3], 6);
        assert_eq!(enc.ids, vec![2, 7, 3, 0, 0, 0]);
        assert_eq!(enc.attention_mask, vec![1, 1, 1, 0, 0, 0]);
        assert_eq!(enc.token_type_ids, vec![0; 6]);
        assert_eq!(enc.num_tokens(), 3);
    }

    #[test]
    fn exact_length_needs_no_padding() {
        let enc = PaddedEncoding::from_ids(vec![2, 7, 3], 3);
        assert_eq!(enc.len(), 3);
        assert_eq!(enc.attention_mask, vec![1, 1, 1]);
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(normalize_whitespace("  great \t film\n\n really  "), "great film really");
        assert_eq!(normalize_whitespace("   "), "");
    }
}
