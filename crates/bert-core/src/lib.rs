pub mod layers;
pub mod attention;
pub mod encoder;
pub mod classifier;
pub mod config;
pub mod safetensors_util;

pub use classifier::{SentimentClassifier, ENCODER_PREFIX};
pub use config::BertConfig;
pub use encoder::BertModel;
pub use layers::{DECAY_GROUP, NO_DECAY_GROUP};
