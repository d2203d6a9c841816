#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use thiserror::Error;

pub mod num;
pub mod value;

/// Errors that can occur while turning user text into bytes or numbers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("value {text:?} does not fit in {len} bytes")]
    Overflow { text: String, len: usize },
    #[error("value {text:?} is {actual} bytes long, expected {expected}")]
    LengthMismatch { text: String, expected: usize, actual: usize },
    #[error("malformed value {0:?}")]
    Malformed(String),
}

impl ValueError {
    pub(crate) fn overflow(text: &str, len: usize) -> Self {
        Self::Overflow { text: text.to_string(), len }
    }
}
