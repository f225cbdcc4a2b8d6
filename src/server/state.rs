use std::sync::Arc;

use crate::hashtags::HashtagOptions;
use crate::providers::{LabelDetector, TextTranslator};

/// Process-wide handles shared by every request. Nothing in here is mutated
/// after startup.
#[derive(Clone)]
pub struct ServerState {
    pub(crate) detector: Arc<dyn LabelDetector>,
    pub(crate) translator: Arc<dyn TextTranslator>,
    pub(crate) options: HashtagOptions,
}

impl ServerState {
    pub fn new(
        detector: Arc<dyn LabelDetector>,
        translator: Arc<dyn TextTranslator>,
        options: HashtagOptions,
    ) -> Self {
        Self {
            detector,
            translator,
            options,
        }
    }
}
