//! Local ONNX embeddings through fastembed.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use super::{EmbeddingBackend, EmbeddingError, EmbeddingResult};

/// fastembed model behind a mutex; `TextEmbedding::embed` needs exclusive access.
pub struct FastEmbedBackend {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

/// Map a configured model name to a fastembed model.
pub fn parse_model(name: &str) -> EmbeddingResult<EmbeddingModel> {
    match name {
        "AllMiniLML6V2" | "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" | "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" | "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" | "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" | "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(EmbeddingError::Init(format!(
            "unsupported fastembed model '{other}'"
        ))),
    }
}

impl FastEmbedBackend {
    pub fn new(model_name: &str) -> EmbeddingResult<Self> {
        let model = parse_model(model_name)?;

        tracing::info!(target: "embedding", "Loading fastembed model {model_name}");
        let mut text_model =
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(true))
                .map_err(|e| EmbeddingError::Init(e.to_string()))?;

        let sample = text_model
            .embed(vec!["dimension check"], None)
            .map_err(|e| EmbeddingError::Generation(e.to_string()))?;
        let dimension = sample
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbeddingError::Init("model returned no embedding".to_string()))?;

        Ok(Self {
            model: Mutex::new(text_model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingBackend for FastEmbedBackend {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Generation(e.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
