use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use candle::{DType, Device, IndexOp, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::VarBuilder;
use candle_transformers::models::modernbert::{
    ClassifierConfig, ClassifierPooling, Config, ModernBertForSequenceClassification,
};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use super::Classifier;

/// Zero-shot classification via NLI entailment: every candidate label is
/// turned into a hypothesis, the (text, hypothesis) pairs are scored in one
/// batch, and the entailment probability becomes the label score.
pub struct ZeroShotClassifier {
    model: ModernBertForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    entailment_id: usize,
}

#[derive(Deserialize)]
struct NliLabelMap {
    #[serde(default)]
    label2id: HashMap<String, u32>,
}

impl ZeroShotClassifier {
    /// Fetch model + tokenizer through the hub cache and load them onto the
    /// selected device. Called once at startup; the instance is then shared
    /// read-only.
    pub fn load(model_id: &str, cache_dir: &Path, device_pref: Option<&str>) -> Result<Self> {
        let device = select_device(device_pref)?;
        info!(model_id, device = ?device, "loading zero-shot classifier");

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .build()?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let tokenizer_path = repo.get("tokenizer.json")?;
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("tokenizer load failed ({}): {e}", tokenizer_path.display()))?;
        tokenizer.with_padding(None);
        let _ = tokenizer.with_truncation(None);

        let config_path = repo.get("config.json")?;
        let raw_config = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Config = serde_json::from_str(&raw_config)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        let nli_labels: NliLabelMap = serde_json::from_str(&raw_config)?;
        let entailment_id = entailment_id(&nli_labels.label2id)?;
        patch_classifier_config(&mut config, nli_labels.label2id.len());

        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))?;
        let vb = load_var_builder(&weights_path, &device)?;
        let model = ModernBertForSequenceClassification::load(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            entailment_id,
        })
    }
}

impl Classifier for ZeroShotClassifier {
    fn classify(&self, text: &str, labels: &[String]) -> Result<Vec<(String, f32)>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }

        let mut encodings = Vec::with_capacity(labels.len());
        for label in labels {
            let hypothesis = hypothesis_for(label);
            let encoding = self
                .tokenizer
                .encode((text, hypothesis.as_str()), true)
                .map_err(|e| anyhow!("tokenizer encode error: {e}"))?;
            encodings.push(encoding);
        }

        let max_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let pad_id = pad_token_id(&self.tokenizer);

        let mut token_ids = Vec::with_capacity(labels.len() * max_len);
        let mut attention = Vec::with_capacity(labels.len() * max_len);
        for encoding in &encodings {
            let mut ids = encoding.get_ids().to_vec();
            let mut mask = encoding.get_attention_mask().to_vec();
            ids.resize(max_len, pad_id);
            mask.resize(max_len, 0);
            token_ids.extend(ids);
            attention.extend(mask);
        }

        let input_ids = Tensor::from_vec(token_ids, (labels.len(), max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(attention, (labels.len(), max_len), &self.device)?;

        let logits = self.model.forward(&input_ids, &attention_mask)?;
        let probabilities = softmax(&logits, D::Minus1)?;
        let entailment = probabilities
            .i((.., self.entailment_id))?
            .to_vec1::<f32>()?;

        Ok(labels.iter().cloned().zip(entailment).collect())
    }
}

fn hypothesis_for(label: &str) -> String {
    format!("This example is {label}.")
}

fn entailment_id(label2id: &HashMap<String, u32>) -> Result<usize> {
    label2id
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("entailment"))
        .map(|(_, id)| *id as usize)
        .ok_or_else(|| {
            let known = label2id.keys().cloned().collect::<Vec<_>>().join(", ");
            anyhow!("model config has no 'entailment' label (found: {known})")
        })
}

/// candle's ModernBERT config needs a populated classifier head section;
/// some hub checkpoints only carry the top-level label maps.
fn patch_classifier_config(config: &mut Config, num_labels: usize) {
    let present = config
        .classifier_config
        .as_ref()
        .map(|c| c.id2label.len())
        .unwrap_or(0);
    if present != num_labels && num_labels > 0 {
        let id2label: HashMap<String, String> = (0..num_labels)
            .map(|i| (i.to_string(), format!("label_{i}")))
            .collect();
        let label2id = id2label
            .iter()
            .map(|(k, v)| (v.clone(), k.clone()))
            .collect();
        config.classifier_config = Some(ClassifierConfig {
            id2label,
            label2id,
            classifier_pooling: ClassifierPooling::default(),
        });
    }
}

fn load_var_builder(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext == "safetensors" {
        let files = vec![path.to_path_buf()];
        unsafe {
            VarBuilder::from_mmaped_safetensors(&files, DType::F32, device)
                .map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
        }
    } else {
        VarBuilder::from_pth(path, DType::F32, device)
            .map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
    }
}

fn select_device(pref: Option<&str>) -> Result<Device> {
    match pref.map(str::trim).filter(|s| !s.is_empty()) {
        Some(pref) => {
            let lower = pref.to_ascii_lowercase();
            if lower == "cpu" {
                Ok(Device::Cpu)
            } else if lower.starts_with("cuda") || lower.starts_with("gpu") {
                let ordinal = pref
                    .split(':')
                    .nth(1)
                    .and_then(|part| part.parse::<usize>().ok())
                    .unwrap_or(0);
                Device::new_cuda(ordinal).map_err(|err| {
                    anyhow!("requested CUDA device {ordinal} but initialization failed: {err}")
                })
            } else {
                warn!("unrecognized device preference '{pref}', defaulting to auto");
                Ok(Device::cuda_if_available(0)?)
            }
        }
        None => Ok(Device::cuda_if_available(0)?),
    }
}

fn pad_token_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer
        .get_padding()
        .map(|params| params.pad_id)
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .unwrap_or(0)
}
