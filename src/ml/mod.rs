pub mod cnn_model;
pub mod training;

pub use cnn_model::{BasicCnn, ModelConfig};
pub use training::{evaluate, model_config, train_model, EvaluationMetrics, StepMetrics, TrainingReport};
