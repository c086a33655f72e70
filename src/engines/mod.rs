//! Concrete speech backends.
//!
//! - [`gtts`], [`openai`]: online services, registered in the
//!   [`BackendRegistry`](crate::BackendRegistry)
//! - `kokoro`: Kokoro-82M neural model (ONNX, espeak-ng required), enabled
//!   via the `kokoro` Cargo feature and constructed through the
//!   [`ModelCache`](crate::ModelCache)
//! - [`espeak`]: espeak-ng, the deterministic last resort

pub mod espeak;
pub mod gtts;
#[cfg(feature = "kokoro")]
pub mod kokoro;
pub mod neural;
pub mod openai;

use std::sync::Arc;

use crate::cache::NeuralFactory;
use crate::config::OrchestratorConfig;

/// The neural factory compiled into this build.
#[cfg(feature = "kokoro")]
pub fn default_neural_factory(config: &OrchestratorConfig) -> Arc<dyn NeuralFactory> {
    Arc::new(kokoro::KokoroFactory::from_config(config))
}

/// The neural factory compiled into this build.
#[cfg(not(feature = "kokoro"))]
pub fn default_neural_factory(_config: &OrchestratorConfig) -> Arc<dyn NeuralFactory> {
    log::debug!("Built without the `kokoro` feature; neural tier disabled");
    Arc::new(crate::cache::DisabledFactory)
}
