//! Flight delay-rate prediction: feature engineering, six-model training and
//! selection, frozen artifacts, and a lookup-first inference service.

pub mod artifacts;
pub mod config;
pub mod encoding;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod inference;
pub mod io;
pub mod model;
pub mod month;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod split;
pub mod stats;

pub use error::{DelayError, Result};
pub use inference::{FlightDelayPredictor, Prediction};
pub use pipeline::{run, RunSummary};
