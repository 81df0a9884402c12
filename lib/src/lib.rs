pub mod backend;
pub mod config;
pub mod dataset;
mod error;
pub mod http;
pub mod insight;
pub mod lttb;
pub mod ml;
pub mod retry;
pub mod series;
pub mod server;
mod store;
pub mod summary;
pub mod timeseries;

pub use backend::SensorApi;
pub use config::{Config, LlmConfig};
pub use dataset::{CleanPayload, ColumnType, Dataset, Row, Schema};
pub use error::*;
pub use insight::{InsightClient, InsightRequest, Provider, CATEGORIES};
pub use lttb::{downsample, downsample_indices, Point};
pub use ml::MlClient;
pub use retry::RetryPolicy;
pub use server::AppState;
pub use store::*;
pub use timeseries::Aggregation;
