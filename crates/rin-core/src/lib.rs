pub mod app_config;
pub mod config;
pub mod coupon;
pub mod dedup;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use coupon::{CouponMessage, NewCoupon, RawCandidate};
pub use dedup::{coupon_hash, normalize_code, normalize_source, normalize_url};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
