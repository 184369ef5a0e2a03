//! Process-wide settings shared by every subcommand.
//!
//! Each flag can also be set through the environment variable named next to
//! it; the command line wins.

use canopy_data::features::{DEFAULT_ALERT_THRESHOLD, LANDSAT_REFLECTANCE_SCALE};
use canopy_data::FeatureConfig;
use canopy_db::IndexColumn;
use canopy_eval::cache::DEFAULT_EVAL_TIMEOUT;
use canopy_eval::report::{DEFAULT_API_BASE, DEFAULT_MODEL};
use canopy_eval::{CacheConfig, ChatConfig};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Radar observations CSV (forest,date,VV,VH[,valid])
    #[arg(long, global = true, env = "CANOPY_RADAR_CSV", default_value = "SentinelMakueni.csv")]
    pub radar_csv: PathBuf,

    /// Optical observations CSV (date,B4_mean,B5_mean[,forest])
    #[arg(long, global = true, env = "CANOPY_OPTICAL_CSV")]
    pub optical_csv: Option<PathBuf>,

    /// Dryness index above which a record raises an alert
    #[arg(long, global = true, env = "CANOPY_ALERT_THRESHOLD", default_value_t = DEFAULT_ALERT_THRESHOLD)]
    pub alert_threshold: f64,

    /// Multiplier from raw optical band values to reflectance
    #[arg(long, global = true, env = "CANOPY_OPTICAL_SCALE", default_value_t = LANDSAT_REFLECTANCE_SCALE)]
    pub optical_scale: f64,

    /// API key for the report model
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    pub api_key: String,

    /// Report model name
    #[arg(long, global = true, env = "CANOPY_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, global = true, env = "CANOPY_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// ISO3 country code for the economic series
    #[arg(long, global = true, env = "CANOPY_COUNTRY", default_value = "KEN")]
    pub country: String,

    /// First year of the economic series
    #[arg(long, global = true, env = "CANOPY_START_YEAR", default_value_t = 2013)]
    pub start_year: i32,

    /// Last year of the economic series
    #[arg(long, global = true, env = "CANOPY_END_YEAR", default_value_t = 2024)]
    pub end_year: i32,

    /// Index column correlated with the economic series
    #[arg(long, global = true, env = "CANOPY_CORRELATION_INDEX", default_value = "ndvi")]
    pub correlation_index: IndexColumn,

    /// Seconds before an evaluation is abandoned
    #[arg(long, global = true, env = "CANOPY_EVAL_TIMEOUT_SECS", default_value_t = DEFAULT_EVAL_TIMEOUT.as_secs())]
    pub eval_timeout_secs: u64,
}

impl Settings {
    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            alert_threshold: self.alert_threshold,
            optical_scale: self.optical_scale,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            timeout: Duration::from_secs(self.eval_timeout_secs),
        }
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            base_url: self.api_base.clone(),
        }
    }
}
