use anyhow::Context;
use std::env;
use std::str::FromStr;

use crate::services::aggregator::AggregatorConfig;
use crate::services::content::ContentWeights;
use crate::services::hybrid::HybridConfig;
use crate::services::trainer::{FactorizationConfig, TrainerConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub aggregator: AggregatorConfig,
    pub trainer: TrainerConfig,
    pub content: ContentConfig,
    pub hybrid: HybridConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ContentConfig {
    pub weights: ContentWeights,
    pub experience_tolerance_years: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub interval_secs: u64,
    pub lease_ttl_secs: u64,
    pub lease_key: String,
}

fn parsed_var<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .unwrap_or_else(|e| panic!("{key} must be a valid value: {e}"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Config {
            service: ServiceConfig {
                port: parsed_var("PORT", "8014"),
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "recommendation-service".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: parsed_var("DB_MAX_CONNECTIONS", "10"),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            aggregator: AggregatorConfig {
                half_life_days: parsed_var("AGG_HALF_LIFE_DAYS", "30"),
                page_size: parsed_var("AGG_PAGE_SIZE", "500"),
                view_weight: parsed_var("AGG_VIEW_WEIGHT", "1"),
                bookmark_weight: parsed_var("AGG_BOOKMARK_WEIGHT", "3"),
                booking_weight: parsed_var("AGG_BOOKING_WEIGHT", "5"),
                rating_weight_max: parsed_var("AGG_RATING_WEIGHT_MAX", "2"),
            },
            trainer: TrainerConfig {
                factorization: FactorizationConfig {
                    factor_dim: parsed_var("TRAIN_FACTOR_DIM", "16"),
                    regularization: parsed_var("TRAIN_REG", "0.05"),
                    learning_rate: parsed_var("TRAIN_LEARNING_RATE", "0.01"),
                    max_epochs: parsed_var("TRAIN_MAX_EPOCHS", "60"),
                    loss_epsilon: parsed_var("TRAIN_LOSS_EPSILON", "0.0001"),
                    seed: parsed_var("TRAIN_SEED", "42"),
                },
                confidence_weight: parsed_var("TRAIN_CONFIDENCE", "1"),
                min_users: parsed_var("TRAIN_MIN_USERS", "5"),
                min_candidates: parsed_var("TRAIN_MIN_CANDIDATES", "5"),
            },
            content: ContentConfig {
                weights: ContentWeights {
                    industry: parsed_var("CONTENT_INDUSTRY_WEIGHT", "1"),
                    language: parsed_var("CONTENT_LANGUAGE_WEIGHT", "1"),
                    experience: parsed_var("CONTENT_EXPERIENCE_WEIGHT", "1"),
                },
                experience_tolerance_years: parsed_var("CONTENT_EXPERIENCE_TOLERANCE_YEARS", "3"),
            },
            hybrid: HybridConfig {
                blend_alpha: parsed_var("HYBRID_BLEND_ALPHA", "0.6"),
                max_results: parsed_var("HYBRID_MAX_RESULTS", "50"),
                scoring_concurrency: parsed_var("HYBRID_SCORING_CONCURRENCY", "8"),
            },
            pipeline: PipelineConfig {
                interval_secs: parsed_var("PIPELINE_INTERVAL_SECS", "3600"),
                lease_ttl_secs: parsed_var("PIPELINE_LEASE_TTL_SECS", "900"),
                lease_key: env::var("PIPELINE_LEASE_KEY")
                    .unwrap_or_else(|_| "mentora:recommendation:pipeline:lease".to_string()),
            },
        };

        if let Err(e) = config.aggregator.validate() {
            anyhow::bail!("invalid aggregator configuration: {e}");
        }
        if !(0.0..=1.0).contains(&config.hybrid.blend_alpha) {
            anyhow::bail!(
                "HYBRID_BLEND_ALPHA must be within [0, 1], got {}",
                config.hybrid.blend_alpha
            );
        }

        Ok(config)
    }
}
