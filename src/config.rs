// src/config.rs
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default)]
    pub database_url: String,
    pub jwt_secret: String,
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default)]
    pub stripe_secret_key: String,
    #[serde(default = "default_stripe_api_url")]
    pub stripe_api_url: String,
    #[serde(default = "default_stripe_currency")]
    pub stripe_currency: String,

    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "default_site_name")]
    pub site_name: String,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_email")]
    pub default_from_email: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_inactive_days")]
    pub inactive_days: i64,
    #[serde(default = "default_task_retry_delay_secs")]
    pub task_retry_delay_secs: u64,
    #[serde(default = "default_task_max_retries")]
    pub task_max_retries: u32,
    #[serde(default = "default_course_cache_capacity")]
    pub course_cache_capacity: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

fn default_access_token_minutes() -> i64 {
    60
}

fn default_refresh_token_days() -> i64 {
    1
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_stripe_api_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_stripe_currency() -> String {
    "rub".to_string()
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_frontend_url() -> String {
    "https://frontend.yourdomain.com".to_string()
}

fn default_site_name() -> String {
    "My Platform".to_string()
}

fn default_smtp_host() -> String {
    "smtp.yandex.ru".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_from_email() -> String {
    "noreply@yourdomain.com".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

// six months of thirty days
fn default_inactive_days() -> i64 {
    180
}

fn default_task_retry_delay_secs() -> u64 {
    60
}

fn default_task_max_retries() -> u32 {
    3
}

fn default_course_cache_capacity() -> u64 {
    1000
}
