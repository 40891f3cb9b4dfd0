use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub session: Session,
	pub ingest: Ingest,
	#[serde(default)]
	pub retrieval: Retrieval,
	pub providers: Providers,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	#[serde(default = "default_true")]
	pub cors_allow_any: bool,
}

/// Idle-session eviction settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Session {
	pub idle_timeout_secs: u64,
	pub sweep_interval_secs: u64,
	/// When true, a session past its idle timeout is rejected with `Gone` even if the sweeper
	/// has not removed it yet.
	pub reject_expired_on_access: bool,
}
impl Default for Session {
	fn default() -> Self {
		Self { idle_timeout_secs: 900, sweep_interval_secs: 300, reject_expired_on_access: false }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Ingest {
	pub max_upload_bytes: u64,
	pub max_chars: u32,
	pub overlap_chars: u32,
	#[serde(default = "default_fetch_timeout_ms")]
	pub fetch_timeout_ms: u64,
	#[serde(default = "default_user_agent")]
	pub user_agent: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub k_per_doc: u32,
	pub k_total: u32,
	/// Results scoring at or below this value are dropped before generation.
	pub min_score: f32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { k_per_doc: 5, k_total: 5, min_score: 0.5 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	/// Optional. Name of an environment variable that supplies `api_key` when it is empty.
	pub api_key_env: Option<String>,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub api_key_env: Option<String>,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

fn default_true() -> bool {
	true
}

fn default_fetch_timeout_ms() -> u64 {
	15_000
}

fn default_user_agent() -> String {
	"Mozilla/5.0".to_string()
}
