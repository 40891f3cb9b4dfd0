mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Ingest, LlmProviderConfig, Providers, Retrieval, Service,
	Session,
};

use std::{env, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	resolve_api_keys(&mut cfg)?;

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.session.idle_timeout_secs == 0 {
		return Err(Error::Validation {
			message: "session.idle_timeout_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.session.sweep_interval_secs == 0 {
		return Err(Error::Validation {
			message: "session.sweep_interval_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.ingest.max_upload_bytes == 0 {
		return Err(Error::Validation {
			message: "ingest.max_upload_bytes must be greater than zero.".to_string(),
		});
	}
	if cfg.ingest.max_chars == 0 {
		return Err(Error::Validation {
			message: "ingest.max_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.ingest.overlap_chars >= cfg.ingest.max_chars {
		return Err(Error::Validation {
			message: "ingest.overlap_chars must be less than ingest.max_chars.".to_string(),
		});
	}
	if cfg.retrieval.k_per_doc == 0 {
		return Err(Error::Validation {
			message: "retrieval.k_per_doc must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.k_total == 0 {
		return Err(Error::Validation {
			message: "retrieval.k_total must be greater than zero.".to_string(),
		});
	}
	if !cfg.retrieval.min_score.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.min_score must be a finite number.".to_string(),
		});
	}
	if !(0.0..1.0).contains(&cfg.retrieval.min_score) {
		return Err(Error::Validation {
			message: "retrieval.min_score must be in the range 0.0-1.0 (exclusive).".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if !cfg.providers.llm.temperature.is_finite() || cfg.providers.llm.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.llm.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	for (label, provider_id, key) in [
		("embedding", &cfg.providers.embedding.provider_id, &cfg.providers.embedding.api_key),
		("llm", &cfg.providers.llm.provider_id, &cfg.providers.llm.api_key),
	] {
		if provider_id.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} provider_id must be non-empty."),
			});
		}
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}

	let embedding_base = cfg.providers.embedding.api_base.trim_end_matches('/').to_string();
	let llm_base = cfg.providers.llm.api_base.trim_end_matches('/').to_string();

	cfg.providers.embedding.api_base = embedding_base;
	cfg.providers.llm.api_base = llm_base;
}

fn resolve_api_keys(cfg: &mut Config) -> Result<()> {
	let embedding = &mut cfg.providers.embedding;

	if embedding.api_key.trim().is_empty()
		&& let Some(name) = embedding.api_key_env.as_deref()
	{
		embedding.api_key = read_env("providers.embedding.api_key_env", name)?;
	}

	let llm = &mut cfg.providers.llm;

	if llm.api_key.trim().is_empty()
		&& let Some(name) = llm.api_key_env.as_deref()
	{
		llm.api_key = read_env("providers.llm.api_key_env", name)?;
	}

	Ok(())
}

fn read_env(key: &str, name: &str) -> Result<String> {
	env::var(name).map_err(|_| Error::MissingEnv { key: key.to_string(), name: name.to_string() })
}
