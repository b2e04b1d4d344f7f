use super::Config;
use crate::secret::Secret;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SNAPSOLVE_PROVIDER") {
            let v = v.trim().to_lowercase();
            if v.is_empty() {
                tracing::warn!("ignoring empty SNAPSOLVE_PROVIDER");
            } else {
                self.provider.id = v;
            }
        }
        if let Ok(v) = std::env::var("SNAPSOLVE_API_KEY") {
            self.provider.api_key = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("SNAPSOLVE_BASE_URL") {
            self.provider.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("SNAPSOLVE_EXTRACTION_MODEL") {
            self.models.extraction = v;
        }
        if let Ok(v) = std::env::var("SNAPSOLVE_SOLUTION_MODEL") {
            self.models.solution = v;
        }
        if let Ok(v) = std::env::var("SNAPSOLVE_DEBUGGING_MODEL") {
            self.models.debugging = v;
        }
        if let Ok(v) = std::env::var("SNAPSOLVE_LANGUAGE") {
            self.pipeline.language = v;
        }
        if let Ok(v) = std::env::var("SNAPSOLVE_CHAT_TIMEOUT") {
            if let Ok(secs) = v.parse::<u64>() {
                self.provider.chat_timeout_secs = secs;
            } else {
                tracing::warn!("ignoring invalid SNAPSOLVE_CHAT_TIMEOUT value: {v}");
            }
        }
    }
}
