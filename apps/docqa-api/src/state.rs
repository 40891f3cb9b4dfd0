use std::sync::Arc;

use docqa_service::DocqaService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<DocqaService>,
}
impl AppState {
	pub fn new(config: docqa_config::Config) -> Self {
		Self::with_service(DocqaService::new(config))
	}

	pub fn with_service(service: DocqaService) -> Self {
		Self { service: Arc::new(service) }
	}
}
