#![allow(dead_code)]

pub mod fixtures;
pub mod pdf_assertions;

use quire::{Config, JobManager, RetentionPolicy, ServiceBuilder};
use quire_broker::testing::ScriptedFactory;
use quire_compose::InMemoryTemplateSource;
use quire_traits::ResourceProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small, fast settings: two workers, a short deadline, a fast sweeper and
/// millisecond backoff between conversion attempts.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.workers.count = 2;
    config.workers.queue_capacity = 8;
    config.jobs.deadline_ms = 10_000;
    config.jobs.sweep_interval_ms = 20;
    config.storage.artifact_ttl_secs = 60;
    config.storage.retention = RetentionPolicy::Ttl;
    config.broker.slots = 1;
    config.broker.attempt_timeout_ms = 2_000;
    config.broker.restart_timeout_ms = 1_000;
    config.broker.backoff_base_ms = 10;
    config.broker.backoff_max_ms = 50;
    config.assets.template_dir = PathBuf::from("templates");
    config
}

/// A running manager over in-memory templates and scripted conversion
/// engines.
pub struct TestService {
    pub manager: JobManager,
    pub engines: ScriptedFactory,
    pub templates: Arc<InMemoryTemplateSource>,
}

pub struct TestServiceBuilder {
    config: Config,
    engines: ScriptedFactory,
    resources: Option<Arc<dyn ResourceProvider>>,
    templates: Vec<String>,
}

impl TestServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            engines: ScriptedFactory::new(),
            resources: None,
            templates: vec![fixtures::LEDGER.to_string(), fixtures::QUOTE.to_string()],
        }
    }

    pub fn configure(mut self, edit: impl FnOnce(&mut Config)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn engines(mut self, engines: ScriptedFactory) -> Self {
        self.engines = engines;
        self
    }

    pub fn resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn template(mut self, json: &str) -> Self {
        self.templates.push(json.to_string());
        self
    }

    pub async fn start(self) -> TestService {
        init_logger();
        let templates = Arc::new(InMemoryTemplateSource::new());
        for json in &self.templates {
            templates.insert_json(json).expect("fixture template should parse");
        }

        let mut builder = ServiceBuilder::new(self.config)
            .with_template_source(templates.clone())
            .with_engine_factory(Arc::new(self.engines.clone()));
        if let Some(resources) = self.resources {
            builder = builder.with_resources(resources);
        }
        let manager = builder.start().await.expect("service should start");
        TestService { manager, engines: self.engines, templates }
    }
}

pub async fn start_service() -> TestService {
    TestServiceBuilder::new().start().await
}

/// Polls `check` every few milliseconds until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
