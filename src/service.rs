use crate::config::Config;
use crate::error::Result;
use crate::jobs::{JobManager, ManagerSettings, RenderPipeline};
use log::info;
use quire_broker::{ConversionBroker, EngineFactory, SofficeFactory};
use quire_compose::{Composer, DirectoryTemplateSource, TemplateSource};
use quire_office::OdtWriter;
use quire_render_lopdf::{FontLibrary, PdfRenderer};
use quire_resource::{FilesystemResourceProvider, InMemoryResourceProvider};
use quire_traits::ResourceProvider;
use std::sync::Arc;

/// Wires templates, fonts, assets and the conversion broker into a running
/// [`JobManager`].
///
/// Anything not set explicitly is built from the [`Config`]: templates from
/// `assets.template_dir`, fonts from `assets.font_dir`, images from
/// `assets.resource_dir` and one soffice engine per broker slot.
pub struct ServiceBuilder {
    config: Config,
    engines: Option<Arc<dyn EngineFactory>>,
    templates: Option<Arc<dyn TemplateSource>>,
    resources: Option<Arc<dyn ResourceProvider>>,
    fonts: Option<Arc<FontLibrary>>,
}

impl ServiceBuilder {
    pub fn new(config: Config) -> Self {
        Self { config, engines: None, templates: None, resources: None, fonts: None }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the soffice engines, e.g. with a scripted factory in tests.
    pub fn with_engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engines = Some(factory);
        self
    }

    pub fn with_template_source(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.templates = Some(source);
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_fonts(mut self, fonts: Arc<FontLibrary>) -> Self {
        self.fonts = Some(fonts);
        self
    }

    /// Builds the synchronous stages only. Enough for CSV export or any use
    /// that never converts.
    pub fn build_pipeline(&self) -> Result<RenderPipeline> {
        let assets = &self.config.assets;
        let templates = match &self.templates {
            Some(source) => Arc::clone(source),
            None => {
                let source = DirectoryTemplateSource::load(&assets.template_dir)?;
                info!("Loaded {} template(s) from '{}'.", source.ids().len(), assets.template_dir.display());
                Arc::new(source) as Arc<dyn TemplateSource>
            }
        };

        let fonts = match &self.fonts {
            Some(fonts) => Arc::clone(fonts),
            None => Arc::new(match &assets.font_dir {
                Some(dir) => FontLibrary::load_dir(dir)?,
                None => FontLibrary::new(),
            }),
        };

        let resources: Arc<dyn ResourceProvider> = match (&self.resources, &assets.resource_dir) {
            (Some(resources), _) => Arc::clone(resources),
            (None, Some(dir)) => Arc::new(FilesystemResourceProvider::new(dir)),
            (None, None) => Arc::new(InMemoryResourceProvider::new()),
        };

        let renderer = PdfRenderer::new(fonts).with_resources(Arc::clone(&resources));
        let mut writer = OdtWriter::new().with_resources(resources);
        if let Some(dir) = &self.config.broker.work_dir {
            writer = writer.with_temp_dir(dir);
        }
        Ok(RenderPipeline::new(Composer::new(templates), renderer, writer))
    }

    /// Builds the pipeline, starts the broker's engines and spawns the
    /// workers. Must be called inside a tokio runtime.
    pub async fn start(self) -> Result<JobManager> {
        let pipeline = Arc::new(self.build_pipeline()?);

        let engines = self.engines.unwrap_or_else(|| {
            let engine = &self.config.broker.engine;
            let mut factory = SofficeFactory::new(&engine.program);
            if let Some(root) = &engine.profile_root {
                factory = factory.with_profile_root(root);
            }
            Arc::new(factory) as Arc<dyn EngineFactory>
        });

        let broker = ConversionBroker::start(self.config.broker.to_broker_config(), engines).await;

        Ok(JobManager::start(ManagerSettings::from(&self.config), pipeline, broker))
    }
}
