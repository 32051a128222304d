//! Per-system factories and the registry that owns them.
//!
//! A factory loads its shared read-only state once (tables, caches,
//! documents) and then builds per-request provider instances bound to an
//! operation context and supplements. Use counters are advisory.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::provider::CodeSystemProvider;
use crate::providers::{
    area::AreaProvider, bcp47::Bcp47Provider, country::CountryProvider, cpt::CptProvider,
    cpt::CptShared, fhir::FhirProvider, hgvs::HgvsProvider, loinc::LoincProvider,
    loinc::LoincShared, mime::MimeProvider, ndc::NdcProvider, ndc::NdcShared, omop::OmopProvider,
    omop::OmopShared, snomed::SnomedProvider, ucum::UcumProvider, unii::UniiProvider,
    unii::UniiShared, uri::UriProvider,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use terminus_models::{CodeSystem, CodeSystemDocument};
use terminus_snomed::CacheFile;

pub trait ProviderFactory: Send + Sync {
    fn system(&self) -> &str;

    fn default_version(&self) -> Option<&str> {
        None
    }

    fn build(
        &self,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Box<dyn CodeSystemProvider>>;

    /// Monotonic build counter; advisory only.
    fn use_count(&self) -> u64;
}

macro_rules! stateless_factory {
    ($factory:ident, $provider:ident, $module:ident) => {
        #[derive(Default)]
        pub struct $factory {
            uses: AtomicU64,
        }

        impl $factory {
            pub fn new() -> Self {
                Self::default()
            }
        }

        impl ProviderFactory for $factory {
            fn system(&self) -> &str {
                crate::providers::$module::SYSTEM
            }

            fn build(
                &self,
                op_context: Arc<OperationContext>,
                supplements: Vec<Arc<CodeSystem>>,
            ) -> Result<Box<dyn CodeSystemProvider>> {
                self.uses.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new($provider::new(op_context, supplements)?))
            }

            fn use_count(&self) -> u64 {
                self.uses.load(Ordering::Relaxed)
            }
        }
    };
}

stateless_factory!(CountryFactory, CountryProvider, country);
stateless_factory!(AreaFactory, AreaProvider, area);
stateless_factory!(UriFactory, UriProvider, uri);
stateless_factory!(MimeFactory, MimeProvider, mime);
stateless_factory!(Bcp47Factory, Bcp47Provider, bcp47);

pub struct UcumFactory {
    service: &'static terminus_ucum::UcumService,
    uses: AtomicU64,
}

impl UcumFactory {
    pub fn new() -> Self {
        Self {
            service: terminus_ucum::shared(),
            uses: AtomicU64::new(0),
        }
    }
}

impl Default for UcumFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for UcumFactory {
    fn system(&self) -> &str {
        crate::providers::ucum::SYSTEM
    }

    fn default_version(&self) -> Option<&str> {
        Some(self.service.version())
    }

    fn build(
        &self,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Box<dyn CodeSystemProvider>> {
        self.uses.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(UcumProvider::new(
            self.service,
            op_context,
            supplements,
        )?))
    }

    fn use_count(&self) -> u64 {
        self.uses.load(Ordering::Relaxed)
    }
}

/// Factory over one parsed CodeSystem resource.
pub struct FhirFactory {
    document: Arc<CodeSystemDocument>,
    uses: AtomicU64,
}

impl FhirFactory {
    pub fn new(document: CodeSystemDocument) -> Self {
        Self {
            document: Arc::new(document),
            uses: AtomicU64::new(0),
        }
    }

    pub fn from_resource(resource: CodeSystem) -> Result<Self> {
        Ok(Self::new(CodeSystemDocument::new(resource)?))
    }
}

impl ProviderFactory for FhirFactory {
    fn system(&self) -> &str {
        self.document.url()
    }

    fn default_version(&self) -> Option<&str> {
        self.document.version()
    }

    fn build(
        &self,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Box<dyn CodeSystemProvider>> {
        self.uses.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(FhirProvider::new(
            self.document.clone(),
            op_context,
            supplements,
        )?))
    }

    fn use_count(&self) -> u64 {
        self.uses.load(Ordering::Relaxed)
    }
}

pub struct SnomedFactory {
    cache: Arc<CacheFile>,
    uses: AtomicU64,
}

impl SnomedFactory {
    pub fn new(cache: CacheFile) -> Self {
        Self {
            cache: Arc::new(cache),
            uses: AtomicU64::new(0),
        }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(CacheFile::open(path)?))
    }
}

impl ProviderFactory for SnomedFactory {
    fn system(&self) -> &str {
        crate::providers::snomed::SYSTEM
    }

    fn default_version(&self) -> Option<&str> {
        Some(self.cache.version_uri())
    }

    fn build(
        &self,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Box<dyn CodeSystemProvider>> {
        self.uses.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(SnomedProvider::new(
            self.cache.clone(),
            op_context,
            supplements,
        )?))
    }

    fn use_count(&self) -> u64 {
        self.uses.load(Ordering::Relaxed)
    }
}

macro_rules! database_factory {
    ($factory:ident, $provider:ident, $shared:ident, $module:ident) => {
        pub struct $factory {
            shared: Arc<$shared>,
            pool: SqlitePool,
            uses: AtomicU64,
        }

        impl $factory {
            pub async fn load(pool: SqlitePool) -> Result<Self> {
                let shared = $shared::load(&pool).await?;
                Ok(Self {
                    shared,
                    pool,
                    uses: AtomicU64::new(0),
                })
            }
        }

        impl ProviderFactory for $factory {
            fn system(&self) -> &str {
                crate::providers::$module::SYSTEM
            }

            fn default_version(&self) -> Option<&str> {
                self.shared.version.as_deref()
            }

            fn build(
                &self,
                op_context: Arc<OperationContext>,
                supplements: Vec<Arc<CodeSystem>>,
            ) -> Result<Box<dyn CodeSystemProvider>> {
                self.uses.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new($provider::new(
                    self.shared.clone(),
                    self.pool.clone(),
                    op_context,
                    supplements,
                )?))
            }

            fn use_count(&self) -> u64 {
                self.uses.load(Ordering::Relaxed)
            }
        }
    };
}

database_factory!(LoincFactory, LoincProvider, LoincShared, loinc);
database_factory!(NdcFactory, NdcProvider, NdcShared, ndc);
database_factory!(OmopFactory, OmopProvider, OmopShared, omop);
database_factory!(CptFactory, CptProvider, CptShared, cpt);
database_factory!(UniiFactory, UniiProvider, UniiShared, unii);

pub struct HgvsFactory {
    endpoint: String,
    client: reqwest::Client,
    uses: AtomicU64,
}

impl HgvsFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: HgvsProvider::default_client(),
            uses: AtomicU64::new(0),
        }
    }
}

impl ProviderFactory for HgvsFactory {
    fn system(&self) -> &str {
        crate::providers::hgvs::SYSTEM
    }

    fn build(
        &self,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Box<dyn CodeSystemProvider>> {
        self.uses.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(HgvsProvider::new(
            self.endpoint.clone(),
            self.client.clone(),
            op_context,
            supplements,
        )?))
    }

    fn use_count(&self) -> u64 {
        self.uses.load(Ordering::Relaxed)
    }
}

/// URI (+ optional version) → factory map.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Vec<Arc<dyn ProviderFactory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        tracing::info!(system = factory.system(), "registering code system factory");
        self.factories
            .entry(factory.system().to_string())
            .or_default()
            .push(factory);
    }

    /// The standard built-in systems.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CountryFactory::new()));
        registry.register(Arc::new(AreaFactory::new()));
        registry.register(Arc::new(UriFactory::new()));
        registry.register(Arc::new(MimeFactory::new()));
        registry.register(Arc::new(Bcp47Factory::new()));
        registry.register(Arc::new(UcumFactory::new()));
        registry
    }

    pub fn systems(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn factory(&self, system: &str, version: Option<&str>) -> Option<&Arc<dyn ProviderFactory>> {
        let candidates = self.factories.get(system)?;
        match version {
            None => candidates.first(),
            Some(v) => candidates
                .iter()
                .find(|f| f.default_version() == Some(v))
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|f| f.default_version().is_some_and(|dv| dv.starts_with(v)))
                }),
        }
    }

    /// Build a provider for one operation. Supplements are validated by
    /// the provider against its host system.
    pub fn provider_for(
        &self,
        system: &str,
        version: Option<&str>,
        op_context: Arc<OperationContext>,
        supplements: Vec<Arc<CodeSystem>>,
    ) -> Result<Box<dyn CodeSystemProvider>> {
        let factory = self.factory(system, version).ok_or_else(|| {
            Error::Internal(match version {
                Some(v) => format!("no provider for {system} version {v}"),
                None => format!("no provider for {system}"),
            })
        })?;
        factory.build(op_context, supplements)
    }
}
