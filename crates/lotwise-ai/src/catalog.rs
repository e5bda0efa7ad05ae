//! The set of scorers available to the router, loaded once.

use std::path::Path;
use std::sync::Arc;

use lotwise_core::features::{specialist_schema, UNIFIED_SCHEMA};
use lotwise_core::{PlatformId, SchemaRegistry};
use tracing::{info, warn};

use crate::model::load_model;
use crate::scorer::{ModelError, Scorer};

/// Loaded generalist and specialists. A tier whose model failed to load is
/// simply absent.
#[derive(Clone, Default)]
pub struct ModelCatalog {
    generalist: Option<Arc<dyn Scorer>>,
    specialists: Vec<(PlatformId, Arc<dyn Scorer>)>,
}

impl std::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("generalist", &self.generalist.as_ref().map(|s| s.name().to_string()))
            .field(
                "specialists",
                &self
                    .specialists
                    .iter()
                    .map(|(p, s)| format!("{p}:{}", s.name()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ModelCatalog {
    /// Load `unified.json` and `<platform>.json` for each platform from `dir`.
    ///
    /// Failures are logged and leave that tier out; this never errors.
    pub fn load(dir: &Path, registry: &SchemaRegistry, platforms: &[PlatformId]) -> Self {
        let mut catalog = Self::default();

        match load_checked(&dir.join("unified.json"), registry, UNIFIED_SCHEMA) {
            Ok(scorer) => catalog.generalist = Some(scorer),
            Err(e) => warn!(error = %e, "generalist model unavailable; tier disabled"),
        }

        for platform in platforms {
            let path = dir.join(format!("{}.json", platform.as_str()));
            match load_checked(&path, registry, &specialist_schema(platform)) {
                Ok(scorer) => catalog.specialists.push((platform.clone(), scorer)),
                Err(e) => {
                    warn!(platform = %platform, error = %e, "specialist model unavailable; tier disabled")
                }
            }
        }

        info!(
            generalist = catalog.generalist.is_some(),
            specialists = catalog.specialists.len(),
            dir = %dir.display(),
            "model catalog ready"
        );
        catalog
    }

    pub fn with_generalist(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.generalist = Some(scorer);
        self
    }

    pub fn with_specialist(mut self, platform: PlatformId, scorer: Arc<dyn Scorer>) -> Self {
        self.specialists.retain(|(p, _)| *p != platform);
        self.specialists.push((platform, scorer));
        self
    }

    pub fn generalist(&self) -> Option<&Arc<dyn Scorer>> {
        self.generalist.as_ref()
    }

    pub fn specialist(&self, platform: &PlatformId) -> Option<&Arc<dyn Scorer>> {
        self.specialists
            .iter()
            .find(|(p, _)| p == platform)
            .map(|(_, s)| s)
    }
}

fn load_checked(
    path: &Path,
    registry: &SchemaRegistry,
    expected: &str,
) -> Result<Arc<dyn Scorer>, ModelError> {
    let scorer = load_model(path, registry)?;
    if scorer.schema() != expected {
        return Err(ModelError::SchemaMismatch {
            model: scorer.name().to_string(),
            expected: expected.to_string(),
            found: scorer.schema().to_string(),
        });
    }
    Ok(scorer)
}
