use crate::core::config::Endpoints;

use super::kind::LoaderKind;
use super::profile::ProfileSource;

pub const QUILT_MAIN_CLASS: &str = "org.quiltmc.loader.impl.launch.knot.KnotClient";

/// Quilt Meta mirrors Fabric Meta's API shape.
pub fn quilt_source(endpoints: &Endpoints) -> ProfileSource {
    ProfileSource {
        kind: LoaderKind::Quilt,
        meta_url: endpoints.quilt_meta.clone(),
        maven_url: endpoints.quilt_maven.clone(),
        default_main_class: QUILT_MAIN_CLASS,
    }
}
