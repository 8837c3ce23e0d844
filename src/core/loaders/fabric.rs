use crate::core::config::Endpoints;

use super::kind::LoaderKind;
use super::profile::ProfileSource;

pub const FABRIC_MAIN_CLASS: &str = "net.fabricmc.loader.impl.launch.knot.KnotClient";

/// Fabric Meta + Fabric Maven.
pub fn fabric_source(endpoints: &Endpoints) -> ProfileSource {
    ProfileSource {
        kind: LoaderKind::Fabric,
        meta_url: endpoints.fabric_meta.clone(),
        maven_url: endpoints.fabric_maven.clone(),
        default_main_class: FABRIC_MAIN_CLASS,
    }
}
