//! Startup provisioning of provider applications.
//!
//! Every configured project gets one provider application named
//! `{app_name_prefix}{project}`, with all supported event types and one
//! endpoint per type registered on it. The resulting project to application
//! mapping is the routing table dispatch tasks resolve against.

use hookrelay_core::RoutingTable;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{client::DeliveryClient, error::Result};

/// Naming of provider applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Prefix prepended to the project key to form the application name.
    pub app_name_prefix: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { app_name_prefix: "hookrelay-".to_string() }
    }
}

impl ProvisioningConfig {
    /// Returns the application name for `project`.
    pub fn application_name(&self, project: &str) -> String {
        format!("{}{project}", self.app_name_prefix)
    }
}

/// Ensures an application exists and is fully routed for every project.
///
/// # Errors
///
/// Aborts with the first provisioning error; no partial table is returned.
#[instrument(skip_all, fields(projects = projects.len()))]
pub async fn initialize_applications(
    client: &DeliveryClient,
    projects: &[String],
    config: &ProvisioningConfig,
    cancel: &CancellationToken,
) -> Result<RoutingTable> {
    let mut routes = Vec::with_capacity(projects.len());

    for project in projects {
        let name = config.application_name(project);
        let app_id = client.ensure_application(&name, cancel).await?;
        client.provision_routing(&app_id, cancel).await?;

        info!(project = %project, app_id = %app_id, "project routed");
        routes.push((project.clone(), app_id));
    }

    Ok(routes.into_iter().collect())
}
