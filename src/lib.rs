pub mod api;
pub mod config;
pub mod dialog;
pub mod edit;
pub mod error;
pub mod logging;

use std::sync::Arc;

use crate::api::{ApiClient, BulkUpdateClient};
use crate::config::Settings;
use crate::dialog::BulkEditController;
use crate::edit::FieldCatalog;
use crate::error::AppError;

pub use crate::error::ErrorPresentation;

/// Initializes logging from `settings` and builds a dialog controller talking
/// to the configured record service.
pub fn connect(
    settings: &Settings,
    catalog: Arc<FieldCatalog>,
) -> Result<BulkEditController<BulkUpdateClient>, AppError> {
    logging::init(&settings.log_level, settings.log_format);

    let api = ApiClient::from_settings(settings)?;
    let client = BulkUpdateClient::new(api, settings.resource.clone());

    tracing::info!(
        "[BULK-EDIT] Connected to {} (resource: {})",
        api::sanitize_url_for_logs(&settings.base_url, settings.logging_mode),
        settings.resource
    );

    Ok(BulkEditController::new(
        Arc::new(client),
        catalog,
        settings.poll_policy(),
    ))
}
