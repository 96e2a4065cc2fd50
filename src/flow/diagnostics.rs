//! Best-effort capture of on-screen error text after a failure

use crate::driver::{Locator, UiDriver};

/// Read the error surface of the current screen
///
/// Never fails: a missing or unreadable surface is a normal outcome and
/// yields `None`. Both outcomes are logged at error level so they land next
/// to the failure in the run log.
pub async fn capture_diagnostics(driver: &mut dyn UiDriver, surface: &Locator) -> Option<String> {
    match driver.get_text(surface).await {
        Ok(text) if !text.trim().is_empty() => {
            tracing::error!("Error info: {}", text.trim());
            Some(text.trim().to_string())
        }
        Ok(_) => {
            tracing::error!(%surface, "Error surface is empty");
            None
        }
        Err(e) => {
            tracing::error!(%surface, "Could not retrieve error info: {e}");
            None
        }
    }
}
