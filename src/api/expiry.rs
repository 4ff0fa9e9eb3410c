//! Expiry list endpoint.

use chrono::NaiveDate;

use crate::client::BackendClient;
use crate::constants::paths;
use crate::error::Result;
use crate::types::option_chain::ExpiryDatesResponse;

impl BackendClient {
    /// Retrieve the expiry dates available for the reference underlying,
    /// sorted ascending with duplicates removed.
    ///
    /// **Endpoint:** `GET /upstox/expiry-dates`
    pub async fn get_expiry_dates(&self) -> Result<Vec<NaiveDate>> {
        let resp: ExpiryDatesResponse = self.get(paths::EXPIRY_DATES).await?;
        let mut dates = resp.into_dates();
        dates.sort_unstable();
        dates.dedup();
        Ok(dates)
    }
}
