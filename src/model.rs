use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Integer liters. The portal reports fractional cubic meters; everything
/// this crate returns is scaled to liters.
pub type Liters = i64;

/// Consumption keyed by the portal's date string for the period.
pub type ConsumptionMap = HashMap<String, Liters>;

/// Portal credentials and the meter they select. Immutable for the lifetime
/// of a client.
#[derive(Debug, Clone)]
pub struct Account {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub counter_id: String,
    /// Bound on each network call. `None` leaves reqwest's default.
    pub timeout: Option<Duration>,
}

/// An authenticated portal session. The `eZSESSID` cookie lives in the
/// client's cookie jar; dropping the client closes the session.
#[derive(Debug)]
pub struct LoggedInAccount {
    pub base_url: String,
    pub counter_id: String,
    pub client: reqwest::Client,
}

/// Everything one `update()` run collects. Serialized field names match the
/// attribute names the portal's other integrations expose.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionResult {
    pub attribution: String,
    pub this_month_consumption: ConsumptionMap,
    pub previous_month_consumption: ConsumptionMap,
    pub history: ConsumptionMap,
    /// Most recent daily reading of the current month.
    pub state: Liters,
    pub highest_monthly_consumption: Liters,
    pub last_year_over_all: Liters,
    pub this_year_over_all: Liters,
}
