pub mod api;
pub mod model;

use chrono::{Datelike, Local, NaiveDate};
use serde_json::Value;
use std::time::Duration;

use api::series;
use api::{Error, Stage};
use model::{Account, ConsumptionResult, LoggedInAccount};

pub const BASE_URL: &str = "https://www.toutsurmoneau.fr";

const ATTRIBUTION: &str = "Data provided by toutsurmoneau.fr";

pub fn account(
    base_url: String,
    username: String,
    password: String,
    counter_id: String,
    timeout: Option<Duration>,
) -> Account {
    Account {
        base_url,
        username,
        password,
        counter_id,
        timeout,
    }
}

/// Last day of the month before `today`'s.
fn previous_month(today: NaiveDate) -> Result<NaiveDate, Error> {
    today
        .with_day(1)
        .and_then(|first| first.pred_opt())
        .ok_or(Error::InternalError)
}

/// Assemble the final result from the three raw series. Pure; the only
/// failure mode is a malformed series, tagged with its stage.
fn build_result(
    this_month: &[Value],
    previous_month: &[Value],
    history: &[Value],
) -> Result<ConsumptionResult, Error> {
    let state = series::latest_reading(this_month)?;
    let this_month_consumption = series::to_consumption_map(this_month, 0, 1, Stage::ThisMonth)?;
    let previous_month_consumption =
        series::to_consumption_map(previous_month, 0, 1, Stage::PreviousMonth)?;
    let (history, summary) = series::split_history(history)?;

    Ok(ConsumptionResult {
        attribution: ATTRIBUTION.to_string(),
        this_month_consumption,
        previous_month_consumption,
        history,
        state,
        highest_monthly_consumption: summary.highest_monthly_consumption,
        last_year_over_all: summary.last_year_over_all,
        this_year_over_all: summary.this_year_over_all,
    })
}

async fn fetch_all(session: &LoggedInAccount) -> Result<ConsumptionResult, Error> {
    let today = Local::now().date_naive();
    let previous = previous_month(today)?;

    let this_month = api::month_data(session, today, Stage::ThisMonth).await?;
    let previous_month = api::month_data(session, previous, Stage::PreviousMonth).await?;
    let history = api::history_data(session).await?;

    build_result(&this_month, &previous_month, &history)
}

/// One full collection cycle: login, fetch the current and previous month's
/// daily series and the long-run history, and assemble the result. The
/// first error aborts the remaining stages; nothing partial is ever
/// returned. The session is released on every path.
pub async fn update(account: &Account) -> Result<ConsumptionResult, Error> {
    let session = api::login(account).await?;
    let result = fetch_all(&session).await;
    close_session(session);
    result
}

/// Release the session; the cookie jar goes with the client. Taking the
/// session by value makes double-close and use-after-close compile errors.
pub fn close_session(session: LoggedInAccount) {
    log::debug!("closing session for counter {}", session.counter_id);
    drop(session);
}
