use serde_json::Value;

use crate::api::error::{Error, Stage};
use crate::model::{ConsumptionMap, Liters};

/// Scale fractional cubic meters to integer liters. Truncates toward zero,
/// so for the non-negative volumes the portal serves this is
/// `floor(v * 1000)`.
pub fn to_liters(value: f64) -> Liters {
    (value * 1000.0) as Liters
}

fn date_at(point: &Value, index: usize, stage: Stage) -> Result<String, Error> {
    point
        .get(index)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            Error::Data(
                stage,
                format!("no date string at index {} in {}", index, point),
            )
        })
}

fn volume_at(point: &Value, index: usize, stage: Stage) -> Result<Liters, Error> {
    point
        .get(index)
        .and_then(Value::as_f64)
        .map(to_liters)
        .ok_or_else(|| {
            Error::Data(
                stage,
                format!("no numeric volume at index {} in {}", index, point),
            )
        })
}

/// Reshape raw series points into a date -> liters map. Dates and volumes
/// sit at fixed tuple positions; any extra fields are ignored. A duplicate
/// date overwrites the earlier entry.
pub fn to_consumption_map(
    points: &[Value],
    date_index: usize,
    value_index: usize,
    stage: Stage,
) -> Result<ConsumptionMap, Error> {
    let mut consumption = ConsumptionMap::new();

    for point in points {
        let date = date_at(point, date_index, stage)?;
        let volume = volume_at(point, value_index, stage)?;
        consumption.insert(date, volume);
    }

    Ok(consumption)
}

/// The three scalars trailing the history series, scaled to liters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistorySummary {
    pub this_year_over_all: Liters,
    pub last_year_over_all: Liters,
    pub highest_monthly_consumption: Liters,
}

fn aggregate(value: &Value) -> Result<Liters, Error> {
    value.as_f64().map(to_liters).ok_or_else(|| {
        Error::Data(
            Stage::History,
            format!("non-numeric trailing aggregate: {}", value),
        )
    })
}

/// Split the raw history series into per-period records and the three
/// trailing aggregates (year to date, last year, highest month, in that
/// literal order).
///
/// Unlike the monthly series, history records carry their date at tuple
/// index 3 and the volume at index 1. Quirk of the upstream format, kept
/// as observed.
pub fn split_history(points: &[Value]) -> Result<(ConsumptionMap, HistorySummary), Error> {
    if points.len() < 3 {
        return Err(Error::Data(
            Stage::History,
            format!("series of {} is too short to carry aggregates", points.len()),
        ));
    }

    let (records, aggregates) = points.split_at(points.len() - 3);

    let history = to_consumption_map(records, 3, 1, Stage::History)?;
    let summary = HistorySummary {
        this_year_over_all: aggregate(&aggregates[0])?,
        last_year_over_all: aggregate(&aggregates[1])?,
        highest_monthly_consumption: aggregate(&aggregates[2])?,
    };

    Ok((history, summary))
}

/// Volume of the newest point of a monthly series, i.e. the meter's most
/// recent daily reading.
pub fn latest_reading(points: &[Value]) -> Result<Liters, Error> {
    points
        .last()
        .ok_or_else(|| Error::Data(Stage::ThisMonth, "empty series".to_string()))
        .and_then(|point| volume_at(point, 1, Stage::ThisMonth))
}
