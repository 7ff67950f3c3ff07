//! Events command - list, show, update and delete stored events

use super::open_store;
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::Subcommand;
use recorder::{RecorderConfig, VersionedProjection, View};
use recorder_db::{normalize_timestamp, EventId, Record, SearchFilters, TIMESTAMP_FORMAT};
use serde_json::Value;

#[derive(Subcommand, Debug)]
pub enum EventsAction {
    /// List events, oldest first
    List {
        /// Earliest creation time (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
        #[arg(long)]
        from: Option<String>,

        /// Latest creation time, inclusive; a bare date covers the whole day
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        min_importance: Option<f64>,

        /// Only events not marked done
        #[arg(long)]
        pending: bool,

        /// summary (alias daily) or detail
        #[arg(long, default_value = "summary")]
        view: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show every field of one event
    Show { id: EventId },

    /// Apply a flat JSON update, e.g. '{"done": 1}'
    Update { id: EventId, json: String },

    Delete { id: EventId },
}

pub async fn run(config: &RecorderConfig, action: EventsAction) -> Result<()> {
    let store = open_store(config).await?;
    let projection = VersionedProjection::builtin();

    let result = match action {
        EventsAction::List {
            from,
            to,
            min_importance,
            pending,
            view,
            json,
        } => {
            let view: View = view.parse()?;
            let mut filters = SearchFilters::new();
            if let Some(from) = from {
                filters = filters.created_from(parse_bound(&from, false)?);
            }
            if let Some(to) = to {
                filters = filters.created_to(parse_bound(&to, true)?);
            }
            if let Some(min) = min_importance {
                filters = filters.min_importance(min);
            }

            let mut records = if pending && filters.is_empty() {
                store.search_pending().await?
            } else {
                store.search(&filters).await?
            };
            if pending {
                records.retain(|r| r.get("done") != Some(&Value::Bool(true)));
            }

            let projected = projection.project(&records, view);
            if json || view == View::Detail {
                println!("{}", serde_json::to_string_pretty(&projected)?);
            } else {
                print_summary(&projected);
            }
            Ok(())
        }
        EventsAction::Show { id } => match store.read(id).await {
            Some(record) => {
                let projected = projection.project(std::slice::from_ref(&record), View::Detail);
                match projected.first() {
                    Some(detail) => println!("{}", serde_json::to_string_pretty(detail)?),
                    None => bail!("Event {} has an unsupported schema version", id),
                }
                Ok(())
            }
            None => Err(anyhow::anyhow!("Event {} not found", id)),
        },
        EventsAction::Update { id, json } => {
            let flat = parse_object(&json)?;
            if !projection.apply_update(&store, id, &flat).await? {
                bail!("Event {} not updated (missing or storage error)", id);
            }
            println!("Updated event {}", id);
            Ok(())
        }
        EventsAction::Delete { id } => {
            if !store.delete(id).await {
                bail!("Event {} not deleted (missing or storage error)", id);
            }
            println!("Deleted event {}", id);
            Ok(())
        }
    };

    store.close().await;
    result
}

/// Accept a bare date or any timestamp format the store reads.
fn parse_bound(raw: &str, end_of_day: bool) -> Result<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_opt(23, 59, 59)
        } else {
            NaiveTime::from_hms_opt(0, 0, 0)
        };
        if let Some(time) = time {
            return Ok(date.and_time(time));
        }
    }
    let canonical = normalize_timestamp(raw);
    NaiveDateTime::parse_from_str(&canonical, TIMESTAMP_FORMAT)
        .with_context(|| format!("Invalid date or timestamp: {}", raw))
}

fn parse_object(raw: &str) -> Result<Record> {
    match serde_json::from_str::<Value>(raw).context("Update payload is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("Update payload must be a JSON object"),
    }
}

fn display_list(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

fn print_summary(records: &[Record]) {
    if records.is_empty() {
        println!("No events");
        return;
    }
    println!("{:>6}  {:<24}  {:<16}  EVENT", "ID", "DATES", "TIMES");
    for record in records {
        let id = record.get("event_id").map(|v| v.to_string()).unwrap_or_default();
        println!(
            "{:>6}  {:<24}  {:<16}  {}",
            id,
            display_list(record.get("dates")),
            display_list(record.get("times")),
            display_list(record.get("events_full")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bound_dates() {
        assert_eq!(
            parse_bound("2025-03-04", false).unwrap().format(TIMESTAMP_FORMAT).to_string(),
            "2025-03-04T00:00:00"
        );
        assert_eq!(
            parse_bound("2025-03-04", true).unwrap().format(TIMESTAMP_FORMAT).to_string(),
            "2025-03-04T23:59:59"
        );
        assert_eq!(
            parse_bound("2025-03-04 08:15", false).unwrap().format(TIMESTAMP_FORMAT).to_string(),
            "2025-03-04T08:15:00"
        );
        assert!(parse_bound("yesterday", false).is_err());
    }

    #[test]
    fn test_parse_object_rejects_non_objects() {
        assert!(parse_object(r#"{"done": 1}"#).is_ok());
        assert!(parse_object("[1, 2]").is_err());
        assert!(parse_object("{").is_err());
    }
}
