use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;

use crate::error::{IoContext, QuireError, Result};

pub const ACTIVE_FIELD: &str = "activo";
pub const START_FIELD: &str = "fechaInicio";
pub const FORMATTED_FIELD: &str = "fechaFormateada";
pub const UPCOMING_KEY: &str = "talleresProximos";
pub const PAST_KEY: &str = "talleresPasados";

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// `5 de diciembre`
pub fn format_spanish_date(date: NaiveDate) -> String {
    format!("{} de {}", date.day(), MONTHS_ES[date.month0() as usize])
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPartition {
    pub upcoming: Vec<Map<String, Value>>,
    pub past: Vec<Map<String, Value>>,
}

impl EventPartition {
    pub fn into_context(self) -> Value {
        json!({
            UPCOMING_KEY: self.upcoming,
            PAST_KEY: self.past,
        })
    }
}

pub fn load_events(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let content = fs::read_to_string(path).io_context("reading events", path)?;
    serde_json::from_str(&content).map_err(|error| QuireError::JsonParse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

/// Keeps active events, stamps each with its formatted date, sorts by start
/// date and splits on `today` (an event starting today is upcoming).
pub fn partition_events(
    events: Vec<Map<String, Value>>,
    today: NaiveDate,
    source: &Path,
) -> Result<EventPartition> {
    let mut dated = Vec::new();
    for mut event in events {
        if !event.get(ACTIVE_FIELD).is_some_and(is_truthy) {
            continue;
        }
        let raw = event
            .get(START_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let start = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
            QuireError::InvalidDate {
                path: source.to_path_buf(),
                value: raw.clone(),
            }
        })?;
        event.insert(
            FORMATTED_FIELD.to_string(),
            Value::String(format_spanish_date(start)),
        );
        dated.push((start, event));
    }

    dated.sort_by_key(|(start, _)| *start);

    let mut partition = EventPartition::default();
    for (start, event) in dated {
        if start >= today {
            partition.upcoming.push(event);
        } else {
            partition.past.push(event);
        }
    }
    Ok(partition)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, active: Value, start: &str) -> Map<String, Value> {
        let value = json!({ "nombre": name, "activo": active, "fechaInicio": start });
        value.as_object().unwrap().clone()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn names(events: &[Map<String, Value>]) -> Vec<&str> {
        events
            .iter()
            .map(|event| event["nombre"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_format_spanish_date() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();
        assert_eq!(format_spanish_date(date), "5 de diciembre");
        let date = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(format_spanish_date(date), "31 de enero");
    }

    #[test]
    fn test_partition_filters_sorts_and_splits() {
        let events = vec![
            event("late", json!(true), "2024-09-01"),
            event("inactive", json!(false), "2024-07-01"),
            event("old", json!(true), "2024-01-10"),
            event("today", json!(true), "2024-06-15"),
            event("older", json!(true), "2023-11-02"),
        ];

        let partition = partition_events(events, today(), Path::new("talleres.json")).unwrap();

        assert_eq!(names(&partition.upcoming), vec!["today", "late"]);
        assert_eq!(names(&partition.past), vec!["older", "old"]);
        assert_eq!(partition.upcoming[0][FORMATTED_FIELD], "15 de junio");
        assert_eq!(partition.past[0][FORMATTED_FIELD], "2 de noviembre");
    }

    #[test]
    fn test_partition_truthiness_of_active_flag() {
        let events = vec![
            event("string", json!("si"), "2024-07-01"),
            event("empty", json!(""), "2024-07-01"),
            event("one", json!(1), "2024-07-02"),
            event("zero", json!(0), "2024-07-02"),
            event("null", Value::Null, "2024-07-03"),
        ];
        let partition = partition_events(events, today(), Path::new("talleres.json")).unwrap();
        assert_eq!(names(&partition.upcoming), vec!["string", "one"]);
    }

    #[test]
    fn test_invalid_date_on_active_event_fails() {
        let events = vec![event("broken", json!(true), "15/06/2024")];
        let error = partition_events(events, today(), Path::new("talleres.json")).unwrap_err();
        assert!(matches!(error, QuireError::InvalidDate { ref value, .. } if value == "15/06/2024"));
    }

    #[test]
    fn test_invalid_date_on_inactive_event_is_ignored() {
        let events = vec![event("broken", json!(false), "nope")];
        let partition = partition_events(events, today(), Path::new("talleres.json")).unwrap();
        assert!(partition.upcoming.is_empty());
        assert!(partition.past.is_empty());
    }

    #[test]
    fn test_into_context_uses_template_keys() {
        let partition = partition_events(
            vec![event("a", json!(true), "2024-06-20")],
            today(),
            Path::new("talleres.json"),
        )
        .unwrap();
        let context = partition.into_context();
        assert_eq!(context[UPCOMING_KEY].as_array().unwrap().len(), 1);
        assert_eq!(context[PAST_KEY].as_array().unwrap().len(), 0);
    }
}
