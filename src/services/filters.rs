// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Presentation filters for rendered payloads.
//!
//! Filters are pure functions registered by name when the filter set is
//! built, and the set is handed to whatever renders a view. There is no
//! process-wide registry.

use serde_json::Value;
use std::collections::HashMap;

/// A pure value transformation.
pub type Filter = fn(&Value) -> Value;

/// Named filters available to views.
#[derive(Clone, Default)]
pub struct FilterSet {
    filters: HashMap<&'static str, Filter>,
}

impl FilterSet {
    /// Empty set; add filters with [`FilterSet::with`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The filters used by the diary views: `durationformat`, `sum`, `average`.
    pub fn standard() -> Self {
        Self::new()
            .with("durationformat", duration_format)
            .with("sum", sum)
            .with("average", average)
    }

    pub fn with(mut self, name: &'static str, filter: Filter) -> Self {
        self.filters.insert(name, filter);
        self
    }

    /// Apply a filter by name. Unknown names yield `None`.
    pub fn apply(&self, name: &str, input: &Value) -> Option<Value> {
        self.filters.get(name).map(|f| f(input))
    }
}

/// Seconds → `"2 h 5 min"`.
///
/// Hours appear only above one hour and minutes only above one minute, so
/// short or exact-boundary values collapse to an empty or shorter label.
fn duration_format(input: &Value) -> Value {
    let mut duration = input.as_f64().unwrap_or(0.0) as i64;
    let mut output = String::new();

    if duration > 3600 {
        output.push_str(&format!("{} h", duration / 3600));
        duration %= 3600;
    }
    if duration > 60 {
        if !output.is_empty() {
            output.push(' ');
        }
        output.push_str(&format!("{} min", duration / 60));
    }

    Value::String(output)
}

fn numbers(input: &Value) -> Vec<f64> {
    input
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn sum(input: &Value) -> Value {
    Value::from(numbers(input).iter().sum::<f64>())
}

/// Mean of a numeric array; an empty array averages to 0.
fn average(input: &Value) -> Value {
    let values = numbers(input);
    if values.is_empty() {
        return Value::from(0.0);
    }
    Value::from(values.iter().sum::<f64>() / values.len() as f64)
}
