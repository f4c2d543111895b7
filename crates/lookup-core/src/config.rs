// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::{FieldId, Item};

pub const DEFAULT_MIN_CHARS: usize = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_EMPTY_OPTION_LABEL: &str = "None";

/// Where an extra query parameter gets its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    Static(String),
    Field(FieldId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub id: FieldId,
    #[serde(default)]
    pub label: String,
    pub endpoint: String,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub required_gates: Vec<FieldId>,
    #[serde(default)]
    pub reset_targets: Vec<FieldId>,
    #[serde(default)]
    pub allow_empty_option: bool,
    #[serde(default)]
    pub empty_option_label: Option<String>,
    #[serde(default)]
    pub empty_value: String,
    #[serde(default)]
    pub required_message: Option<String>,
    /// Query parameter name used when this field's value gates another field.
    #[serde(default)]
    pub gate_param: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSource>,
    /// Value restored when the form opens, e.g. when editing a saved record.
    #[serde(default)]
    pub initial: Option<Item>,
    #[serde(default)]
    pub initial_empty: bool,
}

fn default_min_chars() -> usize {
    DEFAULT_MIN_CHARS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl FieldConfig {
    pub fn new(id: impl Into<FieldId>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            endpoint: endpoint.into(),
            min_chars: DEFAULT_MIN_CHARS,
            page_size: DEFAULT_PAGE_SIZE,
            required_gates: Vec::new(),
            reset_targets: Vec::new(),
            allow_empty_option: false,
            empty_option_label: None,
            empty_value: String::new(),
            required_message: None,
            gate_param: None,
            params: BTreeMap::new(),
            initial: None,
            initial_empty: false,
        }
    }

    pub fn gated_by(mut self, upstream: &str) -> Self {
        self.required_gates.push(FieldId::from(upstream));
        self
    }

    pub fn resets(mut self, downstream: &str) -> Self {
        self.reset_targets.push(FieldId::from(downstream));
        self
    }

    pub fn with_empty_option(mut self, label: &str) -> Self {
        self.allow_empty_option = true;
        self.empty_option_label = Some(label.to_owned());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub fn with_gate_param(mut self, name: &str) -> Self {
        self.gate_param = Some(name.to_owned());
        self
    }

    pub fn with_param(mut self, name: &str, source: ParamSource) -> Self {
        self.params.insert(name.to_owned(), source);
        self
    }

    pub fn with_initial(mut self, item: Item) -> Self {
        self.initial = Some(item);
        self
    }

    pub fn with_initial_empty(mut self) -> Self {
        self.initial_empty = true;
        self
    }

    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.label
        }
    }

    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn gate_param_name(&self) -> &str {
        self.gate_param.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn empty_label(&self) -> &str {
        self.empty_option_label
            .as_deref()
            .unwrap_or(DEFAULT_EMPTY_OPTION_LABEL)
    }

    pub fn prerequisite_message(&self) -> &str {
        self.required_message
            .as_deref()
            .unwrap_or(crate::DEFAULT_PREREQUISITE_MESSAGE)
    }

    /// Checks the parts of a field that do not depend on other fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyFieldId);
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint {
                field: self.id.clone(),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPageSize {
                field: self.id.clone(),
            });
        }
        if !self.allow_empty_option && self.empty_option_label.is_some() {
            return Err(ConfigError::EmptyLabelWithoutOption {
                field: self.id.clone(),
            });
        }
        if self.initial_empty && !self.allow_empty_option {
            return Err(ConfigError::InitialEmptyWithoutOption {
                field: self.id.clone(),
            });
        }
        if self.initial_empty && self.initial.is_some() {
            return Err(ConfigError::ConflictingInitialValue {
                field: self.id.clone(),
            });
        }
        for reference in self.required_gates.iter().chain(&self.reset_targets) {
            if reference == &self.id {
                return Err(ConfigError::SelfReference {
                    field: self.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormSettings {
    pub debounce: Duration,
}

impl Default for FormSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("field id must not be empty")]
    EmptyFieldId,
    #[error("field {field} is declared more than once")]
    DuplicateField { field: FieldId },
    #[error("field {field} has no endpoint -- set `endpoint` to the catalog path")]
    MissingEndpoint { field: FieldId },
    #[error("field {field} has page_size 0 -- use a value between 1 and {max}", max = MAX_PAGE_SIZE)]
    InvalidPageSize { field: FieldId },
    #[error("field {field} sets empty_option_label without allow_empty_option")]
    EmptyLabelWithoutOption { field: FieldId },
    #[error("field {field} sets initial_empty without allow_empty_option")]
    InitialEmptyWithoutOption { field: FieldId },
    #[error("field {field} sets both initial and initial_empty")]
    ConflictingInitialValue { field: FieldId },
    #[error("field {field} references itself")]
    SelfReference { field: FieldId },
    #[error("field {field} references unknown field {reference} in {context}")]
    UnknownReference {
        field: FieldId,
        reference: FieldId,
        context: &'static str,
    },
    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle { path: Vec<FieldId> },
}

fn format_cycle(path: &[FieldId]) -> String {
    path.iter()
        .map(FieldId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
