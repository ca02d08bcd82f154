//! Structured task requirements.
//!
//! A task's requirement map is parsed once, when its spec is built, into a
//! list of [`Requirement`]s used for resource matching and a
//! [`ContainerRequirements`] used when creating a container.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ArrebolError, Result};

/// Requirement key naming the image a task runs in.
pub const IMAGE_KEY: &str = "image";
/// Requirement key holding the `key==value&&key==value` Docker constraints.
pub const DOCKER_REQUIREMENTS_KEY: &str = "DockerRequirements";
pub const DOCKER_MEMORY_KEY: &str = "memory";
pub const DOCKER_CPU_WEIGHT_KEY: &str = "vcpu";

/// Largest memory limit, in megabytes, whose byte count still fits a Docker
/// `i64`.
pub const MAX_MEMORY_MB: u64 = (i64::MAX as u64) >> 20;
const MAX_CPU_WEIGHT: u64 = i64::MAX as u64;

const CLAUSE_SEPARATOR: &str = "&&";
const VALUE_SEPARATOR: &str = "==";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    Image(String),
    /// Memory in megabytes.
    Memory(u64),
    CpuWeight(u64),
    Attribute { key: String, value: String },
}

/// Container-creation parameters extracted from the Docker constraint string.
/// Values are kept as given; unrecognised keys are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequirements {
    pub memory: Option<String>,
    pub cpu_weight: Option<String>,
}

impl ContainerRequirements {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parsed = ContainerRequirements::default();
        for clause in raw.split(CLAUSE_SEPARATOR) {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let (key, value) = clause.split_once(VALUE_SEPARATOR).ok_or_else(|| {
                ArrebolError::InvalidSubmission(format!(
                    "malformed docker requirement clause '{clause}', expected key==value"
                ))
            })?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                DOCKER_MEMORY_KEY => parsed.memory = Some(value.to_string()),
                DOCKER_CPU_WEIGHT_KEY => parsed.cpu_weight = Some(value.to_string()),
                other => tracing::debug!(key = other, "Ignoring unknown docker requirement"),
            }
        }
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.cpu_weight.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    items: Vec<Requirement>,
    container: ContainerRequirements,
}

impl Requirements {
    pub fn parse(raw: &HashMap<String, String>) -> Result<Self> {
        let mut keys: Vec<&String> = raw.keys().collect();
        keys.sort();

        let mut items = Vec::with_capacity(raw.len());
        let mut container = ContainerRequirements::default();
        for key in keys {
            let value = &raw[key];
            match key.as_str() {
                IMAGE_KEY => {
                    if value.trim().is_empty() {
                        return Err(ArrebolError::InvalidSubmission(
                            "image requirement may not be empty".to_string(),
                        ));
                    }
                    items.push(Requirement::Image(value.trim().to_string()));
                }
                DOCKER_REQUIREMENTS_KEY => {
                    container = ContainerRequirements::parse(value)?;
                    if let Some(memory) = &container.memory {
                        items.push(Requirement::Memory(parse_number(
                            DOCKER_MEMORY_KEY,
                            memory,
                            MAX_MEMORY_MB,
                        )?));
                    }
                    if let Some(weight) = &container.cpu_weight {
                        items.push(Requirement::CpuWeight(parse_number(
                            DOCKER_CPU_WEIGHT_KEY,
                            weight,
                            MAX_CPU_WEIGHT,
                        )?));
                    }
                }
                _ => items.push(Requirement::Attribute {
                    key: key.clone(),
                    value: value.clone(),
                }),
            }
        }

        Ok(Requirements { items, container })
    }

    pub fn items(&self) -> &[Requirement] {
        &self.items
    }

    pub fn image(&self) -> Option<&str> {
        self.items.iter().find_map(|r| match r {
            Requirement::Image(image) => Some(image.as_str()),
            _ => None,
        })
    }

    pub fn container(&self) -> &ContainerRequirements {
        &self.container
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn parse_number(key: &str, value: &str, max: u64) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(n) if n <= max => Ok(n),
        Ok(_) => Err(ArrebolError::InvalidSubmission(format!(
            "docker requirement '{key}' must be at most {max}, got '{value}'"
        ))),
        Err(_) => Err(ArrebolError::InvalidSubmission(format!(
            "docker requirement '{key}' must be a non-negative integer, got '{value}'"
        ))),
    }
}
