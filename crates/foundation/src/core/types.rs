//! Shared data-model types that more than one layer needs to agree on:
//! the resource-access model the dependency scheduler builds its graph from,
//! and the static per-tool metadata that drives it.

use serde::{Deserialize, Serialize};

/// Kind of resource a tool call touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    File,
    Directory,
    Network,
    Process,
    State,
}

/// How a resource is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMode {
    Read,
    Write,
    Execute,
}

/// A single resource touched by a tool call. `identifier` is a path, a URL,
/// or the wildcard `"*"` when the exact target can't be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAccess {
    pub resource_type: ResourceType,
    pub identifier: String,
    pub mode: ResourceMode,
}

impl ResourceAccess {
    pub fn new(resource_type: ResourceType, identifier: impl Into<String>, mode: ResourceMode) -> Self {
        Self {
            resource_type,
            identifier: identifier.into(),
            mode,
        }
    }

    pub fn file_read(path: impl Into<String>) -> Self {
        Self::new(ResourceType::File, path, ResourceMode::Read)
    }

    pub fn file_write(path: impl Into<String>) -> Self {
        Self::new(ResourceType::File, path, ResourceMode::Write)
    }

    pub fn is_wildcard(&self) -> bool {
        self.identifier == "*"
    }
}

/// Static, per-tool-name metadata the scheduler uses to build the
/// dependency graph. Independent of any single invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub reads_resource_types: Vec<ResourceType>,
    pub writes_resource_types: Vec<ResourceType>,
    pub has_side_effects: bool,
    pub parallel_safe: bool,
    pub priority: i32,
    pub explicit_depends_on: Vec<String>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parallel_safe: true,
            priority: 0,
            ..Default::default()
        }
    }

    pub fn side_effects(mut self, value: bool) -> Self {
        self.has_side_effects = value;
        self.parallel_safe = !value;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, tool_name: impl Into<String>) -> Self {
        self.explicit_depends_on.push(tool_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_detection() {
        let access = ResourceAccess::new(ResourceType::File, "*", ResourceMode::Write);
        assert!(access.is_wildcard());
        assert!(!ResourceAccess::file_read("/tmp/a").is_wildcard());
    }

    #[test]
    fn metadata_builder() {
        let meta = ToolMetadata::new("bash").side_effects(true).priority(5);
        assert!(meta.has_side_effects);
        assert!(!meta.parallel_safe);
        assert_eq!(meta.priority, 5);
    }
}
