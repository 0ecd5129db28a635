//! Per-call sandbox options

use serde::{Deserialize, Serialize};

/// Options recognised for one execution.
///
/// Every field is optional on the wire; unset fields fall back to the
/// executor's configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxOptions {
    /// Wall-clock deadline in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Runtime image to launch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_image: Option<String>,
    /// Additional launcher arguments, appended after the mandatory set
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_constraints: Vec<String>,
}

impl SandboxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_runtime_image(mut self, image: impl Into<String>) -> Self {
        self.runtime_image = Some(image.into());
        self
    }

    pub fn with_extra_constraints(
        mut self,
        extras: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.extra_constraints = extras.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_camel_case() {
        let json = r#"{"timeoutMs":200,"runtimeImage":"node:22","extraConstraints":["--cpus","1"]}"#;
        let options: SandboxOptions = serde_json::from_str(json).unwrap();

        assert_eq!(options.timeout_ms, Some(200));
        assert_eq!(options.runtime_image.as_deref(), Some("node:22"));
        assert_eq!(options.extra_constraints, vec!["--cpus", "1"]);
    }

    #[test]
    fn test_options_missing_fields_default() {
        let options: SandboxOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, SandboxOptions::default());
    }
}
