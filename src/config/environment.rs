// ABOUTME: Per-environment configuration for a blue/green pair.
// ABOUTME: Holds replica count, per-color base URLs and the initially active color.

use serde::Deserialize;

use crate::types::Color;

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    pub base_urls: ColorUrls,

    /// Color serving production traffic before the first deployment.
    #[serde(default)]
    pub active: Color,
}

fn default_replicas() -> u32 {
    1
}

/// Base URL of each color, used by the health probe.
#[derive(Debug, Clone, Deserialize)]
pub struct ColorUrls {
    pub blue: String,
    pub green: String,
}

impl ColorUrls {
    pub fn for_color(&self, color: Color) -> &str {
        match color {
            Color::Blue => &self.blue,
            Color::Green => &self.green,
        }
    }
}

impl EnvironmentConfig {
    pub fn base_url(&self, color: Color) -> &str {
        self.base_urls.for_color(color)
    }

    pub(crate) fn validate(&self, name: &str) -> Result<(), String> {
        if self.replicas == 0 {
            return Err(format!("environment {name}: replicas must be at least 1"));
        }
        for color in [Color::Blue, Color::Green] {
            let url = self.base_url(color);
            if !url.starts_with("http://") {
                return Err(format!(
                    "environment {name}: {color} base URL must start with http:// (got {url:?})"
                ));
            }
        }
        Ok(())
    }
}
