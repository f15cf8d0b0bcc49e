//! Model kinds served by the classifier

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Pretrained artifacts that can be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Cnn,
    #[serde(alias = "vgg")]
    Vgg16,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Cnn, ModelKind::Vgg16];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Cnn => "cnn",
            ModelKind::Vgg16 => "vgg16",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cnn" => Ok(ModelKind::Cnn),
            "vgg16" | "vgg" => Ok(ModelKind::Vgg16),
            other => anyhow::bail!("Unknown model '{}'. Available: cnn, vgg16", other),
        }
    }
}
