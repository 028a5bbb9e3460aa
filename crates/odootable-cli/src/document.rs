//! Block documents: the YAML file the CLI resolves.
//!
//! ```yaml
//! globals:
//!   url: erp.example.com
//!   login: reader
//!   password: secret
//! blocks:
//!   - options:
//!       model: res.partner
//!       fields: [name, email]
//!       caption: Customers
//!     content: "Customer,E-mail"
//! ```

use std::{fs, path::Path};

use anyhow::Context;
use odootable_core::{BlockInput, GlobalOptions, RawBlock};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockDocument {
    #[serde(default)]
    pub globals: RawBlock,
    #[serde(default)]
    pub blocks: Vec<DocumentBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentBlock {
    #[serde(default)]
    pub options: RawBlock,
    #[serde(default)]
    pub content: String,
}

impl BlockDocument {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn globals(&self) -> GlobalOptions {
        GlobalOptions::new(self.globals.clone())
    }

    pub fn inputs(&self) -> Vec<BlockInput> {
        self.blocks
            .iter()
            .map(|block| BlockInput::new(block.options.clone(), block.content.clone()))
            .collect()
    }
}
