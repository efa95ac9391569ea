//! # Rendering
//!
//! Turns a finished [`NetworkTopology`] into text. Both formats are pure
//! functions of the topology and the options: the same input renders to the
//! same bytes.

use lantopo_common::config::{OutputFormat, RenderOptions};
use lantopo_common::model::NetworkTopology;

pub mod document;
pub mod mermaid;

pub fn render(topology: &NetworkTopology, options: &RenderOptions) -> anyhow::Result<String> {
    match options.format {
        OutputFormat::Mermaid => Ok(mermaid::render(topology, options)),
        OutputFormat::Json => document::to_json(topology),
    }
}
