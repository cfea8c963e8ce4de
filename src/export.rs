// Dataset export
// Writes each dataset as a pretty-printed JSON array under the data directory

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::pipeline::Datasets;

/// Write one dataset to `path`, creating parent directories
pub fn write_json<T: Serialize>(rows: &T, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, rows)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path.to_path_buf())
}

/// Write all three datasets into `data_dir`, returning the created files
pub fn write_datasets(datasets: &Datasets, data_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(vec![
        write_json(&datasets.pokemons, &data_dir.join("pokemons.json"))?,
        write_json(&datasets.combats, &data_dir.join("combats.json"))?,
        write_json(&datasets.attributes, &data_dir.join("pokemon_attributes.json"))?,
    ])
}
