// src/locations.rs
//! Location list loading.
//!
//! Either an explicit list from config, or a file: a world-cities CSV
//! (`name,country,subcountry,geonameid`) filtered to one country, or a plain
//! list with one location per line. The formatted result can be cached so the
//! CSV is only parsed once.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocationsConfig {
    pub list: Vec<String>,
    pub file: Option<PathBuf>,
    /// Country filter for CSV sources.
    pub country: Option<String>,
    pub cache: Option<PathBuf>,
}

pub fn load(cfg: &LocationsConfig) -> Result<Vec<String>> {
    if !cfg.list.is_empty() {
        return Ok(dedup(cfg.list.iter().cloned()));
    }

    if let Some(cache) = &cfg.cache {
        if cache.exists() {
            tracing::debug!(path = %cache.display(), "reading cached locations");
            return read_plain(cache);
        }
    }

    let Some(file) = &cfg.file else {
        bail!("no locations configured: set locations.list or locations.file");
    };

    let locations = if is_csv(file) {
        let country = cfg.country.as_deref().unwrap_or("United States");
        read_world_cities(file, country)?
    } else {
        read_plain(file)?
    };

    if let Some(cache) = &cfg.cache {
        write_cache(cache, &locations)?;
    }
    Ok(locations)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

fn read_plain(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading locations from {}", path.display()))?;
    Ok(dedup(
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string),
    ))
}

fn read_world_cities(path: &Path, country: &str) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading locations from {}", path.display()))?;
    let mut rows = content.lines();
    // header row
    rows.next();
    Ok(dedup(rows.filter_map(|row| {
        let cols = split_csv_row(row);
        let (name, row_country, subcountry) = (cols.first()?, cols.get(1)?, cols.get(2)?);
        if !row_country.eq_ignore_ascii_case(country) || name.is_empty() {
            return None;
        }
        Some(if subcountry.is_empty() {
            name.clone()
        } else {
            format!("{name}, {subcountry}")
        })
    })))
}

/// Minimal CSV field splitting with double-quote support.
fn split_csv_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = row.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn write_cache(path: &Path, locations: &[String]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut body = locations.join("\n");
    body.push('\n');
    fs::write(path, body).with_context(|| format!("writing location cache {}", path.display()))
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|l| seen.insert(l.clone())).collect()
}
