//! Encoding of the settings table.
//!
//! The canonical encoding is a versioned TOML document:
//!
//! ```toml
//! version = 1
//!
//! [devices."{0.0.1.00000000}.{a1b2}"]
//! name = "Microphone (USB)"
//! auto_connect = true
//! volume = 100
//! balance = 50
//! ```
//!
//! Older installs stored a flat text table instead: one record per line (or
//! per U+001E record separator), each `id@name,autoConnect,volume,balance`.
//! That form is still read, and is rewritten as TOML on the next save.

use std::collections::BTreeMap;

use serde::Serialize;

use super::DeviceSettings;
use crate::{DeviceId, SettingsError};

/// Version written by this build.
pub(crate) const FORMAT_VERSION: i64 = 1;

const RECORD_SEPARATOR: char = '\u{1e}';

#[derive(Serialize)]
struct Document<'a> {
    version: i64,
    devices: BTreeMap<&'a str, &'a DeviceSettings>,
}

/// Serializes the table in the canonical format.
pub(crate) fn encode(
    devices: &BTreeMap<DeviceId, DeviceSettings>,
) -> Result<String, SettingsError> {
    let document = Document {
        version: FORMAT_VERSION,
        devices: devices.iter().map(|(id, s)| (id.as_str(), s)).collect(),
    };
    Ok(toml::to_string(&document)?)
}

/// Parses a stored document in either format.
///
/// Individual malformed entries are skipped with a warning. If the TOML
/// document as a whole does not parse, each `[section]` is parsed on its
/// own so one broken entry does not take the others with it. The whole
/// document is rejected only if nothing in it can be read, or if it
/// carries a version this build does not understand.
pub(crate) fn decode(text: &str) -> Result<BTreeMap<DeviceId, DeviceSettings>, SettingsError> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    match text.parse::<toml::Table>() {
        Ok(table) => decode_document(table),
        Err(e) if has_sections(text) => {
            tracing::warn!(error = %e, "settings document is damaged, reading it by section");
            decode_sections(text).ok_or(SettingsError::TomlParse(e))?
        }
        Err(e) if text.contains('@') => {
            tracing::info!("settings are in the legacy flat format, migrating");
            tracing::debug!(error = %e, "not a TOML document");
            Ok(decode_legacy(text))
        }
        Err(e) => Err(e.into()),
    }
}

fn decode_document(
    mut table: toml::Table,
) -> Result<BTreeMap<DeviceId, DeviceSettings>, SettingsError> {
    check_version(&table)?;
    let mut devices = BTreeMap::new();
    collect_devices(&mut table, &mut devices);
    Ok(devices)
}

fn check_version(table: &toml::Table) -> Result<(), SettingsError> {
    match table.get("version").and_then(toml::Value::as_integer) {
        Some(FORMAT_VERSION) => Ok(()),
        Some(found) => Err(SettingsError::UnsupportedVersion {
            found,
            expected: FORMAT_VERSION,
        }),
        None => {
            tracing::warn!("settings document has no version, assuming {FORMAT_VERSION}");
            Ok(())
        }
    }
}

fn collect_devices(table: &mut toml::Table, devices: &mut BTreeMap<DeviceId, DeviceSettings>) {
    let Some(toml::Value::Table(entries)) = table.remove("devices") else {
        return;
    };

    for (id, value) in entries {
        if id.is_empty() {
            tracing::warn!("skipping settings entry with empty device id");
            continue;
        }
        match value.try_into::<DeviceSettings>() {
            Ok(settings) => {
                devices.insert(DeviceId::new(id), settings);
            }
            Err(e) => tracing::warn!(device = %id, error = %e, "skipping malformed settings entry"),
        }
    }
}

fn has_sections(text: &str) -> bool {
    text.lines().any(|line| line.trim_start().starts_with('['))
}

/// Reads a document that failed to parse, one `[section]` at a time.
///
/// Returns `None` if no part of the document could be read.
fn decode_sections(
    text: &str,
) -> Option<Result<BTreeMap<DeviceId, DeviceSettings>, SettingsError>> {
    let mut chunks: Vec<String> = vec![String::new()];
    for line in text.lines() {
        if line.trim_start().starts_with('[') {
            chunks.push(String::new());
        }
        if let Some(chunk) = chunks.last_mut() {
            chunk.push_str(line);
            chunk.push('\n');
        }
    }

    let mut devices = BTreeMap::new();
    let mut readable = false;
    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.trim().is_empty() {
            continue;
        }
        let mut table = match chunk.parse::<toml::Table>() {
            Ok(table) => table,
            Err(e) => {
                let header = chunk.lines().next().unwrap_or_default().trim();
                tracing::warn!(
                    section = header,
                    error = %e,
                    "skipping unreadable settings section"
                );
                continue;
            }
        };
        readable = true;
        // Only the lines before the first section can carry the version.
        if index == 0 {
            if let Err(e) = check_version(&table) {
                return Some(Err(e));
            }
        }
        collect_devices(&mut table, &mut devices);
    }

    readable.then_some(Ok(devices))
}

fn decode_legacy(text: &str) -> BTreeMap<DeviceId, DeviceSettings> {
    let mut devices = BTreeMap::new();
    for record in text.split(['\n', RECORD_SEPARATOR]) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        match parse_legacy_record(record) {
            Some((id, settings)) => {
                devices.insert(id, settings);
            }
            None => tracing::warn!(%record, "skipping malformed settings record"),
        }
    }
    devices
}

/// Parses `id@name,autoConnect,volume,balance`.
///
/// The name may contain commas, so the numeric fields are split off from
/// the right.
fn parse_legacy_record(record: &str) -> Option<(DeviceId, DeviceSettings)> {
    let (id, rest) = record.split_once('@')?;
    if id.is_empty() {
        return None;
    }

    let mut fields = rest.rsplitn(4, ',');
    let balance = fields.next()?.trim().parse().ok()?;
    let volume = fields.next()?.trim().parse().ok()?;
    let auto_connect = parse_bool(fields.next()?.trim())?;
    let name = fields.next()?.to_string();

    Some((
        DeviceId::new(id),
        DeviceSettings {
            name,
            auto_connect,
            volume,
            balance,
        },
    ))
}

fn parse_bool(field: &str) -> Option<bool> {
    if field.eq_ignore_ascii_case("true") || field == "1" {
        Some(true)
    } else if field.eq_ignore_ascii_case("false") || field == "0" {
        Some(false)
    } else {
        None
    }
}
