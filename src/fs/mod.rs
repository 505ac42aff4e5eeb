//! File-backed member sets
//!
//! Binds the stream pipeline to files in the configured member directory.

mod member_set;

pub use member_set::{MemberSet, METADATA_EXTENSION};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::crypto::CipherKey;
use crate::error::{Error, Result};
use crate::raid::{ArrayHealth, MergeReport, MetadataRecord, Pipeline};

/// Key actually used for a run, honoring `encryption.enabled`
fn effective_key<'a>(config: &Config, key: Option<&'a CipherKey>) -> Option<&'a CipherKey> {
    match key {
        Some(_) if !config.encryption.enabled => {
            warn!("Encryption disabled in configuration, ignoring key");
            None
        }
        key => key,
    }
}

/// Split `input` into a new member set
///
/// The set is named after `name`, or the input's file name when `None`.
pub fn split_file(
    config: &Config,
    input: &Path,
    name: Option<&str>,
    key: Option<&CipherKey>,
) -> Result<(MemberSet, MetadataRecord)> {
    let source = File::open(input).map_err(Error::OpenInput)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::OpenInput(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", input.display()),
                ))
            })?,
    };

    config.ensure_directories()?;
    let set = MemberSet::for_name(&config.storage.member_dir, &name);
    let pipeline = Pipeline::from_config(config)?;

    let mut members = set.create_members()?;
    let metadata = set.create_metadata()?;
    let record = pipeline.split(
        BufReader::new(source),
        &mut members,
        BufWriter::new(metadata),
        effective_key(config, key),
    )?;

    info!("Stored {} as {}", name, set.base());
    Ok((set, record))
}

/// Merge the member set `base` into `output`
pub fn merge_file(
    config: &Config,
    base: &str,
    output: &Path,
    key: Option<&CipherKey>,
) -> Result<MergeReport> {
    let set = MemberSet::from_base(&config.storage.member_dir, base)?;
    let record = set.open_metadata()?;
    let members = set.open_members()?;
    let pipeline = Pipeline::from_config(config)?;

    let out = File::create(output).map_err(Error::OpenOutput)?;
    let mut out = BufWriter::new(out);
    let report = pipeline.merge(members, &record, effective_key(config, key), &mut out)?;
    out.flush().map_err(Error::OutputWrite)?;
    Ok(report)
}

/// Read the persisted record of `base`
pub fn inspect(config: &Config, base: &str) -> Result<MetadataRecord> {
    MemberSet::from_base(&config.storage.member_dir, base)?.open_metadata()
}

/// Check the members of `base` against its record
pub fn verify(config: &Config, base: &str) -> Result<ArrayHealth> {
    let set = MemberSet::from_base(&config.storage.member_dir, base)?;
    let record = set.open_metadata()?;
    let mut members = set.open_members()?;
    ArrayHealth::assess(&record, &mut members)
}
