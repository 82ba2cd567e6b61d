//! Object key layout.
//!
//! Keys are part of the wire contract with existing buckets and must not change:
//! chunks live at `chunks/<identifier>/chunk_<index>`, merged files at
//! `files/<identifier>/<name>.<file_type>`.

use crate::{Result, SliceError};

pub const CHUNKS_ROOT: &str = "chunks";
pub const FILES_ROOT: &str = "files";

const CHUNK_NAME_PREFIX: &str = "chunk_";

pub fn validate_identifier(identifier: &str) -> Result<()> {
    validate_segment("identifier", identifier)
}

/// Listing prefix for all chunks of one upload.
pub fn chunk_prefix(identifier: &str) -> String {
    format!("{}/{}/", CHUNKS_ROOT, identifier)
}

pub fn chunk_path(identifier: &str, index: u32) -> String {
    format!("{}{}{}", chunk_prefix(identifier), CHUNK_NAME_PREFIX, index)
}

/// Build `<name>.<file_type>` after checking both parts are usable as a key segment.
pub fn merged_file_name(name: &str, file_type: &str) -> Result<String> {
    validate_segment("name", name)?;
    if file_type.is_empty() || file_type.contains('/') {
        return Err(SliceError::InvalidRequest(format!(
            "invalid file_type: {:?}",
            file_type
        )));
    }

    Ok(format!("{}.{}", name, file_type))
}

pub fn merged_file_path(identifier: &str, file_name: &str) -> String {
    format!("{}/{}/{}", FILES_ROOT, identifier, file_name)
}

/// Parse the index out of a chunk key or bare chunk name.
pub fn parse_chunk_index(key: &str) -> Option<u32> {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.strip_prefix(CHUNK_NAME_PREFIX)?.parse().ok()
}

/// Only merged files may be handed out as download links.
pub fn validate_download_path(path: &str) -> Result<()> {
    let Some(rest) = path.strip_prefix("files/") else {
        return Err(SliceError::InvalidPath(format!(
            "path must start with {}/: {}",
            FILES_ROOT, path
        )));
    };

    for component in rest.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(SliceError::InvalidPath(format!(
                "invalid path component {:?} in {}",
                component, path
            )));
        }
    }

    Ok(())
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SliceError::InvalidRequest(format!("{} cannot be empty", kind)));
    }

    if value.contains('/') || value == "." || value == ".." {
        return Err(SliceError::InvalidRequest(format!(
            "invalid {}: {:?}",
            kind, value
        )));
    }

    Ok(())
}
