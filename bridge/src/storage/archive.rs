//! Deterministic single-file tarballs.
//!
//! Headers carry fixed ownership, mode and timestamps and the gzip header has
//! a zero mtime, so equal input always produces byte-identical archives.

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use sha2::{Digest, Sha256};
use std::io::{self, Read};

pub fn build(file_name: &str, content: &[u8]) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    builder.append_data(&mut header, file_name, content)?;

    builder.into_inner()?.finish()
}

/// Returns the contents of `file_name`, or `None` if the archive has no such entry
pub fn extract(archive: &[u8], file_name: &str) -> io::Result<Option<Vec<u8>>> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    for entry in tar.entries()? {
        let mut entry = entry?;
        let is_match = entry.path()?.as_os_str() == file_name;
        if is_match {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

pub fn digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}
