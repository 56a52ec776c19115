use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Result, SipError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Value used in the METS `CHECKSUMTYPE` attribute.
    pub fn mets_name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "SHA-256",
            ChecksumAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Suffix used in BagIt manifest file names (`manifest-sha512.txt`).
    pub fn manifest_name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }
}

/// Compute the hex digest of a file, streaming it in chunks.
///
/// An unreadable file maps to `SipError::Checksum` so callers can abort
/// the build for that job rather than emit a partial record.
pub fn compute_file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|source| SipError::Checksum {
        path: path.to_path_buf(),
        source,
    })?;
    compute_checksum(&mut file, algorithm).map_err(|source| SipError::Checksum {
        path: path.to_path_buf(),
        source,
    })
}

pub fn compute_checksum<R: Read>(
    reader: &mut R,
    algorithm: ChecksumAlgorithm,
) -> std::io::Result<String> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256, R>(reader),
        ChecksumAlgorithm::Sha512 => digest_reader::<Sha512, R>(reader),
    }
}

fn digest_reader<D: Digest, R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
