use digest::Digest;
use image::imageops::FilterType;
use image::DynamicImage;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const BLOCK_SIZE: usize = 64 * 1024;
const GRID_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HashMethod {
    #[default]
    Sha256,
    Sha1,
    Md5,
    /// Average hash of the decoded image.
    ImageHash,
}

impl HashMethod {
    pub const ALL: [HashMethod; 4] = [
        HashMethod::Sha256,
        HashMethod::Sha1,
        HashMethod::Md5,
        HashMethod::ImageHash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HashMethod::Sha256 => "sha256",
            HashMethod::Sha1 => "sha1",
            HashMethod::Md5 => "md5",
            HashMethod::ImageHash => "imagehash",
        }
    }

    pub fn is_perceptual(self) -> bool {
        self == HashMethod::ImageHash
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashMethod {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HashError::UnknownMethod(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("unknown hash method: {0}")]
    UnknownMethod(String),
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub fn compute_hash(path: &Path, method: HashMethod) -> Result<String, HashError> {
    match method {
        HashMethod::Sha256 => digest_file::<Sha256>(path),
        HashMethod::Sha1 => digest_file::<Sha1>(path),
        HashMethod::Md5 => digest_file::<Md5>(path),
        HashMethod::ImageHash => {
            let image = image::open(path).map_err(|source| HashError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(average_hash(&image))
        }
    }
}

fn digest_file<D: Digest>(path: &Path) -> Result<String, HashError> {
    let io_err = |source: io::Error| HashError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        let read = file.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// One `ff`/`00` byte per grid cell, not bit-packed, so the result is always
/// 128 hex characters.
pub fn average_hash(image: &DynamicImage) -> String {
    let grid = image
        .resize_exact(GRID_SIZE, GRID_SIZE, FilterType::Triangle)
        .to_luma8();
    let pixels = grid.as_raw();
    let mean = pixels.iter().map(|&p| f64::from(p)).sum::<f64>() / pixels.len() as f64;

    pixels
        .iter()
        .map(|&p| if f64::from(p) > mean { "ff" } else { "00" })
        .collect()
}
