//! Derives the staged image and header locations from the base path carried by
//! an OTA notification.

use std::{
    ffi::OsStr,
    fmt::{self, Display},
    os::unix::ffi::OsStrExt as _,
    path::{Path, PathBuf},
};

/// Largest path this daemon hands to other tools, including a C string
/// terminator.
pub const MAX_PATH_LEN: usize = 256;

const IMAGE_EXTENSION: &[u8] = b".img";
const HEADER_EXTENSION: &[u8] = b".hdr";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    ImageSrc,
    HeaderSrc,
    HeaderDst,
}

impl Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PathKind::ImageSrc => "image source",
            PathKind::HeaderSrc => "header source",
            PathKind::HeaderDst => "header destination",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("{which} path is {len} bytes; at most {} fit", MAX_PATH_LEN - 1)]
    TooLong { which: PathKind, len: usize },
    #[error("base path is empty")]
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradePaths {
    pub image_src: PathBuf,
    pub header_src: PathBuf,
    pub header_dst: PathBuf,
}

#[derive(Clone, Debug)]
pub struct PathResolver {
    header_dst_dir: PathBuf,
}

impl PathResolver {
    pub fn new(header_dst_dir: impl Into<PathBuf>) -> Self {
        Self {
            header_dst_dir: header_dst_dir.into(),
        }
    }

    /// Resolves the paths for a staged upgrade.
    ///
    /// `base` is the raw notification payload. Its length is authoritative; a
    /// NUL inside it ends the path early, like it would for the C string the
    /// sender most likely meant.
    pub fn resolve(&self, base: &[u8]) -> Result<UpgradePaths, PathError> {
        let base = base
            .iter()
            .position(|b| *b == 0)
            .map_or(base, |nul| &base[..nul]);
        if base.is_empty() {
            return Err(PathError::Empty);
        }

        let image_src = bounded(PathKind::ImageSrc, &[base, IMAGE_EXTENSION])?;
        let header_src = bounded(PathKind::HeaderSrc, &[base, HEADER_EXTENSION])?;

        let dir = self.header_dst_dir.as_os_str().as_bytes();
        let dir = dir.strip_suffix(b"/").unwrap_or(dir);
        let header_dst = bounded(
            PathKind::HeaderDst,
            &[dir, b"/".as_slice(), base_name(&header_src)],
        )?;

        Ok(UpgradePaths {
            image_src: to_path(image_src),
            header_src: to_path(header_src),
            header_dst: to_path(header_dst),
        })
    }
}

/// The part of `path` after its last `/`, or all of it if there is none.
#[must_use]
pub fn base_name(path: &[u8]) -> &[u8] {
    path.rsplit(|b| *b == b'/').next().unwrap_or(path)
}

fn bounded(which: PathKind, parts: &[&[u8]]) -> Result<Vec<u8>, PathError> {
    let joined = parts.concat();
    // one byte is reserved for the terminator expected by C consumers
    if joined.len() >= MAX_PATH_LEN {
        return Err(PathError::TooLong {
            which,
            len: joined.len(),
        });
    }
    Ok(joined)
}

fn to_path(bytes: Vec<u8>) -> PathBuf {
    Path::new(OsStr::from_bytes(&bytes)).to_path_buf()
}
