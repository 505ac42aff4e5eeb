//! On-disk layout of a member set
//!
//! A set named `name` lives in one directory as `<base>.0`, `<base>.1`,
//! `<base>.2` and `<base>.m`, where `<base>` is the hex digest of `name`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::crypto::Digest;
use crate::error::{Error, Result};
use crate::raid::{Member, MetadataRecord, MEMBER_COUNT};

/// Extension of the metadata file
pub const METADATA_EXTENSION: &str = "m";

/// Paths of one member set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSet {
    dir: PathBuf,
    base: String,
}

impl MemberSet {
    /// Member set for a logical file name
    pub fn for_name<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            base: Digest::of(name.as_bytes()).to_hex(),
        }
    }

    /// Member set for an already derived base name
    pub fn from_base<P: AsRef<Path>>(dir: P, base: &str) -> Result<Self> {
        let base = base.trim();
        if base.is_empty() || base.contains(['/', '\\']) || base == "." || base == ".." {
            return Err(Error::InvalidConfig(format!("Invalid member set name: {:?}", base)));
        }
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            base: base.to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn member_path(&self, member: Member) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base, member.index()))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base, METADATA_EXTENSION))
    }

    /// Create or truncate the three member files
    pub fn create_members(&self) -> Result<[BufWriter<File>; MEMBER_COUNT]> {
        let [m0, m1, m2] = Member::ALL.map(|member| self.create_member(member));
        Ok([m0?, m1?, m2?])
    }

    fn create_member(&self, member: Member) -> Result<BufWriter<File>> {
        let path = self.member_path(member);
        debug!("Creating {} at {}", member, path.display());
        create(&path)
            .map(BufWriter::new)
            .map_err(|source| Error::OpenMember { member, source })
    }

    /// Create or truncate the metadata file
    pub fn create_metadata(&self) -> Result<File> {
        let path = self.metadata_path();
        create(&path).map_err(|e| {
            Error::MetadataUnavailable(format!("cannot create {}: {}", path.display(), e))
        })
    }

    /// Open the members that exist
    ///
    /// A missing file yields `None`; any other failure is an error.
    pub fn open_members(&self) -> Result<[Option<File>; MEMBER_COUNT]> {
        let mut members: [Option<File>; MEMBER_COUNT] = Default::default();
        for member in Member::ALL {
            let path = self.member_path(member);
            match File::open(&path) {
                Ok(file) => members[member.index()] = Some(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("{} not found at {}", member, path.display());
                }
                Err(source) => return Err(Error::OpenMember { member, source }),
            }
        }
        Ok(members)
    }

    /// Read the persisted metadata record
    pub fn open_metadata(&self) -> Result<MetadataRecord> {
        let path = self.metadata_path();
        let file = File::open(&path).map_err(|e| {
            Error::MetadataUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        MetadataRecord::read_from(BufReader::new(file))
    }
}

fn create(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
