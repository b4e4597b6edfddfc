// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Reads at most the last `limit` bytes of the file at `path`.
///
/// The file is opened and sized at call time; it may be growing or have been rotated since
/// the handler was set up. A limit of zero or less yields nothing.
pub fn read_last_part_of_file(path: &Path, limit: i64) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let limit = u64::try_from(limit).unwrap_or(0);
    if limit == 0 {
        return Ok(vec![]);
    }
    let size = file.metadata()?.len();
    if size > limit {
        file.seek(SeekFrom::Start(size - limit))?;
    }
    let mut contents = Vec::with_capacity(size.min(limit) as usize);
    // The file may keep growing while it is read.
    file.take(limit).read_to_end(&mut contents)?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_reads_tail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        assert_eq!(read_last_part_of_file(file.path(), 4).unwrap(), b"6789");
        assert_eq!(read_last_part_of_file(file.path(), 10).unwrap(), b"0123456789");
        assert_eq!(read_last_part_of_file(file.path(), 1000).unwrap(), b"0123456789");
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_non_positive_limit_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        assert!(read_last_part_of_file(file.path(), 0).unwrap().is_empty());
        assert!(read_last_part_of_file(file.path(), -5).unwrap().is_empty());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_missing_file() {
        let err = read_last_part_of_file(Path::new("/definitely/not/here.log"), 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_rereads_at_call_time() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"first").unwrap();
        assert_eq!(read_last_part_of_file(file.path(), 5).unwrap(), b"first");
        file.write_all(b"second").unwrap();
        assert_eq!(read_last_part_of_file(file.path(), 6).unwrap(), b"second");
    }
}
