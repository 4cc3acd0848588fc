/*
 * archway - Arch Linux package search and source fetch helper.
 * Copyright (C) 2025  archway contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Staged `.tar.gz` extraction.
//!
//! Each stage derives its output path from its input path by stripping a
//! literal suffix (`foo.tar.gz` -> `foo.tar` -> `foo/`), so every output
//! location is known before a single byte is read. The `*_and_remove`
//! variants delete a stage's input only after that stage succeeded.

use flate2::read::MultiGzDecoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Entry, EntryType};
use tracing::{debug, trace, warn};

use crate::error::{ArchwayError, ArchwayResult, IoResultExt};

pub const GZIP_SUFFIX: &str = ".gz";
pub const TAR_SUFFIX: &str = ".tar";

/// Mode for directories while unpacking; directory entries get their
/// recorded mode once every entry is written
const PARENT_DIR_MODE: u32 = 0o755;
const MODE_MASK: u32 = 0o7777;

/// What a tar entry turns into on disk
#[derive(Debug)]
enum EntryKind {
    Directory,
    File,
    Symlink(PathBuf),
    Skipped(EntryType),
}

/// Derive a stage's output path by removing `suffix` from the input path.
pub fn output_path(path: &Path, suffix: &str) -> ArchwayResult<PathBuf> {
    let name = path
        .to_str()
        .ok_or_else(|| ArchwayError::invalid_name(path.display().to_string(), "not valid UTF-8"))?;
    let stripped = name
        .strip_suffix(suffix)
        .ok_or_else(|| ArchwayError::invalid_name(name, format!("expected a '{}' suffix", suffix)))?;
    if stripped.is_empty() || stripped.ends_with('/') {
        return Err(ArchwayError::invalid_name(
            name,
            format!("nothing left after removing '{}'", suffix),
        ));
    }
    Ok(PathBuf::from(stripped))
}

/// Decompress `foo.gz` into `foo`.
pub fn decompress(path: &Path) -> ArchwayResult<PathBuf> {
    let out_path = output_path(path, GZIP_SUFFIX)?;
    debug!(from = %path.display(), to = %out_path.display(), "decompressing");

    let input = File::open(path).at_path(path)?;
    let output = File::create(&out_path).at_path(&out_path)?;

    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(output);
    let result = io::copy(&mut decoder, &mut writer).and_then(|_| writer.flush());

    match result {
        Ok(()) => Ok(out_path),
        Err(e) => {
            drop(writer);
            if let Err(rm) = fs::remove_file(&out_path) {
                debug!(path = %out_path.display(), "could not remove partial output: {}", rm);
            }
            Err(ArchwayError::from_stream(path, e))
        }
    }
}

/// Unpack `foo.tar` into the directory `foo`.
///
/// Entries are materialized in stream order, so a directory entry always
/// exists on disk before any file listed after it. The first entry that
/// cannot be decoded or written aborts the whole operation.
pub fn unpack(path: &Path) -> ArchwayResult<PathBuf> {
    let root = output_path(path, TAR_SUFFIX)?;
    debug!(from = %path.display(), to = %root.display(), "unpacking");

    let file = File::open(path).at_path(path)?;
    create_dir_with_mode(&root, PARENT_DIR_MODE).at_path(&root)?;

    let mut archive = Archive::new(BufReader::new(file));
    let entries = archive
        .entries()
        .map_err(|e| ArchwayError::decode(path, e.to_string()))?;

    let mut count = 0usize;
    let mut dir_modes = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchwayError::decode(path, e.to_string()))?;
        unpack_entry(&mut entry, path, &root, &mut dir_modes)?;
        count += 1;
    }

    // Directory modes go on last, in reverse stream order, so read-only
    // directories can still be filled and the latest entry for a path wins.
    let mut applied = HashSet::new();
    for (dir, mode) in dir_modes.into_iter().rev() {
        if applied.insert(dir.clone()) {
            set_dir_mode(&dir, mode).at_path(&dir)?;
        }
    }

    debug!(entries = count, root = %root.display(), "unpacked");
    Ok(root)
}

/// [`decompress`], then delete the compressed input.
pub fn decompress_and_remove(path: &Path) -> ArchwayResult<PathBuf> {
    let out_path = decompress(path)?;
    fs::remove_file(path).at_path(path)?;
    Ok(out_path)
}

/// [`unpack`], then delete the tar file.
pub fn unpack_and_remove(path: &Path) -> ArchwayResult<PathBuf> {
    let root = unpack(path)?;
    fs::remove_file(path).at_path(path)?;
    Ok(root)
}

/// Turn `foo.tar.gz` into the directory `foo`, removing both archive files.
///
/// If unpacking fails the intermediate `foo.tar` stays on disk.
pub fn extract_tar_gz_and_remove(path: &Path) -> ArchwayResult<PathBuf> {
    // Both names are validated up front so a bad name never touches the disk.
    let tar_path = output_path(path, GZIP_SUFFIX)?;
    output_path(&tar_path, TAR_SUFFIX)?;

    let tar_path = decompress_and_remove(path)?;
    unpack_and_remove(&tar_path)
}

fn unpack_entry<R: Read>(
    entry: &mut Entry<'_, R>,
    archive: &Path,
    root: &Path,
    dir_modes: &mut Vec<(PathBuf, u32)>,
) -> ArchwayResult<()> {
    let raw = entry
        .path()
        .map_err(|e| ArchwayError::decode(archive, e.to_string()))?
        .into_owned();
    let relative = sanitize_entry_path(archive, &raw)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }

    let mode = entry
        .header()
        .mode()
        .map_err(|e| ArchwayError::decode(archive, e.to_string()))?
        & MODE_MASK;
    let kind = classify(entry).map_err(|e| ArchwayError::decode(archive, e.to_string()))?;
    let target = root.join(&relative);
    trace!(path = %relative.display(), mode, kind = ?kind, "entry");

    if !matches!(kind, EntryKind::Skipped(_)) {
        reject_symlinked_parents(archive, root, &relative)?;
    }

    match kind {
        EntryKind::Directory => {
            remove_non_directory(&target)?;
            create_dir_with_mode(&target, PARENT_DIR_MODE).at_path(&target)?;
            dir_modes.push((target, mode));
            Ok(())
        }
        EntryKind::File => {
            ensure_parent(&target)?;
            remove_non_directory(&target)?;
            write_file(entry, &target, mode).map_err(|e| ArchwayError::from_stream(&target, e))
        }
        EntryKind::Symlink(link) => {
            ensure_parent(&target)?;
            remove_non_directory(&target)?;
            create_symlink(&link, &target).at_path(&target)
        }
        EntryKind::Skipped(EntryType::XGlobalHeader) => Ok(()),
        EntryKind::Skipped(other) => {
            warn!(path = %relative.display(), "skipping unsupported entry type {:?}", other);
            Ok(())
        }
    }
}

fn classify<R: Read>(entry: &Entry<'_, R>) -> io::Result<EntryKind> {
    let entry_type = entry.header().entry_type();
    let kind = match entry_type {
        EntryType::Directory => EntryKind::Directory,
        EntryType::Regular | EntryType::Continuous => EntryKind::File,
        EntryType::Symlink => match entry.link_name()? {
            Some(link) => EntryKind::Symlink(link.into_owned()),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "symlink entry without a target",
                ))
            }
        },
        other => EntryKind::Skipped(other),
    };
    Ok(kind)
}

/// Reject absolute paths and `..` so every entry stays below the root.
fn sanitize_entry_path(archive: &Path, raw: &Path) -> ArchwayResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ArchwayError::decode(
                    archive,
                    format!("entry '{}' escapes the extraction root", raw.display()),
                ))
            }
        }
    }
    Ok(clean)
}

/// Refuse entries whose parent directories include a symlink, so nothing is
/// written through a link an earlier entry planted.
fn reject_symlinked_parents(archive: &Path, root: &Path, relative: &Path) -> ArchwayResult<()> {
    let parent = match relative.parent() {
        Some(parent) => parent,
        None => return Ok(()),
    };

    let mut current = root.to_path_buf();
    for component in parent.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ArchwayError::decode(
                    archive,
                    format!(
                        "entry '{}' passes through symlink '{}'",
                        relative.display(),
                        current.display()
                    ),
                ))
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(ArchwayError::io(&current, e)),
        }
    }
    Ok(())
}

/// Replace rather than follow whatever non-directory already sits at `path`
fn remove_non_directory(path: &Path) -> ArchwayResult<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path).at_path(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArchwayError::io(path, e)),
    }
}

fn ensure_parent(path: &Path) -> ArchwayResult<()> {
    match path.parent() {
        Some(parent) => create_dir_with_mode(parent, PARENT_DIR_MODE).at_path(parent),
        None => Ok(()),
    }
}

fn write_file<R: Read>(reader: &mut R, path: &Path, mode: u32) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = BufWriter::new(options.open(path)?);
    io::copy(reader, &mut file)?;
    file.flush()?;

    // The umask filters the mode given at creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

#[cfg(unix)]
fn create_dir_with_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dir_with_mode(path: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn set_dir_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_dir_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link: &Path, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, path)
}

#[cfg(not(unix))]
fn create_symlink(link: &Path, path: &Path) -> io::Result<()> {
    warn!(path = %path.display(), target = %link.display(), "symlinks are not supported here, skipping");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::{gzip_bytes, tar_bytes, tar_gz_bytes, Item};
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_output_path_strips_literal_suffix() {
        assert_eq!(
            output_path(Path::new("/tmp/foo.tar.gz"), GZIP_SUFFIX).unwrap(),
            PathBuf::from("/tmp/foo.tar")
        );
        assert_eq!(
            output_path(Path::new("/tmp/foo.tar"), TAR_SUFFIX).unwrap(),
            PathBuf::from("/tmp/foo")
        );
        // Only the literal suffix counts, not the "extension"
        assert_eq!(
            output_path(Path::new("pkg-1.0.tar"), TAR_SUFFIX).unwrap(),
            PathBuf::from("pkg-1.0")
        );
    }

    #[test]
    fn test_output_path_rejects_unexpected_names() {
        for name in ["foo.zip", "foo.tgz", ".gz", "dir/.gz"] {
            let err = output_path(Path::new(name), GZIP_SUFFIX).unwrap_err();
            assert!(matches!(err, ArchwayError::InvalidName { .. }), "{}", name);
        }
    }

    #[test]
    fn test_decompress_produces_tar_name() {
        let dir = tempdir().unwrap();
        let payload = tar_bytes(&[Item::File("foo/PKGBUILD", b"pkgname=foo\n", 0o644)]);
        let gz = dir.path().join("foo.tar.gz");
        fs::write(&gz, gzip_bytes(&payload)).unwrap();

        let out = decompress(&gz).unwrap();
        assert_eq!(out, dir.path().join("foo.tar"));
        assert_eq!(fs::read(&out).unwrap(), payload);
        assert!(gz.exists());
    }

    #[test]
    fn test_decompress_rejects_non_gzip() {
        let dir = tempdir().unwrap();
        let gz = dir.path().join("foo.tar.gz");
        fs::write(&gz, b"definitely not gzip data").unwrap();

        let err = decompress_and_remove(&gz).unwrap_err();
        assert!(matches!(err, ArchwayError::Decode { .. }), "{:?}", err);
        assert!(gz.exists(), "input must survive a failed stage");
        assert!(!dir.path().join("foo.tar").exists());
    }

    #[test]
    fn test_decompress_missing_input() {
        let dir = tempdir().unwrap();
        let err = decompress(&dir.path().join("absent.tar.gz")).unwrap_err();
        assert!(matches!(err, ArchwayError::Io { .. }));
    }

    #[test]
    fn test_unpack_creates_directory_before_file() {
        let dir = tempdir().unwrap();
        let tar = dir.path().join("foo.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::Dir("foo/", 0o755),
                Item::File("foo/PKGBUILD", b"pkgname=foo\n", 0o644),
            ]),
        )
        .unwrap();

        let root = unpack(&tar).unwrap();
        assert_eq!(root, dir.path().join("foo"));
        assert!(root.join("foo").is_dir());
        assert_eq!(fs::read(root.join("foo/PKGBUILD")).unwrap(), b"pkgname=foo\n");
        assert!(tar.exists());
    }

    #[test]
    fn test_unpack_creates_missing_parents() {
        let dir = tempdir().unwrap();
        let tar = dir.path().join("deep.tar");
        fs::write(&tar, tar_bytes(&[Item::File("a/b/c/file.txt", b"x", 0o644)])).unwrap();

        let root = unpack(&tar).unwrap();
        assert_eq!(fs::read(root.join("a/b/c/file.txt")).unwrap(), b"x");
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_preserves_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let tar = dir.path().join("modes.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::Dir("pkg/", 0o750),
                Item::File("pkg/build.sh", b"#!/bin/sh\n", 0o755),
                Item::File("pkg/notes", b"n", 0o600),
            ]),
        )
        .unwrap();

        let root = unpack(&tar).unwrap();
        let mode = |p: &str| fs::metadata(root.join(p)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("pkg"), 0o750);
        assert_eq!(mode("pkg/build.sh"), 0o755);
        assert_eq!(mode("pkg/notes"), 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_recreates_symlinks() {
        let dir = tempdir().unwrap();
        let tar = dir.path().join("links.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::File("pkg/real", b"data", 0o644),
                Item::Symlink("pkg/alias", "real"),
            ]),
        )
        .unwrap();

        let root = unpack(&tar).unwrap();
        assert_eq!(fs::read_link(root.join("pkg/alias")).unwrap(), PathBuf::from("real"));
        assert_eq!(fs::read(root.join("pkg/alias")).unwrap(), b"data");
    }

    #[test]
    fn test_unpack_skips_pax_global_header() {
        let dir = tempdir().unwrap();
        let tar = dir.path().join("snapshot.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::GlobalHeader(b"15 comment=abc\n"),
                Item::File("foo/PKGBUILD", b"pkgname=foo\n", 0o644),
            ]),
        )
        .unwrap();

        let root = unpack(&tar).unwrap();
        assert!(!root.join("pax_global_header").exists());
        assert!(root.join("foo/PKGBUILD").is_file());
    }

    #[test]
    fn test_unpack_rejects_escaping_entries() {
        let dir = tempdir().unwrap();
        let tar = dir.path().join("evil.tar");
        fs::write(&tar, tar_bytes(&[Item::RawFile(b"../evil", b"boom")])).unwrap();

        let err = unpack(&tar).unwrap_err();
        assert!(matches!(err, ArchwayError::Decode { .. }), "{:?}", err);
        assert!(!dir.path().join("evil").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_replaces_symlink_instead_of_writing_through_it() {
        let dir = tempdir().unwrap();
        let victim = dir.path().join("victim");
        fs::write(&victim, b"original").unwrap();
        let tar = dir.path().join("swap.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::Symlink("pkg/link", victim.to_str().unwrap()),
                Item::File("pkg/link", b"clobbered", 0o644),
            ]),
        )
        .unwrap();

        let root = unpack(&tar).unwrap();
        assert_eq!(fs::read(&victim).unwrap(), b"original");
        let link = root.join("pkg/link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_file());
        assert_eq!(fs::read(&link).unwrap(), b"clobbered");
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_rejects_entries_below_a_symlink() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let tar = dir.path().join("escape.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::Symlink("pkg/esc", outside.to_str().unwrap()),
                Item::File("pkg/esc/pwned", b"boom", 0o644),
            ]),
        )
        .unwrap();

        let err = unpack(&tar).unwrap_err();
        assert!(matches!(err, ArchwayError::Decode { .. }), "{:?}", err);
        assert!(!outside.join("pwned").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_applies_directory_mode_after_contents() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let tar = dir.path().join("late.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::File("pkg/a", b"a", 0o644),
                Item::Dir("pkg/", 0o700),
                Item::Dir("ro/", 0o555),
                Item::File("ro/f", b"f", 0o644),
            ]),
        )
        .unwrap();

        let root = unpack(&tar).unwrap();
        let mode = |p: &str| fs::metadata(root.join(p)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("pkg"), 0o700);
        assert_eq!(mode("ro"), 0o555);
        assert_eq!(fs::read(root.join("ro/f")).unwrap(), b"f");

        fs::set_permissions(root.join("ro"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_unpack_later_entry_replaces_earlier_file() {
        let dir = tempdir().unwrap();
        let tar = dir.path().join("dup.tar");
        fs::write(
            &tar,
            tar_bytes(&[
                Item::File("pkg/PKGBUILD", b"a much longer first version\n", 0o755),
                Item::File("pkg/PKGBUILD", b"short\n", 0o644),
            ]),
        )
        .unwrap();

        let root = unpack(&tar).unwrap();
        assert_eq!(fs::read(root.join("pkg/PKGBUILD")).unwrap(), b"short\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(root.join("pkg/PKGBUILD")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }

    #[test]
    fn test_extract_round_trip_removes_archives() {
        let dir = tempdir().unwrap();
        let files: [(&str, &[u8]); 3] = [
            ("foo/PKGBUILD", b"pkgname=foo\npkgver=1.0\n"),
            ("foo/.SRCINFO", b"pkgbase = foo\n"),
            ("foo/patches/fix.patch", b"--- a\n+++ b\n"),
        ];
        let items: Vec<Item<'_>> = files.iter().map(|(p, d)| Item::File(p, d, 0o644)).collect();
        let gz = dir.path().join("foo.tar.gz");
        fs::write(&gz, tar_gz_bytes(&items)).unwrap();

        let root = extract_tar_gz_and_remove(&gz).unwrap();
        assert_eq!(root, dir.path().join("foo"));
        for (path, data) in files {
            assert_eq!(fs::read(root.join(path)).unwrap(), data, "{}", path);
        }
        assert!(!gz.exists());
        assert!(!dir.path().join("foo.tar").exists());
    }

    #[test]
    fn test_extract_keeps_tar_when_unpack_fails() {
        let dir = tempdir().unwrap();
        let gz = dir.path().join("bad.tar.gz");
        fs::write(&gz, gzip_bytes(&tar_bytes(&[Item::RawFile(b"/etc/evil", b"x")]))).unwrap();

        let err = extract_tar_gz_and_remove(&gz).unwrap_err();
        assert!(matches!(err, ArchwayError::Decode { .. }));
        assert!(!gz.exists());
        assert!(dir.path().join("bad.tar").exists());
    }

    #[test]
    fn test_extract_validates_name_before_reading() {
        let dir = tempdir().unwrap();
        let gz = dir.path().join("foo.gz");
        fs::write(&gz, gzip_bytes(b"plain text")).unwrap();

        let err = extract_tar_gz_and_remove(&gz).unwrap_err();
        assert!(matches!(err, ArchwayError::InvalidName { .. }));
        assert!(gz.exists());
        assert!(!dir.path().join("foo").exists());
    }
}
