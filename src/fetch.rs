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

//! Package source fetching.
//!
//! A fetch resolves a query to one package, downloads its source snapshot
//! into a private temporary directory, extracts it and copies the package's
//! build files to `<out_dir>/<name>`. The temporary directory is removed
//! whether or not the copy succeeded.

use console::style;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info_span, warn};
use walkdir::WalkDir;

use crate::archive;
use crate::config::FetchConfig;
use crate::downloader::{self, Transport};
use crate::error::{ArchwayError, ArchwayResult};
use crate::repo::{PackageRecord, Repository};

const WORK_DIR_PREFIX: &str = "archway-";

/// One fetch, owned by a single `get` call. Dropping it removes the
/// working directory.
struct FetchJob {
    record: PackageRecord,
    work_dir: TempDir,
    dest: PathBuf,
}

/// Pipeline stage, reported alongside failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Resolving,
    Downloading,
    Extracting,
    Locating,
    Copying,
    CleaningUp,
    Done,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStage::Resolving => "resolving",
            FetchStage::Downloading => "downloading",
            FetchStage::Extracting => "extracting",
            FetchStage::Locating => "locating",
            FetchStage::Copying => "copying",
            FetchStage::CleaningUp => "cleaning up",
            FetchStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Downloads, extracts and installs package sources
pub struct Fetcher<'a> {
    transport: &'a dyn Transport,
    temp_root: Option<PathBuf>,
    progress: bool,
}

impl<'a> Fetcher<'a> {
    pub fn new(transport: &'a dyn Transport, config: &FetchConfig) -> Self {
        Self {
            transport,
            temp_root: config.temp_dir.clone(),
            progress: config.progress,
        }
    }

    /// Fetch the package `query` resolves to in `repo` into `out_dir/<name>`
    /// and return that directory
    pub fn get(&self, repo: &dyn Repository, query: &str, out_dir: &Path) -> ArchwayResult<PathBuf> {
        let span = info_span!("fetch", query, repo = repo.label());
        let _enter = span.enter();

        let mut stage = FetchStage::Resolving;
        let result = self.run(repo, query, out_dir, &mut stage);
        match &result {
            Ok(path) => debug!(path = %path.display(), "{}", stage),
            Err(e) => debug!(%stage, error = %e, "fetch failed"),
        }
        result
    }

    fn run(
        &self,
        repo: &dyn Repository,
        query: &str,
        out_dir: &Path,
        stage: &mut FetchStage,
    ) -> ArchwayResult<PathBuf> {
        // A plain name can be checked before asking the repository anything
        if is_single_component(query) {
            ensure_absent(&out_dir.join(query))?;
        }

        let record = repo.resolve(query)?;
        if !is_single_component(&record.name) {
            return Err(ArchwayError::invalid_name(
                record.name,
                "package name is not a single path component",
            ));
        }
        let dest = out_dir.join(&record.name);
        ensure_absent(&dest)?;
        debug!(package = %record.qualified_name(), url = %record.url, "resolved");

        let job = FetchJob {
            record,
            work_dir: self.work_dir()?,
            dest,
        };
        self.execute(job, stage)
    }

    fn execute(&self, job: FetchJob, stage: &mut FetchStage) -> ArchwayResult<PathBuf> {
        let FetchJob {
            record,
            work_dir,
            dest,
        } = job;

        *stage = FetchStage::Downloading;
        announce("Downloading", &record.url);
        let archive_path = downloader::download_to(self.transport, &record.url, Some(work_dir.path()), self.progress)?;

        *stage = FetchStage::Extracting;
        announce("Extracting", &archive_path.display());
        let root = archive::extract_tar_gz_and_remove(&archive_path)?;

        *stage = FetchStage::Locating;
        let payload = record.layout.locate(&root, &record.name);
        debug!(payload = %payload.display(), "located payload");

        *stage = FetchStage::Copying;
        announce(
            "Copying",
            &format!("{} to {}", payload.display(), dest.display()),
        );
        let copied = copy_tree(&payload, &dest);
        if copied.is_err() {
            remove_partial(&dest);
        }

        *stage = FetchStage::CleaningUp;
        let work_path = work_dir.path().to_path_buf();
        if let Err(e) = work_dir.close() {
            warn!(path = %work_path.display(), error = %e, "failed to remove temporary directory");
        }

        copied?;
        *stage = FetchStage::Done;
        Ok(dest)
    }

    fn work_dir(&self) -> ArchwayResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORK_DIR_PREFIX);
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root).map_err(|e| ArchwayError::io(root, e)),
            None => builder
                .tempdir()
                .map_err(|e| ArchwayError::io(std::env::temp_dir(), e)),
        }
    }
}

fn announce(action: &str, subject: &dyn fmt::Display) {
    println!("{} {} {} ...", style("::").blue().bold(), style(action).bold(), subject);
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn ensure_absent(path: &Path) -> ArchwayResult<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(ArchwayError::AlreadyExists {
            path: path.display().to_string(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArchwayError::io(path, e)),
    }
}

fn remove_partial(dest: &Path) {
    if let Err(e) = fs::remove_dir_all(dest) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %dest.display(), error = %e, "failed to remove partial copy");
        }
    }
}

/// Recursively copy the directory `from` to `to`, keeping permission bits
/// and recreating symlinks
pub fn copy_tree(from: &Path, to: &Path) -> ArchwayResult<()> {
    let meta = fs::metadata(from)
        .map_err(|e| ArchwayError::copy(from, to, format!("payload not found: {}", e)))?;
    if !meta.is_dir() {
        return Err(ArchwayError::copy(from, to, "payload is not a directory"));
    }

    // Directory modes are applied last so read-only directories can be filled
    let mut dirs = Vec::new();
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| ArchwayError::copy(from, to, e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| ArchwayError::copy(entry.path(), to, e.to_string()))?;
        let target = if relative.as_os_str().is_empty() {
            to.to_path_buf()
        } else {
            to.join(relative)
        };

        let file_type = entry.file_type();
        let copied = if file_type.is_dir() {
            fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)
        } else {
            fs::copy(entry.path(), &target).map(|_| ())
        };
        copied.map_err(|e| ArchwayError::copy(entry.path(), &target, e.to_string()))?;

        if file_type.is_dir() {
            let permissions = entry
                .metadata()
                .map_err(|e| ArchwayError::copy(entry.path(), &target, e.to_string()))?
                .permissions();
            dirs.push((target, permissions));
        }
    }

    for (dir, permissions) in dirs.into_iter().rev() {
        fs::set_permissions(&dir, permissions).map_err(|e| ArchwayError::copy(from, &dir, e.to_string()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    fs::copy(link, target).map(|_| ())
}
