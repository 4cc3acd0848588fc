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

//! Package repository clients.
//!
//! Both repositories expose the same capabilities through [`Repository`]:
//! - keyword search
//! - detailed package info
//! - resolving a query to exactly one downloadable [`PackageRecord`]

pub mod aur;
pub mod official;

pub use aur::AurRepo;
pub use official::OfficialRepo;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ArchwayError, ArchwayResult};

/// Where a package's build files live inside its extracted source archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLayout {
    /// `<root>/<packages_dir>/<name>/repos/<repo>-<arch>`
    Official {
        packages_dir: String,
        repo: String,
        arch: String,
    },
    /// `<root>/<base>`
    User { base: String },
}

impl PayloadLayout {
    pub fn locate(&self, root: &Path, name: &str) -> PathBuf {
        match self {
            PayloadLayout::Official {
                packages_dir,
                repo,
                arch,
            } => root
                .join(packages_dir)
                .join(name)
                .join("repos")
                .join(format!("{}-{}", repo, arch)),
            PayloadLayout::User { base } => root.join(base),
        }
    }
}

/// A query resolved to one downloadable source archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    /// Repository label, e.g. `core` or `aur`
    pub repo: String,
    /// Fully qualified `.tar.gz` source archive URL
    pub url: String,
    pub layout: PayloadLayout,
}

impl PackageRecord {
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.repo, self.name)
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSummary {
    pub repo: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub out_of_date: bool,
    pub votes: Option<u32>,
}

/// Parsed search hits plus the response they came from
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub raw: String,
    pub packages: Vec<PackageSummary>,
}

/// Labelled info fields in display order, plus the raw response
#[derive(Debug, Clone)]
pub struct PackageDetails {
    pub raw: String,
    pub fields: Vec<(&'static str, String)>,
}

impl PackageDetails {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| v.as_str())
    }
}

/// Capabilities shared by the official repository and the AUR
pub trait Repository {
    /// Short label used in messages
    fn label(&self) -> &str;

    fn search(&self, terms: &[String]) -> ArchwayResult<SearchResults>;

    fn info(&self, query: &str) -> ArchwayResult<PackageDetails>;

    /// Every record that matches `query` exactly
    fn lookup(&self, query: &str) -> ArchwayResult<Vec<PackageRecord>>;

    /// Resolve `query` to exactly one record
    fn resolve(&self, query: &str) -> ArchwayResult<PackageRecord> {
        pick_one(query, self.lookup(query)?, PackageRecord::qualified_name)
    }
}

/// Reduce candidates to exactly one, refusing to guess between several
pub fn pick_one<T>(query: &str, mut candidates: Vec<T>, describe: impl Fn(&T) -> String) -> ArchwayResult<T> {
    match candidates.len() {
        0 => Err(ArchwayError::NotFound {
            query: query.to_string(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(ArchwayError::AmbiguousQuery {
            query: query.to_string(),
            matches: candidates.iter().map(describe).collect(),
        }),
    }
}

/// `key=value` pairs joined with `&`; multiple values for one key are
/// joined with `+`
#[derive(Debug, Default, Clone)]
pub struct QueryString {
    pairs: Vec<String>,
}

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, key: &str, value: &str) -> Self {
        self.push_all(key, &[value])
    }

    pub fn push_all<S: AsRef<str>>(mut self, key: &str, values: &[S]) -> Self {
        let joined = values
            .iter()
            .map(|v| urlencoding::encode(v.as_ref()).into_owned())
            .collect::<Vec<_>>()
            .join("+");
        self.pairs.push(format!("{}={}", urlencoding::encode(key), joined));
        self
    }
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pairs.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_official_layout() {
        let layout = PayloadLayout::Official {
            packages_dir: "packages".to_string(),
            repo: "core".to_string(),
            arch: "x86_64".to_string(),
        };
        assert_eq!(
            layout.locate(Path::new("/tmp/w/bash"), "bash"),
            PathBuf::from("/tmp/w/bash/packages/bash/repos/core-x86_64")
        );
    }

    #[test]
    fn test_user_layout() {
        let layout = PayloadLayout::User {
            base: "yay".to_string(),
        };
        assert_eq!(
            layout.locate(Path::new("/tmp/w/yay"), "yay-bin"),
            PathBuf::from("/tmp/w/yay/yay")
        );
    }

    #[test]
    fn test_pick_one() {
        assert_eq!(pick_one("a", vec!["a"], |s| s.to_string()).unwrap(), "a");

        let err = pick_one::<&str>("a", vec![], |s| s.to_string()).unwrap_err();
        assert!(matches!(err, ArchwayError::NotFound { .. }));

        match pick_one("a", vec!["core/a", "extra/a"], |s| s.to_string()) {
            Err(ArchwayError::AmbiguousQuery { matches, .. }) => {
                assert_eq!(matches, vec!["core/a", "extra/a"])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_query_string() {
        let query = QueryString::new()
            .push("arch", "x86_64")
            .push("repo", "Core")
            .push("repo", "Extra")
            .push_all("q", &["python", "a&b"]);
        assert_eq!(
            query.to_string(),
            "arch=x86_64&repo=Core&repo=Extra&q=python+a%26b"
        );
        assert_eq!(QueryString::new().push("arg[]", "yay").to_string(), "arg%5B%5D=yay");
    }
}
