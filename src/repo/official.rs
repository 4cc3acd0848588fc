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

//! Official repository client for the archlinux.org package web API.

use serde::Deserialize;

use super::{
    pick_one, PackageDetails, PackageRecord, PackageSummary, PayloadLayout, QueryString,
    Repository, SearchResults,
};
use crate::config::OfficialConfig;
use crate::downloader::Transport;
use crate::error::{ArchwayError, ArchwayResult};
use crate::output::{format_size, format_timestamp_str, join_or_none, join_or_none_lines};

/// Repositories whose sources live in the `packages` snapshot tree
const CORE_SOURCE_REPOS: &[&str] = &["core", "extra", "testing"];

/// Search API response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct OfficialSearchResponse {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub results: Vec<OfficialPackage>,
}

/// Package document as returned by both the search and the info endpoints
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OfficialPackage {
    pub pkgname: String,
    pub pkgbase: String,
    pub repo: String,
    pub arch: String,
    pub pkgver: String,
    pub pkgrel: String,
    pub epoch: u32,
    pub pkgdesc: String,
    pub url: Option<String>,
    pub filename: String,
    pub compressed_size: u64,
    pub installed_size: u64,
    pub build_date: String,
    pub last_update: String,
    pub flag_date: Option<String>,
    pub maintainers: Vec<String>,
    pub packager: String,
    pub groups: Vec<String>,
    pub licenses: Vec<String>,
    pub conflicts: Vec<String>,
    pub provides: Vec<String>,
    pub replaces: Vec<String>,
    pub depends: Vec<String>,
    pub optdepends: Vec<String>,
    pub makedepends: Vec<String>,
}

impl OfficialPackage {
    /// `[epoch:]pkgver-pkgrel`
    pub fn full_version(&self) -> String {
        if self.epoch > 0 {
            format!("{}:{}-{}", self.epoch, self.pkgver, self.pkgrel)
        } else {
            format!("{}-{}", self.pkgver, self.pkgrel)
        }
    }

    /// Whether sources come from the core snapshot tree or the community one
    pub fn is_core_source(&self) -> bool {
        CORE_SOURCE_REPOS.contains(&self.repo.to_lowercase().as_str())
    }

    fn base(&self) -> &str {
        if self.pkgbase.is_empty() {
            &self.pkgname
        } else {
            &self.pkgbase
        }
    }

    fn summary(&self) -> PackageSummary {
        PackageSummary {
            repo: self.repo.clone(),
            name: self.pkgname.clone(),
            version: self.full_version(),
            description: Some(self.pkgdesc.clone()).filter(|d| !d.is_empty()),
            out_of_date: self.flag_date.is_some(),
            votes: None,
        }
    }

    fn details(&self, raw: String) -> PackageDetails {
        // Older API revisions folded optional deps into `depends` as "name: reason"
        let (optional, required): (Vec<String>, Vec<String>) =
            self.depends.iter().cloned().partition(|d| d.contains(':'));
        let mut optdepends = self.optdepends.clone();
        optdepends.extend(optional);

        PackageDetails {
            raw,
            fields: vec![
                ("Repository", self.repo.clone()),
                ("Name", self.pkgname.clone()),
                ("Version", self.full_version()),
                ("Description", self.pkgdesc.clone()),
                ("Architecture", self.arch.clone()),
                ("URL", self.url.clone().unwrap_or_else(|| "None".to_string())),
                ("Licenses", join_or_none(&self.licenses)),
                ("Groups", join_or_none(&self.groups)),
                ("Provides", join_or_none(&self.provides)),
                ("Depends On", join_or_none(&required)),
                ("Optional Deps", join_or_none_lines(&optdepends)),
                ("Make Deps", join_or_none(&self.makedepends)),
                ("Conflicts With", join_or_none(&self.conflicts)),
                ("Replaces", join_or_none(&self.replaces)),
                ("Download Size", format_size(self.compressed_size)),
                ("Installed Size", format_size(self.installed_size)),
                ("Packager", self.packager.clone()),
                ("Build Date", format_timestamp_str(&self.build_date)),
            ],
        }
    }
}

/// Client for the official repositories
pub struct OfficialRepo<'a> {
    transport: &'a dyn Transport,
    config: OfficialConfig,
}

impl<'a> OfficialRepo<'a> {
    pub fn new(transport: &'a dyn Transport, config: OfficialConfig) -> Self {
        Self { transport, config }
    }

    /// Repository names sent with every search
    pub fn search_repos(&self) -> Vec<&'static str> {
        let mut repos = vec!["Core", "Extra", "Community"];
        if self.config.testing {
            repos.extend(["Testing", "Community-Testing"]);
        }
        if self.config.multilib {
            repos.push("Multilib");
            if self.config.testing {
                repos.push("Multilib-Testing");
            }
        }
        repos
    }

    pub fn search_url(&self, terms: &[String]) -> String {
        let mut query = QueryString::new().push("arch", &self.config.arch);
        for repo in self.search_repos() {
            query = query.push("repo", repo);
        }
        let query = query.push_all("q", terms);
        format!("{}/search/json/?{}", self.base_url(), query)
    }

    pub fn info_url(&self, repo: &str, name: &str) -> String {
        format!(
            "{}/{}/{}/{}/json/",
            self.base_url(),
            urlencoding::encode(repo),
            urlencoding::encode(&self.config.arch),
            urlencoding::encode(name)
        )
    }

    /// Source archive URL for a package document
    pub fn snapshot_url(&self, pkg: &OfficialPackage) -> String {
        let root = if pkg.is_core_source() {
            &self.config.core_snapshot_url
        } else {
            &self.config.community_snapshot_url
        };
        format!("{}/{}.tar.gz", root.trim_end_matches('/'), pkg.base())
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn fetch_search(&self, terms: &[String]) -> ArchwayResult<(String, OfficialSearchResponse)> {
        let url = self.search_url(terms);
        let raw = self.transport.get_text(&url)?;
        let response = serde_json::from_str(&raw).map_err(|e| ArchwayError::parse(url, e))?;
        Ok((raw, response))
    }

    fn fetch_info(&self, repo: &str, name: &str) -> ArchwayResult<(String, OfficialPackage)> {
        let url = self.info_url(repo, name);
        let raw = self.transport.get_text(&url).map_err(|e| {
            if e.is_not_found() {
                ArchwayError::NotFound {
                    query: format!("{}/{}", repo, name),
                }
            } else {
                e
            }
        })?;
        let pkg = serde_json::from_str(&raw).map_err(|e| ArchwayError::parse(url, e))?;
        Ok((raw, pkg))
    }

    /// Packages whose name is exactly `query`; `repo/name` pins the repository
    fn find(&self, query: &str) -> ArchwayResult<Vec<OfficialPackage>> {
        if let Some((repo, name)) = query.split_once('/') {
            let (_, pkg) = self.fetch_info(repo, name)?;
            return Ok(vec![pkg]);
        }

        let (_, response) = self.fetch_search(&[query.to_string()])?;
        Ok(response
            .results
            .into_iter()
            .filter(|pkg| pkg.pkgname == query)
            .collect())
    }

    fn record(&self, pkg: &OfficialPackage) -> PackageRecord {
        let packages_dir = if pkg.is_core_source() {
            "packages"
        } else {
            "community-packages"
        };
        PackageRecord {
            name: pkg.pkgname.clone(),
            repo: pkg.repo.clone(),
            url: self.snapshot_url(pkg),
            layout: PayloadLayout::Official {
                packages_dir: packages_dir.to_string(),
                repo: pkg.repo.clone(),
                arch: self.config.arch.clone(),
            },
        }
    }
}

impl Repository for OfficialRepo<'_> {
    fn label(&self) -> &str {
        "official"
    }

    fn search(&self, terms: &[String]) -> ArchwayResult<SearchResults> {
        let (raw, response) = self.fetch_search(terms)?;
        let packages = response.results.iter().map(OfficialPackage::summary).collect();
        Ok(SearchResults { raw, packages })
    }

    fn info(&self, query: &str) -> ArchwayResult<PackageDetails> {
        let (repo, name) = match query.split_once('/') {
            Some((repo, name)) => (repo.to_string(), name.to_string()),
            None => {
                let pkg = pick_one(query, self.find(query)?, |p| format!("{}/{}", p.repo, p.pkgname))?;
                (pkg.repo, pkg.pkgname)
            }
        };
        let (raw, pkg) = self.fetch_info(&repo, &name)?;
        Ok(pkg.details(raw))
    }

    fn lookup(&self, query: &str) -> ArchwayResult<Vec<PackageRecord>> {
        match self.find(query) {
            Ok(found) => Ok(found.iter().map(|pkg| self.record(pkg)).collect()),
            Err(ArchwayError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
