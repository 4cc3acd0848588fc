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

//! AUR RPC (v5) client.

use serde::Deserialize;

use super::{PackageDetails, PackageRecord, PackageSummary, PayloadLayout, QueryString, Repository, SearchResults};
use crate::config::AurConfig;
use crate::downloader::Transport;
use crate::error::{ArchwayError, ArchwayResult};
use crate::output::{format_timestamp, join_or_none, join_or_none_lines};

const RPC_VERSION: &str = "5";

/// AUR RPC response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct AurRpcResponse {
    #[serde(default)]
    pub version: u32,
    #[serde(rename = "type", default)]
    pub response_type: String,
    #[serde(default)]
    pub resultcount: usize,
    #[serde(default)]
    pub results: Vec<AurPackageInfo>,
    pub error: Option<String>,
}

/// AUR package information from RPC API
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct AurPackageInfo {
    #[serde(rename = "ID")]
    pub id: u64,
    pub name: String,
    pub package_base: String,
    #[serde(rename = "PackageBaseID")]
    pub package_base_id: u64,
    pub version: String,
    pub description: Option<String>,
    #[serde(rename = "URL")]
    pub url: Option<String>,
    pub num_votes: u32,
    pub popularity: f64,
    pub out_of_date: Option<u64>,
    pub maintainer: Option<String>,
    pub first_submitted: i64,
    pub last_modified: i64,
    #[serde(rename = "URLPath")]
    pub url_path: Option<String>,

    // Only present in info responses
    pub depends: Vec<String>,
    pub make_depends: Vec<String>,
    pub opt_depends: Vec<String>,
    pub conflicts: Vec<String>,
    pub provides: Vec<String>,
    pub replaces: Vec<String>,
    pub groups: Vec<String>,
    pub license: Vec<String>,
    pub keywords: Vec<String>,
}

impl AurPackageInfo {
    fn base(&self) -> &str {
        if self.package_base.is_empty() {
            &self.name
        } else {
            &self.package_base
        }
    }

    fn summary(&self) -> PackageSummary {
        PackageSummary {
            repo: "aur".to_string(),
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone().filter(|d| !d.is_empty()),
            out_of_date: self.out_of_date.is_some(),
            votes: Some(self.num_votes),
        }
    }

    fn details(&self, raw: String, snapshot: String) -> PackageDetails {
        let or_none = |value: &Option<String>| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "None".to_string())
        };

        PackageDetails {
            raw,
            fields: vec![
                ("Repository", "aur".to_string()),
                ("Name", self.name.clone()),
                ("Package Base", self.base().to_string()),
                ("Version", self.version.clone()),
                ("Description", or_none(&self.description)),
                ("URL", or_none(&self.url)),
                ("Licenses", join_or_none(&self.license)),
                ("Groups", join_or_none(&self.groups)),
                ("Provides", join_or_none(&self.provides)),
                ("Depends On", join_or_none(&self.depends)),
                ("Optional Deps", join_or_none_lines(&self.opt_depends)),
                ("Make Deps", join_or_none(&self.make_depends)),
                ("Conflicts With", join_or_none(&self.conflicts)),
                ("Replaces", join_or_none(&self.replaces)),
                ("Keywords", join_or_none(&self.keywords)),
                ("Maintainer", or_none(&self.maintainer)),
                ("Votes", self.num_votes.to_string()),
                ("Popularity", format!("{:.2}", self.popularity)),
                (
                    "Out Of Date",
                    self.out_of_date
                        .map(|t| format_timestamp(t as i64))
                        .unwrap_or_else(|| "No".to_string()),
                ),
                ("Submitted", format_timestamp(self.first_submitted)),
                ("Last Modified", format_timestamp(self.last_modified)),
                ("Snapshot", snapshot),
            ],
        }
    }
}

/// Client for the Arch User Repository
pub struct AurRepo<'a> {
    transport: &'a dyn Transport,
    config: AurConfig,
}

impl<'a> AurRepo<'a> {
    pub fn new(transport: &'a dyn Transport, config: AurConfig) -> Self {
        Self { transport, config }
    }

    pub fn search_url(&self, terms: &[String]) -> String {
        let query = QueryString::new()
            .push("v", RPC_VERSION)
            .push("type", "search")
            .push_all("arg", terms);
        format!("{}?{}", self.config.rpc_url, query)
    }

    pub fn info_url(&self, name: &str) -> String {
        let query = QueryString::new()
            .push("v", RPC_VERSION)
            .push("type", "info")
            .push("arg[]", name);
        format!("{}?{}", self.config.rpc_url, query)
    }

    /// Source archive URL; `URLPath` when the RPC provides one
    pub fn snapshot_url(&self, pkg: &AurPackageInfo) -> String {
        let base_url = self.config.base_url.trim_end_matches('/');
        match pkg.url_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => format!("{}{}", base_url, path),
            None => format!("{}/cgit/aur.git/snapshot/{}.tar.gz", base_url, pkg.base()),
        }
    }

    fn call(&self, url: String) -> ArchwayResult<(String, AurRpcResponse)> {
        let raw = self.transport.get_text(&url)?;
        let response: AurRpcResponse =
            serde_json::from_str(&raw).map_err(|e| ArchwayError::parse(url.as_str(), e))?;
        if let Some(message) = response.error.clone() {
            return Err(ArchwayError::network(url, message));
        }
        Ok((raw, response))
    }

    fn find(&self, name: &str) -> ArchwayResult<(String, Vec<AurPackageInfo>)> {
        let (raw, response) = self.call(self.info_url(name))?;
        let found = response
            .results
            .into_iter()
            .filter(|pkg| pkg.name == name)
            .collect();
        Ok((raw, found))
    }
}

impl Repository for AurRepo<'_> {
    fn label(&self) -> &str {
        "aur"
    }

    fn search(&self, terms: &[String]) -> ArchwayResult<SearchResults> {
        let (raw, response) = self.call(self.search_url(terms))?;
        let packages = response.results.iter().map(AurPackageInfo::summary).collect();
        Ok(SearchResults { raw, packages })
    }

    fn info(&self, query: &str) -> ArchwayResult<PackageDetails> {
        let (raw, found) = self.find(query)?;
        let pkg = super::pick_one(query, found, |p| format!("aur/{}", p.name))?;
        let snapshot = self.snapshot_url(&pkg);
        Ok(pkg.details(raw, snapshot))
    }

    fn lookup(&self, query: &str) -> ArchwayResult<Vec<PackageRecord>> {
        let (_, found) = self.find(query)?;
        Ok(found
            .iter()
            .map(|pkg| PackageRecord {
                name: pkg.name.clone(),
                repo: "aur".to_string(),
                url: self.snapshot_url(pkg),
                layout: PayloadLayout::User {
                    base: pkg.base().to_string(),
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::StubTransport;

    const YAY_INFO: &str = r#"{
        "version": 5, "type": "multiinfo", "resultcount": 1,
        "results": [{
            "ID": 1, "Name": "yay-bin", "PackageBaseID": 2, "PackageBase": "yay-bin",
            "Version": "12.4.2-1", "Description": "Yet another yogurt", "URL": "https://github.com/Jguer/yay",
            "NumVotes": 412, "Popularity": 9.5, "OutOfDate": null, "Maintainer": "jguer",
            "FirstSubmitted": 1500000000, "LastModified": 1700000000,
            "URLPath": "/cgit/aur.git/snapshot/yay-bin.tar.gz",
            "Depends": ["pacman", "git"], "OptDepends": ["sudo", "doas"], "License": ["GPL-3.0-or-later"]
        }]
    }"#;

    #[test]
    fn test_urls() {
        let transport = StubTransport::new();
        let repo = AurRepo::new(&transport, AurConfig::default());
        assert_eq!(
            repo.search_url(&["yay".to_string(), "bin".to_string()]),
            "https://aur.archlinux.org/rpc/?v=5&type=search&arg=yay+bin"
        );
        assert_eq!(
            repo.info_url("yay"),
            "https://aur.archlinux.org/rpc/?v=5&type=info&arg%5B%5D=yay"
        );
    }

    #[test]
    fn test_search_parses_results() {
        let transport = StubTransport::new().route("type=search", YAY_INFO);
        let repo = AurRepo::new(&transport, AurConfig::default());

        let results = repo.search(&["yay".to_string()]).unwrap();
        assert_eq!(results.packages.len(), 1);
        assert_eq!(results.packages[0].repo, "aur");
        assert_eq!(results.packages[0].votes, Some(412));
    }

    #[test]
    fn test_resolve_uses_url_path() {
        let transport = StubTransport::new().route("type=info", YAY_INFO);
        let repo = AurRepo::new(&transport, AurConfig::default());

        let record = repo.resolve("yay-bin").unwrap();
        assert_eq!(record.qualified_name(), "aur/yay-bin");
        assert_eq!(
            record.url,
            "https://aur.archlinux.org/cgit/aur.git/snapshot/yay-bin.tar.gz"
        );
        assert_eq!(
            record.layout,
            PayloadLayout::User {
                base: "yay-bin".to_string()
            }
        );
    }

    #[test]
    fn test_snapshot_fallback_uses_package_base() {
        let transport = StubTransport::new();
        let repo = AurRepo::new(&transport, AurConfig::default());
        let pkg = AurPackageInfo {
            name: "python-foo".to_string(),
            package_base: "foo".to_string(),
            ..AurPackageInfo::default()
        };
        assert_eq!(
            repo.snapshot_url(&pkg),
            "https://aur.archlinux.org/cgit/aur.git/snapshot/foo.tar.gz"
        );
    }

    #[test]
    fn test_resolve_missing() {
        let transport = StubTransport::new().route(
            "type=info",
            r#"{"version": 5, "type": "multiinfo", "resultcount": 0, "results": []}"#,
        );
        let repo = AurRepo::new(&transport, AurConfig::default());
        assert!(matches!(repo.resolve("nope"), Err(ArchwayError::NotFound { .. })));
        assert!(matches!(repo.info("nope"), Err(ArchwayError::NotFound { .. })));
    }

    #[test]
    fn test_rpc_error_is_reported() {
        let transport = StubTransport::new().route(
            "type=search",
            r#"{"version": 5, "type": "error", "resultcount": 0, "results": [], "error": "Too many package results."}"#,
        );
        let repo = AurRepo::new(&transport, AurConfig::default());
        match repo.search(&["a".to_string()]) {
            Err(ArchwayError::Network { message, .. }) => {
                assert_eq!(message, "Too many package results.")
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.packages)),
        }
    }

    #[test]
    fn test_info_fields() {
        let transport = StubTransport::new().route("type=info", YAY_INFO);
        let repo = AurRepo::new(&transport, AurConfig::default());

        let details = repo.info("yay-bin").unwrap();
        assert_eq!(details.get("Depends On"), Some("pacman git"));
        assert_eq!(details.get("Optional Deps"), Some("sudo\ndoas"));
        assert_eq!(details.get("Groups"), Some("None"));
        assert_eq!(details.get("Out Of Date"), Some("No"));
        assert_eq!(details.get("Votes"), Some("412"));
    }
}
