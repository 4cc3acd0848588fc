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

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

mod archive;
mod config;
mod downloader;
mod error;
mod fetch;
mod logging;
mod output;
mod repo;

use config::Config;
use downloader::HttpTransport;
use error::ArchwayResult;
use fetch::Fetcher;
use repo::{AurRepo, OfficialRepo, Repository};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Copyright (C) 2025  archway contributors\n",
    "License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>\n\n",
    "This is free software; you are free to change and redistribute it.\n",
    "There is NO WARRANTY, to the extent permitted by law."
);

#[derive(Parser, Debug)]
#[command(name = "archway")]
#[command(version = config::VERSION)]
#[command(long_version = LONG_VERSION)]
#[command(about = "Search Arch Linux packages and fetch their build files.")]
#[command(group(ArgGroup::new("operation").required(true).args(["search", "info", "get"])))]
struct Cli {
    #[arg(short = 's', long, help = "Search packages by keyword")]
    search: bool,
    #[arg(short = 'i', long, help = "Show detailed package information")]
    info: bool,
    #[arg(short = 'g', long, help = "Download and extract package build files")]
    get: bool,
    #[arg(short = 'a', long, help = "Include the AUR")]
    aur: bool,
    #[arg(short = 'A', long, help = "Use the AUR only")]
    auronly: bool,
    #[arg(short = 'm', long, help = "Include multilib repositories")]
    multilib: bool,
    #[arg(short = 't', long, help = "Include testing repositories")]
    testing: bool,
    #[arg(short = 'j', long, help = "Print raw JSON responses")]
    json: bool,
    #[arg(short = 'v', long, help = "Verbose logging")]
    verbose: bool,
    #[arg(short = 'o', long, value_name = "DIR", help = "Directory for fetched packages")]
    outdir: Option<PathBuf>,
    #[arg(value_name = "QUERY", required = true)]
    queries: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Search,
    Info,
    Get,
}

impl Cli {
    fn operation(&self) -> Operation {
        if self.search {
            Operation::Search
        } else if self.info {
            Operation::Info
        } else {
            Operation::Get
        }
    }

    fn apply_to(&self, config: &mut Config) {
        config.official.testing |= self.testing;
        config.official.multilib |= self.multilib;
        if let Some(dir) = &self.outdir {
            config.fetch.output_dir = dir.clone();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let mut config = Config::load().context("failed to load configuration")?;
    cli.apply_to(&mut config);

    logging::init_with_file(
        logging::effective_level(cli.verbose, &config.logging.level),
        config.logging.file.as_deref(),
    );
    if !config.color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let transport = HttpTransport::new(&config.http);
    let official = OfficialRepo::new(&transport, config.official.clone());
    let aur = AurRepo::new(&transport, config.aur.clone());

    let mut repos: Vec<&dyn Repository> = Vec::new();
    if !cli.auronly {
        repos.push(&official);
    }
    if cli.aur || cli.auronly {
        repos.push(&aur);
    }

    let ok = match cli.operation() {
        Operation::Search => search(&repos, &cli.queries, cli.json),
        Operation::Info => for_each_query(&repos, &cli.queries, |repo, query| {
            let details = repo.info(query)?;
            output::print_details(&details, cli.json);
            Ok(())
        }),
        Operation::Get => {
            let fetcher = Fetcher::new(&transport, &config.fetch);
            for_each_query(&repos, &cli.queries, |repo, query| {
                let path = fetcher.get(repo, query, &config.fetch.output_dir)?;
                println!("{} {}", style("::").green().bold(), path.display());
                Ok(())
            })
        }
    };
    Ok(ok)
}

/// Search every repository; succeeds if any of them answered
fn search(repos: &[&dyn Repository], terms: &[String], json: bool) -> bool {
    let mut any_ok = false;
    for repo in repos {
        match repo.search(terms) {
            Ok(results) => {
                output::print_search(&results, json);
                any_ok = true;
            }
            Err(e) => eprintln!("{} {} search failed: {}", style("error:").red().bold(), repo.label(), e),
        }
    }
    any_ok
}

/// Run `action` for each query against the repositories in order until one
/// succeeds. Returns false if some query was not satisfied anywhere.
fn for_each_query(
    repos: &[&dyn Repository],
    queries: &[String],
    mut action: impl FnMut(&dyn Repository, &str) -> ArchwayResult<()>,
) -> bool {
    let mut all_ok = true;
    for query in queries {
        let satisfied = repos.iter().any(|repo| match action(*repo, query) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("{} {}: {}", style("error:").red().bold(), repo.label(), e);
                false
            }
        });
        all_ok &= satisfied;
    }
    all_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchwayError;
    use crate::repo::{PackageDetails, PackageRecord, SearchResults};
    use clap::CommandFactory;
    use std::cell::RefCell;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exactly_one_operation() {
        assert!(Cli::try_parse_from(["archway", "bash"]).is_err());
        assert!(Cli::try_parse_from(["archway", "-s", "-g", "bash"]).is_err());
        assert!(Cli::try_parse_from(["archway", "-s"]).is_err());

        let cli = Cli::try_parse_from(["archway", "-g", "-A", "-o", "/tmp/pkgs", "yay", "paru"]).unwrap();
        assert_eq!(cli.operation(), Operation::Get);
        assert!(cli.auronly);
        assert_eq!(cli.queries, vec!["yay", "paru"]);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from(["archway", "-s", "-t", "-m", "-o", "out", "x"]).unwrap();
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert!(config.official.testing);
        assert!(config.official.multilib);
        assert_eq!(config.fetch.output_dir, PathBuf::from("out"));
    }

    struct Fixed {
        label: &'static str,
        known: &'static [&'static str],
        calls: RefCell<Vec<String>>,
    }

    impl Repository for Fixed {
        fn label(&self) -> &str {
            self.label
        }

        fn search(&self, _terms: &[String]) -> ArchwayResult<SearchResults> {
            Err(ArchwayError::network("http://x", "offline"))
        }

        fn info(&self, query: &str) -> ArchwayResult<PackageDetails> {
            self.calls.borrow_mut().push(query.to_string());
            if self.known.contains(&query) {
                Ok(PackageDetails {
                    raw: String::new(),
                    fields: Vec::new(),
                })
            } else {
                Err(ArchwayError::NotFound {
                    query: query.to_string(),
                })
            }
        }

        fn lookup(&self, _query: &str) -> ArchwayResult<Vec<PackageRecord>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_first_repository_to_succeed_wins() {
        let official = Fixed {
            label: "official",
            known: &["bash"],
            calls: RefCell::new(Vec::new()),
        };
        let aur = Fixed {
            label: "aur",
            known: &["bash", "yay"],
            calls: RefCell::new(Vec::new()),
        };
        let repos: Vec<&dyn Repository> = vec![&official, &aur];
        let queries = vec!["bash".to_string(), "yay".to_string()];

        assert!(for_each_query(&repos, &queries, |repo, q| repo.info(q).map(|_| ())));
        assert_eq!(*official.calls.borrow(), vec!["bash", "yay"]);
        assert_eq!(*aur.calls.borrow(), vec!["yay"]);

        let queries = vec!["nope".to_string()];
        assert!(!for_each_query(&repos, &queries, |repo, q| repo.info(q).map(|_| ())));
    }

    #[test]
    fn test_search_fails_only_if_every_repository_fails() {
        let official = Fixed {
            label: "official",
            known: &[],
            calls: RefCell::new(Vec::new()),
        };
        let repos: Vec<&dyn Repository> = vec![&official];
        assert!(!search(&repos, &["x".to_string()], false));
    }
}
