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

//! Terminal rendering of search results and package details.

use chrono::{DateTime, Utc};
use console::style;
use std::fmt::Write as _;

use crate::repo::{PackageDetails, SearchResults};

const NONE: &str = "None";

/// Print search hits, or the raw response when `json` is set
pub fn print_search(results: &SearchResults, json: bool) {
    if json {
        println!("{}", results.raw.trim_end());
    } else {
        print!("{}", render_search(results));
    }
}

/// Print package details, or the raw response when `json` is set
pub fn print_details(details: &PackageDetails, json: bool) {
    if json {
        println!("{}", details.raw.trim_end());
    } else {
        print!("{}", render_details(details));
    }
}

pub fn render_search(results: &SearchResults) -> String {
    let mut out = String::new();
    for pkg in &results.packages {
        let version = if pkg.out_of_date {
            style(&pkg.version).red().bold()
        } else {
            style(&pkg.version).bold()
        };
        let _ = write!(
            out,
            "{}{} {}",
            style(&pkg.repo).blue().bold(),
            style(format!("/{}", pkg.name)).bold(),
            version
        );
        if let Some(votes) = pkg.votes {
            let _ = write!(out, " ({})", votes);
        }
        out.push('\n');
        if let Some(desc) = &pkg.description {
            let _ = writeln!(out, "    {}", desc);
        }
    }
    out
}

pub fn render_details(details: &PackageDetails) -> String {
    let width = details
        .fields
        .iter()
        .map(|(label, _)| label.len())
        .max()
        .unwrap_or(0);
    let indent = " ".repeat(width + 3);

    let mut out = String::new();
    for (label, value) in &details.fields {
        let mut lines = value.lines();
        let first = lines.next().unwrap_or("");
        let _ = writeln!(
            out,
            "{} {}",
            style(format!("{:<width$} :", label, width = width)).bold(),
            first
        );
        for line in lines {
            let _ = writeln!(out, "{}{}", indent, line);
        }
    }
    out.push('\n');
    out
}

/// Space-separated list, `None` when empty
pub fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        NONE.to_string()
    } else {
        items.join(" ")
    }
}

/// One item per line, `None` when empty
pub fn join_or_none_lines(items: &[String]) -> String {
    if items.is_empty() {
        NONE.to_string()
    } else {
        items.join("\n")
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;

    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Unix seconds as `YYYY-MM-DD HH:MM`
pub fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// RFC 3339 timestamp as `YYYY-MM-DD HH:MM`; anything else is passed through
pub fn format_timestamp_str(value: &str) -> String {
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => t.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string(),
        Err(_) if value.is_empty() => NONE.to_string(),
        Err(_) => value.to_string(),
    }
}
