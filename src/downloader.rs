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

//! Blocking HTTP transport and file downloads.

use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::{ArchwayError, ArchwayResult, IoResultExt};

/// An open response body
pub struct Download {
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Plain HTTP GET, the only network primitive archway needs
pub trait Transport {
    fn open(&self, url: &str) -> ArchwayResult<Download>;

    /// Fetch a whole response body as text
    fn get_text(&self, url: &str) -> ArchwayResult<String> {
        let mut download = self.open(url)?;
        let mut text = String::new();
        download
            .body
            .read_to_string(&mut text)
            .map_err(|e| ArchwayError::network(url, format!("failed to read response: {}", e)))?;
        Ok(text)
    }
}

/// `ureq`-backed transport
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Self {
        let mut builder = ureq::AgentBuilder::new().user_agent(&config.user_agent);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        Self {
            agent: builder.build(),
        }
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> ArchwayResult<Download> {
        debug!(url, "GET");
        match self.agent.get(url).call() {
            Ok(response) => {
                let content_length = response
                    .header("Content-Length")
                    .and_then(|v| v.parse().ok());
                Ok(Download {
                    content_length,
                    body: response.into_reader(),
                })
            }
            Err(ureq::Error::Status(status, _)) => Err(ArchwayError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            Err(e) => Err(ArchwayError::Network {
                url: url.to_string(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            }),
        }
    }
}

/// Last non-empty path segment of `url`
pub fn url_basename(url: &str) -> ArchwayResult<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| ArchwayError::invalid_name(url, format!("not a valid URL: {}", e)))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .ok_or_else(|| ArchwayError::invalid_name(url, "URL has no file name"))
}

/// Create the file a download of `url` will be written to.
///
/// Without `out` the URL's basename is used. An existing directory at the
/// chosen path is descended into with the basename appended; an existing
/// file is a [`ArchwayError::DestinationConflict`].
pub fn create_out_file(out: Option<&Path>, url: &str) -> ArchwayResult<(File, PathBuf)> {
    let path = match out {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(url_basename(url)?),
    };

    match fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => {
            let nested = path.join(url_basename(url)?);
            create_out_file(Some(nested.as_path()), url)
        }
        Ok(_) => Err(ArchwayError::DestinationConflict {
            path: path.display().to_string(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let file = File::create(&path).at_path(&path)?;
            Ok((file, path))
        }
        Err(e) => Err(ArchwayError::io(&path, e)),
    }
}

/// Download `url` to `out` (see [`create_out_file`]) and return the written path
pub fn download_to(
    transport: &dyn Transport,
    url: &str,
    out: Option<&Path>,
    progress: bool,
) -> ArchwayResult<PathBuf> {
    let (file, path) = create_out_file(out, url)?;
    let download = transport.open(url)?;

    let pb = if !progress {
        ProgressBar::hidden()
    } else if let Some(len) = download.content_length {
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("   {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb
    } else {
        ProgressBar::new_spinner()
    };

    let mut reader = pb.wrap_read(download.body);
    let mut writer = BufWriter::new(file);
    let written = io::copy(&mut reader, &mut writer)
        .and_then(|n| writer.flush().map(|_| n))
        .map_err(|e| ArchwayError::network(url, format!("download interrupted: {}", e)))?;
    pb.finish_and_clear();

    debug!(url, path = %path.display(), bytes = written, "downloaded");
    Ok(path)
}
