// kvmdeploy
// Copyright (C) Riff Labs Limited <team@riff.cc>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Base image resolution and the shared download cache.
//!
//! Downloads land in a temporary file inside the cache directory and are
//! renamed to their final name only once complete, so a half-written image
//! is never visible under the name later runs look for.

use crate::error::{DeployError, ErrorContext, Result};
use crate::output::OutputHandlerRef;
use reqwest::Url;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Where a base image comes from
#[derive(Debug, PartialEq, Eq)]
pub enum ImageSource {
    Remote { url: Url, file_name: String },
    Local(PathBuf),
}

impl ImageSource {
    pub fn parse(image_path: &str) -> Result<Self> {
        match Url::parse(image_path) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                let file_name = url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .ok_or_else(|| DeployError::Config(format!("image URL has no file name: {}", image_path)))?;
                Ok(ImageSource::Remote { url, file_name })
            }
            _ => Ok(ImageSource::Local(PathBuf::from(image_path))),
        }
    }
}

pub struct ImageCache {
    dir: PathBuf,
    timeout: Duration,
    // one download at a time in this process; a second node asking for the
    // same URL then finds the published file
    download_lock: Mutex<()>,
    output: OutputHandlerRef,
}

impl ImageCache {
    pub fn new(dir: &Path, timeout: Duration, output: OutputHandlerRef) -> Self {
        Self { dir: dir.to_path_buf(), timeout, download_lock: Mutex::new(()), output }
    }

    /// Local path of the base image named by `image_path`, downloading it
    /// first when it is an http(s) URL that isn't cached yet.
    pub fn resolve(&self, image_path: &str) -> Result<PathBuf> {
        let path = match ImageSource::parse(image_path)? {
            ImageSource::Remote { url, file_name } => self.fetch(&url, &file_name)?,
            ImageSource::Local(path) => self.locate(path),
        };
        if !path.is_file() {
            return Err(DeployError::Path(path));
        }
        Ok(path)
    }

    // a relative path that doesn't exist here may name an image in the cache
    fn locate(&self, path: PathBuf) -> PathBuf {
        if path.exists() || path.is_absolute() {
            return path;
        }
        let cached = self.dir.join(&path);
        if cached.exists() { cached } else { path }
    }

    fn fetch(&self, url: &Url, file_name: &str) -> Result<PathBuf> {
        let target = self.dir.join(file_name);
        if target.is_file() {
            self.output.on_image_cached(&target);
            return Ok(target);
        }

        let _guard = self.download_lock.lock()
            .map_err(|_| DeployError::Other("image download lock poisoned".into()))?;
        if target.is_file() {
            self.output.on_image_cached(&target);
            return Ok(target);
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating image cache {}", self.dir.display()))?;
        self.output.on_image_download(url.as_str(), &target);

        let mut partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".part")
            .tempfile_in(&self.dir)
            .with_context(|| format!("creating temporary file in {}", self.dir.display()))?;
        self.download(url, partial.as_file_mut())?;

        partial.persist(&target)
            .map_err(|e| DeployError::Filesystem(format!("publishing {}: {}", target.display(), e.error)))?;
        Ok(target)
    }

    fn download(&self, url: &Url, file: &mut fs::File) -> Result<()> {
        let failure = |reason: String| DeployError::ExternalTool { command: format!("GET {}", url), reason };

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()
            .map_err(|e| failure(format!("runtime: {}", e)))?;

        rt.block_on(async {
            let client = reqwest::Client::builder().timeout(self.timeout).build()
                .map_err(|e| failure(format!("HTTP: {}", e)))?;
            let mut resp = client.get(url.clone()).send().await
                .map_err(|e| failure(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(failure(format!("server answered {}", resp.status())));
            }
            while let Some(chunk) = resp.chunk().await.map_err(|e| failure(e.to_string()))? {
                file.write_all(&chunk).context("writing downloaded image")?;
            }
            file.sync_all().context("flushing downloaded image")?;
            Ok(())
        })
    }
}
