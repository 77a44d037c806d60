use super::pacdb;
use crate::{
    debug, info,
    types::{config::normalize_mirror_url, SourcePackage},
    utils::{
        archive::{append_bytes, gzip_tar, open_tar},
        slugify,
    },
    warn,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use console::style;
use reqwest::{header::IF_MODIFIED_SINCE, Client, StatusCode};
use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

/// A mirrored binary repository, together with its source tarball
pub struct MirrorProvider {
    repo: String,
    url: String,
    cache_db: PathBuf,
    cache_src: PathBuf,
    client: Client,
}

impl MirrorProvider {
    pub fn new(repo: &str, url: &str, cache_dir: &Path) -> Result<Self> {
        let url = normalize_mirror_url(url);
        let cache_dir = cache_dir.join(slugify(&url));
        if !cache_dir.is_dir() {
            fs::create_dir_all(&cache_dir).with_context(|| {
                format!("Failed to create cache directory {}", cache_dir.display())
            })?;
        }

        Ok(MirrorProvider {
            repo: repo.to_owned(),
            url,
            cache_db: cache_dir.join("db"),
            cache_src: cache_dir.join("src"),
            client: Client::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn sync(&mut self) -> Result<()> {
        debug!("Checking {} for updates", self.url());
        let url_src = format!("{}/{}.abs.tar.gz", self.url, self.repo);
        if let Err(e) = self.download(&url_src, &self.cache_src).await {
            // Builds can still be tracked, only `source` requests will miss
            warn!("No source tarball for {}: {:#}", style(&self.repo).bold(), e);
        }

        let url_db = format!("{}/{}.db", self.url, self.repo);
        self.download(&url_db, &self.cache_db).await?;
        Ok(())
    }

    /// Returns whether anything was downloaded
    async fn download(&self, url: &str, filename: &Path) -> Result<bool> {
        let mut req = self.client.get(url);
        if let Ok(modified) = fs::metadata(filename).and_then(|m| m.modified()) {
            let modified: DateTime<Utc> = modified.into();
            req = req.header(
                IF_MODIFIED_SINCE,
                modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            );
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        match resp.status() {
            StatusCode::NOT_MODIFIED => return Ok(false),
            StatusCode::OK => (),
            status => bail!("Failed to fetch {}: server returned {}", url, status),
        }

        info!("Downloading {}", url);
        let bytes = resp.bytes().await?;
        let part = filename.with_extension("part");
        tokio::fs::write(&part, &bytes).await?;
        tokio::fs::rename(&part, filename).await?;
        Ok(true)
    }

    pub fn packages(&self) -> Result<Vec<SourcePackage>> {
        pacdb::read_db(&self.repo, &self.cache_db)
    }

    /// Cut the directory of one package out of the cached source tarball
    pub fn sourceball(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.cache_src.is_file() {
            return Ok(None);
        }

        let mut tar = open_tar(&self.cache_src)?;
        let mut found = false;
        let data = gzip_tar(|builder| {
            for entry in tar.entries()? {
                let mut entry = entry?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let path = entry.path()?.into_owned();
                // Tarballs may or may not be rooted at the repository name
                let rel = path.strip_prefix(&self.repo).unwrap_or(&path);
                if !rel.starts_with(name) {
                    continue;
                }
                let mut content = Vec::new();
                entry.read_to_end(&mut content)?;
                append_bytes(builder, &rel.to_string_lossy(), &content)?;
                found = true;
            }
            Ok(())
        })?;

        Ok(if found { Some(data) } else { None })
    }
}
