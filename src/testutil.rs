//! Fixtures shared by unit tests
use crate::utils::archive::append_bytes;

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tar::Builder;
use xz2::write::XzEncoder;

/// Write a minimal `<name>-<version>-x86_64.pkg.tar.xz` into `dir`
pub fn make_pkg(dir: &Path, name: &str, base: &str, version: &str) -> PathBuf {
    let pkginfo = format!(
        "# Generated by makepkg
pkgname = {name}
pkgbase = {base}
pkgver = {version}
pkgdesc = Test package {name}
arch = x86_64
size = 1024
depend = glibc
depend = zlib>=1.2
group = test-group
"
    );
    let mut builder = Builder::new(XzEncoder::new(Vec::new(), 6));
    append_bytes(&mut builder, ".PKGINFO", pkginfo.as_bytes()).unwrap();
    append_bytes(&mut builder, "usr/bin/hello", b"#!/bin/sh\necho hello\n").unwrap();
    let data = builder.into_inner().unwrap().finish().unwrap();

    let path = dir.join(format!("{}-{}-x86_64.pkg.tar.xz", name, version));
    fs::write(&path, data).unwrap();
    path
}

/// Lay out a one-package source tree under `root/<name>`
pub fn make_srcdir(root: &Path, name: &str, version: &str, release: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(".SRCINFO"),
        format!(
            "pkgbase = {name}\n\tpkgver = {version}\n\tpkgrel = {release}\n\tmakedepends = make\n\npkgname = {name}\n\tpkgdesc = Test package {name}\n"
        ),
    )
    .unwrap();
    fs::write(dir.join("PKGBUILD"), format!("pkgname={name}\n")).unwrap();
}

/// Mark `root/<name>` as excluded, creating the directory if needed
pub fn exclude_srcdir(root: &Path, name: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("EXCLUDE"), "").unwrap();
}

/// Run git in `dir`, panicking on failure
pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=Architect Test",
            "-c",
            "user.email=test@example.org",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed in {}", args, dir.display());
}

/// Commit everything in the work tree at `dir`
pub fn git_commit_all(dir: &Path, msg: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", msg]);
}
