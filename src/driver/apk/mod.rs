pub mod axml;
pub mod dex;
#[cfg(test)]
pub mod fixtures;

pub use dex::MethodSignature;

use crate::driver::traits::ApkAnalyzer;
use anyhow::{Context, Result};
use axml::{Attribute, XmlDocument};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Metadata extracted from an APK
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkInfo {
    pub app_name: Option<String>,
    pub package: Option<String>,
    pub icon: Option<String>,
    pub permissions: Vec<String>,
    pub activities: Vec<String>,
    pub version_code: Option<String>,
    pub version_name: Option<String>,
    pub min_sdk_version: Option<String>,
    pub target_sdk_version: Option<String>,
    pub max_sdk_version: Option<String>,
    pub sha256: String,
    pub entry_count: usize,
    pub dex_files: Vec<String>,
}

fn attr<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.as_str())
}

impl ApkInfo {
    /// Fill manifest-derived fields from a decoded manifest
    pub fn from_manifest(doc: &XmlDocument) -> Self {
        let mut info = ApkInfo::default();

        if let Some(manifest) = doc.elements("manifest").next() {
            info.package = attr(manifest, "package").map(str::to_string);
            info.version_code = attr(manifest, "versionCode").map(str::to_string);
            info.version_name = attr(manifest, "versionName").map(str::to_string);
        }
        if let Some(sdk) = doc.elements("uses-sdk").next() {
            info.min_sdk_version = attr(sdk, "minSdkVersion").map(str::to_string);
            info.target_sdk_version = attr(sdk, "targetSdkVersion").map(str::to_string);
            info.max_sdk_version = attr(sdk, "maxSdkVersion").map(str::to_string);
        }
        if let Some(app) = doc.elements("application").next() {
            info.app_name = attr(app, "label").map(str::to_string);
            info.icon = attr(app, "icon").map(str::to_string);
        }

        for tag in ["uses-permission", "uses-permission-sdk-23"] {
            for perm in doc.elements(tag) {
                if let Some(name) = attr(perm, "name") {
                    if !info.permissions.iter().any(|p| p == name) {
                        info.permissions.push(name.to_string());
                    }
                }
            }
        }

        for tag in ["activity", "activity-alias"] {
            for activity in doc.elements(tag) {
                if let Some(name) = attr(activity, "name") {
                    info.activities
                        .push(qualify_class(info.package.as_deref(), name));
                }
            }
        }

        info
    }
}

/// Expand `.Main` / `Main` to a fully qualified class name
fn qualify_class(package: Option<&str>, name: &str) -> String {
    match package {
        Some(pkg) if name.starts_with('.') => format!("{}{}", pkg, name),
        Some(pkg) if !name.contains('.') => format!("{}.{}", pkg, name),
        _ => name.to_string(),
    }
}

/// [`ApkAnalyzer`] reading the APK as a zip archive
#[derive(Debug, Clone, Default)]
pub struct ZipApkAnalyzer;

impl ZipApkAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn open(apk: &Path) -> Result<ZipArchive<File>> {
        let file =
            File::open(apk).with_context(|| format!("Failed to open APK {}", apk.display()))?;
        ZipArchive::new(file).with_context(|| format!("{} is not a zip archive", apk.display()))
    }

    fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
        let mut entry = archive
            .by_name(name)
            .with_context(|| format!("APK has no {}", name))?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn dex_entries(archive: &ZipArchive<File>) -> Vec<String> {
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("classes") && n.ends_with(".dex") && !n.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    fn decoded_manifest(archive: &mut ZipArchive<File>) -> Result<XmlDocument> {
        let bytes = Self::read_entry(archive, MANIFEST_ENTRY)?;
        axml::decode(&bytes).context("Failed to decode AndroidManifest.xml")
    }
}

impl ApkAnalyzer for ZipApkAnalyzer {
    fn info(&self, apk: &Path) -> Result<ApkInfo> {
        let mut archive = Self::open(apk)?;
        let doc = Self::decoded_manifest(&mut archive)?;

        let mut info = ApkInfo::from_manifest(&doc);
        info.entry_count = archive.len();
        info.dex_files = Self::dex_entries(&archive);

        let bytes = std::fs::read(apk)?;
        info.sha256 = format!("{:x}", Sha256::digest(&bytes));
        Ok(info)
    }

    fn manifest(&self, apk: &Path) -> Result<Vec<u8>> {
        let mut archive = Self::open(apk)?;
        let doc = Self::decoded_manifest(&mut archive)?;
        Ok(doc.to_xml()?.into_bytes())
    }

    fn decompile(&self, apk: &Path) -> Result<Vec<MethodSignature>> {
        let mut archive = Self::open(apk)?;
        let mut methods = Vec::new();
        for name in Self::dex_entries(&archive) {
            let bytes = Self::read_entry(&mut archive, &name)?;
            let found =
                dex::read_methods(&bytes).with_context(|| format!("Failed to read {}", name))?;
            methods.extend(found);
        }
        Ok(methods)
    }

    fn repackage(&self, apk: &Path, dest: &Path) -> Result<()> {
        let mut archive = Self::open(apk)?;
        let out = File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut writer = zip::ZipWriter::new(out);
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            writer.raw_copy_file(entry)?;
        }
        writer.finish()?;
        Ok(())
    }
}
