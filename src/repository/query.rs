// src/repository/query.rs

//! OData query URL construction for NuGet v2 feeds

use crate::error::{Error, Result};
use crate::manifest::ManifestEntry;
use crate::packages::PackageIdentifier;
use crate::repository::SearchQuery;
use reqwest::Url;

/// Quote a value as an OData string literal (`'` doubled inside)
pub fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn endpoint(base: &str, operation: &str) -> Result<Url> {
    let url = format!("{}/{}", base.trim_end_matches('/'), operation);
    Url::parse(&url).map_err(|e| Error::ParseError(format!("Invalid feed URL {}: {}", url, e)))
}

/// `FindPackagesById()?id='{id}'&$filter=Version eq '{version}'`
pub fn find_package(base: &str, package: &PackageIdentifier) -> Result<Url> {
    let mut url = endpoint(base, "FindPackagesById()")?;
    url.query_pairs_mut()
        .append_pair("id", &odata_string(&package.id))
        .append_pair("$filter", &format!("Version eq {}", odata_string(&package.version)));
    Ok(url)
}

/// `FindPackagesById()?id='{id}'&$orderby=Version asc`
///
/// The server's ordering is lexicographic, so callers re-sort the result.
pub fn find_all_versions(base: &str, id: &str) -> Result<Url> {
    let mut url = endpoint(base, "FindPackagesById()")?;
    url.query_pairs_mut()
        .append_pair("id", &odata_string(id))
        .append_pair("$orderby", "Version asc");
    Ok(url)
}

/// `Search()` ordered by download count, one page at a time
pub fn search(base: &str, query: &SearchQuery) -> Result<Url> {
    let mut url = endpoint(base, "Search()")?;
    {
        let mut pairs = url.query_pairs_mut();
        if !query.include_all_versions {
            let filter = if query.include_prerelease {
                "IsAbsoluteLatestVersion"
            } else {
                "IsLatestVersion"
            };
            pairs.append_pair("$filter", filter);
        }
        pairs
            .append_pair("$orderby", "DownloadCount desc")
            .append_pair("$skip", &query.skip.to_string())
            .append_pair("$top", &query.take.to_string())
            .append_pair("searchTerm", &odata_string(&query.term))
            .append_pair("targetFramework", "''")
            .append_pair("includePrerelease", &query.include_prerelease.to_string());
    }
    Ok(url)
}

/// `GetUpdates()` for one batch of installed packages
pub fn get_updates(
    base: &str,
    installed: &[ManifestEntry],
    include_prerelease: bool,
    include_all_versions: bool,
) -> Result<Url> {
    let ids: Vec<&str> = installed.iter().map(|e| e.id.as_str()).collect();
    let versions: Vec<&str> = installed.iter().map(|e| e.version.as_str()).collect();
    let constraints: Vec<&str> = installed
        .iter()
        .map(|e| e.allowed_versions.as_deref().unwrap_or(""))
        .collect();

    let mut frameworks: Vec<&str> = Vec::new();
    for framework in installed.iter().filter_map(|e| e.target_framework.as_deref()) {
        if !framework.is_empty() && !frameworks.contains(&framework) {
            frameworks.push(framework);
        }
    }

    let mut url = endpoint(base, "GetUpdates()")?;
    url.query_pairs_mut()
        .append_pair("packageIds", &odata_string(&ids.join("|")))
        .append_pair("versions", &odata_string(&versions.join("|")))
        .append_pair("includePrerelease", &include_prerelease.to_string())
        .append_pair("includeAllVersions", &include_all_versions.to_string())
        .append_pair("targetFrameworks", &odata_string(&frameworks.join("|")))
        .append_pair("versionConstraints", &odata_string(&constraints.join("|")));
    Ok(url)
}
