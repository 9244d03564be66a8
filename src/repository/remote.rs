// src/repository/remote.rs

//! Remote NuGet v2 (OData) feed source

use super::parsers::FeedEntries;
use super::{PackageSource, PackageSourceConfig, SearchQuery, UPDATE_BATCH_SIZE, query, select_updates};
use crate::error::{Error, Result};
use crate::manifest::ManifestEntry;
use crate::packages::{PackageIdentifier, PackageRecord, sort_records};
use crate::version::{VersionRange, compare_versions};
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::Client;
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Package source backed by an HTTP feed
pub struct RemoteFeedSource {
    name: String,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    client: Client,
}

impl RemoteFeedSource {
    /// Create a feed client
    ///
    /// Server certificates are not validated: older private feeds commonly
    /// run with self-signed certificates.
    pub fn new(config: &PackageSourceConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("nuget-feed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.path.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one feed query and decode the response
    ///
    /// 404/405/501 map to `UnsupportedFeedOperation` so callers can fall back
    /// to simpler queries; every other failure is `FeedUnavailable`.
    fn fetch(&self, url: Url) -> Result<Vec<PackageRecord>> {
        debug!("Querying {}: {}", self.name, url);

        let mut request = self.client.get(url.clone());
        if let Some(password) = &self.password {
            request = request.basic_auth(self.username.as_deref().unwrap_or(""), Some(password));
        }

        let response = request
            .send()
            .map_err(|e| Error::FeedUnavailable(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            return Err(Error::UnsupportedFeedOperation(format!("HTTP {} from {}", status, url)));
        }
        if !status.is_success() {
            return Err(Error::FeedUnavailable(format!("HTTP {} from {}", status, url)));
        }

        let body = response
            .text()
            .map_err(|e| Error::FeedUnavailable(format!("Failed to read response from {}: {}", url, e)))?;

        let records: Vec<PackageRecord> = FeedEntries::new(&body)
            .map(|mut record| {
                record.source = Some(self.name.clone());
                record
            })
            .collect();

        debug!("{} returned {} packages", self.name, records.len());
        Ok(records)
    }

    /// Run a query, logging failures and yielding an empty result instead
    fn fetch_or_empty(&self, url: Result<Url>, operation: &str) -> Vec<PackageRecord> {
        match url.and_then(|url| self.fetch(url)) {
            Ok(records) => records,
            Err(e) => {
                error!("{} on {} failed: {}", operation, self.name, e);
                Vec::new()
            }
        }
    }

    /// Per-package update lookup for feeds without `GetUpdates()`
    fn updates_one_by_one(
        &self,
        batch: &[ManifestEntry],
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Vec<PackageRecord> {
        let mut updates = Vec::new();
        for entry in batch {
            let range = match entry.allowed_versions.as_deref() {
                Some(allowed) => VersionRange::parse(allowed),
                None => VersionRange::newer_than(&entry.version),
            };
            let candidates = self.find_by_range(&entry.id, &range, include_prerelease);
            updates.extend(select_updates(entry, candidates, include_all_versions));
        }
        updates
    }
}

impl PackageSource for RemoteFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_by_id(&self, package: &PackageIdentifier) -> Option<PackageRecord> {
        let records = self.fetch_or_empty(query::find_package(&self.base_url, package), "FindPackagesById");
        records
            .into_iter()
            .find(|r| compare_versions(&r.version, &package.version) == Ordering::Equal)
    }

    fn find_by_range(
        &self,
        id: &str,
        range: &VersionRange,
        include_prerelease: bool,
    ) -> Vec<PackageRecord> {
        // Server-side ordering is lexicographic (10.0 < 9.0); filter and sort here
        let mut versions: Vec<PackageRecord> = self
            .fetch_or_empty(query::find_all_versions(&self.base_url, id), "FindPackagesById")
            .into_iter()
            .filter(|r| include_prerelease || !r.is_prerelease())
            .collect();
        sort_records(&mut versions);

        let in_range: Vec<PackageRecord> = versions
            .iter()
            .filter(|r| range.satisfied_by(&r.version))
            .cloned()
            .collect();
        if !in_range.is_empty() {
            return in_range;
        }

        // Nothing in range: offer the nearest version above the minimum
        let nearest = versions.into_iter().find(|r| match &range.minimum {
            Some(min) => compare_versions(&r.version, min) == Ordering::Greater,
            None => true,
        });
        if let Some(record) = &nearest {
            debug!("No {} version in {}; nearest is {}", id, range, record.version);
        }
        nearest.into_iter().collect()
    }

    fn search(&self, query: &SearchQuery) -> Vec<PackageRecord> {
        self.fetch_or_empty(query::search(&self.base_url, query), "Search")
    }

    fn compute_updates(
        &self,
        installed: &[ManifestEntry],
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Vec<PackageRecord> {
        let mut updates = Vec::new();

        for batch in installed.chunks(UPDATE_BATCH_SIZE) {
            let url = match query::get_updates(&self.base_url, batch, include_prerelease, include_all_versions) {
                Ok(url) => url,
                Err(e) => {
                    error!("Cannot build GetUpdates query for {}: {}", self.name, e);
                    continue;
                }
            };

            match self.fetch(url) {
                Ok(records) => updates.extend(records),
                Err(Error::UnsupportedFeedOperation(reason)) => {
                    info!(
                        "{} does not support GetUpdates ({}); querying {} packages individually",
                        self.name,
                        reason,
                        batch.len()
                    );
                    updates.extend(self.updates_one_by_one(batch, include_prerelease, include_all_versions));
                }
                Err(e) => warn!("Skipping update batch of {} packages on {}: {}", batch.len(), self.name, e),
            }
        }

        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn feed(packages: &[(&str, &str)]) -> String {
        let entries: String = packages
            .iter()
            .map(|(id, version)| {
                format!(
                    r#"<entry><title type="text">{id}</title>
<content type="application/zip" src="https://example.com/package/{id}/{version}" />
<m:properties><d:Version>{version}</d:Version></m:properties></entry>"#
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">{entries}</feed>"#
        )
    }

    fn source(server: &ServerGuard) -> RemoteFeedSource {
        let config = PackageSourceConfig::new("remote", format!("{}/api/v2/", server.url()));
        RemoteFeedSource::new(&config, Duration::from_secs(5)).unwrap()
    }

    fn versions(records: &[PackageRecord]) -> Vec<&str> {
        records.iter().map(|r| r.version.as_str()).collect()
    }

    fn all_versions_mock(server: &mut ServerGuard, id: &str, body: String) -> mockito::Mock {
        server
            .mock("GET", Matcher::Regex(r"^/api/v2/FindPackagesById\(\)".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), format!("'{}'", id)),
                Matcher::UrlEncoded("$orderby".into(), "Version asc".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create()
    }

    #[test]
    fn test_find_by_id() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", Matcher::Regex(r"^/api/v2/FindPackagesById\(\)".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "'Foo'".into()),
                Matcher::UrlEncoded("$filter".into(), "Version eq '1.2.0'".into()),
            ]))
            .with_status(200)
            .with_body(feed(&[("Foo", "1.2.0")]))
            .create();

        let found = source(&server).find_by_id(&PackageIdentifier::new("Foo", "1.2.0"));

        mock.assert();
        let found = found.unwrap();
        assert_eq!(found.id, "Foo");
        assert_eq!(found.source.as_deref(), Some("remote"));
        assert_eq!(found.download_url.as_deref(), Some("https://example.com/package/Foo/1.2.0"));
    }

    #[test]
    fn test_basic_auth_sent_with_password() {
        let mut server = Server::new();
        // "user:secret"
        let mock = server
            .mock("GET", Matcher::Any)
            .match_header("authorization", "Basic dXNlcjpzZWNyZXQ=")
            .with_status(200)
            .with_body(feed(&[]))
            .create();

        let mut config = PackageSourceConfig::new("private", server.url());
        config.username = Some("user".to_string());
        config.password = Some("secret".to_string());
        let source = RemoteFeedSource::new(&config, Duration::from_secs(5)).unwrap();
        assert!(source.search(&SearchQuery::new("x")).is_empty());

        mock.assert();
    }

    #[test]
    fn test_find_by_range_sorts_numerically() {
        let mut server = Server::new();
        // Lexicographic server order
        let mock = all_versions_mock(
            &mut server,
            "Foo",
            feed(&[("Foo", "10.0.0"), ("Foo", "2.0.0"), ("Foo", "3.0.0-beta"), ("Foo", "9.0.0")]),
        );

        let found = source(&server).find_by_range("Foo", &VersionRange::parse("[2.0,10.0]"), false);

        mock.assert();
        assert_eq!(versions(&found), vec!["2.0.0", "9.0.0", "10.0.0"]);
    }

    #[test]
    fn test_find_by_range_falls_back_to_nearest_above_minimum() {
        let mut server = Server::new();
        let _mock = all_versions_mock(
            &mut server,
            "Foo",
            feed(&[("Foo", "1.0"), ("Foo", "3.0"), ("Foo", "2.5")]),
        );

        let found = source(&server).find_by_range("Foo", &VersionRange::parse("[1.5,2.0)"), false);
        assert_eq!(versions(&found), vec!["2.5"]);
    }

    #[test]
    fn test_find_by_range_tolerates_malformed_versions() {
        let mut server = Server::new();
        let packages: Vec<(String, String)> = (0..40)
            .map(|i| {
                let version = if i % 3 == 0 { format!("v{}", i) } else { format!("1.{}", i) };
                ("Foo".to_string(), version)
            })
            .collect();
        let packages: Vec<(&str, &str)> =
            packages.iter().map(|(id, v)| (id.as_str(), v.as_str())).collect();
        let _mock = all_versions_mock(&mut server, "Foo", feed(&packages));

        let found = source(&server).find_by_range("Foo", &VersionRange::parse("[1.0,)"), false);

        assert_eq!(found.len(), 26);
        assert_eq!(found.first().map(|r| r.version.as_str()), Some("1.1"));
        assert_eq!(found.last().map(|r| r.version.as_str()), Some("1.38"));
    }

    #[test]
    fn test_find_by_range_no_candidate() {
        let mut server = Server::new();
        let _mock = all_versions_mock(&mut server, "Foo", feed(&[("Foo", "1.0")]));

        let found = source(&server).find_by_range("Foo", &VersionRange::parse("[4.0,5.0)"), false);
        assert!(found.is_empty());
    }

    #[test]
    fn test_search() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", Matcher::Regex(r"^/api/v2/Search\(\)".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("searchTerm".into(), "'json'".into()),
                Matcher::UrlEncoded("$top".into(), "15".into()),
                Matcher::UrlEncoded("$skip".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(feed(&[("Json.A", "1.0"), ("Json.B", "2.0")]))
            .create();

        let found = source(&server).search(&SearchQuery::new("json"));

        mock.assert();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_server_error_yields_empty_result() {
        let mut server = Server::new();
        let _mock = server.mock("GET", Matcher::Any).with_status(500).create();

        let source = source(&server);
        assert!(source.search(&SearchQuery::new("json")).is_empty());
        assert!(source.find_by_id(&PackageIdentifier::new("Foo", "1.0")).is_none());
    }

    #[test]
    fn test_unreachable_feed_yields_empty_result() {
        let config = PackageSourceConfig::new("dead", "http://127.0.0.1:1/api/v2");
        let source = RemoteFeedSource::new(&config, Duration::from_secs(2)).unwrap();
        assert!(source.search(&SearchQuery::new("json")).is_empty());
        assert!(source.compute_updates(&[ManifestEntry::new("Foo", "1.0")], false, false).is_empty());
    }

    #[test]
    fn test_compute_updates_batches_of_ten() {
        let mut server = Server::new();
        let installed: Vec<ManifestEntry> = (0..23)
            .map(|i| ManifestEntry::new(format!("Pkg{:02}", i), "1.0"))
            .collect();

        let mocks: Vec<mockito::Mock> = installed
            .chunks(10)
            .map(|batch| {
                let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();
                let versions = vec!["1.0"; batch.len()];
                server
                    .mock("GET", Matcher::Regex(r"^/api/v2/GetUpdates\(\)".to_string()))
                    .match_query(Matcher::AllOf(vec![
                        Matcher::UrlEncoded("packageIds".into(), format!("'{}'", ids.join("|"))),
                        Matcher::UrlEncoded("versions".into(), format!("'{}'", versions.join("|"))),
                    ]))
                    .with_status(200)
                    .with_body(feed(&[(ids[0], "2.0")]))
                    .expect(1)
                    .create()
            })
            .collect();

        let updates = source(&server).compute_updates(&installed, false, false);

        assert_eq!(mocks.len(), 3);
        for mock in &mocks {
            mock.assert();
        }
        let ids: Vec<&str> = updates.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Pkg00", "Pkg10", "Pkg20"]);
    }

    #[test]
    fn test_compute_updates_falls_back_when_get_updates_missing() {
        let mut server = Server::new();
        let _get_updates = server
            .mock("GET", Matcher::Regex(r"^/api/v2/GetUpdates\(\)".to_string()))
            .with_status(404)
            .expect(1)
            .create();
        let _foo = all_versions_mock(&mut server, "Foo", feed(&[("Foo", "1.0"), ("Foo", "1.1"), ("Foo", "1.2")]));
        let _bar = all_versions_mock(&mut server, "Bar", feed(&[("Bar", "2.0"), ("Bar", "3.0-rc1")]));
        let _missing = server
            .mock("GET", Matcher::Regex(r"^/api/v2/FindPackagesById\(\)".to_string()))
            .match_query(Matcher::UrlEncoded("id".into(), "'Missing'".into()))
            .with_status(404)
            .create();

        let installed = vec![
            ManifestEntry::new("Foo", "1.0"),
            ManifestEntry::new("Missing", "1.0"),
            ManifestEntry::new("Bar", "1.0"),
        ];
        let updates = source(&server).compute_updates(&installed, false, false);

        let found: Vec<String> = updates.iter().map(|r| r.identifier().to_string()).collect();
        assert_eq!(found, vec!["Foo.1.2", "Bar.2.0"]);
    }

    #[test]
    fn test_compute_updates_skips_failed_batch() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", Matcher::Regex(r"^/api/v2/GetUpdates\(\)".to_string()))
            .with_status(503)
            .create();

        let updates = source(&server).compute_updates(&[ManifestEntry::new("Foo", "1.0")], false, false);
        assert!(updates.is_empty());
    }
}
