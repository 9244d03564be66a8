// src/config.rs

//! `NuGet.config` settings
//!
//! ```xml
//! <configuration>
//!   <packageSources>
//!     <add key="nuget.org" value="https://www.nuget.org/api/v2/" />
//!     <add key="team" value="%SHARE%\packages" />
//!   </packageSources>
//!   <disabledPackageSources>
//!     <add key="team" value="true" />
//!   </disabledPackageSources>
//!   <packageSourceCredentials>
//!     <nuget.org>
//!       <add key="Username" value="me" />
//!       <add key="ClearTextPassword" value="secret" />
//!     </nuget.org>
//!   </packageSourceCredentials>
//!   <config>
//!     <add key="repositoryPath" value="./Packages" />
//!   </config>
//! </configuration>
//! ```

use crate::error::{Error, Result};
use crate::packages::NupkgReader;
use crate::repository::{HTTP_TIMEOUT, PackageSourceConfig, SourceOptions};
use crate::xml::{attribute, local_name, parse_bool};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public NuGet v2 feed written into new configuration files
pub const DEFAULT_FEED_URL: &str = "https://www.nuget.org/api/v2/";

pub const DEFAULT_REPOSITORY_PATH: &str = "./Packages";

/// Name of the source that serves the local package cache
pub const CACHE_SOURCE_NAME: &str = "cache";

const USERNAME_KEY: &str = "Username";
const PASSWORD_KEY: &str = "ClearTextPassword";

/// Parsed `NuGet.config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Sources in priority order, paths as written in the file
    pub sources: Vec<PackageSourceConfig>,
    pub repository_path: String,
    pub verbose: bool,
    pub install_from_cache: bool,
    pub request_timeout: Duration,
    /// `config` keys this crate does not interpret
    pub extra: Vec<(String, String)>,
    base_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: vec![PackageSourceConfig::new("nuget.org", DEFAULT_FEED_URL)],
            repository_path: DEFAULT_REPOSITORY_PATH.to_string(),
            verbose: false,
            install_from_cache: true,
            request_timeout: HTTP_TIMEOUT,
            extra: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Load settings, writing a default file when `path` does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if !path.exists() {
            info!("Writing default configuration to {}", path.display());
            let settings = Self {
                base_dir,
                ..Self::default()
            };
            settings.save(path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path)?;
        let mut settings = Self::parse(&content)?;
        settings.base_dir = base_dir;
        debug!(
            "Loaded {} package sources from {}",
            settings.sources.len(),
            path.display()
        );
        Ok(settings)
    }

    /// Parse configuration XML; relative paths resolve against the current directory
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut builder = SettingsBuilder::default();
        let mut path: Vec<String> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    builder.element(&path, &e);
                    path.push(local_name(&e));
                }
                Ok(Event::Empty(e)) => builder.element(&path, &e),
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::ConfigError(format!(
                        "Failed to parse configuration at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        builder.build()
    }

    /// Write the settings in `NuGet.config` format
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_xml()?)?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("configuration")))?;

        writer.write_event(Event::Start(BytesStart::new("packageSources")))?;
        for source in &self.sources {
            writer.write_event(Event::Empty(add_element(&source.name, &source.path)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("packageSources")))?;

        let disabled: Vec<&PackageSourceConfig> =
            self.sources.iter().filter(|s| !s.enabled).collect();
        if !disabled.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("disabledPackageSources")))?;
            for source in disabled {
                writer.write_event(Event::Empty(add_element(&source.name, "true")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("disabledPackageSources")))?;
        }

        let credentialed: Vec<&PackageSourceConfig> = self
            .sources
            .iter()
            .filter(|s| s.username.is_some() || s.password.is_some())
            .collect();
        if !credentialed.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("packageSourceCredentials")))?;
            for source in credentialed {
                let element = encode_element_name(&source.name);
                writer.write_event(Event::Start(BytesStart::new(element.as_str())))?;
                if let Some(username) = &source.username {
                    writer.write_event(Event::Empty(add_element(USERNAME_KEY, username)))?;
                }
                if let Some(password) = &source.password {
                    writer.write_event(Event::Empty(add_element(PASSWORD_KEY, password)))?;
                }
                writer.write_event(Event::End(BytesEnd::new(element.as_str())))?;
            }
            writer.write_event(Event::End(BytesEnd::new("packageSourceCredentials")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("config")))?;
        let timeout = self.request_timeout.as_secs().to_string();
        let values = [
            ("repositoryPath", self.repository_path.as_str()),
            ("verbose", bool_str(self.verbose)),
            ("installFromCache", bool_str(self.install_from_cache)),
            ("requestTimeout", timeout.as_str()),
        ];
        for (key, value) in values {
            writer.write_event(Event::Empty(add_element(key, value)))?;
        }
        for (key, value) in &self.extra {
            writer.write_event(Event::Empty(add_element(key, value)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("config")))?;

        writer.write_event(Event::End(BytesEnd::new("configuration")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::ConfigError(format!("Configuration is not valid UTF-8: {}", e)))
    }

    /// Directory the configuration was loaded from
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Local package cache directory
    pub fn packages_dir(&self) -> PathBuf {
        self.resolve_local_path(&self.repository_path)
    }

    /// Sources with `%VAR%` references expanded and relative local paths resolved
    pub fn resolved_sources(&self) -> Vec<PackageSourceConfig> {
        self.sources
            .iter()
            .map(|source| {
                let mut source = source.clone();
                if source.is_local() {
                    source.path = self.resolve_local_path(&source.path).display().to_string();
                }
                source
            })
            .collect()
    }

    /// Sources for exact lookups: the package cache first when enabled
    pub fn lookup_sources(&self) -> Vec<PackageSourceConfig> {
        let mut sources = Vec::new();
        if self.install_from_cache {
            sources.push(PackageSourceConfig::new(
                CACHE_SOURCE_NAME,
                self.packages_dir().display().to_string(),
            ));
        }
        sources.extend(self.resolved_sources());
        sources
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            timeout: self.request_timeout,
            reader: Arc::new(NupkgReader::new()),
        }
    }

    fn resolve_local_path(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(expand_env_vars(path));
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }
}

/// Accumulates `add` elements by the section they appear in
#[derive(Default)]
struct SettingsBuilder {
    sources: Vec<PackageSourceConfig>,
    disabled: Vec<String>,
    credentials: Vec<(String, String, String)>,
    config: Vec<(String, String)>,
}

impl SettingsBuilder {
    fn element(&mut self, path: &[String], element: &BytesStart) {
        let name = local_name(element);
        let parent = path.last().map(String::as_str);

        if name == "clear" && parent == Some("packageSources") {
            self.sources.clear();
            return;
        }
        if name != "add" {
            return;
        }

        let Some(key) = attribute(element, "key") else {
            warn!("Ignoring <add> without key in {:?}", parent);
            return;
        };
        let value = attribute(element, "value").unwrap_or_default();

        match parent {
            Some("packageSources") => {
                self.sources.retain(|s| !s.name.eq_ignore_ascii_case(&key));
                self.sources.push(PackageSourceConfig::new(key, value));
            }
            Some("disabledPackageSources") => {
                if parse_bool(&value).unwrap_or(false) {
                    self.disabled.push(key);
                }
            }
            Some("config") => self.config.push((key, value)),
            Some(source) if path.len() >= 2 && path[path.len() - 2] == "packageSourceCredentials" => {
                self.credentials.push((decode_element_name(source), key, value));
            }
            _ => {}
        }
    }

    fn build(self) -> Result<Settings> {
        let mut settings = Settings {
            sources: self.sources,
            ..Settings::default()
        };

        for source in &mut settings.sources {
            if self.disabled.iter().any(|d| d.eq_ignore_ascii_case(&source.name)) {
                source.enabled = false;
            }
        }

        for (name, key, value) in self.credentials {
            let Some(source) = settings
                .sources
                .iter_mut()
                .find(|s| s.name.eq_ignore_ascii_case(&name))
            else {
                warn!("Credentials for unknown package source {}", name);
                continue;
            };
            if key.eq_ignore_ascii_case(USERNAME_KEY) {
                source.username = Some(value);
            } else if key.eq_ignore_ascii_case(PASSWORD_KEY) {
                source.password = Some(value);
            } else {
                warn!("Unsupported credential key {} for {}", key, name);
            }
        }

        for (key, value) in self.config {
            match key.as_str() {
                "repositoryPath" => settings.repository_path = value,
                "verbose" => settings.verbose = config_bool(&key, &value)?,
                "installFromCache" => settings.install_from_cache = config_bool(&key, &value)?,
                "requestTimeout" => {
                    let secs: u64 = value.trim().parse().map_err(|_| {
                        Error::ConfigError(format!("requestTimeout must be seconds, got {}", value))
                    })?;
                    settings.request_timeout = Duration::from_secs(secs);
                }
                _ => settings.extra.push((key, value)),
            }
        }

        Ok(settings)
    }
}

fn config_bool(key: &str, value: &str) -> Result<bool> {
    parse_bool(value)
        .ok_or_else(|| Error::ConfigError(format!("{} must be true or false, got {}", key, value)))
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn add_element<'a>(key: &'a str, value: &'a str) -> BytesStart<'a> {
    let mut element = BytesStart::new("add");
    element.push_attribute(("key", key));
    element.push_attribute(("value", value));
    element
}

/// Source names become element names under `packageSourceCredentials`
fn encode_element_name(name: &str) -> String {
    name.replace(' ', "_x0020_")
}

fn decode_element_name(name: &str) -> String {
    name.replace("_x0020_", " ")
}

/// Expand `%NAME%` references from the environment; unknown names stay as written
pub fn expand_env_vars(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let name = &after[..end];
        let value = Some(name)
            .filter(|n| !n.is_empty())
            .and_then(|n| std::env::var(n).ok());
        match value {
            Some(value) => {
                output.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                output.push('%');
                output.push_str(name);
                rest = &after[end..];
            }
        }
    }

    output.push_str(rest);
    output
}
