//! Directory client implementation.

use crate::config::DirectoryConfig;
use crate::entry::Entry;
use async_trait::async_trait;
use directory_core::{Error, Result};
use ldap3::{ldap_escape, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

/// LDAP result code for `noSuchObject`.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Represents the search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Raw entry as returned by the native client, before canonicalization.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve order from the server).
    pub attributes: HashMap<String, Vec<String>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<RawEntry>>;
    async fn modify_replace(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<()>;
    async fn add(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Directory client holding one authenticated session.
///
/// The session is established and bound once at construction and reused for
/// every operation, serialized behind a mutex. There is no reconnect or
/// retry; after a failure the session state is undefined and the caller must
/// discard the client and connect again.
pub struct DirectoryClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    config: DirectoryConfig,
    session: Mutex<Box<dyn LdapSession>>,
    weak_self: Weak<ClientInner>,
}

impl DirectoryClient {
    /// Connects to the directory server and binds with the configured
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectSyntax`] when the target is syntactically
    /// invalid, [`Error::Config`] for an unsupported protocol version or TLS
    /// material problem, and [`Error::Directory`] when the connection,
    /// STARTTLS negotiation or bind fails.
    pub async fn connect(config: DirectoryConfig) -> Result<Self> {
        let connector = NativeLdapConnector::new(config.clone());
        Self::connect_with(config, Box::new(connector)).await
    }

    #[cfg(test)]
    pub(crate) async fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        Self::connect_with(config, connector).await
    }

    async fn connect_with(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        if config.protocol_version() != 3 {
            return Err(Error::Config(format!(
                "unsupported LDAP protocol version {}",
                config.protocol_version()
            )));
        }

        let url = config.url()?;
        debug!(%url, "connecting to directory server");
        let mut session = connector.connect().await?;
        session
            .simple_bind(
                config.credentials().bind_dn(),
                config.credentials().bind_password(),
            )
            .await?;
        debug!(bind_dn = config.credentials().bind_dn(), "bind succeeded");

        Ok(Self {
            inner: Arc::new_cyclic(|weak| ClientInner {
                config,
                session: Mutex::new(session),
                weak_self: weak.clone(),
            }),
        })
    }

    /// Reads the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no entry exists at `dn`.
    pub async fn get_by_dn(&self, dn: &str) -> Result<Entry> {
        self.inner.get_by_dn(dn).await
    }

    /// Returns every entry under `base` (or the connection default) whose
    /// attribute equals `value`.
    ///
    /// The value is escaped so filter metacharacters are matched literally.
    /// An empty result is an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no search base is available, or
    /// [`Error::Directory`] when the search fails.
    pub async fn get_all_by_attribute(
        &self,
        name: &str,
        value: &str,
        base: Option<&str>,
    ) -> Result<Vec<Entry>> {
        self.inner.get_all_by_attribute(name, value, base).await
    }

    /// Returns the first entry matching `name=value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    pub async fn get_one_by_attribute(
        &self,
        name: &str,
        value: &str,
        base: Option<&str>,
    ) -> Result<Entry> {
        let entries = self.inner.get_all_by_attribute(name, value, base).await?;
        entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no entry with `{name}={value}`")))
    }

    /// Stages a new, unsaved entry at `dn` with the given initial attributes.
    ///
    /// Unless `skip_existence_check` is set, the DN is probed first and an
    /// existing entry is a conflict. Single-string values are normalized to
    /// one-element lists via [`AttrValue`](crate::AttrValue).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the DN already exists.
    pub async fn create<I, S>(
        &self,
        dn: &str,
        initial: I,
        skip_existence_check: bool,
    ) -> Result<Entry>
    where
        I: IntoIterator<Item = (S, crate::AttrValue)>,
        S: Into<String>,
    {
        let initial = initial
            .into_iter()
            .map(|(name, value)| (name.into(), value.into_values()))
            .collect();
        self.inner.create(dn, initial, skip_existence_check).await
    }

    /// Persists an entry: an add for staged entries, a replace-style modify
    /// for loaded ones. Saving an unchanged loaded entry is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] on a server-side rejection; the request
    /// is then fully unapplied (single add/modify requests are atomic).
    pub async fn save(&self, entry: &mut Entry) -> Result<()> {
        self.inner.save_entry(entry).await
    }

    /// Unbinds and tears down the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] when the unbind request fails.
    pub async fn close(self) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        session.unbind().await
    }
}

impl ClientInner {
    fn entry_origin(&self) -> Weak<ClientInner> {
        self.weak_self.clone()
    }

    fn search_base<'a>(&'a self, base: Option<&'a str>) -> Result<&'a str> {
        base.or_else(|| self.config.base_dn())
            .ok_or_else(|| Error::Config("no search base configured".to_string()))
    }

    async fn get_by_dn(&self, dn: &str) -> Result<Entry> {
        if dn.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "distinguished name must not be empty".to_string(),
            ));
        }

        let mut session = self.session.lock().await;
        let found = session.search(dn, SearchScope::Base, "(objectClass=*)").await;
        drop(session);

        // A base-scope search at a missing DN yields noSuchObject rather
        // than an empty result set.
        let entries = match found {
            Ok(entries) => entries,
            Err(Error::Directory {
                code: RC_NO_SUCH_OBJECT,
                ..
            }) => Vec::new(),
            Err(err) => return Err(err),
        };

        entries
            .into_iter()
            .next()
            .map(|raw| Entry::from_search(raw.dn, raw.attributes, self.entry_origin()))
            .ok_or_else(|| Error::NotFound(format!("no entry at `{dn}`")))
    }

    async fn get_all_by_attribute(
        &self,
        name: &str,
        value: &str,
        base: Option<&str>,
    ) -> Result<Vec<Entry>> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "attribute name must not be empty".to_string(),
            ));
        }

        let base = self.search_base(base)?.to_string();
        let filter = format!("({name}={})", ldap_escape(value));
        debug!(%base, %filter, "searching subtree");

        let mut session = self.session.lock().await;
        let entries = session.search(&base, SearchScope::Subtree, &filter).await?;
        drop(session);

        debug!(count = entries.len(), "search finished");
        Ok(entries
            .into_iter()
            .map(|raw| Entry::from_search(raw.dn, raw.attributes, self.entry_origin()))
            .collect())
    }

    async fn create(
        &self,
        dn: &str,
        initial: Vec<(String, Vec<String>)>,
        skip_existence_check: bool,
    ) -> Result<Entry> {
        if dn.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "distinguished name must not be empty".to_string(),
            ));
        }

        if !skip_existence_check {
            match self.get_by_dn(dn).await {
                Ok(_) => return Err(Error::Conflict(format!("`{dn}` already exists"))),
                Err(Error::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let mut entry = Entry::staged(dn.to_string(), self.entry_origin());
        for (name, values) in initial {
            entry.set_attribute(&name, values);
        }
        Ok(entry)
    }

    pub(crate) async fn save_entry(&self, entry: &mut Entry) -> Result<()> {
        if entry.is_new() {
            let attrs: Vec<(String, Vec<String>)> = entry
                .attributes()
                .iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(name, values)| (name.clone(), values.clone()))
                .collect();
            debug!(dn = entry.dn(), attributes = attrs.len(), "adding entry");

            let mut session = self.session.lock().await;
            session.add(entry.dn(), attrs).await?;
            drop(session);
        } else {
            let changes: Vec<(String, Vec<String>)> =
                entry.changed_attributes().into_iter().collect();
            if changes.is_empty() {
                return Ok(());
            }
            debug!(dn = entry.dn(), attributes = changes.len(), "modifying entry");

            let mut session = self.session.lock().await;
            session.modify_replace(entry.dn(), changes).await?;
            drop(session);
        }

        entry.mark_saved();
        Ok(())
    }
}

/// Connector backed by `ldap3`.
pub(crate) struct NativeLdapConnector {
    config: DirectoryConfig,
}

impl NativeLdapConnector {
    pub(crate) fn new(config: DirectoryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for NativeLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let url = self.config.url()?;
        let settings = build_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(NativeLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct NativeLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for NativeLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::Timeout("bind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        check_result(result)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<RawEntry>> {
        let result = timeout(
            self.operation_timeout,
            self.inner.search(base_dn, scope.into(), filter, vec!["*"]),
        )
        .await
        .map_err(|_| Error::Timeout("search timed out".to_string()))?
        .map_err(map_ldap_error)?;
        let (entries, _) = result.success().map_err(map_ldap_error)?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| {
                if !entry.bin_attrs.is_empty() {
                    warn!(dn = %entry.dn, "discarding binary-valued attributes from search result");
                }
                RawEntry {
                    dn: entry.dn,
                    attributes: entry.attrs,
                }
            })
            .collect())
    }

    async fn modify_replace(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<()> {
        let mods = attrs
            .into_iter()
            .map(|(name, values)| Mod::Replace(name, values.into_iter().collect::<HashSet<_>>()))
            .collect::<Vec<_>>();

        let result = timeout(self.operation_timeout, self.inner.modify(dn, mods))
            .await
            .map_err(|_| Error::Timeout("modify timed out".to_string()))?
            .map_err(map_ldap_error)?;
        check_result(result)
    }

    async fn add(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<()> {
        let attrs = attrs
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().collect::<HashSet<_>>()))
            .collect::<Vec<_>>();

        let result = timeout(self.operation_timeout, self.inner.add(dn, attrs))
            .await
            .map_err(|_| Error::Timeout("add timed out".to_string()))?
            .map_err(map_ldap_error)?;
        check_result(result)
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("unbind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        Ok(())
    }
}

fn build_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if config.starttls() {
        settings = settings.set_starttls(true);
    }

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| Error::Config(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::Config(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::Config(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::Config(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn check_result(result: ldap3::LdapResult) -> Result<()> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(Error::directory(result.text, result.rc))
    }
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    match err {
        ldap3::LdapError::LdapResult { result } => Error::directory(result.text, result.rc),
        ldap3::LdapError::UrlParsing { source } => Error::ConnectSyntax(source.to_string()),
        ldap3::LdapError::UnknownScheme(scheme) => {
            Error::ConnectSyntax(format!("unknown URL scheme `{scheme}`"))
        }
        other => Error::directory(other.to_string(), 0),
    }
}
