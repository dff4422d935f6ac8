//! # Connection Registry
//!
//! Process-scoped map from server name to the transport connection every
//! adapter bound to that server shares.
//!
//! ## Resolution Order
//!
//! For each server a load needs:
//!
//! 1. a connection supplied by the caller is adopted verbatim (and never
//!    closed by the registry),
//! 2. otherwise an existing entry for the server name is reused,
//! 3. otherwise the server's factory opens a new one.
//!
//! Missing connections for distinct servers are opened concurrently. All
//! mutation happens under one async mutex, so two loads never race to open
//! the same server twice.

use crate::adapter::{AdapterFactory, Connection};
use crate::error::PublishError;
use crate::spec::Server;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Connections supplied by the caller, keyed by server name
pub type ExternalConnections = HashMap<String, Connection>;

/// Whether the registry opened a connection or adopted it from the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Adopted,
}

struct Entry {
    connection: Connection,
    factory: Arc<dyn AdapterFactory>,
    ownership: Ownership,
}

/// A server that needs a connection, with the factory for its protocol
#[derive(Clone)]
pub struct ServerRequest {
    pub server: Server,
    pub factory: Arc<dyn AdapterFactory>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a connection for every requested server.
    ///
    /// Requests naming the same server twice are resolved once. If any new
    /// connection fails to open, the first failure is returned; connections
    /// that did open are kept and will be reused or torn down later.
    pub async fn resolve_all(
        &self,
        requests: &[ServerRequest],
        external: &ExternalConnections,
    ) -> Result<HashMap<String, Connection>, PublishError> {
        let mut entries = self.entries.lock().await;
        let mut resolved = HashMap::with_capacity(requests.len());
        let mut missing: Vec<&ServerRequest> = Vec::new();

        for request in requests {
            let name = request.server.name.as_str();
            if resolved.contains_key(name) || missing.iter().any(|m| m.server.name == name) {
                continue;
            }

            if let Some(conn) = external.get(name) {
                let replaced = entries.insert(
                    name.to_string(),
                    Entry {
                        connection: conn.clone(),
                        factory: Arc::clone(&request.factory),
                        ownership: Ownership::Adopted,
                    },
                );
                if let Some(old) = replaced {
                    if old.ownership == Ownership::Owned && !old.connection.ptr_eq(conn) {
                        warn!(server = %name, "Caller connection replaces a registry-owned one");
                        if let Err(e) = old.factory.close_connection(old.connection).await {
                            warn!(server = %name, error = %e, "Failed to close replaced connection");
                        }
                    }
                }
                debug!(server = %name, "Adopted caller-supplied connection");
                resolved.insert(name.to_string(), conn.clone());
            } else if let Some(entry) = entries.get(name) {
                debug!(server = %name, "Reusing existing connection");
                resolved.insert(name.to_string(), entry.connection.clone());
            } else {
                missing.push(request);
            }
        }

        if missing.is_empty() {
            return Ok(resolved);
        }

        info!(
            servers = ?missing.iter().map(|r| r.server.name.as_str()).collect::<Vec<_>>(),
            "Opening connections"
        );
        let opened = futures::future::join_all(missing.iter().map(|request| async move {
            let result = request.factory.get_connection(&request.server).await;
            (*request, result)
        }))
        .await;

        let mut first_error = None;
        for (request, result) in opened {
            let name = request.server.name.clone();
            match result {
                Ok(conn) => {
                    info!(
                        server = %name,
                        protocol = %request.server.protocol,
                        url = %request.server.url,
                        "Connection established"
                    );
                    resolved.insert(name.clone(), conn.clone());
                    entries.insert(
                        name,
                        Entry {
                            connection: conn,
                            factory: Arc::clone(&request.factory),
                            ownership: Ownership::Owned,
                        },
                    );
                }
                Err(e) => {
                    error!(server = %name, error = %e, "Failed to open connection");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(resolved),
        }
    }

    /// Current connection for `server`, if any
    pub async fn get(&self, server: &str) -> Option<Connection> {
        self.entries
            .lock()
            .await
            .get(server)
            .map(|entry| entry.connection.clone())
    }

    pub async fn ownership(&self, server: &str) -> Option<Ownership> {
        self.entries
            .lock()
            .await
            .get(server)
            .map(|entry| entry.ownership)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drain every entry.
    ///
    /// With `close_connections`, registry-owned connections are closed through
    /// their factory; adopted ones are only dropped. Every close is attempted
    /// and the first failure is returned. A second call finds nothing to do.
    pub async fn teardown(&self, close_connections: bool) -> Result<(), PublishError> {
        let drained: Vec<(String, Entry)> = self.entries.lock().await.drain().collect();
        if drained.is_empty() {
            return Ok(());
        }

        let mut first_error = None;
        let mut closed = 0usize;
        let total = drained.len();
        for (name, entry) in drained {
            if !close_connections || entry.ownership == Ownership::Adopted {
                continue;
            }
            match entry.factory.close_connection(entry.connection).await {
                Ok(()) => closed += 1,
                Err(e) => {
                    error!(server = %name, error = %e, "Failed to close connection");
                    first_error.get_or_insert(e);
                }
            }
        }
        info!(released = total, closed, "Connection registry torn down");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
