// ============================================
// File: crates/tether-transport/src/list.rs
// ============================================
//! # Transport List
//!
//! ## Creation Reason
//! An application usually owns a handful of top-level transports keyed by
//! URL scheme (`ws`, `tcp`, ...) and wants to tear them all down in one
//! call. The interior layers of a chain are owned by the chain, not the
//! list, so teardown has to honour a per-entry ownership decision.
//!
//! ## Main Functionality
//! - `add` / `add_ex`: register a transport under a scheme with an ownership tag
//! - `get` / `remove`: lookup and un-list
//! - `clean` / `destroy`: ownership-respecting bulk teardown
//!
//! ## Teardown Policy
//! | Ownership | `clean` does |
//! |-----------|--------------|
//! | `Exclusive` | `destroy_chain` on the entry |
//! | `Shared` | `destroy_chain` if the list holds the last reference, else release |
//! | `None` | clear the scheme key only |
//!
//! ## ⚠️ Important Note for Next Developer
//! - A node reached both through a list entry and a parent chain is freed
//!   once; the second attempt sees a tombstone and is skipped
//! - Dropping a non-empty list does NOT destroy anything; call `destroy`
//!
//! ## Last Modified
//! v0.1.0 - Initial transport list

use tracing::{debug, warn};

use tether_common::Ownership;

use crate::chain::destroy_chain;
use crate::error::{Result, TransportError};
use crate::handle::TransportHandle;

struct ListEntry {
    scheme: String,
    ownership: Ownership,
    transport: TransportHandle,
}

/// Copies a scheme key, reporting allocation failure.
fn copy_scheme(scheme: &str) -> Result<String> {
    let mut key = String::new();
    key.try_reserve_exact(scheme.len())
        .map_err(|_| TransportError::allocation("scheme", scheme.len()))?;
    key.push_str(scheme);
    Ok(key)
}

// ============================================
// TransportList
// ============================================

/// Keyed collection of top-level transports with per-entry ownership.
///
/// # Example
/// ```ignore
/// let mut list = TransportList::new();
/// list.add_ex(tcp.clone(), "_tcp", Ownership::None)?;
/// list.add(ws.clone(), "ws")?;
///
/// let ws = list.get("ws").expect("registered");
/// ws.connect("echo.example.com", 80, timeout).await?;
///
/// list.destroy().await?; // ws chain destroyed once, tcp via the chain
/// ```
#[derive(Default)]
pub struct TransportList {
    entries: Vec<ListEntry>,
}

impl TransportList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `transport` under `scheme` with exclusive ownership.
    ///
    /// # Errors
    /// See [`TransportList::add_ex`].
    pub fn add(&mut self, transport: TransportHandle, scheme: &str) -> Result<()> {
        self.add_ex(transport, scheme, Ownership::Exclusive)
    }

    /// Adds `transport` under `scheme` with the given ownership.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty scheme, a destroyed transport, a
    ///   scheme already in use, or a transport that is already listed
    /// - `Allocation` if the scheme key cannot be copied
    pub fn add_ex(&mut self, transport: TransportHandle, scheme: &str, ownership: Ownership) -> Result<()> {
        if scheme.is_empty() {
            return Err(TransportError::invalid_argument("scheme cannot be empty"));
        }
        if transport.is_destroyed() {
            return Err(TransportError::invalid_argument(format!(
                "{} is destroyed and cannot be listed",
                transport.id()
            )));
        }
        if self.entries.iter().any(|e| e.scheme == scheme) {
            return Err(TransportError::invalid_argument(format!(
                "scheme '{scheme}' is already registered"
            )));
        }
        if let Some(existing) = transport.scheme() {
            return Err(TransportError::invalid_argument(format!(
                "{} is already listed as '{existing}'",
                transport.id()
            )));
        }
        if self.entries.iter().any(|e| e.transport.ptr_eq(&transport)) {
            return Err(TransportError::invalid_argument(format!(
                "{} is already listed",
                transport.id()
            )));
        }

        let key = copy_scheme(scheme)?;
        transport.set_listing(copy_scheme(scheme)?, ownership);
        debug!(scheme, %ownership, transport = %transport.id(), "Added transport to list");

        self.entries.push(ListEntry {
            scheme: key,
            ownership,
            transport,
        });
        Ok(())
    }

    /// Looks up a transport by scheme.
    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<&TransportHandle> {
        self.entries
            .iter()
            .find(|e| e.scheme == scheme)
            .map(|e| &e.transport)
    }

    /// Returns the ownership the entry was added with.
    #[must_use]
    pub fn ownership_of(&self, scheme: &str) -> Option<Ownership> {
        self.entries
            .iter()
            .find(|e| e.scheme == scheme)
            .map(|e| e.ownership)
    }

    /// Removes an entry without destroying it and returns the transport.
    pub fn remove(&mut self, scheme: &str) -> Option<TransportHandle> {
        let idx = self.entries.iter().position(|e| e.scheme == scheme)?;
        let entry = self.entries.remove(idx);
        entry.transport.clear_scheme();
        debug!(scheme, transport = %entry.transport.id(), "Removed transport from list");
        Some(entry.transport)
    }

    /// Returns the registered schemes in insertion order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.scheme.as_str())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tears down every entry according to its ownership and empties the list.
    ///
    /// Always processes every entry.
    ///
    /// # Errors
    /// The last teardown failure.
    pub async fn clean(&mut self) -> Result<()> {
        let mut last_error = None;

        for entry in std::mem::take(&mut self.entries) {
            let ListEntry {
                scheme,
                ownership,
                transport,
            } = entry;
            transport.clear_scheme();

            let result = match ownership {
                Ownership::Exclusive => {
                    debug!(scheme = %scheme, transport = %transport.id(), "Destroying exclusive entry");
                    destroy_chain(transport).await
                }
                Ownership::Shared if transport.is_sole_owner() => {
                    debug!(scheme = %scheme, transport = %transport.id(), "Destroying last shared reference");
                    destroy_chain(transport).await
                }
                Ownership::Shared => {
                    debug!(scheme = %scheme, transport = %transport.id(), "Releasing shared entry, still referenced");
                    Ok(())
                }
                Ownership::None => {
                    debug!(scheme = %scheme, transport = %transport.id(), "Skipping unowned entry");
                    Ok(())
                }
            };

            if let Err(e) = result {
                warn!(scheme = %scheme, error = %e, "List teardown step failed, continuing");
                last_error = Some(e);
            }
        }

        last_error.map_or(Ok(()), Err)
    }

    /// Cleans the list and drops it.
    ///
    /// # Errors
    /// The last teardown failure from [`TransportList::clean`].
    pub async fn destroy(mut self) -> Result<()> {
        self.clean().await
    }
}

impl Drop for TransportList {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                entries = self.entries.len(),
                "Transport list dropped without destroy, transports left to their other owners"
            );
        }
    }
}

impl std::fmt::Debug for TransportList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.scheme, e.ownership)))
            .finish()
    }
}

// ============================================
// Tests
// ============================================
