use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use dynbus_core::error::{DynbusError, Result};

use crate::config::RebindPolicy;

/// Connection-scoped id, unique for the life of the broker.
pub type SessionId = u64;

/// One node's outbound queue sender.
#[derive(Clone)]
pub struct NodeLink {
    pub session: SessionId,
    pub tx: mpsc::Sender<String>,
}

struct NodeEntry {
    link: NodeLink,
    peer: Option<String>,
    /// Nodes that delivered to this one; told when it goes away.
    contacts: DashSet<String>,
}

/// Snapshot of a registered node.
#[derive(Clone)]
pub struct NodeView {
    pub link: NodeLink,
    pub peer: Option<String>,
}

/// Result of binding a name.
pub struct Bound {
    /// Link of the connection that lost the name, if any.
    pub replaced: Option<NodeLink>,
    /// Nodes that had delivered to the replaced connection.
    pub contacts: Vec<String>,
}

impl Bound {
    fn fresh() -> Self {
        Self {
            replaced: None,
            contacts: Vec::new(),
        }
    }
}

/// Entry removed on unbind.
pub struct Unbound {
    pub contacts: Vec<String>,
}

/// `name -> node` map. A name is bound to at most one connection.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: DashMap<String, NodeEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `link`. Re-binding from the same session updates in
    /// place; binding over another session follows `policy`.
    pub fn bind(
        &self,
        name: &str,
        link: NodeLink,
        peer: Option<String>,
        policy: RebindPolicy,
    ) -> Result<Bound> {
        let fresh = NodeEntry {
            link,
            peer,
            contacts: DashSet::new(),
        };
        match self.nodes.entry(name.to_string()) {
            Entry::Occupied(mut o) => {
                if o.get().link.session == fresh.link.session {
                    o.get_mut().peer = fresh.peer;
                    return Ok(Bound::fresh());
                }
                if policy == RebindPolicy::Reject {
                    return Err(DynbusError::AddressInUse(name.to_string()));
                }
                let old = o.insert(fresh);
                Ok(Bound {
                    replaced: Some(old.link),
                    contacts: old.contacts.into_iter().collect(),
                })
            }
            Entry::Vacant(v) => {
                v.insert(fresh);
                Ok(Bound::fresh())
            }
        }
    }

    /// Remove `name` only if `session` still owns it.
    pub fn unbind(&self, name: &str, session: SessionId) -> Option<Unbound> {
        self.nodes
            .remove_if(name, |_, e| e.link.session == session)
            .map(|(_, entry)| Unbound {
                contacts: entry.contacts.into_iter().collect(),
            })
    }

    pub fn get(&self, name: &str) -> Option<NodeView> {
        self.nodes.get(name).map(|e| NodeView {
            link: e.link.clone(),
            peer: e.peer.clone(),
        })
    }

    pub fn is_bound(&self, name: &str, session: SessionId) -> bool {
        self.nodes
            .get(name)
            .map(|e| e.link.session == session)
            .unwrap_or(false)
    }

    pub fn record_contact(&self, target: &str, from: &str) {
        if target == from {
            return;
        }
        if let Some(e) = self.nodes.get(target) {
            e.contacts.insert(from.to_string());
        }
    }

    /// Every registered name except `exclude`.
    pub fn others(&self, exclude: &str) -> Vec<String> {
        self.nodes
            .iter()
            .map(|r| r.key().clone())
            .filter(|n| n != exclude)
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn link(session: SessionId) -> NodeLink {
        let (tx, _rx) = mpsc::channel(1);
        NodeLink { session, tx }
    }

    #[test]
    fn replace_returns_previous_owner() {
        let reg = NodeRegistry::new();
        assert!(reg.bind("b", link(1), None, RebindPolicy::Replace).unwrap().replaced.is_none());
        reg.record_contact("b", "a");
        let bound = reg.bind("b", link(2), None, RebindPolicy::Replace).unwrap();
        assert_eq!(bound.replaced.map(|l| l.session), Some(1));
        // contacts go with the old connection
        assert_eq!(bound.contacts, vec!["a".to_string()]);
        let again = reg.bind("b", link(3), None, RebindPolicy::Replace).unwrap();
        assert!(again.contacts.is_empty());
        assert!(reg.is_bound("b", 3));
        assert!(!reg.is_bound("b", 1));
    }

    #[test]
    fn reject_keeps_first_owner() {
        let reg = NodeRegistry::new();
        reg.bind("b", link(1), None, RebindPolicy::Reject).unwrap();
        let err = reg.bind("b", link(2), None, RebindPolicy::Reject).err().unwrap();
        assert_eq!(err.client_code().as_str(), "ADDRESS_IN_USE");
        assert!(reg.is_bound("b", 1));
        // same session may re-bind
        reg.bind("b", link(1), Some("x".into()), RebindPolicy::Reject).unwrap();
        assert_eq!(reg.get("b").unwrap().peer.as_deref(), Some("x"));
    }

    #[test]
    fn stale_session_cannot_unbind_new_owner() {
        let reg = NodeRegistry::new();
        reg.bind("b", link(1), None, RebindPolicy::Replace).unwrap();
        reg.bind("b", link(2), None, RebindPolicy::Replace).unwrap();
        assert!(reg.unbind("b", 1).is_none());
        assert!(reg.is_bound("b", 2));
        reg.record_contact("b", "a");
        reg.record_contact("b", "b");
        let gone = reg.unbind("b", 2).unwrap();
        assert_eq!(gone.contacts, vec!["a".to_string()]);
        assert!(reg.is_empty());
    }
}
