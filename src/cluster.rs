use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{QuorumDbError, Result};

/// Believed role of a peer, updated from response metadata. Never
/// authoritative; every request outcome revalidates it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PeerRole {
    #[default]
    Unknown,
    Follower,
    Leader,
}

#[derive(Debug)]
struct Peer {
    base_url: String,
    role: PeerRole,
    unreachable_since: Option<Instant>,
}

impl Peer {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            role: PeerRole::Unknown,
            unreachable_since: None,
        }
    }

    fn cooling(&self, now: Instant, cooldown: Duration) -> bool {
        self.unreachable_since
            .is_some_and(|since| now.duration_since(since) < cooldown)
    }
}

/// Observable snapshot of one directory entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerStatus {
    pub base_url: String,
    pub role: PeerRole,
    /// Currently skipped because of a recent failure.
    pub unreachable: bool,
}

/// Role metadata extracted from one response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum RoleHint {
    Leader,
    Follower,
    /// Response carried no role metadata; keep whatever is recorded.
    Unchanged,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    peers: Vec<Peer>,
    /// Index of the believed leader. Weak reference: cleared whenever the
    /// peer it points at fails or reports otherwise.
    leader: Option<usize>,
    /// Round-robin position for the next non-leader pick.
    cursor: usize,
}

impl DirectoryInner {
    fn position(&self, base_url: &str) -> Option<usize> {
        self.peers.iter().position(|p| p.base_url == base_url)
    }

    fn clear_leader_if(&mut self, index: usize) {
        if self.leader == Some(index) {
            self.leader = None;
        }
    }
}

/// Tracks known cluster members and which one is believed to be the leader.
///
/// Pure state, no I/O. All methods take `&self` and serialize internally, so
/// concurrent reads dispatched through one client share a single directory.
#[derive(Debug, Default)]
pub(crate) struct NodeDirectory {
    inner: Mutex<DirectoryInner>,
    cooldown: Duration,
}

impl NodeDirectory {
    pub(crate) fn new(seed_urls: Vec<String>, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(DirectoryInner {
                peers: seed_urls.into_iter().map(Peer::new).collect(),
                leader: None,
                cursor: 0,
            }),
            cooldown,
        }
    }

    /// Picks the peer the next attempt should target.
    ///
    /// The believed leader wins when it is not in cooldown. Otherwise peers
    /// are tried in round-robin order, skipping entries still cooling down.
    /// When every peer is cooling down, all marks are cleared once and the
    /// scan repeats; only then is the cluster reported unreachable.
    pub(crate) fn acquire_target(&self) -> Result<String> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(index) = inner.leader {
            let peer = &inner.peers[index];
            if peer.role == PeerRole::Leader && !peer.cooling(now, self.cooldown) {
                return Ok(peer.base_url.clone());
            }
        }

        let count = inner.peers.len();
        if count == 0 {
            return Err(QuorumDbError::ClusterUnavailable {
                attempts: 0,
                last_error: "node directory is empty".to_owned(),
            });
        }

        for pass in 0..2 {
            for step in 0..count {
                let index = (inner.cursor + step) % count;
                if !inner.peers[index].cooling(now, self.cooldown) {
                    inner.cursor = (index + 1) % count;
                    return Ok(inner.peers[index].base_url.clone());
                }
            }
            if pass == 0 {
                tracing::debug!("all peers in cooldown, clearing unreachable marks");
                for peer in &mut inner.peers {
                    peer.unreachable_since = None;
                    peer.role = PeerRole::Unknown;
                }
                inner.leader = None;
            }
        }

        Err(QuorumDbError::ClusterUnavailable {
            attempts: 0,
            last_error: "no reachable cluster node".to_owned(),
        })
    }

    /// Records a served response and the role the peer reported for it.
    pub(crate) fn record_success(&self, base_url: &str, hint: RoleHint) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.position(base_url) else {
            return;
        };
        inner.peers[index].unreachable_since = None;
        match hint {
            RoleHint::Leader => {
                inner.peers[index].role = PeerRole::Leader;
                inner.leader = Some(index);
            }
            RoleHint::Follower => {
                inner.peers[index].role = PeerRole::Follower;
                inner.clear_leader_if(index);
            }
            RoleHint::Unchanged => {}
        }
    }

    /// Records a network-level failure: the peer enters cooldown and loses
    /// leader status. Eligible again once the cooldown window passes.
    pub(crate) fn record_failure(&self, base_url: &str) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.position(base_url) else {
            return;
        };
        inner.peers[index].unreachable_since = Some(Instant::now());
        inner.clear_leader_if(index);
    }

    /// Records a not-leader rejection. The peer answered, so it is reachable
    /// and a follower; when it named the leader, that peer is added or
    /// promoted without being contacted yet.
    pub(crate) fn record_not_leader(&self, base_url: &str, redirect: Option<String>) {
        let mut inner = self.inner.lock();
        if let Some(index) = inner.position(base_url) {
            inner.peers[index].role = PeerRole::Follower;
            inner.peers[index].unreachable_since = None;
            inner.clear_leader_if(index);
        }
        if let Some(leader_url) = redirect {
            let index = match inner.position(&leader_url) {
                Some(index) => index,
                None => {
                    inner.peers.push(Peer::new(leader_url.clone()));
                    inner.peers.len() - 1
                }
            };
            tracing::debug!(leader = %leader_url, "redirect promoted new leader");
            inner.peers[index].role = PeerRole::Leader;
            inner.peers[index].unreachable_since = None;
            inner.leader = Some(index);
        }
    }

    /// Replaces membership with the set reported by a discovery call,
    /// keeping failure state for peers that survive the merge.
    pub(crate) fn absorb_nodes(&self, nodes: &[(String, PeerRole, bool)]) {
        let mut inner = self.inner.lock();
        let mut peers = Vec::with_capacity(nodes.len());
        let mut leader = None;
        for (base_url, role, reachable) in nodes {
            let mut peer = match inner.position(base_url) {
                Some(index) => inner.peers.swap_remove(index),
                None => Peer::new(base_url.clone()),
            };
            peer.role = *role;
            if !*reachable && peer.unreachable_since.is_none() {
                peer.unreachable_since = Some(Instant::now());
            }
            if *role == PeerRole::Leader {
                leader = Some(peers.len());
            }
            peers.push(peer);
        }
        inner.peers = peers;
        inner.leader = leader;
        inner.cursor = 0;
    }

    /// Current believed leader, if any.
    pub(crate) fn leader(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner.leader.map(|index| inner.peers[index].base_url.clone())
    }

    /// Snapshot of every known peer.
    pub(crate) fn peers(&self) -> Vec<PeerStatus> {
        let inner = self.inner.lock();
        let now = Instant::now();
        inner
            .peers
            .iter()
            .map(|peer| PeerStatus {
                base_url: peer.base_url.clone(),
                role: peer.role,
                unreachable: peer.cooling(now, self.cooldown),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeDirectory, PeerRole, RoleHint};
    use std::time::Duration;

    fn directory(urls: &[&str]) -> NodeDirectory {
        NodeDirectory::new(
            urls.iter().map(|u| (*u).to_owned()).collect(),
            Duration::from_secs(3),
        )
    }

    #[test]
    fn round_robin_from_seed_order() {
        let dir = directory(&["http://a", "http://b", "http://c"]);
        assert_eq!(dir.acquire_target().unwrap(), "http://a");
        assert_eq!(dir.acquire_target().unwrap(), "http://b");
        assert_eq!(dir.acquire_target().unwrap(), "http://c");
        assert_eq!(dir.acquire_target().unwrap(), "http://a");
    }

    #[test]
    fn leader_short_circuits_rotation() {
        let dir = directory(&["http://a", "http://b", "http://c"]);
        dir.record_success("http://c", RoleHint::Leader);
        assert_eq!(dir.acquire_target().unwrap(), "http://c");
        assert_eq!(dir.acquire_target().unwrap(), "http://c");
    }

    #[test]
    fn follower_report_clears_leader_pointer() {
        let dir = directory(&["http://a", "http://b"]);
        dir.record_success("http://a", RoleHint::Leader);
        assert_eq!(dir.leader().as_deref(), Some("http://a"));
        dir.record_success("http://a", RoleHint::Follower);
        assert_eq!(dir.leader(), None);
        assert_eq!(dir.peers()[0].role, PeerRole::Follower);
    }

    #[test]
    fn failed_peer_is_skipped_and_loses_leadership() {
        let dir = directory(&["http://a", "http://b"]);
        dir.record_success("http://a", RoleHint::Leader);
        dir.record_failure("http://a");
        assert_eq!(dir.leader(), None);
        assert_eq!(dir.acquire_target().unwrap(), "http://b");
        assert_eq!(dir.acquire_target().unwrap(), "http://b");
    }

    #[test]
    fn all_cooling_resets_once_then_serves() {
        let dir = directory(&["http://a", "http://b"]);
        dir.record_failure("http://a");
        dir.record_failure("http://b");
        // Reset pass clears the marks instead of reporting unavailable.
        let target = dir.acquire_target().unwrap();
        assert!(target == "http://a" || target == "http://b");
        assert_eq!(dir.peers()[0].role, PeerRole::Unknown);
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = directory(&[]);
        assert!(dir.acquire_target().is_err());
    }

    #[test]
    fn redirect_adds_and_promotes_unknown_peer() {
        let dir = directory(&["http://a"]);
        dir.record_not_leader("http://a", Some("http://leader".to_owned()));
        assert_eq!(dir.leader().as_deref(), Some("http://leader"));
        assert_eq!(dir.acquire_target().unwrap(), "http://leader");
        let peers = dir.peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].role, PeerRole::Follower);
    }

    #[test]
    fn absorb_nodes_rebuilds_membership() {
        let dir = directory(&["http://a", "http://b"]);
        dir.absorb_nodes(&[
            ("http://b".to_owned(), PeerRole::Leader, true),
            ("http://c".to_owned(), PeerRole::Follower, true),
        ]);
        assert_eq!(dir.leader().as_deref(), Some("http://b"));
        let peers = dir.peers();
        assert_eq!(peers.len(), 2);
        assert!(peers.iter().all(|p| p.base_url != "http://a"));
    }

    #[test]
    fn cooldown_expires() {
        let dir = NodeDirectory::new(
            vec!["http://a".to_owned(), "http://b".to_owned()],
            Duration::from_millis(0),
        );
        dir.record_failure("http://a");
        // Zero cooldown: the failed peer is immediately eligible again.
        let picks = [dir.acquire_target().unwrap(), dir.acquire_target().unwrap()];
        assert!(picks.contains(&"http://a".to_owned()));
    }
}
