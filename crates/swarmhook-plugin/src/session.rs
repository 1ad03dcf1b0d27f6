//! Session scope: engine ticks, alerts, and the torrent plugin factory.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::{
    EngineAlert, InfoHash, PeerConnectionRef, StateMap, TorrentHandle, UnchokeCandidate,
};
use crate::torrent::{BaseTorrentPlugin, TorrentPlugin, TorrentPluginShim};

/// Opaque user data supplied by the engine when a torrent is attached.
pub type TorrentContext<'a> = Option<&'a (dyn Any + Send + Sync)>;

/// Engine-side torrent object as seen by the session factory.
pub trait EngineTorrent {
    /// Resolve the public handle for this torrent.
    fn handle(&self) -> TorrentHandle;
}

impl EngineTorrent for TorrentHandle {
    fn handle(&self) -> TorrentHandle {
        self.clone()
    }
}

/// Session-wide hooks.
#[allow(unused_variables)]
pub trait SessionPlugin: Send + Sync {
    /// Build the plugin for a newly attached torrent, or `None` to stay out of it.
    fn create_torrent_handler(&self, torrent: &TorrentHandle) -> Option<Box<dyn TorrentPlugin>> {
        Some(Box::new(BaseTorrentPlugin))
    }

    /// Scheduler tick.
    fn on_tick(&self) {}

    /// An alert was posted by the engine.
    fn on_alert(&self, alert: &EngineAlert) {}

    /// A peer asked for a torrent the session does not have; `true` claims it.
    fn on_unknown_torrent(&self, info_hash: &InfoHash, peer: &PeerConnectionRef) -> bool {
        false
    }

    /// Reorder optimistic unchoke candidates; `true` means the plugin chose the order.
    fn on_optimistic_unchoke(&self, candidates: &mut [UnchokeCandidate]) -> bool {
        false
    }

    /// Persist plugin state into the session state document.
    fn save_state(&self, state: &mut StateMap) {}

    /// Restore plugin state from the session state document.
    fn load_state(&self, state: &Value) {}
}

/// Session plugin that attaches a [`BaseTorrentPlugin`] to every torrent.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseSessionPlugin;

impl SessionPlugin for BaseSessionPlugin {}

/// Shared-ownership handle the engine holds for a session plugin.
#[derive(Clone)]
pub struct SessionPluginShim {
    inner: Arc<dyn SessionPlugin>,
}

impl fmt::Debug for SessionPluginShim {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("SessionPluginShim").finish_non_exhaustive()
    }
}

impl SessionPluginShim {
    /// Wrap an injected plugin implementation.
    #[must_use]
    pub const fn new(plugin: Arc<dyn SessionPlugin>) -> Self {
        Self { inner: plugin }
    }

    /// Access the wrapped plugin.
    #[must_use]
    pub const fn plugin(&self) -> &Arc<dyn SessionPlugin> {
        &self.inner
    }

    /// Engine entry point for a newly attached torrent.
    ///
    /// The context is engine-owned user data; it is accepted for parity with the engine's
    /// factory signature and not interpreted here. Returns `None` when the plugin declines.
    #[must_use]
    pub fn on_factory_requested(
        &self,
        torrent: &dyn EngineTorrent,
        _context: TorrentContext<'_>,
    ) -> Option<TorrentPluginShim> {
        let handle = torrent.handle();
        self.inner
            .create_torrent_handler(&handle)
            .map(TorrentPluginShim::from)
    }

    /// Forward [`SessionPlugin::on_tick`].
    pub fn on_tick(&self) {
        self.inner.on_tick();
    }

    /// Forward [`SessionPlugin::on_alert`].
    pub fn on_alert(&self, alert: &EngineAlert) {
        self.inner.on_alert(alert);
    }

    /// Forward [`SessionPlugin::on_unknown_torrent`].
    #[must_use]
    pub fn on_unknown_torrent(&self, info_hash: &InfoHash, peer: &PeerConnectionRef) -> bool {
        self.inner.on_unknown_torrent(info_hash, peer)
    }

    /// Forward [`SessionPlugin::on_optimistic_unchoke`].
    #[must_use]
    pub fn on_optimistic_unchoke(&self, candidates: &mut [UnchokeCandidate]) -> bool {
        self.inner.on_optimistic_unchoke(candidates)
    }

    /// Forward [`SessionPlugin::save_state`].
    pub fn save_state(&self, state: &mut StateMap) {
        self.inner.save_state(state);
    }

    /// Forward [`SessionPlugin::load_state`].
    pub fn load_state(&self, state: &Value) {
        self.inner.load_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::DEFAULT_PEER_PLUGIN_TYPE;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn torrent(n: u128) -> TorrentHandle {
        TorrentHandle::new(Uuid::from_u128(n), InfoHash::default())
    }

    fn peer(torrent_id: Uuid) -> PeerConnectionRef {
        PeerConnectionRef {
            id: Uuid::from_u128(99),
            torrent_id,
            endpoint: "192.0.2.7:51413".parse().expect("valid endpoint"),
            outgoing: false,
        }
    }

    struct NamedOnly {
        seen: Mutex<Vec<Uuid>>,
    }

    impl SessionPlugin for NamedOnly {
        fn create_torrent_handler(
            &self,
            torrent: &TorrentHandle,
        ) -> Option<Box<dyn TorrentPlugin>> {
            self.seen.lock().expect("seen lock").push(torrent.id);
            torrent
                .name
                .as_ref()
                .map(|_| Box::new(BaseTorrentPlugin) as Box<dyn TorrentPlugin>)
        }
    }

    struct EngineSideTorrent {
        id: Uuid,
    }

    impl EngineTorrent for EngineSideTorrent {
        fn handle(&self) -> TorrentHandle {
            TorrentHandle::new(self.id, InfoHash::default()).with_name("resolved")
        }
    }

    #[test]
    fn attach_torrent_then_peer_uses_base_plugins() {
        let session = SessionPluginShim::new(Arc::new(BaseSessionPlugin));
        let t1 = torrent(1);
        let torrent_shim = session
            .on_factory_requested(&t1, None)
            .expect("base session accepts torrents");
        let peer_shim = torrent_shim
            .on_peer_factory_requested(&peer(t1.id))
            .expect("base torrent accepts peers");
        assert_eq!(peer_shim.type_name(), DEFAULT_PEER_PLUGIN_TYPE);
    }

    #[test]
    fn declining_factory_yields_empty_handle() {
        let plugin = Arc::new(NamedOnly {
            seen: Mutex::new(Vec::new()),
        });
        let session = SessionPluginShim::new(plugin.clone());

        assert!(session.on_factory_requested(&torrent(1), None).is_none());
        assert!(
            session
                .on_factory_requested(&torrent(2).with_name("named"), None)
                .is_some()
        );
        assert_eq!(
            *plugin.seen.lock().expect("seen lock"),
            vec![Uuid::from_u128(1), Uuid::from_u128(2)]
        );
    }

    #[test]
    fn factory_resolves_handle_from_engine_torrent() {
        let plugin = Arc::new(NamedOnly {
            seen: Mutex::new(Vec::new()),
        });
        let session = SessionPluginShim::new(plugin.clone());
        let engine_torrent = EngineSideTorrent {
            id: Uuid::from_u128(5),
        };
        let context: u32 = 17;

        assert!(
            session
                .on_factory_requested(&engine_torrent, Some(&context as &(dyn Any + Send + Sync)))
                .is_some()
        );
        assert_eq!(
            *plugin.seen.lock().expect("seen lock"),
            vec![Uuid::from_u128(5)]
        );
    }

    #[test]
    fn base_session_hooks_have_no_effect() {
        let session = SessionPluginShim::new(Arc::new(BaseSessionPlugin));
        let mut candidates = vec![
            UnchokeCandidate {
                endpoint: "192.0.2.1:1".parse().expect("endpoint"),
                last_optimistic_unchoke: 4,
            },
            UnchokeCandidate {
                endpoint: "192.0.2.2:2".parse().expect("endpoint"),
                last_optimistic_unchoke: 1,
            },
        ];
        let before = candidates.clone();
        let mut state = StateMap::new();

        for _ in 0..3 {
            session.on_tick();
        }
        session.on_alert(&EngineAlert {
            kind: "torrent_added".into(),
            message: "added".into(),
        });
        assert!(!session.on_unknown_torrent(&InfoHash::default(), &peer(Uuid::nil())));
        assert!(!session.on_optimistic_unchoke(&mut candidates));
        session.save_state(&mut state);
        session.load_state(&Value::Null);

        assert_eq!(candidates, before);
        assert!(state.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn factory_is_safe_across_concurrent_attachments() -> anyhow::Result<()> {
        let session = SessionPluginShim::new(Arc::new(BaseSessionPlugin));
        let mut tasks = Vec::new();
        for n in 0..64_u128 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                let handle = torrent(n);
                session
                    .on_factory_requested(&handle, None)
                    .and_then(|shim| shim.on_peer_factory_requested(&peer(handle.id)))
                    .map(|peer_shim| peer_shim.type_name().to_string())
            }));
        }
        for task in tasks {
            assert_eq!(task.await?.as_deref(), Some(DEFAULT_PEER_PLUGIN_TYPE));
        }
        Ok(())
    }
}
