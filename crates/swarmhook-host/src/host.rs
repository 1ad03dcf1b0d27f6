//! Session-scope registry and dispatch.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use swarmhook_config::{HostConfig, PluginSettings};
use swarmhook_events::{Event, EventBus};
use swarmhook_plugin::{
    Dispatch, EngineAlert, EngineTorrent, InfoHash, PeerConnectionRef, SessionPlugin,
    SessionPluginShim, StateMap, TorrentContext, TorrentPluginShim, UnchokeCandidate,
};
use tracing::{debug, info, trace};

use crate::error::{HostError, HostResult};
use crate::torrent::TorrentExtensions;

/// Outcome of [`PluginHost::add_extension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The extension joins every torrent attached from now on.
    Installed,
    /// The configuration disables the extension; it was not installed.
    Disabled,
}

#[derive(Clone)]
struct RegisteredExtension {
    name: String,
    shim: SessionPluginShim,
}

/// Registry of session extensions plus the event bus they report through.
pub struct PluginHost {
    settings: PluginSettings,
    events: EventBus,
    extensions: RwLock<Vec<RegisteredExtension>>,
}

impl PluginHost {
    /// Construct a host that publishes onto an existing bus.
    #[must_use]
    pub fn new(config: &HostConfig, events: EventBus) -> Self {
        Self {
            settings: config.plugins.clone(),
            events,
            extensions: RwLock::new(Vec::new()),
        }
    }

    /// Construct a host with its own bus sized from the configuration.
    #[must_use]
    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(config, EventBus::with_capacity(config.events.replay_capacity))
    }

    /// Bus carrying host events.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Install a session extension under a unique name.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidName`] for a blank name and
    /// [`HostError::DuplicateExtension`] when the name is taken.
    pub fn add_extension(
        &self,
        name: impl Into<String>,
        plugin: Arc<dyn SessionPlugin>,
    ) -> HostResult<Registration> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(HostError::InvalidName { name });
        }

        if self.settings.is_disabled(&name) {
            info!(extension = %name, "extension disabled by configuration");
            self.events.publish(Event::ExtensionDisabled { name });
            return Ok(Registration::Disabled);
        }

        {
            let mut extensions = self.write();
            if extensions.iter().any(|existing| existing.name == name) {
                return Err(HostError::DuplicateExtension { name });
            }
            extensions.push(RegisteredExtension {
                name: name.clone(),
                shim: SessionPluginShim::new(plugin),
            });
        }

        info!(extension = %name, "extension registered");
        self.events.publish(Event::ExtensionRegistered { name });
        Ok(Registration::Installed)
    }

    /// Names of the installed extensions in registration order.
    #[must_use]
    pub fn extensions(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|extension| extension.name.clone())
            .collect()
    }

    /// Deliver a scheduler tick to every extension.
    pub fn tick(&self) {
        for extension in self.snapshot() {
            trace!(extension = %extension.name, "session tick");
            extension.shim.on_tick();
        }
    }

    /// Deliver an engine alert to every extension.
    pub fn post_alert(&self, alert: &EngineAlert) {
        for extension in self.snapshot() {
            extension.shim.on_alert(alert);
        }
    }

    /// Offer an unknown info-hash to the extensions; the first to claim it wins.
    #[must_use]
    pub fn unknown_torrent(&self, info_hash: &InfoHash, peer: &PeerConnectionRef) -> Dispatch {
        for extension in self.snapshot() {
            if extension.shim.on_unknown_torrent(info_hash, peer) {
                debug!(
                    extension = %extension.name,
                    info_hash = %info_hash,
                    "extension claimed unknown torrent"
                );
                return Dispatch::Consumed;
            }
        }
        Dispatch::Deferred
    }

    /// Let the extensions reorder optimistic unchoke candidates; the first to do so wins.
    #[must_use]
    pub fn optimistic_unchoke(&self, candidates: &mut [UnchokeCandidate]) -> Dispatch {
        for extension in self.snapshot() {
            if extension.shim.on_optimistic_unchoke(candidates) {
                trace!(extension = %extension.name, "extension ordered unchoke candidates");
                return Dispatch::Consumed;
            }
        }
        Dispatch::Deferred
    }

    /// Collect every extension's persisted state into one document.
    #[must_use]
    pub fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        for extension in self.snapshot() {
            extension.shim.save_state(&mut state);
        }
        state
    }

    /// Hand a previously saved document back to every extension.
    pub fn load_state(&self, state: &Value) {
        for extension in self.snapshot() {
            extension.shim.load_state(state);
        }
    }

    /// Build the plugin chain for a newly attached torrent.
    ///
    /// Extensions registered later do not join an existing chain.
    pub fn attach_torrent(
        &self,
        torrent: &dyn EngineTorrent,
        context: TorrentContext<'_>,
    ) -> TorrentExtensions {
        let handle = torrent.handle();
        let chain: Vec<TorrentPluginShim> = self
            .snapshot()
            .into_iter()
            .filter_map(|extension| {
                let shim = extension.shim.on_factory_requested(torrent, context);
                if shim.is_none() {
                    debug!(
                        extension = %extension.name,
                        torrent_id = %handle.id,
                        "extension declined torrent"
                    );
                }
                shim
            })
            .collect();

        debug!(
            torrent_id = %handle.id,
            extensions = chain.len(),
            "torrent attached"
        );
        self.events.publish(Event::TorrentAttached {
            torrent_id: handle.id,
            extensions: chain.len(),
        });
        if chain.is_empty() {
            self.events.publish(Event::TorrentDeclined {
                torrent_id: handle.id,
            });
        }

        TorrentExtensions::new(handle, chain, self.events.clone())
    }

    fn snapshot(&self) -> Vec<RegisteredExtension> {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<RegisteredExtension>> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<RegisteredExtension>> {
        self.extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmhook_events::MAX_REPLAY_CAPACITY;
    use swarmhook_plugin::{BaseSessionPlugin, DEFAULT_PEER_PLUGIN_TYPE, TorrentHandle};
    use swarmhook_test_support::fixtures::{FakeTorrent, peer_ref, torrent_handle};
    use swarmhook_test_support::recording::{Behaviour, CallLog, RecordingSessionPlugin};

    fn host() -> PluginHost {
        PluginHost::from_config(&HostConfig::default())
    }

    fn kinds(host: &PluginHost) -> Vec<&'static str> {
        host.events()
            .recent()
            .iter()
            .map(|envelope| envelope.event.kind())
            .collect()
    }

    #[test]
    fn registration_rejects_blank_and_duplicate_names() -> anyhow::Result<()> {
        let host = host();
        assert_eq!(
            host.add_extension("ut_pex", Arc::new(BaseSessionPlugin))?,
            Registration::Installed
        );
        assert_eq!(
            host.add_extension("ut_pex", Arc::new(BaseSessionPlugin)),
            Err(HostError::DuplicateExtension {
                name: "ut_pex".into()
            })
        );
        assert_eq!(
            host.add_extension("  ", Arc::new(BaseSessionPlugin)),
            Err(HostError::InvalidName { name: "  ".into() })
        );
        assert_eq!(host.extensions(), vec!["ut_pex".to_string()]);
        assert_eq!(kinds(&host), vec!["extension_registered"]);
        Ok(())
    }

    #[test]
    fn disabled_extensions_are_skipped() -> anyhow::Result<()> {
        let mut config = HostConfig::default();
        config.plugins.disabled = vec!["smart_ban".into()];
        let host = PluginHost::from_config(&config);

        assert_eq!(
            host.add_extension("smart_ban", Arc::new(BaseSessionPlugin))?,
            Registration::Disabled
        );
        assert!(host.extensions().is_empty());
        assert_eq!(kinds(&host), vec!["extension_disabled"]);
        Ok(())
    }

    #[test]
    fn tick_and_alert_reach_every_extension_in_order() -> anyhow::Result<()> {
        let host = host();
        let log = CallLog::default();
        host.add_extension("a", Arc::new(RecordingSessionPlugin::new("a", log.clone())))?;
        host.add_extension("b", Arc::new(RecordingSessionPlugin::new("b", log.clone())))?;

        host.tick();
        host.post_alert(&EngineAlert {
            kind: "stats".into(),
            message: "session stats".into(),
        });

        assert_eq!(
            log.entries(),
            vec!["a:on_tick", "b:on_tick", "a:on_alert(stats)", "b:on_alert(stats)"]
        );
        Ok(())
    }

    #[test]
    fn first_claim_wins_for_unknown_torrents() -> anyhow::Result<()> {
        let host = host();
        let log = CallLog::default();
        let claim = Behaviour {
            claim: true,
            ..Behaviour::default()
        };
        host.add_extension("a", Arc::new(RecordingSessionPlugin::new("a", log.clone())))?;
        host.add_extension(
            "b",
            Arc::new(RecordingSessionPlugin::with_behaviour("b", log.clone(), claim)),
        )?;
        host.add_extension(
            "c",
            Arc::new(RecordingSessionPlugin::with_behaviour("c", log.clone(), claim)),
        )?;

        let torrent = torrent_handle(1);
        let outcome = host.unknown_torrent(&InfoHash([9; 20]), &peer_ref(&torrent, 1));
        assert_eq!(outcome, Dispatch::Consumed);
        assert_eq!(log.entries(), vec!["a:on_unknown_torrent", "b:on_unknown_torrent"]);
        Ok(())
    }

    #[test]
    fn optimistic_unchoke_defers_without_claims() -> anyhow::Result<()> {
        let host = host();
        host.add_extension("base", Arc::new(BaseSessionPlugin))?;
        let mut candidates = vec![UnchokeCandidate {
            endpoint: "192.0.2.1:6881".parse()?,
            last_optimistic_unchoke: 3,
        }];
        assert_eq!(host.optimistic_unchoke(&mut candidates), Dispatch::Deferred);
        Ok(())
    }

    #[test]
    fn optimistic_unchoke_stops_at_first_claim() -> anyhow::Result<()> {
        let host = host();
        let log = CallLog::default();
        let claim = Behaviour {
            claim: true,
            ..Behaviour::default()
        };
        host.add_extension("a", Arc::new(RecordingSessionPlugin::new("a", log.clone())))?;
        host.add_extension(
            "b",
            Arc::new(RecordingSessionPlugin::with_behaviour("b", log.clone(), claim)),
        )?;
        host.add_extension(
            "c",
            Arc::new(RecordingSessionPlugin::with_behaviour("c", log.clone(), claim)),
        )?;

        let mut candidates = vec![
            UnchokeCandidate {
                endpoint: "192.0.2.1:6881".parse()?,
                last_optimistic_unchoke: 9,
            },
            UnchokeCandidate {
                endpoint: "192.0.2.2:6881".parse()?,
                last_optimistic_unchoke: 2,
            },
        ];
        assert_eq!(host.optimistic_unchoke(&mut candidates), Dispatch::Consumed);

        let order: Vec<u32> = candidates
            .iter()
            .map(|candidate| candidate.last_optimistic_unchoke)
            .collect();
        assert_eq!(order, vec![2, 9]);
        assert_eq!(log.entries(), vec!["a:on_optimistic_unchoke", "b:on_optimistic_unchoke"]);
        Ok(())
    }

    #[test]
    fn oversized_bus_capacity_is_clamped() {
        let mut config = HostConfig::default();
        config.events.replay_capacity = usize::MAX / 2 + 1;
        let host = PluginHost::from_config(&config);
        assert_eq!(host.events().replay_capacity(), MAX_REPLAY_CAPACITY);
    }

    #[test]
    fn state_round_trips_through_every_extension() -> anyhow::Result<()> {
        let host = host();
        let log = CallLog::default();
        host.add_extension("a", Arc::new(RecordingSessionPlugin::new("a", log.clone())))?;
        host.add_extension("b", Arc::new(RecordingSessionPlugin::new("b", log.clone())))?;

        let state = host.save_state();
        assert_eq!(state.len(), 2);
        host.load_state(&Value::Object(state));
        assert_eq!(log.count("a:load_state(true)"), 1);
        assert_eq!(log.count("b:load_state(true)"), 1);
        Ok(())
    }

    #[test]
    fn attach_skips_declining_extensions() -> anyhow::Result<()> {
        let host = host();
        let log = CallLog::default();
        let decline = Behaviour {
            decline_torrents: true,
            ..Behaviour::default()
        };
        host.add_extension(
            "no",
            Arc::new(RecordingSessionPlugin::with_behaviour("no", log.clone(), decline)),
        )?;
        host.add_extension("yes", Arc::new(RecordingSessionPlugin::new("yes", log)))?;

        let torrent = host.attach_torrent(&FakeTorrent::new(torrent_handle(1)), None);
        assert_eq!(torrent.len(), 1);
        assert_eq!(kinds(&host).last().copied(), Some("torrent_attached"));
        Ok(())
    }

    #[test]
    fn attach_with_no_takers_publishes_decline() {
        let host = host();
        let handle: TorrentHandle = torrent_handle(4);
        let torrent = host.attach_torrent(&handle, None);
        assert!(torrent.is_empty());
        assert_eq!(kinds(&host), vec!["torrent_attached", "torrent_declined"]);
    }

    #[test]
    fn base_extension_builds_full_chain() -> anyhow::Result<()> {
        let host = host();
        host.add_extension("base", Arc::new(BaseSessionPlugin))?;
        let handle = torrent_handle(1);
        let torrent = host.attach_torrent(&handle, None);
        let peer = torrent.attach_peer(&peer_ref(&handle, 1));
        assert_eq!(peer.type_names(), vec![DEFAULT_PEER_PLUGIN_TYPE]);
        Ok(())
    }

    #[test]
    fn later_registrations_do_not_join_attached_torrents() -> anyhow::Result<()> {
        let host = host();
        host.add_extension("first", Arc::new(BaseSessionPlugin))?;
        let torrent = host.attach_torrent(&torrent_handle(1), None);
        host.add_extension("second", Arc::new(BaseSessionPlugin))?;
        assert_eq!(torrent.len(), 1);
        assert_eq!(host.attach_torrent(&torrent_handle(2), None).len(), 2);
        Ok(())
    }
}
