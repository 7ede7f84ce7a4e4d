//! Sharded in-memory instance directory with long-poll notification

use crate::error::{CoreError, Result};
use crate::poll::{ChanPool, NotifyHandle, PollResult};
use beacon_api::{
    now_nanos, ArgCancel, ArgFetchs, ArgPolls, ArgRenew, Instance, InstanceInfo, STATUS_UP,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

const SHARD_COUNT: usize = 32;

/// Directory key: one entry per (env, appid) pair, holding every zone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct AppKey {
    env: String,
    appid: String,
}

impl AppKey {
    fn new(env: &str, appid: &str) -> Self {
        Self {
            env: env.to_string(),
            appid: appid.to_string(),
        }
    }
}

/// All instances of one appid, grouped by zone, plus the app-level version
/// marker used for NotModified comparisons. The marker moves on register
/// and cancel but never on renew, so renewals do not wake pollers.
#[derive(Default)]
struct Apps {
    zones: HashMap<String, HashMap<String, Instance>>,
    latest_timestamp: i64,
}

impl Apps {
    fn update_latest(&mut self, ts: i64) {
        if ts > self.latest_timestamp {
            self.latest_timestamp = ts;
        }
    }
}

/// One registered long-poll waiter. A client polling several appids shares
/// a single notify handle across them; `count` tracks how many outstanding
/// polls of the same connection reference this entry.
struct Conn {
    handle: Arc<NotifyHandle>,
    zone: String,
    count: usize,
}

/// Registry owns the instance directory. All callers receive clones of the
/// stored instances, never references into the live maps.
pub struct Registry {
    shards: Vec<RwLock<HashMap<AppKey, Apps>>>,
    conns: Mutex<HashMap<AppKey, HashMap<String, Conn>>>,
    pool: ChanPool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            conns: Mutex::new(HashMap::new()),
            pool: ChanPool::new(),
        }
    }

    fn shard(&self, key: &AppKey) -> &RwLock<HashMap<AppKey, Apps>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Unconditional insert/replace keyed by (appid, hostname). Always
    /// succeeds; wakes any long-poll waiters subscribed to the appid.
    pub async fn register(&self, ins: Instance, latest_timestamp: i64) {
        let key = AppKey::new(&ins.env, &ins.appid);
        let env = ins.env.clone();
        let appid = ins.appid.clone();
        {
            let mut shard = self.shard(&key).write().await;
            let apps = shard.entry(key).or_default();
            let ts = if latest_timestamp > 0 {
                latest_timestamp
            } else {
                ins.latest_timestamp
            };
            debug!(appid = %ins.appid, hostname = %ins.hostname, zone = %ins.zone, "register instance");
            apps.zones
                .entry(ins.zone.clone())
                .or_default()
                .insert(ins.hostname.clone(), ins);
            apps.update_latest(ts);
        }
        self.broadcast(&env, &appid).await;
    }

    /// Refresh the renewal clock of an existing instance.
    ///
    /// For a replicated renewal the incoming dirty timestamp is compared
    /// against the local one first: ahead means the sender knows a version
    /// this node has never seen (NothingFound, recover with a full
    /// register); behind means the local state is authoritative (Conflict).
    /// Both error paths leave the record untouched.
    pub async fn renew(&self, arg: &ArgRenew) -> Result<Instance> {
        let key = AppKey::new(&arg.env, &arg.appid);
        let mut shard = self.shard(&key).write().await;
        let ins = shard
            .get_mut(&key)
            .and_then(|apps| apps.zones.get_mut(&arg.zone))
            .and_then(|hosts| hosts.get_mut(&arg.hostname))
            .ok_or(CoreError::NothingFound)?;
        if arg.replication {
            if arg.dirty_timestamp > ins.dirty_timestamp {
                return Err(CoreError::NothingFound);
            }
            if arg.dirty_timestamp < ins.dirty_timestamp {
                return Err(CoreError::Conflict);
            }
        }
        ins.renew(now_nanos());
        Ok(ins.clone())
    }

    /// Remove an identity from the directory; wakes waiters of the appid.
    pub async fn cancel(&self, arg: &ArgCancel) -> Result<Instance> {
        let key = AppKey::new(&arg.env, &arg.appid);
        let removed;
        {
            let mut shard = self.shard(&key).write().await;
            let apps = shard.get_mut(&key).ok_or(CoreError::NothingFound)?;
            let hosts = apps.zones.get_mut(&arg.zone).ok_or(CoreError::NothingFound)?;
            removed = hosts.remove(&arg.hostname).ok_or(CoreError::NothingFound)?;
            if hosts.is_empty() {
                apps.zones.remove(&arg.zone);
            }
            if apps.zones.is_empty() {
                shard.remove(&key);
            } else {
                let ts = if arg.latest_timestamp > 0 {
                    arg.latest_timestamp
                } else {
                    now_nanos()
                };
                apps.update_latest(ts);
            }
            debug!(appid = %arg.appid, hostname = %arg.hostname, "cancel instance");
        }
        self.broadcast(&arg.env, &arg.appid).await;
        Ok(removed)
    }

    /// Full snapshot across all apps, for bootstrap and admin use.
    pub async fn fetch_all(&self) -> HashMap<String, Vec<Instance>> {
        let mut all: HashMap<String, Vec<Instance>> = HashMap::new();
        for shard in &self.shards {
            let shard = shard.read().await;
            for (key, apps) in shard.iter() {
                let entry = all.entry(key.appid.clone()).or_default();
                for hosts in apps.zones.values() {
                    entry.extend(hosts.values().cloned());
                }
            }
        }
        all
    }

    /// Filtered snapshot of one appid. An empty `zone` matches every zone.
    /// Fails with NotModified when the caller already holds the current
    /// version, NothingFound when the appid is unknown or the filter
    /// matches nothing.
    pub async fn fetch(
        &self,
        zone: &str,
        env: &str,
        appid: &str,
        latest_timestamp: i64,
        status: u32,
    ) -> Result<InstanceInfo> {
        let key = AppKey::new(env, appid);
        let shard = self.shard(&key).read().await;
        let apps = shard.get(&key).ok_or(CoreError::NothingFound)?;
        if latest_timestamp >= apps.latest_timestamp {
            return Err(CoreError::NotModified);
        }
        let mut instances = BTreeMap::new();
        for (z, hosts) in &apps.zones {
            if !zone.is_empty() && z != zone {
                continue;
            }
            let mut list: Vec<Instance> = hosts
                .values()
                .filter(|i| i.filter_status(status))
                .cloned()
                .collect();
            if list.is_empty() {
                continue;
            }
            list.sort_by(|a, b| a.hostname.cmp(&b.hostname));
            instances.insert(z.clone(), list);
        }
        if instances.is_empty() {
            return Err(CoreError::NothingFound);
        }
        Ok(InstanceInfo {
            instances,
            latest_timestamp: apps.latest_timestamp,
        })
    }

    /// Batch fetch. A failure on one appid is logged and that key omitted;
    /// the batch itself never fails.
    pub async fn fetchs(&self, arg: &ArgFetchs) -> HashMap<String, InstanceInfo> {
        let mut infos = HashMap::with_capacity(arg.appid.len());
        for appid in &arg.appid {
            match self.fetch(&arg.zone, &arg.env, appid, 0, arg.status).await {
                Ok(info) => {
                    infos.insert(appid.clone(), info);
                }
                Err(err) => {
                    warn!(appid = %appid, %err, "fetchs: skipping appid");
                }
            }
        }
        infos
    }

    /// Subscribe the caller to changes of its appids.
    ///
    /// Fast path: anything already newer than the caller's known versions
    /// is delivered through the returned handle immediately. Otherwise a
    /// waiter is registered per (env, appid) under the caller's hostname
    /// and the handle is signaled on the next change. The bool is true for
    /// a freshly allocated handle rather than one reused from the pool.
    pub async fn polls(&self, arg: &ArgPolls) -> Result<(Arc<NotifyHandle>, bool)> {
        if arg.appid.is_empty() {
            return Err(CoreError::InvalidParam("polls without appid".to_string()));
        }
        let mut changed = PollResult::new();
        for (i, appid) in arg.appid.iter().enumerate() {
            match self
                .fetch(&arg.zone, &arg.env, appid, arg.known_version(i), STATUS_UP)
                .await
            {
                Ok(info) => {
                    changed.insert(appid.clone(), info);
                }
                Err(CoreError::NotModified) => {}
                Err(err) => return Err(err),
            }
        }
        if !changed.is_empty() {
            let (handle, is_new) = self.pool.get().await;
            handle.notify(changed);
            return Ok((handle, is_new));
        }

        let mut conns = self.conns.lock().await;
        let mut handle: Option<Arc<NotifyHandle>> = None;
        let mut is_new = false;
        for appid in &arg.appid {
            let key = AppKey::new(&arg.env, appid);
            let waiters = conns.entry(key).or_default();
            if let Some(conn) = waiters.get_mut(&arg.hostname) {
                conn.count += 1;
                if handle.is_none() {
                    handle = Some(conn.handle.clone());
                }
            } else {
                let h = match &handle {
                    Some(h) => h.clone(),
                    None => {
                        let (h, fresh) = self.pool.get().await;
                        is_new = fresh;
                        handle = Some(h.clone());
                        h
                    }
                };
                debug!(appid = %appid, hostname = %arg.hostname, "polls: new waiter");
                waiters.insert(
                    arg.hostname.clone(),
                    Conn {
                        handle: h,
                        zone: arg.zone.clone(),
                        count: 1,
                    },
                );
            }
        }
        // appid is non-empty, so a handle was picked above
        match handle {
            Some(handle) => Ok((handle, is_new)),
            None => Err(CoreError::InvalidParam("polls without appid".to_string())),
        }
    }

    /// Unregister a waiting connection, e.g. on client disconnect or poll
    /// timeout. Safe no-op when no such waiter exists.
    pub async fn del_conns(&self, arg: &ArgPolls) {
        let mut conns = self.conns.lock().await;
        for appid in &arg.appid {
            let key = AppKey::new(&arg.env, appid);
            let Some(waiters) = conns.get_mut(&key) else {
                continue;
            };
            if let Some(conn) = waiters.get_mut(&arg.hostname) {
                if conn.count > 1 {
                    conn.count -= 1;
                } else {
                    debug!(appid = %appid, hostname = %arg.hostname, "del_conns: waiter removed");
                    waiters.remove(&arg.hostname);
                }
            }
            if waiters.is_empty() {
                conns.remove(&key);
            }
        }
    }

    /// Return a notify handle to the reuse pool. Callers must have
    /// unregistered their waiters via `del_conns` first; a pooled handle is
    /// never signaled again until reissued by a subsequent `polls`.
    pub async fn put_chan(&self, handle: Arc<NotifyHandle>) {
        self.pool.put(handle).await;
    }

    /// Wake every waiter of one appid with its current view. Waiters are
    /// signaled exactly once and dropped from the map; an appid that
    /// vanished entirely yields an empty snapshot so pollers observe the
    /// deletion.
    async fn broadcast(&self, env: &str, appid: &str) {
        let waiters = {
            let mut conns = self.conns.lock().await;
            match conns.remove(&AppKey::new(env, appid)) {
                Some(waiters) => waiters,
                None => return,
            }
        };
        for (hostname, conn) in waiters {
            let info = match self.fetch(&conn.zone, env, appid, 0, STATUS_UP).await {
                Ok(info) => info,
                Err(_) => InstanceInfo {
                    instances: BTreeMap::new(),
                    latest_timestamp: now_nanos(),
                },
            };
            let mut result = PollResult::new();
            result.insert(appid.to_string(), info);
            for _ in 0..conn.count {
                if !conn.handle.notify(result.clone()) {
                    warn!(appid = %appid, hostname = %hostname, "poll channel full, notification dropped");
                    break;
                }
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_api::{ArgRegister, STATUS_ALL, STATUS_WAITING};
    use std::time::Duration;

    fn reg_arg(appid: &str, hostname: &str) -> ArgRegister {
        ArgRegister {
            zone: "sh001".to_string(),
            env: "prod".to_string(),
            appid: appid.to_string(),
            hostname: hostname.to_string(),
            status: STATUS_UP,
            addrs: vec![format!("http://{}:8000", hostname)],
            ..Default::default()
        }
    }

    fn renew_arg(appid: &str, hostname: &str) -> ArgRenew {
        ArgRenew {
            zone: "sh001".to_string(),
            env: "prod".to_string(),
            appid: appid.to_string(),
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }

    fn cancel_arg(appid: &str, hostname: &str) -> ArgCancel {
        ArgCancel {
            zone: "sh001".to_string(),
            env: "prod".to_string(),
            appid: appid.to_string(),
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }

    fn polls_arg(appids: &[&str], versions: &[i64], hostname: &str) -> ArgPolls {
        ArgPolls {
            zone: "sh001".to_string(),
            env: "prod".to_string(),
            appid: appids.iter().map(|s| s.to_string()).collect(),
            latest_timestamp: versions.to_vec(),
            hostname: hostname.to_string(),
        }
    }

    async fn register(registry: &Registry, appid: &str, hostname: &str) -> Instance {
        let ins = Instance::from_register(&reg_arg(appid, hostname));
        registry.register(ins.clone(), ins.latest_timestamp).await;
        ins
    }

    #[tokio::test]
    async fn test_register_then_fetch() {
        let registry = Registry::new();
        register(&registry, "svc", "h1").await;

        let info = registry.fetch("sh001", "prod", "svc", 0, STATUS_UP).await.unwrap();
        let hosts = &info.instances["sh001"];
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].hostname, "h1");
    }

    #[tokio::test]
    async fn test_fetch_unknown_appid() {
        let registry = Registry::new();
        assert_eq!(
            registry.fetch("sh001", "prod", "missing", 0, STATUS_UP).await,
            Err(CoreError::NothingFound)
        );
    }

    #[tokio::test]
    async fn test_fetch_not_modified() {
        let registry = Registry::new();
        register(&registry, "svc", "h1").await;
        let info = registry.fetch("sh001", "prod", "svc", 0, STATUS_UP).await.unwrap();
        assert_eq!(
            registry
                .fetch("sh001", "prod", "svc", info.latest_timestamp, STATUS_UP)
                .await,
            Err(CoreError::NotModified)
        );
    }

    #[tokio::test]
    async fn test_fetch_empty_zone_matches_all_zones() {
        let registry = Registry::new();
        register(&registry, "svc", "h1").await;
        let mut other = Instance::from_register(&reg_arg("svc", "h2"));
        other.zone = "sh002".to_string();
        registry.register(other.clone(), other.latest_timestamp).await;

        let info = registry.fetch("", "prod", "svc", 0, STATUS_UP).await.unwrap();
        assert_eq!(info.instances.len(), 2);
        let info = registry.fetch("sh002", "prod", "svc", 0, STATUS_UP).await.unwrap();
        assert_eq!(info.instances.len(), 1);
        assert!(info.instances.contains_key("sh002"));
    }

    #[tokio::test]
    async fn test_fetch_status_filter() {
        let registry = Registry::new();
        let mut arg = reg_arg("svc", "h1");
        arg.status = STATUS_WAITING;
        let ins = Instance::from_register(&arg);
        registry.register(ins.clone(), ins.latest_timestamp).await;

        assert_eq!(
            registry.fetch("sh001", "prod", "svc", 0, STATUS_UP).await,
            Err(CoreError::NothingFound)
        );
        assert!(registry.fetch("sh001", "prod", "svc", 0, STATUS_ALL).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_replaces_and_resets_clocks() {
        let registry = Registry::new();
        let first = register(&registry, "svc", "h1").await;
        let second = Instance::from_register(&reg_arg("svc", "h1"));
        assert!(second.dirty_timestamp >= first.dirty_timestamp);
        registry.register(second.clone(), second.latest_timestamp).await;

        let info = registry.fetch("sh001", "prod", "svc", 0, STATUS_UP).await.unwrap();
        let hosts = &info.instances["sh001"];
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].dirty_timestamp, second.dirty_timestamp);
    }

    #[tokio::test]
    async fn test_renew_refreshes_clock_not_dirty() {
        let registry = Registry::new();
        let ins = register(&registry, "svc", "h1").await;

        let renewed = registry.renew(&renew_arg("svc", "h1")).await.unwrap();
        assert!(renewed.renew_timestamp >= ins.renew_timestamp);
        assert_eq!(renewed.dirty_timestamp, ins.dirty_timestamp);
    }

    #[tokio::test]
    async fn test_renew_unknown_is_nothing_found() {
        let registry = Registry::new();
        assert_eq!(
            registry.renew(&renew_arg("svc", "h1")).await,
            Err(CoreError::NothingFound)
        );
    }

    #[tokio::test]
    async fn test_replicated_renew_conflict_rule() {
        let registry = Registry::new();
        let ins = register(&registry, "svc", "h1").await;

        // Equal versions: normal renewal, dirty unchanged.
        let mut arg = renew_arg("svc", "h1");
        arg.replication = true;
        arg.dirty_timestamp = ins.dirty_timestamp;
        let renewed = registry.renew(&arg).await.unwrap();
        assert_eq!(renewed.dirty_timestamp, ins.dirty_timestamp);

        // Sender ahead: this node never saw that write.
        arg.dirty_timestamp = ins.dirty_timestamp + 1;
        assert_eq!(registry.renew(&arg).await, Err(CoreError::NothingFound));

        // Sender behind: local state is authoritative.
        arg.dirty_timestamp = ins.dirty_timestamp - 1;
        assert_eq!(registry.renew(&arg).await, Err(CoreError::Conflict));

        // Neither error path mutated the record.
        let info = registry.fetch("sh001", "prod", "svc", 0, STATUS_UP).await.unwrap();
        assert_eq!(info.instances["sh001"][0].dirty_timestamp, ins.dirty_timestamp);
    }

    #[tokio::test]
    async fn test_cancel_removes_instance() {
        let registry = Registry::new();
        register(&registry, "svc", "h1").await;

        let removed = registry.cancel(&cancel_arg("svc", "h1")).await.unwrap();
        assert_eq!(removed.hostname, "h1");
        assert_eq!(
            registry.fetch("sh001", "prod", "svc", 0, STATUS_UP).await,
            Err(CoreError::NothingFound)
        );
    }

    #[tokio::test]
    async fn test_cancel_unknown_is_nothing_found() {
        let registry = Registry::new();
        assert_eq!(
            registry.cancel(&cancel_arg("svc", "h1")).await,
            Err(CoreError::NothingFound)
        );
    }

    #[tokio::test]
    async fn test_cancel_keeps_other_instances() {
        let registry = Registry::new();
        register(&registry, "svc", "h1").await;
        register(&registry, "svc", "h2").await;

        registry.cancel(&cancel_arg("svc", "h1")).await.unwrap();
        let info = registry.fetch("sh001", "prod", "svc", 0, STATUS_UP).await.unwrap();
        assert_eq!(info.instances["sh001"].len(), 1);
        assert_eq!(info.instances["sh001"][0].hostname, "h2");
    }

    #[tokio::test]
    async fn test_fetch_all_merges_appids() {
        let registry = Registry::new();
        register(&registry, "svc.a", "h1").await;
        register(&registry, "svc.b", "h2").await;

        let all = registry.fetch_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all["svc.a"].len(), 1);
        assert_eq!(all["svc.b"].len(), 1);
    }

    #[tokio::test]
    async fn test_fetchs_omits_failing_appids() {
        let registry = Registry::new();
        register(&registry, "svc.a", "h1").await;

        let infos = registry
            .fetchs(&ArgFetchs {
                zone: "sh001".to_string(),
                env: "prod".to_string(),
                appid: vec!["svc.a".to_string(), "svc.missing".to_string()],
                status: STATUS_UP,
            })
            .await;
        assert_eq!(infos.len(), 1);
        assert!(infos.contains_key("svc.a"));
    }

    #[tokio::test]
    async fn test_polls_fast_path_on_changed_app() {
        let registry = Registry::new();
        register(&registry, "svc", "h1").await;

        let (handle, _) = registry.polls(&polls_arg(&["svc"], &[0], "client-1")).await.unwrap();
        let result = handle.wait().await.unwrap();
        assert_eq!(result["svc"].instances["sh001"].len(), 1);
        registry.put_chan(handle).await;
    }

    #[tokio::test]
    async fn test_polls_unknown_appid_fails() {
        let registry = Registry::new();
        assert_eq!(
            registry
                .polls(&polls_arg(&["svc.missing"], &[0], "client-1"))
                .await
                .err(),
            Some(CoreError::NothingFound)
        );
    }

    #[tokio::test]
    async fn test_polls_blocks_until_register_broadcast() {
        let registry = Arc::new(Registry::new());
        let ins = register(&registry, "svc", "h1").await;

        let arg = polls_arg(&["svc"], &[ins.latest_timestamp], "client-1");
        let (handle, is_new) = registry.polls(&arg).await.unwrap();
        assert!(is_new);

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        register(&registry, "svc", "h2").await;
        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result["svc"].instances["sh001"].len(), 2);

        registry.del_conns(&arg).await;
        registry.put_chan(handle).await;
    }

    #[tokio::test]
    async fn test_polls_waiter_woken_by_cancel_of_last_instance() {
        let registry = Registry::new();
        let ins = register(&registry, "svc", "h1").await;

        let arg = polls_arg(&["svc"], &[ins.latest_timestamp], "client-1");
        let (handle, _) = registry.polls(&arg).await.unwrap();

        registry.cancel(&cancel_arg("svc", "h1")).await.unwrap();
        let result = handle.wait().await.unwrap();
        assert!(result["svc"].instances.is_empty());
    }

    #[tokio::test]
    async fn test_polls_shared_handle_across_appids() {
        let registry = Registry::new();
        let a = register(&registry, "svc.a", "h1").await;
        let b = register(&registry, "svc.b", "h2").await;

        let arg = polls_arg(
            &["svc.a", "svc.b"],
            &[a.latest_timestamp, b.latest_timestamp],
            "client-1",
        );
        let (handle, _) = registry.polls(&arg).await.unwrap();

        register(&registry, "svc.b", "h3").await;
        let result = handle.wait().await.unwrap();
        assert!(result.contains_key("svc.b"));
        assert!(!result.contains_key("svc.a"));
    }

    #[tokio::test]
    async fn test_del_conns_without_waiter_is_noop() {
        let registry = Registry::new();
        registry.del_conns(&polls_arg(&["svc"], &[0], "ghost")).await;
    }

    #[tokio::test]
    async fn test_del_conns_drops_waiter() {
        let registry = Registry::new();
        let ins = register(&registry, "svc", "h1").await;

        let arg = polls_arg(&["svc"], &[ins.latest_timestamp], "client-1");
        let (handle, _) = registry.polls(&arg).await.unwrap();
        registry.del_conns(&arg).await;

        // The waiter is gone: a later register must not signal the handle.
        register(&registry, "svc", "h2").await;
        let woken = tokio::time::timeout(Duration::from_millis(50), handle.wait()).await;
        assert!(woken.is_err());
        registry.put_chan(handle).await;
    }

    #[tokio::test]
    async fn test_duplicate_polls_do_not_alias_pooled_handles() {
        let registry = Registry::new();
        let ins = register(&registry, "svc", "h1").await;

        // Two polls from the same hostname share one subscription and one
        // handle, and the transport returns that handle once per request.
        let arg = polls_arg(&["svc"], &[ins.latest_timestamp], "client-1");
        let (first, _) = registry.polls(&arg).await.unwrap();
        let (second, _) = registry.polls(&arg).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        registry.del_conns(&arg).await;
        registry.del_conns(&arg).await;
        registry.put_chan(first).await;
        registry.put_chan(second).await;

        // Later waiters must never be handed the same channel.
        let (x, _) = registry
            .polls(&polls_arg(&["svc"], &[ins.latest_timestamp], "client-x"))
            .await
            .unwrap();
        let (y, _) = registry
            .polls(&polls_arg(&["svc"], &[ins.latest_timestamp], "client-y"))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&x, &y));
    }

    #[tokio::test]
    async fn test_distinct_appids_do_not_contend() {
        let registry = Arc::new(Registry::new());
        let mut tasks = Vec::new();
        for n in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let appid = format!("svc.{n}");
                for i in 0..50 {
                    let hostname = format!("h{i}");
                    let ins = Instance::from_register(&reg_arg(&appid, &hostname));
                    registry.register(ins.clone(), ins.latest_timestamp).await;
                    registry.renew(&renew_arg(&appid, &hostname)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.fetch_all().await.len(), 8);
    }
}
