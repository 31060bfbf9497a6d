//! In-memory stand-ins for the Docker daemon and the node APIs

use crate::container::daemon::{ContainerState, ContainerSummary, DockerDaemon, LogStream};
use crate::container::spec::ContainerSpec;
use crate::error::{FactoryError, Result};
use crate::readiness::api::{DebugInfo, NodeApi, PeerTable, EXPECTED_CHAIN_ID};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
}

#[derive(Default)]
struct FakeState {
    networks: Vec<String>,
    containers: Vec<FakeContainer>,
    local_images: HashMap<String, HashMap<String, String>>,
    remote_images: HashMap<String, HashMap<String, String>>,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    logs: Vec<String>,
    endless_logs: bool,
    calls: Vec<String>,
    next_id: u64,
}

/// Docker daemon kept in memory.
///
/// Only mutations are recorded in `calls`, as `create <name>`,
/// `start <name>`, `stop <name>`, `remove <name>`, `pull <image>` and
/// `network <name>`.
#[derive(Default)]
pub(crate) struct FakeDaemon {
    state: Mutex<FakeState>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image already present locally
    pub fn with_local_image(self, image: &str, labels: HashMap<String, String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .local_images
            .insert(image.to_string(), labels);
        self
    }

    /// Image that can be pulled
    pub fn with_remote_image(self, image: &str, labels: HashMap<String, String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .remote_images
            .insert(image.to_string(), labels);
        self
    }

    /// Output every container produces
    pub fn with_logs(self, chunks: &[&str]) -> Self {
        self.state.lock().unwrap().logs = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Followed logs never end after the configured output
    pub fn with_endless_logs(self) -> Self {
        self.state.lock().unwrap().endless_logs = true;
        self
    }

    /// Add a container as if another process had created it
    pub fn insert_container(&self, name: &str, image: &str, running: bool) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            image: image.to_string(),
            running,
        });
        id
    }

    pub fn set_running(&self, name: &str, running: bool) {
        let mut state = self.state.lock().unwrap();
        for container in state.containers.iter_mut().filter(|c| c.name == name) {
            container.running = running;
        }
    }

    /// Creating a container with this name fails with a server error
    pub fn fail_create_for(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    /// Starting a container with this name fails with a server error
    pub fn fail_start_for(&self, name: &str) {
        self.state.lock().unwrap().fail_start.insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn networks(&self) -> Vec<String> {
        self.state.lock().unwrap().networks.clone()
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn container_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.name == name)
            .count()
    }
}

fn no_such_container(id: &str) -> FactoryError {
    FactoryError::daemon(404, format!("No such container: {}", id))
}

#[async_trait]
impl DockerDaemon for FakeDaemon {
    async fn list_networks(&self, name: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .iter()
            .filter(|n| n.contains(name))
            .cloned()
            .collect())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.networks.iter().any(|n| n == name) {
            return Err(FactoryError::daemon(409, format!("network {} already exists", name)));
        }
        state.networks.push(name.to_string());
        state.calls.push(format!("network {}", name));
        Ok(())
    }

    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| name.map_or(true, |n| c.name.contains(n)))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: c.image.clone(),
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {}", spec.name));

        if state.fail_create.contains(&spec.name) {
            return Err(FactoryError::daemon(500, "injected create failure"));
        }
        if !state.local_images.contains_key(&spec.image) {
            return Err(FactoryError::daemon(404, format!("No such image: {}", spec.image)));
        }
        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(FactoryError::daemon(409, format!("Conflict. The container name \"/{}\" is already in use", spec.name)));
        }

        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            running: false,
        });
        Ok(id)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerState> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| ContainerState { running: c.running })
            .ok_or_else(|| no_such_container(id))
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let fail_start = state.fail_start.clone();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such_container(id))?;

        if fail_start.contains(&container.name) {
            return Err(FactoryError::daemon(500, "injected start failure"));
        }

        container.running = true;
        let name = container.name.clone();
        state.calls.push(format!("start {}", name));
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such_container(id))?;

        if !container.running {
            return Err(FactoryError::daemon(304, "container already stopped"));
        }

        container.running = false;
        let name = container.name.clone();
        state.calls.push(format!("stop {}", name));
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| no_such_container(id))?;

        if state.containers[index].running && !force {
            return Err(FactoryError::daemon(409, "cannot remove a running container"));
        }

        let removed = state.containers.remove(index);
        state.calls.push(format!("remove {}", removed.name));
        Ok(())
    }

    async fn image_labels(&self, image: &str) -> Result<HashMap<String, String>> {
        let state = self.state.lock().unwrap();
        state
            .local_images
            .get(image)
            .cloned()
            .ok_or_else(|| FactoryError::daemon(404, format!("No such image: {}", image)))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let labels = state
            .remote_images
            .get(image)
            .cloned()
            .ok_or_else(|| FactoryError::daemon(404, format!("manifest for {} not found", image)))?;

        state.local_images.insert(image.to_string(), labels);
        state.calls.push(format!("pull {}", image));
        Ok(())
    }

    async fn logs(&self, id: &str, follow: bool, _tail: Option<usize>) -> Result<LogStream> {
        let state = self.state.lock().unwrap();
        if !state.containers.iter().any(|c| c.id == id) {
            return Err(no_such_container(id));
        }

        let chunks: Vec<Result<Bytes>> = state
            .logs
            .iter()
            .map(|chunk| Ok(Bytes::from(chunk.clone())))
            .collect();
        let stream = futures_util::stream::iter(chunks);

        if follow && state.endless_logs {
            return Ok(Box::pin(stream.chain(futures_util::stream::pending())));
        }
        Ok(Box::pin(stream))
    }
}

/// Debug info announcing `addrs` with `peers` entries in the discovery table
pub(crate) fn debug_info(addrs: &[&str], peers: usize) -> DebugInfo {
    DebugInfo {
        addrs: addrs.iter().map(|a| a.to_string()).collect(),
        table: PeerTable {
            nodes: (0..peers)
                .map(|n| serde_json::json!({ "peerId": format!("peer-{}", n) }))
                .collect(),
        },
    }
}

/// Node APIs answering from a script.
///
/// Queued answers are served first; once a queue is empty the steady answer
/// is repeated.
pub(crate) struct FakeNodeApi {
    chain_ids: Mutex<VecDeque<Result<Option<String>>>>,
    steady_chain_id: Mutex<Option<String>>,
    debug_infos: Mutex<VecDeque<Result<DebugInfo>>>,
    steady_debug_info: Mutex<DebugInfo>,
    chain_calls: AtomicU32,
    debug_calls: AtomicU32,
}

impl FakeNodeApi {
    /// Nodes that never become ready
    pub fn new() -> Self {
        Self {
            chain_ids: Mutex::new(VecDeque::new()),
            steady_chain_id: Mutex::new(None),
            debug_infos: Mutex::new(VecDeque::new()),
            steady_debug_info: Mutex::new(DebugInfo::default()),
            chain_calls: AtomicU32::new(0),
            debug_calls: AtomicU32::new(0),
        }
    }

    /// Nodes that are ready right away
    pub fn ready(addrs: &[&str], peers: usize) -> Self {
        let api = Self::new();
        api.set_chain_id(Some(EXPECTED_CHAIN_ID));
        api.set_debug_info(debug_info(addrs, peers));
        api
    }

    pub fn set_chain_id(&self, chain_id: Option<&str>) {
        *self.steady_chain_id.lock().unwrap() = chain_id.map(str::to_string);
    }

    pub fn set_debug_info(&self, info: DebugInfo) {
        *self.steady_debug_info.lock().unwrap() = info;
    }

    pub fn push_chain_id(&self, answer: Result<Option<String>>) {
        self.chain_ids.lock().unwrap().push_back(answer);
    }

    pub fn push_debug_info(&self, answer: Result<DebugInfo>) {
        self.debug_infos.lock().unwrap().push_back(answer);
    }

    pub fn chain_calls(&self) -> u32 {
        self.chain_calls.load(Ordering::SeqCst)
    }

    pub fn debug_calls(&self) -> u32 {
        self.debug_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeApi for FakeNodeApi {
    async fn chain_id(&self) -> Result<Option<String>> {
        self.chain_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(answer) = self.chain_ids.lock().unwrap().pop_front() {
            return answer;
        }
        Ok(self.steady_chain_id.lock().unwrap().clone())
    }

    async fn debug_info(&self) -> Result<DebugInfo> {
        self.debug_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(answer) = self.debug_infos.lock().unwrap().pop_front() {
            return answer;
        }
        Ok(self.steady_debug_info.lock().unwrap().clone())
    }
}
