//! Swarm: the lifecycle container for a set of agents.
//!
//! A swarm owns the shared services every chat uses (event stream,
//! scratchpad, read trackers, the global tool-concurrency semaphore, plugins,
//! and the provider factory), builds agent conversations lazily, and tracks
//! per-caller delegation instances separately from top-level agents.

mod executor;
mod orchestrator;
pub mod scope;

pub use executor::{ExecutionMetadata, ExecutionResult};
pub use orchestrator::{NodeContext, NodeOrchestrator, NodeResult};
pub use scope::ExecutionScope;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::agent::{AskResult, Chat};
use crate::definition::{AgentDefinition, SwarmSpec};
use crate::error::{Error, Result};
use crate::events::{LogStream, SwarmEvent};
use crate::model::ModelCatalog;
use crate::plugin::{Plugin, PluginSet};
use crate::provider::{EnvProviderFactory, ProviderFactory, RetryPolicy};
use crate::scratchpad::ScratchpadStorage;
use crate::tracker::ReadTracker;

/// Shared handles every chat in a swarm uses.
#[derive(Clone)]
pub struct SwarmServices {
    /// Swarm name, for events and hook payloads.
    pub swarm_name: String,
    /// Event stream.
    pub log: LogStream,
    /// Shared scratchpad.
    pub scratchpad: ScratchpadStorage,
    /// File read tracker.
    pub files: ReadTracker,
    /// Memory-entry read tracker.
    pub memory: ReadTracker,
    /// Process-wide bound on concurrent tool executions.
    pub semaphore: Arc<Semaphore>,
    /// Model catalog.
    pub catalog: Arc<ModelCatalog>,
    /// Provider retry policy.
    pub retry: RetryPolicy,
    /// Default per-agent tool concurrency.
    pub default_local_concurrency: usize,
    /// Registered plugins.
    pub plugins: PluginSet,
    /// Provider construction.
    pub providers: Arc<dyn ProviderFactory>,
}

impl std::fmt::Debug for SwarmServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmServices")
            .field("swarm_name", &self.swarm_name)
            .finish_non_exhaustive()
    }
}

type SharedChat = Arc<Mutex<Chat>>;

/// Shared swarm state reachable from every chat.
pub struct SwarmCore {
    pub(crate) spec: SwarmSpec,
    pub(crate) services: SwarmServices,
    pub(crate) first_message_sent: AtomicBool,
    chats: Mutex<Vec<(String, SharedChat)>>,
    delegation_instances: Mutex<Vec<(String, SharedChat)>>,
}

impl std::fmt::Debug for SwarmCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmCore")
            .field("swarm", &self.spec.name)
            .finish_non_exhaustive()
    }
}

impl SwarmCore {
    fn definition(&self, name: &str) -> Result<&AgentDefinition> {
        self.spec
            .agent_named(name)
            .ok_or_else(|| Error::AgentNotFound { agent: name.into() })
    }

    /// Fetch or lazily construct the singleton chat for `name`.
    pub(crate) async fn chat(self: &Arc<Self>, name: &str) -> Result<SharedChat> {
        {
            let chats = self.chats.lock().await;
            if let Some((_, chat)) = chats.iter().find(|(existing, _)| existing == name) {
                return Ok(Arc::clone(chat));
            }
        }
        let definition = self.definition(name)?.clone();
        let chat = Chat::build(
            &definition,
            name,
            self.services.clone(),
            Arc::downgrade(self),
        )?;
        let shared: SharedChat = Arc::new(Mutex::new(chat));
        {
            let mut chats = self.chats.lock().await;
            // A concurrent builder may have won the race.
            if let Some((_, chat)) = chats.iter().find(|(existing, _)| existing == name) {
                return Ok(Arc::clone(chat));
            }
            chats.push((name.to_string(), Arc::clone(&shared)));
        }
        self.services.plugins.on_agent_initialized(name).await;
        self.services.log.emit(
            Some(name),
            SwarmEvent::AgentStart {
                model: definition.model.clone(),
            },
        );
        Ok(shared)
    }

    /// Fetch or lazily construct the per-caller instance `"<target>@<caller>"`.
    pub(crate) async fn delegation_instance(
        self: &Arc<Self>,
        target: &str,
        caller: &str,
    ) -> Result<SharedChat> {
        let key = format!("{target}@{caller}");
        {
            let instances = self.delegation_instances.lock().await;
            if let Some((_, chat)) = instances.iter().find(|(existing, _)| existing == &key) {
                return Ok(Arc::clone(chat));
            }
        }
        let definition = self.definition(target)?.clone();
        let chat = Chat::build(&definition, &key, self.services.clone(), Arc::downgrade(self))?;
        let shared: SharedChat = Arc::new(Mutex::new(chat));
        {
            let mut instances = self.delegation_instances.lock().await;
            if let Some((_, chat)) = instances.iter().find(|(existing, _)| existing == &key) {
                return Ok(Arc::clone(chat));
            }
            instances.push((key.clone(), Arc::clone(&shared)));
        }
        self.services.plugins.on_agent_initialized(target).await;
        self.services.log.emit(
            Some(&key),
            SwarmEvent::AgentStart {
                model: definition.model.clone(),
            },
        );
        Ok(shared)
    }

    /// Run a prompt through a chat from a delegation site.
    ///
    /// Boxed so the `ask → delegate → ask` recursion has a finite type.
    pub(crate) fn run_delegated(
        chat: SharedChat,
        prompt: String,
    ) -> futures::future::BoxFuture<'static, Result<AskResult>> {
        Box::pin(async move {
            let mut guard = chat.lock().await;
            guard.ask_with_signal(&prompt).await
        })
    }

    /// Snapshot access: the live chats in insertion order.
    pub(crate) async fn chats_snapshot(&self) -> Vec<(String, SharedChat)> {
        self.chats.lock().await.clone()
    }

    /// Snapshot access: the live delegation instances.
    pub(crate) async fn delegation_snapshot(&self) -> Vec<(String, SharedChat)> {
        self.delegation_instances.lock().await.clone()
    }

    pub(crate) async fn clear_instances(&self) {
        self.chats.lock().await.clear();
        self.delegation_instances.lock().await.clear();
    }
}

/// A validated, runnable swarm.
#[derive(Debug)]
pub struct Swarm {
    pub(crate) core: Arc<SwarmCore>,
    pub(crate) swarm_id: String,
    pub(crate) execution_timeout: Option<Duration>,
}

impl Swarm {
    /// Start building a swarm from a spec.
    #[must_use]
    pub fn builder(spec: SwarmSpec) -> SwarmBuilder {
        SwarmBuilder::new(spec)
    }

    /// The swarm id assigned at construction.
    #[must_use]
    pub fn swarm_id(&self) -> &str {
        &self.swarm_id
    }

    /// Swarm name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.spec.name
    }

    /// The event stream.
    #[must_use]
    pub fn log(&self) -> &LogStream {
        &self.core.services.log
    }

    /// The shared scratchpad.
    #[must_use]
    pub fn scratchpad(&self) -> &ScratchpadStorage {
        &self.core.services.scratchpad
    }

    /// Resolved lead agent name.
    #[must_use]
    pub fn lead_name(&self) -> &str {
        self.core.spec.lead_name().unwrap_or_default()
    }

    /// The lead agent's chat, built on first use.
    pub async fn lead_chat(&self) -> Result<Arc<Mutex<Chat>>> {
        let lead = self
            .core
            .spec
            .lead_name()
            .ok_or_else(|| Error::Configuration(crate::error::ConfigError::invalid(
                "swarm has no agents",
            )))?
            .to_string();
        self.core.chat(&lead).await
    }

    /// A named agent's chat, built on first use.
    pub async fn chat(&self, name: &str) -> Result<Arc<Mutex<Chat>>> {
        self.core.chat(name).await
    }

    /// Destroy agent instances, delegation instances, and volatile state.
    pub async fn cleanup(&self) {
        self.core.clear_instances().await;
        self.core.services.scratchpad.clear();
        self.core.services.files.clear();
        self.core.services.memory.clear();
    }
}

/// Builder wiring services into a [`Swarm`].
pub struct SwarmBuilder {
    spec: SwarmSpec,
    catalog: ModelCatalog,
    providers: Arc<dyn ProviderFactory>,
    plugins: PluginSet,
    log: LogStream,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SwarmBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmBuilder")
            .field("swarm", &self.spec.name)
            .finish_non_exhaustive()
    }
}

impl SwarmBuilder {
    /// Builder with default services.
    #[must_use]
    pub fn new(spec: SwarmSpec) -> Self {
        Self {
            spec,
            catalog: ModelCatalog::builtin(),
            providers: Arc::new(EnvProviderFactory),
            plugins: PluginSet::new(),
            log: LogStream::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the model catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the provider factory.
    #[must_use]
    pub fn provider_factory(mut self, providers: Arc<dyn ProviderFactory>) -> Self {
        self.providers = providers;
        self
    }

    /// Register a plugin.
    #[must_use]
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.add(plugin);
        self
    }

    /// Share an existing event stream.
    #[must_use]
    pub fn log(mut self, log: LogStream) -> Self {
        self.log = log;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the spec and construct the swarm.
    ///
    /// Configuration problems (duplicate names, unknown delegates, unknown
    /// models, delegation cycles) fail here; no swarm instance is created.
    pub fn build(self) -> Result<Swarm> {
        self.spec.validate(&self.catalog)?;

        let execution_timeout = self.spec.execution_timeout;
        let services = SwarmServices {
            swarm_name: self.spec.name.clone(),
            log: self.log,
            scratchpad: ScratchpadStorage::new(),
            files: ReadTracker::new(),
            memory: ReadTracker::new(),
            semaphore: Arc::new(Semaphore::new(self.spec.global_concurrency.max(1))),
            catalog: Arc::new(self.catalog),
            retry: self.retry,
            default_local_concurrency: self.spec.default_local_concurrency.max(1),
            plugins: self.plugins,
            providers: self.providers,
        };
        let core = SwarmCore {
            spec: self.spec,
            services,
            first_message_sent: AtomicBool::new(false),
            chats: Mutex::new(Vec::new()),
            delegation_instances: Mutex::new(Vec::new()),
        };
        Ok(Swarm {
            core: Arc::new(core),
            swarm_id: Uuid::new_v4().to_string(),
            execution_timeout,
        })
    }
}
