//! In-memory delivery provider with failure injection.
//!
//! [`StubProviderApi`] behaves like a real provider: names and event ids are
//! unique, so repeated creates and redelivered messages come back as
//! conflicts. Failures can be queued per operation and are consumed in
//! order before the normal behaviour resumes.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use hookrelay_dispatch::{
    provider::{ApplicationIn, ApplicationOut, EndpointIn, EndpointOut, EventTypeIn},
    ProviderApi, ProviderMessage, RelayError, Result,
};

/// Provider operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_applications`
    ListApplications,
    /// `create_application`
    CreateApplication,
    /// `create_event_type`
    CreateEventType,
    /// `list_endpoints`
    ListEndpoints,
    /// `create_endpoint`
    CreateEndpoint,
    /// `create_message`
    CreateMessage,
}

/// A call received by the stub.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    /// Applications were listed.
    ListApplications,
    /// An application was requested.
    CreateApplication {
        /// Requested name.
        name: String,
    },
    /// An event type was requested.
    CreateEventType {
        /// Requested name.
        name: String,
    },
    /// Endpoints of an application were listed.
    ListEndpoints {
        /// Application id.
        app_id: String,
    },
    /// An endpoint was requested.
    CreateEndpoint {
        /// Application id.
        app_id: String,
        /// Requested URL.
        url: String,
    },
    /// A message was sent.
    CreateMessage {
        /// Application id.
        app_id: String,
        /// Message body.
        message: ProviderMessage,
    },
}

impl ProviderCall {
    /// Operation this call belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            Self::ListApplications => Operation::ListApplications,
            Self::CreateApplication { .. } => Operation::CreateApplication,
            Self::CreateEventType { .. } => Operation::CreateEventType,
            Self::ListEndpoints { .. } => Operation::ListEndpoints,
            Self::CreateEndpoint { .. } => Operation::CreateEndpoint,
            Self::CreateMessage { .. } => Operation::CreateMessage,
        }
    }
}

#[derive(Debug, Default)]
struct StubState {
    applications: Vec<ApplicationOut>,
    event_types: HashSet<String>,
    endpoints: HashMap<String, Vec<EndpointOut>>,
    delivered: HashSet<(String, String)>,
    failures: HashMap<Operation, VecDeque<RelayError>>,
    racing_applications: VecDeque<ApplicationOut>,
    calls: Vec<ProviderCall>,
    next_id: u64,
}

impl StubState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    /// Records the call and pops an injected failure for it, if any.
    fn enter(&mut self, call: ProviderCall) -> Result<()> {
        let operation = call.operation();
        self.calls.push(call);
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// In-memory [`ProviderApi`] for tests.
#[derive(Debug, Default)]
pub struct StubProviderApi {
    state: Mutex<StubState>,
}

impl StubProviderApi {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an existing application.
    #[must_use]
    pub fn with_application(self, name: &str, id: &str) -> Self {
        self.state()
            .applications
            .push(ApplicationOut { id: id.to_string(), name: name.to_string() });
        self
    }

    /// Queues `error` as the next result of `operation`.
    pub fn fail_next(&self, operation: Operation, error: RelayError) {
        self.fail_times(operation, 1, error);
    }

    /// Queues `error` as the next `times` results of `operation`.
    pub fn fail_times(&self, operation: Operation, times: usize, error: RelayError) {
        let mut state = self.state();
        let queue = state.failures.entry(operation).or_default();
        queue.extend((0..times).map(|_| error.clone()));
    }

    /// Makes the next application create lose a race: a concurrent creator
    /// registers `name` as `id`, and the create answers with a conflict.
    pub fn race_next_application(&self, name: &str, id: &str) {
        let mut state = self.state();
        state
            .failures
            .entry(Operation::CreateApplication)
            .or_default()
            .push_back(RelayError::conflict(format!("application {name} exists")));
        state
            .racing_applications
            .push_back(ApplicationOut { id: id.to_string(), name: name.to_string() });
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    /// Number of calls received for `operation`.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.state().calls.iter().filter(|call| call.operation() == operation).count()
    }

    /// Every `create_message` call as `(app_id, message)`, including
    /// failed attempts.
    pub fn messages(&self) -> Vec<(String, ProviderMessage)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::CreateMessage { app_id, message } => {
                    Some((app_id.clone(), message.clone()))
                },
                _ => None,
            })
            .collect()
    }

    /// Applications currently known to the provider.
    pub fn applications(&self) -> Vec<ApplicationOut> {
        self.state().applications.clone()
    }

    /// Registered event type names, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().event_types.iter().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Endpoints registered on `app_id`.
    pub fn endpoints(&self, app_id: &str) -> Vec<EndpointOut> {
        self.state().endpoints.get(app_id).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ProviderApi for StubProviderApi {
    async fn list_applications(&self) -> Result<Vec<ApplicationOut>> {
        let mut state = self.state();
        state.enter(ProviderCall::ListApplications)?;
        Ok(state.applications.clone())
    }

    async fn create_application(&self, request: &ApplicationIn) -> Result<ApplicationOut> {
        let mut state = self.state();
        let call = ProviderCall::CreateApplication { name: request.name.clone() };
        if let Err(error) = state.enter(call) {
            if let Some(application) = state.racing_applications.pop_front() {
                state.applications.push(application);
            }
            return Err(error);
        }

        if state.applications.iter().any(|app| app.name == request.name) {
            return Err(RelayError::conflict(format!("application {} exists", request.name)));
        }

        let application = ApplicationOut { id: state.next_id("app"), name: request.name.clone() };
        state.applications.push(application.clone());
        Ok(application)
    }

    async fn create_event_type(&self, request: &EventTypeIn) -> Result<()> {
        let mut state = self.state();
        state.enter(ProviderCall::CreateEventType { name: request.name.clone() })?;

        if !state.event_types.insert(request.name.clone()) {
            return Err(RelayError::conflict(format!("event type {} exists", request.name)));
        }
        Ok(())
    }

    async fn list_endpoints(&self, app_id: &str) -> Result<Vec<EndpointOut>> {
        let mut state = self.state();
        state.enter(ProviderCall::ListEndpoints { app_id: app_id.to_string() })?;
        Ok(state.endpoints.get(app_id).cloned().unwrap_or_default())
    }

    async fn create_endpoint(&self, app_id: &str, request: &EndpointIn) -> Result<EndpointOut> {
        let mut state = self.state();
        state.enter(ProviderCall::CreateEndpoint {
            app_id: app_id.to_string(),
            url: request.url.clone(),
        })?;

        if !state.applications.iter().any(|app| app.id == app_id) {
            return Err(RelayError::not_found("not_found", format!("application {app_id}")));
        }

        let endpoint = EndpointOut { id: state.next_id("ep"), url: request.url.clone() };
        state.endpoints.entry(app_id.to_string()).or_default().push(endpoint.clone());
        Ok(endpoint)
    }

    async fn create_message(&self, app_id: &str, message: &ProviderMessage) -> Result<()> {
        let mut state = self.state();
        state.enter(ProviderCall::CreateMessage {
            app_id: app_id.to_string(),
            message: message.clone(),
        })?;

        if !state.delivered.insert((app_id.to_string(), message.event_id.clone())) {
            return Err(RelayError::conflict(format!(
                "message with eventId {} already exists",
                message.event_id
            )));
        }
        Ok(())
    }
}
