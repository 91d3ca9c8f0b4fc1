//! Log-event trigger capability service.
//!
//! Owns the trigger store and turns registration requests into running
//! triggers. Registration is idempotent per trigger id: a duplicate request
//! gets the response channel of the trigger already running.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{MultiContractConfig, ServiceConfig};
use crate::error::{RegistrationStage, TriggerError, TriggerResult};
use crate::normalize::normalize;
use crate::store::{CapabilityStore, InMemoryCapabilityStore};

use super::context::RegistrationContext;
use super::events::{TriggerRegistrationRequest, TriggerResponse};
use super::listener::{ListenerFactory, ListenerSpec};
use super::record::{LogEventTrigger, TriggerIdentity};

/// Name reported by [`TriggerService::name`] and health reports.
pub const SERVICE_NAME: &str = "LogEventTriggerCapabilityService";

const DESCRIPTION: &str =
    "A trigger that listens for specific contract log events and starts a workflow run.";

/// Store type used by the service.
pub type TriggerStore = dyn CapabilityStore<LogEventTrigger, TriggerResponse>;

/// Lifecycle of a [`TriggerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    /// Constructed; registrations are accepted.
    Unstarted,
    /// Running.
    Started,
    /// Closed; new registrations are refused.
    Stopped,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityType {
    Trigger,
    Action,
    Consensus,
    Target,
}

/// Public description of the capability.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub id: String,
    pub capability_type: CapabilityType,
    pub description: String,
}

/// Service that registers, runs and tears down log-event triggers.
pub struct TriggerService {
    info: CapabilityInfo,
    config: ServiceConfig,
    factory: Arc<dyn ListenerFactory>,
    triggers: Arc<TriggerStore>,
    state: RwLock<ServiceState>,
}

impl std::fmt::Debug for TriggerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerService")
            .field("info", &self.info)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("triggers", &self.triggers.len())
            .finish_non_exhaustive()
    }
}

impl TriggerService {
    /// Creates a service backed by an [`InMemoryCapabilityStore`].
    pub fn new(config: ServiceConfig, factory: Arc<dyn ListenerFactory>) -> TriggerResult<Self> {
        let triggers: Arc<TriggerStore> =
            Arc::new(InMemoryCapabilityStore::<LogEventTrigger, TriggerResponse>::new());
        Self::with_store(config, factory, triggers)
    }

    /// Creates a service over a caller-supplied store.
    pub fn with_store(
        config: ServiceConfig,
        factory: Arc<dyn ListenerFactory>,
        triggers: Arc<TriggerStore>,
    ) -> TriggerResult<Self> {
        config.validate()?;
        let info = CapabilityInfo {
            id: config.capability_id(),
            capability_type: CapabilityType::Trigger,
            description: DESCRIPTION.to_string(),
        };
        info!(capability_id = %info.id, "log event trigger service created");
        Ok(Self {
            info,
            config,
            factory,
            triggers,
            state: RwLock::new(ServiceState::Unstarted),
        })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    #[must_use]
    pub fn info(&self) -> &CapabilityInfo {
        &self.info
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered triggers.
    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// Looks up a registered trigger.
    #[must_use]
    pub fn trigger(&self, trigger_id: &str) -> Option<Arc<LogEventTrigger>> {
        self.triggers.read(trigger_id)
    }

    pub fn start(&self) -> TriggerResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match *state {
            ServiceState::Unstarted => {
                *state = ServiceState::Started;
                info!(capability_id = %self.info.id, "log event trigger service started");
                Ok(())
            }
            ServiceState::Started => Err(self.lifecycle("service has already been started")),
            ServiceState::Stopped => Err(self.lifecycle("service has already been stopped")),
        }
    }

    /// Stops the service and closes every registered trigger.
    ///
    /// Triggers that fail to close stay registered; their errors are
    /// aggregated into [`TriggerError::Shutdown`].
    pub fn close(&self) -> TriggerResult<()> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match *state {
                ServiceState::Started => *state = ServiceState::Stopped,
                ServiceState::Unstarted => {
                    return Err(self.lifecycle("cannot stop unstarted service"))
                }
                ServiceState::Stopped => return Err(self.lifecycle("service has already been stopped")),
            }
        }

        let messages: Vec<String> = self
            .triggers
            .read_all()
            .into_iter()
            .filter_map(|trigger| {
                trigger.close().err().map(|e| {
                    warn!(trigger_id = %trigger.trigger_id(), error = %e, "failed to close trigger");
                    format!("{}: {e}", trigger.trigger_id())
                })
            })
            .collect();

        info!(capability_id = %self.info.id, failures = messages.len(), "log event trigger service closed");
        if messages.is_empty() {
            Ok(())
        } else {
            Err(TriggerError::Shutdown {
                count: messages.len(),
                messages,
            })
        }
    }

    /// Health of the service keyed by name.
    #[must_use]
    pub fn health_report(&self) -> BTreeMap<String, Result<(), TriggerError>> {
        let health = match self.state() {
            ServiceState::Started => Ok(()),
            ServiceState::Unstarted => Err(self.lifecycle("service has not been started")),
            ServiceState::Stopped => Err(self.lifecycle("service has been stopped")),
        };
        BTreeMap::from([(SERVICE_NAME.to_string(), health)])
    }

    /// Registers a trigger and returns its response channel.
    ///
    /// Duplicate trigger ids return the existing channel without building a
    /// second listener. On failure nothing is registered and the request may
    /// be retried.
    pub fn register_trigger(
        &self,
        ctx: &RegistrationContext,
        req: &TriggerRegistrationRequest,
    ) -> TriggerResult<Receiver<TriggerResponse>> {
        let trigger_id = req.trigger_id.as_str();
        let raw = req.config.as_ref().ok_or_else(|| TriggerError::MissingConfig {
            trigger_id: trigger_id.to_string(),
        })?;

        let normalized = normalize(raw)
            .map_err(|e| TriggerError::from(e).at_stage(trigger_id, RegistrationStage::Normalize))?;
        if normalized.migrated {
            info!(
                trigger_id,
                workflow_id = %req.metadata.workflow_id,
                legacy_key = normalized.legacy_key.as_deref().unwrap_or("<root>"),
                "migrated legacy trigger config"
            );
        }
        normalized
            .config
            .validate()
            .map_err(|e| TriggerError::from(e).at_stage(trigger_id, RegistrationStage::Validate))?;

        // Held across the insert so close() cannot run between the check and
        // the commit.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if *state == ServiceState::Stopped {
            return Err(TriggerError::ServiceStopped {
                service: SERVICE_NAME.to_string(),
            });
        }

        let config = &normalized.config;
        let responses = self.triggers.insert_if_not_exists(
            trigger_id,
            Box::new(move || {
                self.build_trigger(ctx, req, config)
                    .map_err(|e| e.at_stage(trigger_id, RegistrationStage::Construct))
            }),
        )?;
        drop(state);

        info!(
            trigger_id,
            workflow_id = %req.metadata.workflow_id,
            contracts = ?normalized.config.contract_names(),
            "registered log event trigger"
        );
        Ok(responses)
    }

    /// Closes and removes a trigger.
    ///
    /// If the trigger fails to close it stays registered and running.
    pub fn unregister_trigger(&self, req: &TriggerRegistrationRequest) -> TriggerResult<()> {
        let trigger_id = req.trigger_id.as_str();
        let trigger = self
            .triggers
            .read(trigger_id)
            .ok_or_else(|| TriggerError::TriggerNotFound {
                trigger_id: trigger_id.to_string(),
            })?;

        trigger.close().map_err(|e| TriggerError::Unregistration {
            trigger_id: trigger_id.to_string(),
            chain_id: self.config.chain_id.clone(),
            source: Box::new(e),
        })?;
        self.triggers.delete(trigger_id);

        info!(
            trigger_id,
            workflow_id = %req.metadata.workflow_id,
            forwarded = trigger.forwarded(),
            "unregistered log event trigger"
        );
        Ok(())
    }

    fn build_trigger(
        &self,
        ctx: &RegistrationContext,
        req: &TriggerRegistrationRequest,
        config: &MultiContractConfig,
    ) -> TriggerResult<(Arc<LogEventTrigger>, Receiver<TriggerResponse>)> {
        ctx.check()?;
        let spec = ListenerSpec {
            trigger_id: &req.trigger_id,
            workflow_id: &req.metadata.workflow_id,
            config,
            service: &self.config,
        };
        let (listener, events) = self.factory.new_listener(&spec)?;
        debug!(trigger_id = %req.trigger_id, listener = listener.name(), "starting listener");

        if let Err(e) = listener.start(ctx).and_then(|()| ctx.check()) {
            if let Err(close_err) = listener.close() {
                warn!(trigger_id = %req.trigger_id, error = %close_err, "failed to close listener after failed start");
            }
            return Err(e);
        }

        let identity = TriggerIdentity {
            trigger_id: req.trigger_id.clone(),
            workflow_id: req.metadata.workflow_id.clone(),
            trigger_type: self.info.id.clone(),
        };
        LogEventTrigger::spawn(identity, listener, events, self.config.response_buffer_size)
    }

    fn lifecycle(&self, reason: &str) -> TriggerError {
        TriggerError::Lifecycle {
            service: SERVICE_NAME.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crossbeam_channel::{bounded, Sender};
    use tracing_test::traced_test;

    use crate::error::ListenerError;
    use crate::trigger::events::LogEvent;
    use crate::trigger::listener::EventListener;
    use crate::value::{Value, ValueMap};

    #[derive(Default)]
    struct Harness {
        built: AtomicUsize,
        closed: AtomicUsize,
        fail_start: AtomicBool,
        fail_close: AtomicBool,
        cancel_on_start: Mutex<Option<RegistrationContext>>,
        senders: Mutex<Vec<Sender<LogEvent>>>,
    }

    struct FakeListener(Arc<Harness>);

    impl EventListener for FakeListener {
        fn name(&self) -> &str {
            "fake"
        }

        fn start(&self, _ctx: &RegistrationContext) -> TriggerResult<()> {
            if let Some(ctx) = self.0.cancel_on_start.lock().unwrap().as_ref() {
                ctx.cancel();
            }
            if self.0.fail_start.load(Ordering::SeqCst) {
                return Err(ListenerError::StartFailed {
                    listener: "fake".to_string(),
                    message: "connection refused".to_string(),
                }
                .into());
            }
            Ok(())
        }

        fn close(&self) -> TriggerResult<()> {
            if self.0.fail_close.load(Ordering::SeqCst) {
                return Err(ListenerError::CloseFailed {
                    listener: "fake".to_string(),
                    message: "rpc timeout".to_string(),
                }
                .into());
            }
            self.0.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeFactory(Arc<Harness>);

    impl ListenerFactory for FakeFactory {
        fn new_listener(
            &self,
            _spec: &ListenerSpec<'_>,
        ) -> TriggerResult<(Box<dyn EventListener>, Receiver<LogEvent>)> {
            self.0.built.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = bounded(8);
            self.0.senders.lock().unwrap().push(tx);
            Ok((Box::new(FakeListener(Arc::clone(&self.0))), rx))
        }
    }

    fn service() -> (TriggerService, Arc<Harness>) {
        let harness = Arc::new(Harness::default());
        let svc = TriggerService::new(
            ServiceConfig::new("evm", "11155111"),
            Arc::new(FakeFactory(Arc::clone(&harness))),
        )
        .unwrap();
        (svc, harness)
    }

    fn config() -> ValueMap {
        Value::from(serde_json::json!({
            "contracts": [{
                "contractName": "Foo",
                "contractAddress": "0xabc",
                "contractEventNames": ["Transfer"],
                "contractReaderConfig": {}
            }]
        }))
        .into_map()
        .unwrap()
    }

    fn request(id: &str) -> TriggerRegistrationRequest {
        TriggerRegistrationRequest::new(id, "wf1").with_config(config())
    }

    #[test]
    fn test_info() {
        let (svc, _) = service();
        assert_eq!(svc.name(), SERVICE_NAME);
        assert_eq!(svc.info().id, "log-event-trigger-evm-11155111@1.0.0");
        assert_eq!(svc.info().capability_type, CapabilityType::Trigger);
        assert!(svc.info().description.contains("contract log events"));
    }

    #[test]
    fn test_invalid_service_config_rejected() {
        let harness = Arc::new(Harness::default());
        let err = TriggerService::new(ServiceConfig::default(), Arc::new(FakeFactory(harness)))
            .unwrap_err();
        assert!(err.is_config_defect());
    }

    #[test]
    #[traced_test]
    fn test_register_is_idempotent() {
        let (svc, harness) = service();
        let ctx = RegistrationContext::new();
        let first = svc.register_trigger(&ctx, &request("t1")).unwrap();
        let second = svc.register_trigger(&ctx, &request("t1")).unwrap();
        assert!(first.same_channel(&second));
        assert_eq!(harness.built.load(Ordering::SeqCst), 1);
        assert_eq!(svc.trigger_count(), 1);
        assert!(logs_contain("registered log event trigger"));
    }

    #[test]
    fn test_missing_config() {
        let (svc, harness) = service();
        let err = svc
            .register_trigger(&RegistrationContext::new(), &TriggerRegistrationRequest::new("t1", "wf1"))
            .unwrap_err();
        assert!(matches!(err, TriggerError::MissingConfig { .. }));
        assert_eq!(harness.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bad_config_wrapped_with_stage() {
        let (svc, harness) = service();
        let req = TriggerRegistrationRequest::new("t1", "wf1").with_config(ValueMap::new());
        let err = svc.register_trigger(&RegistrationContext::new(), &req).unwrap_err();
        assert!(matches!(
            err,
            TriggerError::Registration {
                stage: RegistrationStage::Normalize,
                ..
            }
        ));
        assert!(err.to_string().contains("t1"));
        assert!(err.as_config().is_some());
        assert_eq!(harness.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_start_leaves_key_absent() {
        let (svc, harness) = service();
        harness.fail_start.store(true, Ordering::SeqCst);
        let err = svc
            .register_trigger(&RegistrationContext::new(), &request("t1"))
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(svc.trigger_count(), 0);
        assert_eq!(harness.closed.load(Ordering::SeqCst), 1);

        harness.fail_start.store(false, Ordering::SeqCst);
        svc.register_trigger(&RegistrationContext::new(), &request("t1"))
            .unwrap();
        assert_eq!(svc.trigger_count(), 1);
    }

    #[test]
    fn test_cancel_during_start_commits_nothing() {
        let (svc, harness) = service();
        let ctx = RegistrationContext::new();
        *harness.cancel_on_start.lock().unwrap() = Some(ctx.clone());
        let err = svc.register_trigger(&ctx, &request("t1")).unwrap_err();
        assert!(matches!(err.innermost(), TriggerError::Cancelled { .. }));
        assert_eq!(svc.trigger_count(), 0);
        assert_eq!(harness.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister() {
        let (svc, harness) = service();
        let responses = svc
            .register_trigger(&RegistrationContext::new(), &request("t1"))
            .unwrap();
        svc.unregister_trigger(&request("t1")).unwrap();
        assert_eq!(svc.trigger_count(), 0);
        assert_eq!(harness.closed.load(Ordering::SeqCst), 1);
        assert!(responses.recv().is_err());

        let err = svc.unregister_trigger(&request("t1")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unregister_close_failure_keeps_trigger() {
        let (svc, harness) = service();
        svc.register_trigger(&RegistrationContext::new(), &request("t1"))
            .unwrap();
        harness.fail_close.store(true, Ordering::SeqCst);
        let err = svc.unregister_trigger(&request("t1")).unwrap_err();
        assert!(err.to_string().contains("chainID 11155111"));
        assert_eq!(svc.trigger_count(), 1);
        assert!(!svc.trigger("t1").unwrap().is_closed());
        harness.fail_close.store(false, Ordering::SeqCst);
    }

    #[test]
    fn test_lifecycle() {
        let (svc, _) = service();
        assert_eq!(svc.state(), ServiceState::Unstarted);
        assert!(svc.health_report()[SERVICE_NAME].is_err());
        assert!(svc.close().is_err());

        svc.start().unwrap();
        assert!(svc.start().is_err());
        assert!(svc.health_report()[SERVICE_NAME].is_ok());

        svc.close().unwrap();
        assert_eq!(svc.state(), ServiceState::Stopped);
        assert!(svc.close().is_err());
        assert!(svc.start().is_err());
    }

    #[test]
    fn test_register_after_close_refused() {
        let (svc, harness) = service();
        svc.start().unwrap();
        svc.register_trigger(&RegistrationContext::new(), &request("t1"))
            .unwrap();
        svc.close().unwrap();
        assert!(svc.trigger("t1").unwrap().is_closed());

        let err = svc
            .register_trigger(&RegistrationContext::new(), &request("t2"))
            .unwrap_err();
        assert!(matches!(err, TriggerError::ServiceStopped { .. }));
        assert_eq!(harness.built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_aggregates_failures() {
        let (svc, harness) = service();
        svc.start().unwrap();
        let ctx = RegistrationContext::new();
        svc.register_trigger(&ctx, &request("t1")).unwrap();
        svc.register_trigger(&ctx, &request("t2")).unwrap();
        harness.fail_close.store(true, Ordering::SeqCst);

        match svc.close().unwrap_err() {
            TriggerError::Shutdown { count, .. } => assert_eq!(count, 2),
            other => panic!("unexpected error: {other}"),
        }
        harness.fail_close.store(false, Ordering::SeqCst);
    }

    #[test]
    fn test_events_forwarded_to_response_channel() {
        let (svc, harness) = service();
        let responses = svc
            .register_trigger(&RegistrationContext::new(), &request("t1"))
            .unwrap();
        let tx = harness.senders.lock().unwrap()[0].clone();
        tx.send(LogEvent {
            contract_name: "Foo".to_string(),
            contract_address: "0xabc".to_string(),
            event_name: "Transfer".to_string(),
            block_number: 7,
            tx_hash: "0xbeef".to_string(),
            log_index: 0,
            data: Value::Null,
        })
        .unwrap();
        let resp = responses
            .recv_timeout(std::time::Duration::from_secs(1))
            .unwrap();
        assert_eq!(resp.event.id, "0xbeef-0");
        assert_eq!(resp.event.trigger_type, svc.info().id);
    }
}
