//! The governance facade.
//!
//! The agent host drives two entry points per tool call: `pre_call`
//! renders a policy verdict before the tool runs, and `post_call`
//! appends the signed audit record afterwards (or records the block).
//! Within one session the host guarantees pre, then post, then the
//! next pre; the hash chain depends on that ordering.
//!
//! Policy evaluation never raises. Audit recording does: a post-call
//! that cannot persist its record fails loudly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, info, warn};
use warden_audit::{AuditChain, EventStream, R6Builder, R6Input, SessionStore, WitnessLedger};
use warden_policy::{Classification, Classifier, PolicyEngine, RateLimiter};
use warden_types::error::{WardenError, WardenResult};
use warden_types::event::{EventType, GovernanceEvent, Severity};
use warden_types::hash::short_hash;
use warden_types::policy::{PolicyDecision, PolicyEvaluation};
use warden_types::r6::R6Request;
use warden_types::record::{AuditRecord, CallResult, CallStatus, FilterCriteria, VerifyReport};
use warden_types::session::SessionState;

use crate::config::{default_root, StorageLayout, WardenConfig};

/// The verdict returned to the agent host before a tool call runs.
///
/// `decision` is the effective gate decision: a deny under a dry-run
/// configuration surfaces here as `allow` with `enforced = false`,
/// while the would-be denial is preserved in the audit record's
/// constraints.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub decision: PolicyDecision,
    pub enforced: bool,
    pub reason: String,
    pub rule_id: Option<String>,
}

impl Verdict {
    /// Whether the host must block this call.
    pub fn is_blocking(&self) -> bool {
        self.decision == PolicyDecision::Deny && self.enforced
    }
}

/// What the host reports about a completed tool call.
#[derive(Debug, Clone, Default)]
pub struct CallOutcome {
    /// False when the tool ran and failed.
    pub success: bool,
    /// Raw tool output; only its hash is persisted.
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
}

impl CallOutcome {
    /// A successful call.
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// A successful call with output to hash.
    pub fn success_with_output(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// A failed call.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Attach the call duration.
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }
}

struct PendingCall {
    evaluation: PolicyEvaluation,
    classification: Classification,
}

/// What `post_call` hands back: the R6 envelope the call was recorded
/// under (constraints included) and the signed record as written.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub r6: R6Request,
    pub record: AuditRecord,
}

/// The governance layer: policy gate in front, audit chain behind.
pub struct Warden {
    config: WardenConfig,
    layout: StorageLayout,
    classifier: Classifier,
    engine: PolicyEngine,
    limiter: Arc<RateLimiter>,
    sessions: SessionStore,
    stream: EventStream,
    witnesses: WitnessLedger,
    r6_builder: R6Builder,
    chains: Mutex<HashMap<String, Arc<AuditChain>>>,
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl Warden {
    /// Builds the facade from a configuration, creating the storage
    /// layout and loading (and witnessing) the policy bundle.
    pub fn new(config: WardenConfig) -> WardenResult<Self> {
        let root = config
            .storage_root
            .clone()
            .unwrap_or_else(default_root);
        let layout = StorageLayout::new(root);
        std::fs::create_dir_all(layout.root())?;

        let limiter = Arc::new(RateLimiter::open(layout.rate_limit_db()));
        let engine = PolicyEngine::new(config.policy.clone(), Arc::clone(&limiter))?;
        let sessions = SessionStore::new(layout.sessions_dir())?;
        let stream = EventStream::new(layout.events_path(), config.min_severity);
        let witnesses = WitnessLedger::new(layout.witnesses_path());
        let r6_builder = R6Builder::new(config.audit_level);

        info!(
            root = %layout.root().display(),
            policy = %engine.entity_id(),
            enforce = config.policy.enforce,
            "Governance layer ready"
        );

        Ok(Self {
            config,
            layout,
            classifier: Classifier::new(),
            engine,
            limiter,
            sessions,
            stream,
            witnesses,
            r6_builder,
            chains: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// The content-addressed id of the active policy bundle.
    pub fn policy_entity_id(&self) -> &str {
        self.engine.entity_id()
    }

    /// The event stream, for registering in-process observers.
    pub fn events(&self) -> &EventStream {
        &self.stream
    }

    /// The resolved storage layout.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Gate a proposed tool call: classify, scan for sensitive paths,
    /// evaluate policy, and return the verdict the host acts on.
    pub fn pre_call(&self, session_id: &str, tool: &str, params: &Value) -> WardenResult<Verdict> {
        self.ensure_session(session_id)?;

        let classification = self.classifier.classify(tool, params);
        self.emit_sensitivity_alerts(session_id, tool, &classification);

        self.stream.emit(
            &GovernanceEvent::new(EventType::ToolCall, Severity::Debug)
                .with_session(session_id)
                .with_tool(tool)
                .with_category(classification.category),
        );

        let mut evaluation = self.engine.evaluate(
            tool,
            classification.category,
            classification.target.as_deref(),
        );

        let decision_severity = match evaluation.decision {
            PolicyDecision::Allow => Severity::Info,
            PolicyDecision::Warn => Severity::Warn,
            PolicyDecision::Deny => Severity::Alert,
        };
        let mut decision_event = GovernanceEvent::new(EventType::PolicyDecision, decision_severity)
            .with_session(session_id)
            .with_tool(tool)
            .with_category(classification.category)
            .with_decision(evaluation.decision)
            .with_reason(evaluation.reason.clone());
        if let Some(target) = &classification.target {
            decision_event = decision_event.with_target(target.clone());
        }
        if let Some(rule_id) = &evaluation.matched_rule {
            decision_event = decision_event.with_rule(rule_id.clone());
        }
        self.stream.emit(&decision_event);

        if let Some(rate_key) = &evaluation.exceeded_rate_key {
            self.stream.emit(
                &GovernanceEvent::new(EventType::RateLimitExceeded, Severity::Warn)
                    .with_session(session_id)
                    .with_tool(tool)
                    .with_reason(format!("sliding window full for {rate_key}")),
            );
        }

        let blocking = evaluation.decision == PolicyDecision::Deny && evaluation.enforced;
        if blocking {
            let mut violation = GovernanceEvent::new(EventType::PolicyViolation, Severity::Alert)
                .with_session(session_id)
                .with_tool(tool)
                .with_category(classification.category)
                .with_reason(evaluation.reason.clone());
            if let Some(rule_id) = &evaluation.matched_rule {
                violation = violation.with_rule(rule_id.clone());
            }
            self.stream.emit(&violation);
        }

        // A dry-run deny passes the gate as allow; the would-be denial
        // stays visible in the record's constraints.
        let effective = if evaluation.decision == PolicyDecision::Deny && !evaluation.enforced {
            evaluation.constraints.push("dryRun=deny".to_string());
            PolicyDecision::Allow
        } else {
            evaluation.decision
        };

        let verdict = Verdict {
            decision: effective,
            enforced: evaluation.enforced,
            reason: evaluation.reason.clone(),
            rule_id: evaluation.matched_rule.clone(),
        };
        debug!(
            session = session_id,
            tool,
            decision = %verdict.decision,
            enforced = verdict.enforced,
            "Pre-call verdict"
        );

        self.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(
            session_id.to_string(),
            PendingCall {
                evaluation,
                classification,
            },
        );

        Ok(verdict)
    }

    /// Record a completed (or blocked) tool call: build the R6
    /// envelope, append the signed audit record, feed the rate
    /// windows, and advance the session state.
    pub fn post_call(
        &self,
        session_id: &str,
        tool: &str,
        params: &Value,
        outcome: CallOutcome,
    ) -> WardenResult<RecordedCall> {
        let PendingCall {
            evaluation,
            classification,
        } = match self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
        {
            Some(pending) => pending,
            None => {
                // A post without its pre is a host-ordering bug; fall
                // back to evaluating now so the record still lands.
                warn!(session = session_id, tool, "post_call without matching pre_call");
                let classification = self.classifier.classify(tool, params);
                let evaluation = self.engine.evaluate(
                    tool,
                    classification.category,
                    classification.target.as_deref(),
                );
                PendingCall {
                    evaluation,
                    classification,
                }
            }
        };

        let state = self
            .sessions
            .load_or_create(session_id, self.engine.entity_id())?;

        let blocked = evaluation.decision == PolicyDecision::Deny && evaluation.enforced;
        let result = if blocked {
            CallResult::blocked(evaluation.reason.clone())
        } else {
            CallResult {
                status: if outcome.success {
                    CallStatus::Success
                } else {
                    CallStatus::Error
                },
                output_hash: outcome.output.as_ref().map(|o| short_hash(o.as_bytes())),
                error_message: outcome.error_message.clone(),
                duration_ms: outcome.duration_ms,
            }
        };
        let status = result.status;

        let estimated_tokens = serde_json::to_string(params)
            .ok()
            .map(|s| (s.len() / 4) as u64);
        let r6 = self.r6_builder.build(
            &state,
            R6Input {
                tool,
                params,
                category: classification.category,
                target: classification.target.clone(),
                targets: classification.targets.clone(),
                constraints: evaluation.constraints.clone(),
                agent_id: self.config.agent_id.clone(),
                approval_required: evaluation.decision == PolicyDecision::Warn,
                estimated_tokens,
            },
        )?;

        let chain = self.chain_for(session_id, &state)?;
        let record = match chain.record(&r6, result) {
            Ok(record) => record,
            Err(e) => {
                self.stream.emit(
                    &GovernanceEvent::new(EventType::SystemError, Severity::Error)
                        .with_session(session_id)
                        .with_tool(tool)
                        .with_error(e.to_string()),
                );
                return Err(e);
            }
        };

        // Feed the sliding windows of every rule that admitted this
        // call. A blocked call never ran, so it consumes no budget.
        if status != CallStatus::Blocked {
            for key in &evaluation.admitted_rate_keys {
                self.limiter.record(key);
            }
        }

        let mut state = state;
        state.action_index += 1;
        state.last_r6_id = r6.id.clone();
        state.count_call(tool, &classification.category);
        self.sessions.save(&state)?;

        let (event_type, severity) = if status == CallStatus::Blocked {
            (EventType::AuditAlert, Severity::Alert)
        } else {
            (EventType::AuditRecord, Severity::Info)
        };
        let mut audit_event = GovernanceEvent::new(event_type, severity)
            .with_session(session_id)
            .with_tool(tool)
            .with_category(classification.category)
            .with_decision(evaluation.decision)
            .with_metadata("recordId", Value::String(record.record_id.clone()));
        if let Some(target) = &classification.target {
            audit_event = audit_event.with_target(target.clone());
        }
        if let Some(ms) = outcome.duration_ms {
            audit_event = audit_event.with_duration_ms(ms);
        }
        self.stream.emit(&audit_event);

        self.stream.emit(
            &GovernanceEvent::new(EventType::ToolResult, Severity::Debug)
                .with_session(session_id)
                .with_tool(tool)
                .with_reason(status.to_string()),
        );

        Ok(RecordedCall { r6, record })
    }

    /// Verifies a session's whole chain against its own public key.
    pub fn verify(&self, session_id: &str) -> WardenResult<VerifyReport> {
        let state = self
            .sessions
            .load(session_id)?
            .ok_or_else(|| WardenError::SessionNotFound(session_id.to_string()))?;
        let mut keys = HashMap::new();
        keys.insert(
            state.signing.key_id.clone(),
            state.signing.public_key_hex.clone(),
        );
        let chain = self.chain_for(session_id, &state)?;
        chain.verify(Some(&keys))
    }

    /// Filters a session's audit records.
    pub fn filter(
        &self,
        session_id: &str,
        criteria: &FilterCriteria,
    ) -> WardenResult<Vec<AuditRecord>> {
        let state = self
            .sessions
            .load(session_id)?
            .ok_or_else(|| WardenError::SessionNotFound(session_id.to_string()))?;
        self.chain_for(session_id, &state)?.filter(criteria)
    }

    /// The most recent `n` records of a session.
    pub fn last_n(&self, session_id: &str, n: usize) -> WardenResult<Vec<AuditRecord>> {
        let state = self
            .sessions
            .load(session_id)?
            .ok_or_else(|| WardenError::SessionNotFound(session_id.to_string()))?;
        self.chain_for(session_id, &state)?.last_n(n)
    }

    /// Marks a session as ended: emits the `session_end` event and
    /// drops in-memory handles. The log and state file stay on disk.
    pub fn end_session(&self, session_id: &str) {
        self.chains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        self.stream.emit(
            &GovernanceEvent::new(EventType::SessionEnd, Severity::Info).with_session(session_id),
        );
    }

    /// Drops rate-limit events older than `window_ms` from the durable
    /// store; returns how many were removed.
    pub fn prune_rate_limits(&self, window_ms: u64) -> u64 {
        self.limiter.prune(window_ms)
    }

    fn ensure_session(&self, session_id: &str) -> WardenResult<SessionState> {
        if let Some(state) = self.sessions.load(session_id)? {
            return Ok(state);
        }
        let state = self
            .sessions
            .load_or_create(session_id, self.engine.entity_id())?;
        self.witnesses.witness(
            session_id,
            self.engine.entity_id(),
            Some("policy bound at session start".to_string()),
        );
        self.stream.emit(
            &GovernanceEvent::new(EventType::SessionStart, Severity::Info)
                .with_session(session_id)
                .with_metadata(
                    "policyEntityId",
                    Value::String(self.engine.entity_id().to_string()),
                ),
        );
        Ok(state)
    }

    fn chain_for(&self, session_id: &str, state: &SessionState) -> WardenResult<Arc<AuditChain>> {
        let mut chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(chain) = chains.get(session_id) {
            return Ok(Arc::clone(chain));
        }
        let chain = Arc::new(AuditChain::open(
            self.layout.audit_dir(),
            session_id,
            Some(state.signing.clone()),
        )?);
        chains.insert(session_id.to_string(), Arc::clone(&chain));
        Ok(chain)
    }

    fn emit_sensitivity_alerts(
        &self,
        session_id: &str,
        tool: &str,
        classification: &Classification,
    ) {
        for hit in &classification.credential_hits {
            self.stream.emit(
                &GovernanceEvent::new(EventType::AuditAlert, Severity::Alert)
                    .with_session(session_id)
                    .with_tool(tool)
                    .with_target(hit.clone())
                    .with_category(classification.category)
                    .with_reason("credential-bearing path"),
            );
        }
        for hit in &classification.memory_hits {
            self.stream.emit(
                &GovernanceEvent::new(EventType::AuditAlert, Severity::Warn)
                    .with_session(session_id)
                    .with_tool(tool)
                    .with_target(hit.clone())
                    .with_category(classification.category)
                    .with_reason("agent memory path"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use warden_types::policy::PolicyConfig;

    fn warden(dir: &TempDir, preset: &str, enforce: bool) -> Warden {
        let config = WardenConfig {
            storage_root: Some(dir.path().to_path_buf()),
            policy: PolicyConfig {
                name: preset.to_string(),
                preset: Some(preset.to_string()),
                enforce,
                ..Default::default()
            },
            ..Default::default()
        };
        Warden::new(config).unwrap()
    }

    #[test]
    fn test_allowed_call_roundtrip() {
        let dir = TempDir::new().unwrap();
        let warden = warden(&dir, "safety", true);
        let params = json!({"file_path": "/src/main.rs"});

        let verdict = warden.pre_call("sess", "Read", &params).unwrap();
        assert_eq!(verdict.decision, PolicyDecision::Allow);
        assert!(!verdict.is_blocking());

        let recorded = warden
            .post_call("sess", "Read", &params, CallOutcome::success())
            .unwrap();
        assert_eq!(recorded.record.result.status, CallStatus::Success);
        assert_eq!(recorded.record.provenance.action_index, 0);
    }

    #[test]
    fn test_blocked_call_records_blocked_status() {
        let dir = TempDir::new().unwrap();
        let warden = warden(&dir, "safety", true);
        let params = json!({"command": "rm -rf /tmp"});

        let verdict = warden.pre_call("sess", "Bash", &params).unwrap();
        assert!(verdict.is_blocking());
        assert_eq!(verdict.rule_id.as_deref(), Some("deny-destructive-commands"));

        let recorded = warden
            .post_call("sess", "Bash", &params, CallOutcome::default())
            .unwrap();
        assert_eq!(recorded.record.result.status, CallStatus::Blocked);
    }

    #[test]
    fn test_action_index_advances() {
        let dir = TempDir::new().unwrap();
        let warden = warden(&dir, "permissive", false);
        let params = json!({"file_path": "/a.txt"});

        for expected in 0..3 {
            warden.pre_call("sess", "Read", &params).unwrap();
            let recorded = warden
                .post_call("sess", "Read", &params, CallOutcome::success())
                .unwrap();
            assert_eq!(recorded.record.provenance.action_index, expected);
        }
    }

    #[test]
    fn test_verify_unknown_session_errors() {
        let dir = TempDir::new().unwrap();
        let warden = warden(&dir, "permissive", false);
        assert!(matches!(
            warden.verify("ghost"),
            Err(WardenError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_output_hash_recorded() {
        let dir = TempDir::new().unwrap();
        let warden = warden(&dir, "permissive", false);
        let params = json!({"command": "echo hi"});

        warden.pre_call("sess", "Bash", &params).unwrap();
        let recorded = warden
            .post_call(
                "sess",
                "Bash",
                &params,
                CallOutcome::success_with_output("hi\n").with_duration_ms(4),
            )
            .unwrap();
        assert_eq!(
            recorded.record.result.output_hash.as_deref(),
            Some(short_hash(b"hi\n").as_str())
        );
        assert_eq!(recorded.record.result.duration_ms, Some(4));
    }
}
