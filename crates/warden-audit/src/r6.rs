//! R6 request assembly.
//!
//! Builds one immutable [`R6Request`] per tool call from the session
//! state, the classifier's output, and the policy evaluation.

use serde_json::Value;
use uuid::Uuid;
use warden_types::category::ToolCategory;
use warden_types::error::WardenResult;
use warden_types::hash::short_hash_canonical;
use warden_types::policy::AuditLevel;
use warden_types::r6::{R6Call, R6Reference, R6Request, R6Resource, R6Role, R6Rules, BINDING_SOFT_LCT};
use warden_types::session::SessionState;

/// Assembles R6 request envelopes.
pub struct R6Builder {
    audit_level: AuditLevel,
}

/// Call-specific inputs to [`R6Builder::build`].
pub struct R6Input<'a> {
    pub tool: &'a str,
    pub params: &'a Value,
    pub category: ToolCategory,
    pub target: Option<String>,
    pub targets: Option<Vec<String>>,
    pub constraints: Vec<String>,
    pub agent_id: Option<String>,
    pub approval_required: bool,
    pub estimated_tokens: Option<u64>,
}

impl R6Builder {
    /// A builder emitting envelopes at the given audit level.
    pub fn new(audit_level: AuditLevel) -> Self {
        Self { audit_level }
    }

    /// Builds the envelope for one tool call. The id is `r6:` plus a
    /// random 8-char identifier; the input hash covers the canonical
    /// JSON of the parameter bag.
    pub fn build(&self, state: &SessionState, input: R6Input<'_>) -> WardenResult<R6Request> {
        let id = format!("r6:{}", &Uuid::new_v4().simple().to_string()[..8]);
        Ok(R6Request {
            id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            rules: R6Rules {
                audit_level: self.audit_level,
                constraints: input.constraints,
                policy_entity_id: state.policy_entity_id.clone(),
            },
            role: R6Role {
                session_id: state.session_id.clone(),
                agent_id: input.agent_id,
                action_index: state.action_index,
                binding_type: BINDING_SOFT_LCT.to_string(),
            },
            request: R6Call {
                tool_name: input.tool.to_string(),
                category: input.category,
                target: input.target,
                targets: input.targets,
                input_hash: short_hash_canonical(input.params)?,
            },
            reference: R6Reference {
                session_id: state.session_id.clone(),
                previous_r6_id: state.last_r6_id.clone(),
                chain_position: state.action_index,
            },
            resource: R6Resource {
                estimated_tokens: input.estimated_tokens,
                approval_required: input.approval_required,
            },
        })
    }
}
