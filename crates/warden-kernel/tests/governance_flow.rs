//! End-to-end governance scenarios: gate, record, verify, tamper.

use serde_json::json;
use tempfile::TempDir;
use warden_kernel::{
    CallOutcome, CallStatus, FilterCriteria, PolicyConfig, PolicyDecision, Warden, WardenConfig,
};
use warden_types::event::{EventType, GovernanceEvent, Severity};
use warden_types::policy::{PolicyRule, RateLimitSpec, RuleMatch};

fn warden_with(dir: &TempDir, policy: PolicyConfig) -> Warden {
    let config = WardenConfig {
        storage_root: Some(dir.path().to_path_buf()),
        policy,
        min_severity: Severity::Debug,
        ..Default::default()
    };
    Warden::new(config).unwrap()
}

fn safety(enforce: bool) -> PolicyConfig {
    PolicyConfig {
        name: "safety".to_string(),
        preset: Some("safety".to_string()),
        enforce,
        ..Default::default()
    }
}

fn stream_events(warden: &Warden) -> Vec<GovernanceEvent> {
    let contents = std::fs::read_to_string(warden.layout().events_path()).unwrap_or_default();
    contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn destructive_command_blocked_under_safety() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(true));
    let params = json!({"command": "rm -rf /tmp"});

    let verdict = warden.pre_call("sess-1", "Bash", &params).unwrap();
    assert_eq!(verdict.decision, PolicyDecision::Deny);
    assert!(verdict.is_blocking());
    assert_eq!(verdict.rule_id.as_deref(), Some("deny-destructive-commands"));

    let recorded = warden
        .post_call("sess-1", "Bash", &params, CallOutcome::default())
        .unwrap();
    assert_eq!(recorded.record.result.status, CallStatus::Blocked);

    let events = stream_events(&warden);
    assert!(events.iter().any(|e| {
        e.event_type == EventType::AuditAlert && e.severity == Severity::Alert
    }));
    assert!(events.iter().any(|e| {
        e.event_type == EventType::PolicyDecision
            && e.decision == Some(PolicyDecision::Deny)
            && e.rule_id.as_deref() == Some("deny-destructive-commands")
    }));
}

#[test]
fn credential_read_escalates_and_alerts() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(true));
    let params = json!({"file_path": "/etc/credentials.json"});

    let verdict = warden.pre_call("sess-1", "Read", &params).unwrap();
    assert_eq!(verdict.decision, PolicyDecision::Deny);
    assert_eq!(verdict.rule_id.as_deref(), Some("deny-secret-files"));

    let events = stream_events(&warden);
    let alert = events
        .iter()
        .find(|e| e.event_type == EventType::AuditAlert)
        .expect("pre-call credential alert");
    assert_eq!(alert.severity, Severity::Alert);
    assert_eq!(alert.target.as_deref(), Some("/etc/credentials.json"));
    assert_eq!(
        alert.category,
        Some(warden_kernel::ToolCategory::CredentialAccess)
    );
}

#[test]
fn dry_run_deny_passes_gate_but_is_visible() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(false));
    let params = json!({"command": "rm -rf /tmp"});

    let verdict = warden.pre_call("sess-1", "Bash", &params).unwrap();
    assert_eq!(verdict.decision, PolicyDecision::Allow);
    assert!(!verdict.enforced);
    assert!(!verdict.is_blocking());

    let recorded = warden
        .post_call("sess-1", "Bash", &params, CallOutcome::success())
        .unwrap();
    // The tool actually ran.
    assert_eq!(recorded.record.result.status, CallStatus::Success);
    // The would-be denial is preserved in the envelope's constraints.
    assert!(recorded
        .r6
        .rules
        .constraints
        .contains(&"ruleId=deny-destructive-commands".to_string()));
    assert!(recorded
        .r6
        .rules
        .constraints
        .contains(&"dryRun=deny".to_string()));

    // The stream still shows the raw deny decision.
    let events = stream_events(&warden);
    assert!(events.iter().any(|e| {
        e.event_type == EventType::PolicyDecision && e.decision == Some(PolicyDecision::Deny)
    }));
}

#[test]
fn ten_record_chain_verifies_with_full_signature_stats() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(true));

    for i in 0..10 {
        let params = json!({"file_path": format!("/src/mod{i}.rs")});
        warden.pre_call("sess-1", "Read", &params).unwrap();
        warden
            .post_call("sess-1", "Read", &params, CallOutcome::success())
            .unwrap();
    }

    let report = warden.verify("sess-1").unwrap();
    assert!(report.valid, "errors: {:?}", report.errors);
    assert_eq!(report.record_count, 10);
    assert_eq!(report.signature_stats.signed, 10);
    assert_eq!(report.signature_stats.verified, 10);
    assert_eq!(report.signature_stats.invalid, 0);
}

#[test]
fn tampering_with_a_record_breaks_verification() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(true));

    for i in 0..8 {
        let params = json!({"file_path": format!("/src/mod{i}.rs")});
        warden.pre_call("sess-1", "Read", &params).unwrap();
        warden
            .post_call("sess-1", "Read", &params, CallOutcome::success())
            .unwrap();
    }

    let log_path = dir.path().join("audit").join("sess-1.jsonl");
    let contents = std::fs::read_to_string(&log_path).unwrap();
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    lines[5] = lines[5].replace("/src/mod5.rs", "/src/mod6.rs");
    std::fs::write(&log_path, lines.join("\n") + "\n").unwrap();

    let report = warden.verify("sess-1").unwrap();
    assert!(!report.valid);
    assert!(report
        .errors
        .iter()
        .any(|e| e.starts_with("record 5") || e.starts_with("record 6")));
}

#[test]
fn rate_limit_admits_up_to_n_then_denies() {
    let dir = TempDir::new().unwrap();
    let policy = PolicyConfig {
        name: "rate-test".to_string(),
        enforce: true,
        rules: vec![PolicyRule {
            id: "bash-budget".to_string(),
            name: "Bash budget".to_string(),
            priority: 1,
            match_spec: RuleMatch {
                tools: Some(vec!["Bash".to_string()]),
                rate_limit: Some(RateLimitSpec {
                    max_count: 3,
                    window_ms: 1_500,
                }),
                ..Default::default()
            },
            decision: PolicyDecision::Deny,
            reason: Some("Too many shell commands".to_string()),
        }],
        ..Default::default()
    };
    let warden = warden_with(&dir, policy);
    let params = json!({"command": "ls"});

    for i in 0..3 {
        let verdict = warden.pre_call("sess-1", "Bash", &params).unwrap();
        assert_eq!(verdict.decision, PolicyDecision::Allow, "call {i}");
        warden
            .post_call("sess-1", "Bash", &params, CallOutcome::success())
            .unwrap();
    }

    let fourth = warden.pre_call("sess-1", "Bash", &params).unwrap();
    assert_eq!(fourth.decision, PolicyDecision::Deny);
    assert_eq!(fourth.rule_id.as_deref(), Some("bash-budget"));
    warden
        .post_call("sess-1", "Bash", &params, CallOutcome::default())
        .unwrap();

    let events = stream_events(&warden);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::RateLimitExceeded));

    // Once the window has drained, calls are admitted again.
    std::thread::sleep(std::time::Duration::from_millis(1_700));
    let fifth = warden.pre_call("sess-1", "Bash", &params).unwrap();
    assert_eq!(fifth.decision, PolicyDecision::Allow);
}

#[test]
fn sessions_are_isolated_chains() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(true));
    let params = json!({"file_path": "/src/a.rs"});

    for session in ["alpha", "beta"] {
        warden.pre_call(session, "Read", &params).unwrap();
        warden
            .post_call(session, "Read", &params, CallOutcome::success())
            .unwrap();
    }

    let alpha = warden.verify("alpha").unwrap();
    let beta = warden.verify("beta").unwrap();
    assert_eq!(alpha.record_count, 1);
    assert_eq!(beta.record_count, 1);
    assert!(alpha.valid && beta.valid);

    // Each session signs with its own key: alpha's records do not
    // verify under beta's key and vice versa, which verify() already
    // scopes correctly by loading each session's own state.
    let alpha_records = warden.last_n("alpha", 10).unwrap();
    let beta_records = warden.last_n("beta", 10).unwrap();
    assert_ne!(
        alpha_records[0].signing_key_id,
        beta_records[0].signing_key_id
    );
}

#[test]
fn filter_and_last_n_queries() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(true));

    let read = json!({"file_path": "/src/lib.rs"});
    warden.pre_call("sess-1", "Read", &read).unwrap();
    warden
        .post_call("sess-1", "Read", &read, CallOutcome::success())
        .unwrap();

    let destructive = json!({"command": "rm -rf /srv/data"});
    warden.pre_call("sess-1", "Bash", &destructive).unwrap();
    warden
        .post_call("sess-1", "Bash", &destructive, CallOutcome::default())
        .unwrap();

    let blocked = warden
        .filter(
            "sess-1",
            &FilterCriteria {
                status: Some(CallStatus::Blocked),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].tool, "Bash");

    let recent = warden.filter(
        "sess-1",
        &FilterCriteria {
            since: Some("1h".to_string()),
            ..Default::default()
        },
    );
    assert_eq!(recent.unwrap().len(), 2);

    let last = warden.last_n("sess-1", 1).unwrap();
    assert_eq!(last[0].tool, "Bash");
}

#[test]
fn session_lifecycle_events_and_witnessing() {
    let dir = TempDir::new().unwrap();
    let warden = warden_with(&dir, safety(true));
    let params = json!({"file_path": "/src/a.rs"});

    warden.pre_call("sess-1", "Read", &params).unwrap();
    warden
        .post_call("sess-1", "Read", &params, CallOutcome::success())
        .unwrap();
    warden.end_session("sess-1");

    let events = stream_events(&warden);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::SessionStart));
    assert!(events.iter().any(|e| e.event_type == EventType::SessionEnd));

    // The witnessing ledger binds the session to the policy bundle.
    let witnesses = std::fs::read_to_string(warden.layout().witnesses_path()).unwrap();
    assert!(witnesses.contains("sess-1"));
    assert!(witnesses.contains(warden.policy_entity_id()));
}

#[test]
fn chain_survives_facade_restart() {
    let dir = TempDir::new().unwrap();
    let params = json!({"file_path": "/src/a.rs"});

    {
        let warden = warden_with(&dir, safety(true));
        warden.pre_call("sess-1", "Read", &params).unwrap();
        warden
            .post_call("sess-1", "Read", &params, CallOutcome::success())
            .unwrap();
    }

    let warden = warden_with(&dir, safety(true));
    warden.pre_call("sess-1", "Read", &params).unwrap();
    let recorded = warden
        .post_call("sess-1", "Read", &params, CallOutcome::success())
        .unwrap();
    // State and chain picked up where the previous process stopped.
    assert_eq!(recorded.record.provenance.action_index, 1);

    let report = warden.verify("sess-1").unwrap();
    assert!(report.valid, "errors: {:?}", report.errors);
    assert_eq!(report.record_count, 2);
    assert_eq!(report.signature_stats.verified, 2);
}
