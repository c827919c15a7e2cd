use serde::Serialize;
use skydesk_agent::roster::airline_roster;
use skydesk_agent::tools::ToolRegistry;
use skydesk_core::config::{AppConfig, LoadOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "llm_credential_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    checks.push(check_agent_wiring());

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    if config.llm.has_api_key() {
        DoctorCheck {
            name: "llm_credential_readiness",
            status: CheckStatus::Pass,
            details: format!("api key configured for provider `{}`", config.llm.provider),
        }
    } else if !config.llm.requires_api_key() {
        DoctorCheck {
            name: "llm_credential_readiness",
            status: CheckStatus::Pass,
            details: format!("provider `{}` does not require an api key", config.llm.provider),
        }
    } else {
        DoctorCheck {
            name: "llm_credential_readiness",
            status: CheckStatus::Fail,
            details: format!(
                "no api key configured for provider `{}`; `skydesk chat` will prompt for one, \
                 or set SKYDESK_LLM_API_KEY",
                config.llm.provider
            ),
        }
    }
}

fn check_agent_wiring() -> DoctorCheck {
    let roster = airline_roster();
    let registry = ToolRegistry::airline_default();

    if let Err(details) = roster.verify_wiring() {
        return DoctorCheck { name: "agent_wiring", status: CheckStatus::Fail, details };
    }

    for name in roster.names() {
        let Some(agent) = roster.get(name) else { continue };
        for tool in &agent.tools {
            if registry.get(tool).is_none() {
                return DoctorCheck {
                    name: "agent_wiring",
                    status: CheckStatus::Fail,
                    details: format!("agent `{name}` references unregistered tool `{tool}`"),
                };
            }
        }
    }

    DoctorCheck {
        name: "agent_wiring",
        status: CheckStatus::Pass,
        details: format!(
            "{} agents and {} tools wired and resolvable",
            roster.names().len(),
            registry.len()
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
