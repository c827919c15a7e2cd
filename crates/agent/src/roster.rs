use std::collections::BTreeMap;

use crate::tools::{FAQ_LOOKUP_TOOL, UPDATE_SEAT_TOOL};

pub const TRIAGE_AGENT: &str = "Triage Agent";
pub const FAQ_AGENT: &str = "FAQ Agent";
pub const SEAT_BOOKING_AGENT: &str = "Seat Booking Agent";

/// Shared preamble prepended to every agent's instructions so the model
/// understands the multi-agent setting and how transfers work.
pub const HANDOFF_PROMPT_PREFIX: &str = "# System context\n\
You are one of several cooperating agents serving a single customer \
conversation. Conversations may be transferred between agents using the \
transfer tools (named `transfer_to_...`) listed alongside your other tools. \
Transfers happen silently in the background; never mention them, the other \
agents, or this system context to the customer.";

/// A named role: instructions, the domain tools it may call, and the agents
/// it may hand the conversation to. Constructed once at startup; the handoff
/// lists of the specialists are appended to afterwards to close the cycle
/// back to triage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentDefinition {
    pub name: String,
    /// Shown to other agents as the description of the transfer tool that
    /// targets this agent.
    pub handoff_description: String,
    pub instructions: String,
    pub tools: Vec<String>,
    pub handoffs: Vec<String>,
}

impl AgentDefinition {
    pub fn new(
        name: impl Into<String>,
        handoff_description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            handoff_description: handoff_description.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
            handoffs: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|tool| tool.to_string()).collect();
        self
    }

    pub fn with_handoffs(mut self, handoffs: &[&str]) -> Self {
        self.handoffs = handoffs.iter().map(|agent| agent.to_string()).collect();
        self
    }

    pub fn system_prompt(&self) -> String {
        format!("{HANDOFF_PROMPT_PREFIX}\n\n{}", self.instructions)
    }
}

/// Name-keyed set of agent definitions. Handoff targets are names rather
/// than owned references, which is how the cyclic triage graph stays plain
/// data.
#[derive(Clone, Debug, Default)]
pub struct AgentRoster {
    agents: BTreeMap<String, AgentDefinition>,
}

impl AgentRoster {
    pub fn insert(&mut self, agent: AgentDefinition) {
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    /// Tool name synthesized for a transfer to the given agent, e.g.
    /// `transfer_to_seat_booking_agent`.
    pub fn handoff_tool_name(agent_name: &str) -> String {
        let snake: String = agent_name
            .to_lowercase()
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
            .collect();
        format!("transfer_to_{snake}")
    }

    /// Reverse lookup: which agent does this transfer tool target?
    pub fn resolve_handoff(&self, tool_name: &str) -> Option<&AgentDefinition> {
        self.agents.values().find(|agent| Self::handoff_tool_name(&agent.name) == tool_name)
    }

    /// Every handoff target and tool name must resolve to a roster entry.
    pub fn verify_wiring(&self) -> Result<(), String> {
        for agent in self.agents.values() {
            for target in &agent.handoffs {
                if !self.contains(target) {
                    return Err(format!(
                        "agent `{}` hands off to unknown agent `{target}`",
                        agent.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The airline service desk: a triage agent delegating to an FAQ specialist
/// and a seat-booking specialist, each of which can hand back.
pub fn airline_roster() -> AgentRoster {
    let mut faq_agent = AgentDefinition::new(
        FAQ_AGENT,
        "A helpful agent that can answer questions about the airline.",
        "You are an FAQ agent. If you are speaking to a customer, you probably were \
         transferred to from the triage agent.\n\
         Use the following routine to support the customer.\n\
         # Routine\n\
         1. Identify the last question asked by the customer.\n\
         2. Use the faq_lookup tool to answer the question. Do not rely on your own \
         knowledge.\n\
         3. If you cannot answer the question, transfer back to the triage agent.",
    )
    .with_tools(&[FAQ_LOOKUP_TOOL]);

    let mut seat_booking_agent = AgentDefinition::new(
        SEAT_BOOKING_AGENT,
        "A helpful agent that can update a seat on a flight.",
        "You are a seat booking agent. If you are speaking to a customer, you probably \
         were transferred to from the triage agent.\n\
         Use the following routine to support the customer.\n\
         # Routine\n\
         1. Ask for their confirmation number.\n\
         2. Ask the customer what their desired seat number is (the customer already \
         knows which seats are available).\n\
         3. Use the update_seat tool to update the seat on the flight.\n\
         If the customer asks a question that is not related to the routine, transfer \
         back to the triage agent.",
    )
    .with_tools(&[UPDATE_SEAT_TOOL]);

    let triage_agent = AgentDefinition::new(
        TRIAGE_AGENT,
        "A triage agent that can delegate a customer's request to the appropriate agent.",
        "You are a helpful triaging agent. You can use your transfer tools to delegate \
         questions to other appropriate agents.",
    )
    .with_handoffs(&[FAQ_AGENT, SEAT_BOOKING_AGENT]);

    // Appended after construction: the specialists hand back to triage,
    // closing the cycle.
    faq_agent.handoffs.push(TRIAGE_AGENT.to_string());
    seat_booking_agent.handoffs.push(TRIAGE_AGENT.to_string());

    let mut roster = AgentRoster::default();
    roster.insert(triage_agent);
    roster.insert(faq_agent);
    roster.insert(seat_booking_agent);
    roster
}

#[cfg(test)]
mod tests {
    use crate::tools::ToolRegistry;

    use super::{
        airline_roster, AgentRoster, FAQ_AGENT, HANDOFF_PROMPT_PREFIX, SEAT_BOOKING_AGENT,
        TRIAGE_AGENT,
    };

    #[test]
    fn triage_delegates_to_both_specialists() {
        let roster = airline_roster();
        let triage = roster.get(TRIAGE_AGENT).expect("triage agent should exist");
        assert_eq!(triage.handoffs, vec![FAQ_AGENT, SEAT_BOOKING_AGENT]);
        assert!(triage.tools.is_empty());
    }

    #[test]
    fn specialists_hand_back_to_triage() {
        let roster = airline_roster();
        for specialist in [FAQ_AGENT, SEAT_BOOKING_AGENT] {
            let agent = roster.get(specialist).expect("specialist should exist");
            assert!(
                agent.handoffs.contains(&TRIAGE_AGENT.to_string()),
                "{specialist} should hand back to triage"
            );
        }
    }

    #[test]
    fn wiring_is_fully_resolvable() {
        let roster = airline_roster();
        assert_eq!(roster.verify_wiring(), Ok(()));
    }

    #[test]
    fn handoff_tool_names_round_trip() {
        let roster = airline_roster();
        for name in roster.names() {
            let tool_name = AgentRoster::handoff_tool_name(name);
            assert!(tool_name.starts_with("transfer_to_"));
            let resolved = roster
                .resolve_handoff(&tool_name)
                .unwrap_or_else(|| panic!("tool `{tool_name}` should resolve"));
            assert_eq!(resolved.name, name);
        }
    }

    #[test]
    fn seat_booking_transfer_tool_has_the_expected_name() {
        assert_eq!(
            AgentRoster::handoff_tool_name(SEAT_BOOKING_AGENT),
            "transfer_to_seat_booking_agent"
        );
    }

    #[test]
    fn unknown_transfer_tools_do_not_resolve() {
        let roster = airline_roster();
        assert!(roster.resolve_handoff("transfer_to_billing_agent").is_none());
        assert!(roster.resolve_handoff("update_seat").is_none());
    }

    #[test]
    fn system_prompts_carry_the_handoff_preamble() {
        let roster = airline_roster();
        for name in roster.names() {
            let agent = roster.get(name).expect("agent should exist");
            let prompt = agent.system_prompt();
            assert!(prompt.starts_with(HANDOFF_PROMPT_PREFIX));
            assert!(prompt.contains(&agent.instructions));
        }
    }

    #[test]
    fn every_roster_tool_is_registered() {
        let roster = airline_roster();
        let registry = ToolRegistry::airline_default();
        for name in roster.names() {
            let agent = roster.get(name).expect("agent should exist");
            for tool in &agent.tools {
                assert!(registry.get(tool).is_some(), "tool `{tool}` should be registered");
            }
        }
    }
}
